use std::fmt;

/// Placeholder the static-site build replaces with the served image path.
pub const PATH_PREFIX: &str = "{static}/images/";

pub const PREVIEW_PREFIX: &str = "/static/images/";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    filename: String,
}

impl ImageRef {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn path(&self) -> String {
        format!("{PATH_PREFIX}{}", self.filename)
    }

    pub fn preview_url(&self) -> String {
        format!("{PREVIEW_PREFIX}{}", self.filename)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.filename)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    None,
    Left,
    Center,
    Right,
}

impl Alignment {
    pub const ALL: [Alignment; 4] = [
        Alignment::None,
        Alignment::Left,
        Alignment::Center,
        Alignment::Right,
    ];

    pub fn class_token(self) -> Option<&'static str> {
        match self {
            Alignment::None => None,
            Alignment::Left => Some("align-left"),
            Alignment::Center => Some("align-center"),
            Alignment::Right => Some("align-right"),
        }
    }

    pub fn from_class_token(token: &str) -> Option<Self> {
        match token {
            "align-left" => Some(Alignment::Left),
            "align-center" => Some(Alignment::Center),
            "align-right" => Some(Alignment::Right),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Alignment::None => "none",
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
        }
    }

    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|a| *a == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        let idx = Self::ALL.iter().position(|a| *a == self).unwrap_or(0);
        Self::ALL[(idx + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PresentationOptions {
    pub alt: String,
    pub caption: String,
    pub alignment: Alignment,
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupShape {
    Plain,
    InlineTag,
    Block,
}

impl PresentationOptions {
    pub fn shape(&self) -> MarkupShape {
        if !self.caption.is_empty() {
            MarkupShape::Block
        } else if self.alignment != Alignment::None || self.width.is_some() {
            MarkupShape::InlineTag
        } else {
            MarkupShape::Plain
        }
    }
}

pub fn generate(image: &ImageRef, options: &PresentationOptions) -> String {
    let path = image.path();
    let alt = if options.alt.is_empty() {
        image.filename()
    } else {
        options.alt.as_str()
    };

    match options.shape() {
        MarkupShape::Plain => format!("![{alt}]({path})"),
        MarkupShape::InlineTag => {
            let class_attr = options
                .alignment
                .class_token()
                .map(|token| format!(" class=\"{token}\""))
                .unwrap_or_default();
            let width_attr = options
                .width
                .map(|px| format!(" width=\"{px}\""))
                .unwrap_or_default();
            format!("<img src=\"{path}\"{class_attr}{width_attr} alt=\"{alt}\" />")
        }
        MarkupShape::Block => {
            let align_class = options
                .alignment
                .class_token()
                .map(|token| format!(" {token}"))
                .unwrap_or_default();
            let style_attr = options
                .width
                .map(|px| format!(" style=\"width: {px}px\""))
                .unwrap_or_default();
            format!(
                "<div class=\"figure{align_class}\"{style_attr}>\n  <img src=\"{path}\" alt=\"{alt}\">\n  <p class=\"caption\">{}</p>\n</div>",
                options.caption
            )
        }
    }
}
