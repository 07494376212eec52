use crate::directive::{Alignment, ImageRef, PATH_PREFIX, PREVIEW_PREFIX, PresentationOptions};
use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd, html};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use regex::Regex;
use unicode_width::UnicodeWidthStr;

// Quoted attribute values may hold `>`.
static TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<(/?)([a-zA-Z][a-zA-Z0-9]*)\b((?:[^>"']|"[^"]*"|'[^']*')*)>"#).unwrap()
});

static ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .unwrap()
});

static CLOSE_P: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</p\s*>").unwrap());

static STYLE_WIDTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"width:\s*(\d+)px").unwrap());

static IMG_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<img\b").unwrap());

fn markdown_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_FOOTNOTES);
    options
}

pub fn preview_source(body: &str) -> String {
    body.replace(PATH_PREFIX, PREVIEW_PREFIX)
}

pub fn render_html(title: &str, body: &str) -> String {
    let source = preview_source(body);
    let mut out = format!("<h1>{}</h1>\n", html_escape::encode_text(title));
    html::push_html(&mut out, Parser::new_ext(&source, markdown_options()));
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Figure {
    pub classes: Vec<String>,
    pub style: Option<String>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderedImage {
    pub src: String,
    pub alt: String,
    pub classes: Vec<String>,
    pub style: Option<String>,
    pub width: Option<String>,
    pub figure: Option<Figure>,
}

impl RenderedImage {
    pub fn image_ref(&self) -> Option<ImageRef> {
        let filename = self.src.strip_prefix(PREVIEW_PREFIX)?;
        if filename.is_empty() {
            return None;
        }
        Some(ImageRef::new(filename))
    }

    pub fn options(&self) -> PresentationOptions {
        let (classes, style, width_attr) = match &self.figure {
            Some(figure) => (&figure.classes, figure.style.as_deref(), None),
            None => (&self.classes, self.style.as_deref(), self.width.as_deref()),
        };
        let alignment = classes
            .iter()
            .find_map(|c| Alignment::from_class_token(c))
            .unwrap_or(Alignment::None);
        let width = style
            .and_then(|style| STYLE_WIDTH.captures(style))
            .and_then(|caps| caps[1].parse::<u32>().ok())
            .or_else(|| width_attr.and_then(|w| w.trim().parse::<u32>().ok()))
            .filter(|px| *px > 0);

        PresentationOptions {
            alt: self.alt.clone(),
            caption: self
                .figure
                .as_ref()
                .and_then(|f| f.caption.clone())
                .unwrap_or_default(),
            alignment,
            width,
        }
    }
}

struct DivFrame {
    figure: Option<usize>,
}

pub fn rendered_images(html: &str) -> Vec<RenderedImage> {
    let mut figures: Vec<Figure> = Vec::new();
    let mut stack: Vec<DivFrame> = Vec::new();
    let mut images: Vec<(RenderedImage, Option<usize>)> = Vec::new();

    for caps in TAG.captures_iter(html) {
        let closing = !caps[1].is_empty();
        let name = caps[2].to_ascii_lowercase();
        let attrs = parse_attrs(&caps[3]);
        let current_figure = stack.iter().rev().find_map(|frame| frame.figure);

        match (closing, name.as_str()) {
            (false, "div") => {
                let classes = class_tokens(attr(&attrs, "class"));
                let figure = if classes.iter().any(|c| c == "figure") {
                    figures.push(Figure {
                        classes,
                        style: attr(&attrs, "style").map(str::to_string),
                        caption: None,
                    });
                    Some(figures.len() - 1)
                } else {
                    None
                };
                stack.push(DivFrame { figure });
            }
            (true, "div") => {
                stack.pop();
            }
            (false, "img") => {
                let image = RenderedImage {
                    src: percent_decode(attr(&attrs, "src").unwrap_or_default()),
                    alt: attr(&attrs, "alt").unwrap_or_default().to_string(),
                    classes: class_tokens(attr(&attrs, "class")),
                    style: attr(&attrs, "style").map(str::to_string),
                    width: attr(&attrs, "width").map(str::to_string),
                    figure: None,
                };
                images.push((image, current_figure));
            }
            (false, "p") => {
                let Some(idx) = current_figure else { continue };
                let is_caption = class_tokens(attr(&attrs, "class"))
                    .iter()
                    .any(|c| c == "caption");
                if !is_caption || figures[idx].caption.is_some() {
                    continue;
                }
                let Some(whole) = caps.get(0) else { continue };
                let rest = &html[whole.end()..];
                let inner = CLOSE_P.find(rest).map_or(rest, |m| &rest[..m.start()]);
                figures[idx].caption = Some(decode_entities(&strip_tags(inner)));
            }
            _ => {}
        }
    }

    images
        .into_iter()
        .map(|(mut image, figure)| {
            image.figure = figure.map(|idx| figures[idx].clone());
            image
        })
        .collect()
}

fn parse_attrs(raw: &str) -> Vec<(String, String)> {
    ATTR.captures_iter(raw)
        .map(|caps| {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map_or("", |m| m.as_str());
            (caps[1].to_ascii_lowercase(), decode_entities(value))
        })
        .collect()
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn class_tokens(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn strip_tags(text: &str) -> String {
    TAG.replace_all(text, "").into_owned()
}

fn decode_entities(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

fn percent_decode(text: &str) -> String {
    percent_decode_str(text).decode_utf8_lossy().into_owned()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PreviewStyles {
    pub base: Style,
    pub heading: Style,
    pub link: Style,
    pub code: Style,
    pub quote: Style,
    pub rule: Style,
    pub image: Style,
    pub caption: Style,
}

#[derive(Debug, Clone, Default)]
pub struct PreviewDocument {
    pub images: Vec<RenderedImage>,
    pub lines: Vec<Line<'static>>,
    pub image_lines: Vec<usize>,
}

impl PreviewDocument {
    pub fn render(title: &str, body: &str, width: usize, styles: &PreviewStyles) -> Self {
        let html = render_html(title, body);
        let images = rendered_images(&html);
        let mut layout = TextLayout::new(width, *styles);
        layout.heading(title);
        layout.markdown(&preview_source(body));
        let TextLayout {
            lines,
            mut image_lines,
            ..
        } = layout;
        if image_lines.len() != images.len() {
            tracing::debug!(
                rows = image_lines.len(),
                nodes = images.len(),
                "preview image rows out of step with html"
            );
            image_lines.truncate(images.len());
        }
        Self {
            images,
            lines,
            image_lines,
        }
    }

    pub fn image_at_line(&self, line: usize) -> Option<usize> {
        self.image_lines.iter().position(|l| *l == line)
    }
}

struct TextLayout {
    width: usize,
    styles: PreviewStyles,
    lines: Vec<Line<'static>>,
    image_lines: Vec<usize>,
    current: Vec<Span<'static>>,
    prefix: String,
    inline: Vec<Style>,
    list_stack: Vec<Option<u64>>,
    quote_depth: usize,
    in_code: bool,
    image_alt: Option<(String, String)>,
    html_block: Option<String>,
}

impl TextLayout {
    fn new(width: usize, styles: PreviewStyles) -> Self {
        Self {
            width: width.max(10),
            styles,
            lines: Vec::new(),
            image_lines: Vec::new(),
            current: Vec::new(),
            prefix: String::new(),
            inline: vec![styles.base],
            list_stack: Vec::new(),
            quote_depth: 0,
            in_code: false,
            image_alt: None,
            html_block: None,
        }
    }

    fn style(&self) -> Style {
        self.inline.last().copied().unwrap_or(self.styles.base)
    }

    fn heading(&mut self, title: &str) {
        if title.is_empty() {
            return;
        }
        self.push_wrapped(vec![Span::styled(title.to_string(), self.styles.heading)]);
        self.blank();
    }

    fn blank(&mut self) {
        if self.lines.last().is_some_and(|l| l.width() > 0) {
            self.lines.push(Line::default());
        }
    }

    fn flush(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let spans = std::mem::take(&mut self.current);
        self.push_wrapped(spans);
    }

    fn block_prefix(&self) -> String {
        let mut prefix = "│ ".repeat(self.quote_depth);
        prefix.push_str(&self.prefix);
        prefix
    }

    fn push_wrapped(&mut self, spans: Vec<Span<'static>>) {
        let prefix = self.block_prefix();
        let indent = " ".repeat(prefix.width());
        let room = self.width.saturating_sub(prefix.width()).max(1);

        let mut line: Vec<Span<'static>> = vec![Span::styled(prefix, self.styles.quote)];
        let mut used = 0usize;
        for span in spans {
            for word in split_keep_spaces(&span.content) {
                let w = word.width();
                if used + w > room && used > 0 {
                    self.lines.push(Line::from(std::mem::take(&mut line)));
                    line.push(Span::styled(indent.clone(), self.styles.quote));
                    used = 0;
                    if word.trim().is_empty() {
                        continue;
                    }
                }
                used += w;
                line.push(Span::styled(word, span.style));
            }
        }
        self.lines.push(Line::from(line));
        // Only the first row of a list item carries the marker.
        if !self.prefix.trim().is_empty() {
            self.prefix = " ".repeat(self.prefix.width());
        }
    }

    fn push_image(&mut self, label: String, caption: Option<String>) {
        self.flush();
        self.image_lines.push(self.lines.len());
        let prefix = self.block_prefix();
        self.lines.push(Line::from(vec![
            Span::styled(prefix.clone(), self.styles.quote),
            Span::styled(format!("▣ {label}"), self.styles.image),
        ]));
        if let Some(caption) = caption.filter(|c| !c.is_empty()) {
            self.lines.push(Line::from(vec![
                Span::styled(prefix, self.styles.quote),
                Span::styled(format!("  {caption}"), self.styles.caption),
            ]));
        }
    }

    fn html_chunk(&mut self, chunk: &str) {
        let images = rendered_images(chunk);
        let tag_count = IMG_OPEN.find_iter(chunk).count();
        if images.is_empty() && tag_count == 0 {
            let text = decode_entities(strip_tags(chunk).trim());
            if !text.is_empty() {
                self.current.push(Span::styled(text, self.style()));
            }
            return;
        }
        for image in images {
            let options = image.options();
            self.push_image(image_label(&image, &options), Some(options.caption));
        }
    }

    fn markdown(&mut self, source: &str) {
        for event in Parser::new_ext(source, markdown_options()) {
            if let Some(block) = self.html_block.as_mut() {
                match event {
                    Event::Html(text) => {
                        block.push_str(&text);
                        continue;
                    }
                    Event::End(TagEnd::HtmlBlock) => {
                        let block = self.html_block.take().unwrap_or_default();
                        self.html_chunk(&block);
                        self.flush();
                        self.blank();
                        continue;
                    }
                    _ => {}
                }
            }
            if let Some((_, alt)) = self.image_alt.as_mut() {
                match event {
                    Event::Text(text) | Event::Code(text) => {
                        alt.push_str(&text);
                        continue;
                    }
                    Event::End(TagEnd::Image) => {
                        let (src, alt) = self.image_alt.take().unwrap_or_default();
                        let image = RenderedImage {
                            src,
                            alt,
                            ..RenderedImage::default()
                        };
                        self.push_image(image_label(&image, &image.options()), None);
                        continue;
                    }
                    _ => continue,
                }
            }

            match event {
                Event::Start(tag) => self.start(tag),
                Event::End(tag) => self.end(tag),
                Event::Text(text) => {
                    if self.in_code {
                        for line in text.lines() {
                            self.current
                                .push(Span::styled(format!("  {line}"), self.styles.code));
                            self.flush();
                        }
                    } else {
                        self.current.push(Span::styled(text.to_string(), self.style()));
                    }
                }
                Event::Code(text) => {
                    self.current
                        .push(Span::styled(format!("`{text}`"), self.styles.code));
                }
                Event::InlineHtml(text) | Event::Html(text) => self.html_chunk(&text),
                Event::SoftBreak => self.current.push(Span::styled(" ", self.style())),
                Event::HardBreak => self.flush(),
                Event::Rule => {
                    self.flush();
                    let rule = "─".repeat(self.width.min(40));
                    self.lines.push(Line::from(Span::styled(rule, self.styles.rule)));
                    self.blank();
                }
                Event::TaskListMarker(done) => {
                    let mark = if done { "[x] " } else { "[ ] " };
                    self.current.push(Span::styled(mark, self.style()));
                }
                _ => {}
            }
        }
        if let Some(block) = self.html_block.take() {
            self.html_chunk(&block);
        }
        self.flush();
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {}
            Tag::Heading { level, .. } => {
                self.flush();
                let marks = "#".repeat(heading_rank(level));
                self.inline.push(self.styles.heading);
                self.current
                    .push(Span::styled(format!("{marks} "), self.styles.heading));
            }
            Tag::BlockQuote => {
                self.flush();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(kind) => {
                self.flush();
                self.in_code = true;
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        self.lines.push(Line::from(Span::styled(
                            format!("  ─ {lang}"),
                            self.styles.rule,
                        )));
                    }
                }
            }
            Tag::HtmlBlock => {
                self.flush();
                self.html_block = Some(String::new());
            }
            Tag::List(start) => {
                self.flush();
                self.list_stack.push(start);
            }
            Tag::Item => {
                self.flush();
                let depth = self.list_stack.len().saturating_sub(1);
                let marker = match self.list_stack.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{n}. ");
                        *n += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                self.prefix = format!("{}{marker}", "  ".repeat(depth));
            }
            Tag::Emphasis => self
                .inline
                .push(self.style().add_modifier(Modifier::ITALIC)),
            Tag::Strong => self.inline.push(self.style().add_modifier(Modifier::BOLD)),
            Tag::Strikethrough => self
                .inline
                .push(self.style().add_modifier(Modifier::CROSSED_OUT)),
            Tag::Link { .. } => self.inline.push(self.styles.link),
            Tag::Image { dest_url, .. } => {
                self.image_alt = Some((percent_decode(&dest_url), String::new()));
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.flush();
                if self.list_stack.is_empty() {
                    self.blank();
                }
            }
            TagEnd::Heading(_) => {
                self.inline.pop();
                self.flush();
                self.blank();
            }
            TagEnd::BlockQuote => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.blank();
            }
            TagEnd::CodeBlock => {
                self.flush();
                self.in_code = false;
                self.blank();
            }
            TagEnd::List(_) => {
                self.flush();
                self.list_stack.pop();
                self.prefix.clear();
                if self.list_stack.is_empty() {
                    self.blank();
                }
            }
            TagEnd::Item => {
                self.flush();
                self.prefix.clear();
            }
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link => {
                if self.inline.len() > 1 {
                    self.inline.pop();
                }
            }
            _ => {}
        }
    }
}

fn heading_rank(level: HeadingLevel) -> usize {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn image_label(image: &RenderedImage, options: &PresentationOptions) -> String {
    let name = image
        .image_ref()
        .map(|r| r.filename().to_string())
        .unwrap_or_else(|| image.src.clone());
    let mut label = if options.alt.is_empty() {
        name
    } else {
        format!("{} ({name})", options.alt)
    };
    if options.alignment != Alignment::None {
        label.push_str(&format!(" [{}]", options.alignment.label()));
    }
    if let Some(px) = options.width {
        label.push_str(&format!(" [{px}px]"));
    }
    label
}

fn split_keep_spaces(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut word = String::new();
    for ch in text.chars() {
        if ch == ' ' {
            if !word.is_empty() {
                out.push(std::mem::take(&mut word));
            }
            out.push(" ".to_string());
        } else {
            word.push(ch);
        }
    }
    if !word.is_empty() {
        out.push(word);
    }
    out
}
