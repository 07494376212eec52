use crate::buffer::Buffer;
use crate::directive::{Alignment, ImageRef, PresentationOptions, generate};
use crate::locate::{SourceSpan, locate};
use crate::preview::RenderedImage;
use std::mem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WidthMode {
    #[default]
    Auto,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Field {
    #[default]
    Alt,
    Caption,
    Alignment,
    Width,
}

impl Field {
    const ORDER: [Field; 4] = [Field::Alt, Field::Caption, Field::Alignment, Field::Width];

    pub fn next(self) -> Self {
        let idx = Self::ORDER.iter().position(|f| *f == self).unwrap_or(0);
        Self::ORDER[(idx + 1) % Self::ORDER.len()]
    }

    pub fn prev(self) -> Self {
        let idx = Self::ORDER.iter().position(|f| *f == self).unwrap_or(0);
        Self::ORDER[(idx + Self::ORDER.len() - 1) % Self::ORDER.len()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageForm {
    pub image: ImageRef,
    pub alt: String,
    pub caption: String,
    pub alignment: Alignment,
    pub width_mode: WidthMode,
    pub width_input: String,
    pub field: Field,
}

impl ImageForm {
    pub fn new(image: ImageRef) -> Self {
        Self {
            image,
            alt: String::new(),
            caption: String::new(),
            alignment: Alignment::None,
            width_mode: WidthMode::Auto,
            width_input: String::new(),
            field: Field::Alt,
        }
    }

    pub fn from_options(image: ImageRef, options: &PresentationOptions) -> Self {
        let (width_mode, width_input) = match options.width {
            Some(px) => (WidthMode::Custom, px.to_string()),
            None => (WidthMode::Auto, String::new()),
        };
        Self {
            image,
            alt: options.alt.clone(),
            caption: options.caption.clone(),
            alignment: options.alignment,
            width_mode,
            width_input,
            field: Field::Alt,
        }
    }

    pub fn options(&self) -> PresentationOptions {
        let width = match self.width_mode {
            WidthMode::Auto => None,
            WidthMode::Custom => self
                .width_input
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|px| *px > 0),
        };
        PresentationOptions {
            alt: self.alt.clone(),
            caption: self.caption.clone(),
            alignment: self.alignment,
            width,
        }
    }

    pub fn toggle_width(&mut self, default_width: u32) {
        self.width_mode = match self.width_mode {
            WidthMode::Auto => {
                if self.width_input.trim().is_empty() {
                    self.width_input = default_width.to_string();
                }
                WidthMode::Custom
            }
            WidthMode::Custom => WidthMode::Auto,
        };
    }

    pub fn markup(&self) -> String {
        generate(&self.image, &self.options())
    }

    pub fn input_char(&mut self, c: char) {
        match self.field {
            Field::Alt => self.alt.push(c),
            Field::Caption => self.caption.push(c),
            Field::Width if c.is_ascii_digit() => {
                self.width_mode = WidthMode::Custom;
                self.width_input.push(c);
            }
            Field::Alignment | Field::Width => {}
        }
    }

    pub fn backspace(&mut self) {
        match self.field {
            Field::Alt => {
                self.alt.pop();
            }
            Field::Caption => {
                self.caption.pop();
            }
            Field::Width => {
                self.width_input.pop();
            }
            Field::Alignment => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DialogState {
    #[default]
    Closed,
    Insert { form: ImageForm },
    Edit { form: ImageForm, span: SourceSpan },
}

#[derive(Debug, Default)]
pub struct DialogController {
    state: DialogState,
}

impl DialogController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DialogState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.state, DialogState::Closed)
    }

    pub fn form(&self) -> Option<&ImageForm> {
        match &self.state {
            DialogState::Closed => None,
            DialogState::Insert { form } | DialogState::Edit { form, .. } => Some(form),
        }
    }

    pub fn form_mut(&mut self) -> Option<&mut ImageForm> {
        match &mut self.state {
            DialogState::Closed => None,
            DialogState::Insert { form } | DialogState::Edit { form, .. } => Some(form),
        }
    }

    pub fn open_for_insert(&mut self, image: ImageRef) {
        tracing::debug!(image = %image, "dialog: insert");
        self.state = DialogState::Insert {
            form: ImageForm::new(image),
        };
    }

    pub fn open_for_edit(&mut self, clicked: &RenderedImage, source: &str) -> bool {
        let Some(image) = clicked.image_ref() else {
            tracing::debug!(src = %clicked.src, "dialog: clicked image is not an upload");
            return false;
        };
        let Some(span) = locate(source, &image) else {
            return false;
        };
        tracing::debug!(image = %image, ?span, "dialog: edit");
        let form = ImageForm::from_options(image, &clicked.options());
        self.state = DialogState::Edit { form, span };
        true
    }

    pub fn cancel(&mut self) {
        if self.is_open() {
            tracing::debug!("dialog: cancelled");
        }
        self.state = DialogState::Closed;
    }

    /// Write the directive into `buffer` and close. The state is taken first,
    /// so a span is used at most once. Closed submits do nothing.
    pub fn submit(&mut self, buffer: &mut Buffer) -> Option<SourceSpan> {
        match mem::take(&mut self.state) {
            DialogState::Closed => None,
            DialogState::Insert { form } => Some(buffer.insert_at_cursor(&form.markup())),
            DialogState::Edit { form, span } => {
                let written = buffer.replace_span(span, &form.markup());
                if written.is_none() {
                    tracing::warn!(?span, "dialog: span no longer in buffer");
                }
                written
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DialogController, DialogState, Field, ImageForm, WidthMode};
    use crate::buffer::Buffer;
    use crate::directive::{Alignment, ImageRef, PresentationOptions, generate};
    use crate::locate::{SourceSpan, locate, span_text};
    use crate::preview::{render_html, rendered_images};

    fn cat() -> ImageRef {
        ImageRef::new("cat.png")
    }

    fn clicked(text: &str) -> crate::preview::RenderedImage {
        rendered_images(&render_html("", text))
            .into_iter()
            .next()
            .unwrap()
    }

    #[test]
    fn insert_submit_writes_plain_line() {
        let mut buffer = Buffer::from_text("");
        let mut dialog = DialogController::new();
        dialog.open_for_insert(cat());
        dialog.form_mut().unwrap().alt = "A cat".into();
        let span = dialog.submit(&mut buffer).unwrap();
        assert_eq!(span, SourceSpan::single(0));
        assert!(buffer.text().starts_with("![A cat]({static}/images/cat.png)\n"));
        assert_eq!(dialog.state(), &DialogState::Closed);
    }

    #[test]
    fn every_option_combination_survives_a_round_trip() {
        for caption in ["", "A cute cat"] {
            for alignment in Alignment::ALL {
                for width in [None, Some(300)] {
                    let options = PresentationOptions {
                        alt: "A cat".into(),
                        caption: caption.into(),
                        alignment,
                        width,
                    };
                    let mut buffer = Buffer::from_text("Intro paragraph.");
                    buffer.move_line_end();
                    let mut dialog = DialogController::new();
                    dialog.open_for_insert(cat());
                    *dialog.form_mut().unwrap() = ImageForm::from_options(cat(), &options);
                    let written = dialog.submit(&mut buffer).unwrap();

                    let text = buffer.text();
                    assert_eq!(locate(&text, &cat()), Some(written), "{options:?}");
                    let node = clicked(&span_text(&text, written));
                    assert_eq!(node.options(), options);
                }
            }
        }
    }

    #[test]
    fn edit_of_block_width_replaces_exactly_the_span() {
        let block = generate(
            &cat(),
            &PresentationOptions {
                alt: "A cat".into(),
                caption: "A cute cat".into(),
                alignment: Alignment::Center,
                width: None,
            },
        );
        let source = format!("before\n\n{block}\n\nafter\n");
        let mut buffer = Buffer::from_text(&source);
        let mut dialog = DialogController::new();

        assert!(dialog.open_for_edit(&clicked(&source), &buffer.text()));
        let form = dialog.form_mut().unwrap();
        form.toggle_width(400);
        form.width_input = "250".into();
        let written = dialog.submit(&mut buffer).unwrap();

        let text = buffer.text();
        assert!(text.starts_with("before\n\n<div class=\"figure align-center\" style=\"width: 250px\">"));
        assert!(text.ends_with("</div>\n\nafter\n"));
        let options = clicked(&span_text(&text, written)).options();
        assert_eq!(options.width, Some(250));
        assert_eq!(options.caption, "A cute cat");
        assert_eq!(options.alignment, Alignment::Center);
    }

    #[test]
    fn repeated_edit_submit_is_idempotent() {
        let source = "x\n\n<img src=\"{static}/images/cat.png\" class=\"align-left\" width=\"300\" alt=\"A cat\" />\n\ny";
        let mut buffer = Buffer::from_text(source);
        let mut dialog = DialogController::new();

        assert!(dialog.open_for_edit(&clicked(source), &buffer.text()));
        dialog.submit(&mut buffer);
        let first = buffer.text();

        assert!(dialog.open_for_edit(&clicked(&first), &first));
        dialog.submit(&mut buffer);
        assert_eq!(buffer.text(), first);
        assert_eq!(first, source);
    }

    #[test]
    fn edit_is_not_entered_when_markup_is_missing() {
        let source = "![A cat]({static}/images/cat.png)";
        let node = clicked(source);
        let mut dialog = DialogController::new();
        assert!(!dialog.open_for_edit(&node, "the image was deleted"));
        assert!(!dialog.is_open());
    }

    #[test]
    fn cancel_and_closed_submit_leave_buffer_alone() {
        let mut buffer = Buffer::from_text("![A cat]({static}/images/cat.png)");
        let revision = buffer.revision();
        let mut dialog = DialogController::new();

        assert_eq!(dialog.submit(&mut buffer), None);
        assert!(dialog.open_for_edit(&clicked(&buffer.text()), &buffer.text()));
        dialog.cancel();
        assert_eq!(dialog.submit(&mut buffer), None);
        assert_eq!(buffer.revision(), revision);
    }

    #[test]
    fn span_is_dropped_after_submit() {
        let mut buffer = Buffer::from_text("![A cat]({static}/images/cat.png)\nline two");
        let mut dialog = DialogController::new();
        assert!(dialog.open_for_edit(&clicked(&buffer.text()), &buffer.text()));
        assert!(matches!(dialog.state(), DialogState::Edit { span, .. } if *span == SourceSpan::single(0)));
        dialog.submit(&mut buffer);
        let after = buffer.text();
        assert_eq!(dialog.submit(&mut buffer), None);
        assert_eq!(buffer.text(), after);
    }

    fn edit_without_changes(options: &PresentationOptions) {
        let source = format!("Intro.\n\n{}\n\nOutro.\n", generate(&cat(), options));
        let mut buffer = Buffer::from_text(&source);
        let mut dialog = DialogController::new();

        assert!(dialog.open_for_edit(&clicked(&source), &buffer.text()));
        assert_eq!(&dialog.form().unwrap().options(), options);
        dialog.submit(&mut buffer).unwrap();
        assert_eq!(buffer.text(), source);
    }

    #[test]
    fn markup_characters_in_inline_tag_alt_survive_edit() {
        edit_without_changes(&PresentationOptions {
            alt: "input -> output & a < b".into(),
            caption: String::new(),
            alignment: Alignment::Left,
            width: None,
        });
    }

    #[test]
    fn markup_characters_in_block_alt_and_caption_survive_edit() {
        edit_without_changes(&PresentationOptions {
            alt: "a > b".into(),
            caption: "5 > 3 & 2 < 4".into(),
            alignment: Alignment::Center,
            width: Some(320),
        });
    }

    #[test]
    fn non_ascii_filename_can_be_edited() {
        let image = ImageRef::new("café.png");
        let source = format!(
            "Intro.\n\n{}\n",
            generate(
                &image,
                &PresentationOptions {
                    alt: "Coffee".into(),
                    ..Default::default()
                }
            )
        );
        let node = clicked(&source);
        assert_eq!(node.image_ref(), Some(image.clone()));

        let mut dialog = DialogController::new();
        assert!(dialog.open_for_edit(&node, &source));
        assert!(matches!(dialog.state(), DialogState::Edit { span, .. } if *span == SourceSpan::single(2)));
        assert_eq!(dialog.form().unwrap().options().alt, "Coffee");
    }

    #[test]
    fn whitespace_caption_is_kept_verbatim() {
        let mut form = ImageForm::new(cat());
        form.alt = " A cat ".into();
        form.caption = " ".into();
        let options = form.options();
        assert_eq!(options.alt, " A cat ");
        assert_eq!(options.caption, " ");
        assert!(form.markup().starts_with("<div class=\"figure\">"));
    }

    #[test]
    fn custom_width_prefills_default_and_rejects_zero() {
        let mut form = ImageForm::new(cat());
        form.toggle_width(400);
        assert_eq!(form.width_mode, WidthMode::Custom);
        assert_eq!(form.options().width, Some(400));
        form.width_input = "0".into();
        assert_eq!(form.options().width, None);
        form.toggle_width(400);
        assert_eq!(form.width_input, "0");
        assert_eq!(form.options().width, None);
    }

    #[test]
    fn field_cycle_wraps() {
        assert_eq!(Field::Width.next(), Field::Alt);
        assert_eq!(Field::Alt.prev(), Field::Width);
        let mut form = ImageForm::new(cat());
        form.field = Field::Width;
        form.input_char('x');
        form.input_char('7');
        assert_eq!(form.width_input, "7");
        assert_eq!(form.width_mode, WidthMode::Custom);
    }
}
