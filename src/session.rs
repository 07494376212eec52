use crate::buffer::Buffer;
use crate::dialog::DialogController;
use crate::directive::ImageRef;
use crate::locate::SourceSpan;
use crate::preview::{PreviewDocument, PreviewStyles};
use crate::scheduler::{ChangeScheduler, Fired};
use crate::store::{DocumentStore, Post, StoreError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SaveStatus {
    #[default]
    Ready,
    Pending,
    Saving,
    Saved,
    Error(String),
}

impl SaveStatus {
    pub fn label(&self) -> &str {
        match self {
            SaveStatus::Ready => "ready",
            SaveStatus::Pending => "unsaved",
            SaveStatus::Saving => "saving...",
            SaveStatus::Saved => "saved",
            SaveStatus::Error(_) => "save failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenDocument {
    pub id: String,
    pub title: String,
    pub date: String,
    pub author: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaField {
    Title,
    Date,
    Status,
}

impl MetaField {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "title" => Some(MetaField::Title),
            "date" => Some(MetaField::Date),
            "status" => Some(MetaField::Status),
            _ => None,
        }
    }
}

pub struct EditorSession {
    doc: Option<OpenDocument>,
    buffer: Buffer,
    dialog: DialogController,
    scheduler: ChangeScheduler,
    preview: PreviewDocument,
    preview_width: usize,
    styles: PreviewStyles,
    preview_renders: u64,
    seen_revision: u64,
    dirty: bool,
    save_status: SaveStatus,
}

impl EditorSession {
    pub fn new(preview_delay: Duration, autosave_delay: Duration, styles: PreviewStyles) -> Self {
        Self {
            doc: None,
            buffer: Buffer::default(),
            dialog: DialogController::new(),
            scheduler: ChangeScheduler::new(preview_delay, autosave_delay),
            preview: PreviewDocument::default(),
            preview_width: 80,
            styles,
            preview_renders: 0,
            seen_revision: 0,
            dirty: false,
            save_status: SaveStatus::Ready,
        }
    }

    pub fn document(&self) -> Option<&OpenDocument> {
        self.doc.as_ref()
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn dialog(&self) -> &DialogController {
        &self.dialog
    }

    pub fn dialog_mut(&mut self) -> &mut DialogController {
        &mut self.dialog
    }

    pub fn preview(&self) -> &PreviewDocument {
        &self.preview
    }

    pub fn preview_renders(&self) -> u64 {
        self.preview_renders
    }

    pub fn save_status(&self) -> &SaveStatus {
        &self.save_status
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Load `id` and make it the open post. On failure the current post stays open.
    pub fn open(&mut self, store: &dyn DocumentStore, id: &str) -> Result<(), StoreError> {
        let post = store.get(id)?;
        // Timers belong to the outgoing post and must not outlive it.
        self.scheduler.cancel_all();
        self.dialog.cancel();
        if self.dirty {
            tracing::info!(
                from = self.doc.as_ref().map(|d| d.id.as_str()).unwrap_or(""),
                "discarding unsaved changes"
            );
        }

        self.doc = Some(OpenDocument {
            id: id.to_string(),
            title: post.title,
            date: post.date,
            author: post.author,
            status: post.status,
        });
        self.buffer = Buffer::from_text(&post.body);
        self.seen_revision = self.buffer.revision();
        self.dirty = false;
        self.save_status = SaveStatus::Ready;
        self.render_preview();
        tracing::info!(id, "post opened");
        Ok(())
    }

    pub fn close(&mut self) {
        self.scheduler.cancel_all();
        self.dialog.cancel();
        self.doc = None;
        self.buffer = Buffer::default();
        self.seen_revision = self.buffer.revision();
        self.dirty = false;
        self.save_status = SaveStatus::Ready;
        self.preview = PreviewDocument::default();
    }

    pub fn edit<R>(&mut self, now: Instant, f: impl FnOnce(&mut Buffer) -> R) -> R {
        let out = f(&mut self.buffer);
        self.note_buffer_change(now);
        out
    }

    fn note_buffer_change(&mut self, now: Instant) {
        let revision = self.buffer.revision();
        if revision != self.seen_revision {
            self.seen_revision = revision;
            self.mark_changed(now);
        }
    }

    fn mark_changed(&mut self, now: Instant) {
        if self.doc.is_none() {
            return;
        }
        self.scheduler.on_change(now);
        self.dirty = true;
        self.save_status = SaveStatus::Pending;
    }

    pub fn set_meta(&mut self, field: MetaField, value: &str, now: Instant) {
        let Some(doc) = self.doc.as_mut() else {
            return;
        };
        let slot = match field {
            MetaField::Title => &mut doc.title,
            MetaField::Date => &mut doc.date,
            MetaField::Status => &mut doc.status,
        };
        if slot.as_str() == value {
            return;
        }
        *slot = value.to_string();
        self.mark_changed(now);
    }

    pub fn set_preview_width(&mut self, width: usize) {
        let width = width.max(10);
        if width != self.preview_width {
            self.preview_width = width;
            self.render_preview();
        }
    }

    pub fn render_preview(&mut self) {
        let title = self.doc.as_ref().map(|d| d.title.as_str()).unwrap_or("");
        self.preview =
            PreviewDocument::render(title, &self.buffer.text(), self.preview_width, &self.styles);
        self.preview_renders += 1;
        tracing::trace!(
            renders = self.preview_renders,
            images = self.preview.images.len(),
            "preview rendered"
        );
    }

    pub fn tick(&mut self, now: Instant, store: &mut dyn DocumentStore) -> Fired {
        let fired = self.scheduler.poll(now);
        if fired.preview {
            self.render_preview();
        }
        if fired.autosave {
            tracing::debug!("autosave due");
            self.persist(store);
        }
        fired
    }

    pub fn save_now(&mut self, store: &mut dyn DocumentStore) -> bool {
        self.scheduler.cancel_autosave();
        self.persist(store)
    }

    fn persist(&mut self, store: &mut dyn DocumentStore) -> bool {
        let Some(doc) = self.doc.as_ref() else {
            return false;
        };
        self.save_status = SaveStatus::Saving;
        let post = Post {
            title: doc.title.clone(),
            date: doc.date.clone(),
            author: doc.author.clone(),
            status: doc.status.clone(),
            body: self.buffer.text(),
        };
        match store.put(&doc.id, &post) {
            Ok(()) => {
                self.dirty = false;
                self.save_status = SaveStatus::Saved;
                true
            }
            Err(err) => {
                tracing::warn!(id = %doc.id, error = %err, "save failed");
                self.save_status = SaveStatus::Error(err.to_string());
                false
            }
        }
    }

    pub fn open_insert_dialog(&mut self, image: ImageRef) {
        if self.doc.is_some() {
            self.dialog.open_for_insert(image);
        }
    }

    pub fn click_image(&mut self, index: usize) -> bool {
        let Some(node) = self.preview.images.get(index) else {
            return false;
        };
        self.dialog.open_for_edit(node, &self.buffer.text())
    }

    pub fn submit_dialog(&mut self, now: Instant) -> Option<SourceSpan> {
        let written = self.dialog.submit(&mut self.buffer);
        self.note_buffer_change(now);
        written
    }

    pub fn cancel_dialog(&mut self) {
        self.dialog.cancel();
    }
}
