use crate::config::Config;
use crate::dialog::{DialogState, Field, WidthMode};
use crate::directive::{Alignment, ImageRef};
use crate::images::FsImageStore;
use crate::locate::looks_like_directive;
use crate::posts::{FsPostStore, PostFilter, filter_posts};
use crate::session::{EditorSession, MetaField, SaveStatus};
use crate::store::{DocumentStore, ImageStore, PostSummary, StoredImage};
use crate::theme::UiPalette;
use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture,
    Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use notify::{RecursiveMode, Watcher};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, BorderType, Clear, List, ListItem, ListState, Paragraph};
use std::fs;
use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use unicode_width::UnicodeWidthChar;

const IDLE_POLL: Duration = Duration::from_millis(250);
const RELOAD_DELAY: Duration = Duration::from_millis(150);
const GALLERY_SIZE: usize = 12;
const DEFAULT_TITLE: &str = "New Blog Post";

pub fn run_app(config: Config, initial: Option<String>) -> Result<()> {
    for dir in [&config.blog_dir, &config.images_dir] {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let mut app = App::new(config);
    app.refresh_posts();
    app.refresh_gallery();
    match initial {
        Some(id) => app.open_post(&id),
        None => {
            if let Some(first) = app.post_list.first().map(|p| p.id.clone()) {
                app.open_post(&first);
            }
        }
    }

    let mut terminal = setup_terminal()?;
    let _guard = TerminalGuard;

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    })?;
    watcher.watch(&app.config.blog_dir, RecursiveMode::NonRecursive)?;
    watcher.watch(&app.config.images_dir, RecursiveMode::NonRecursive)?;

    loop {
        let size = terminal.size()?;
        let layout = app.layout(size);
        if let Some(width) = layout.preview_width {
            app.session.set_preview_width(width as usize);
        }
        app.ensure_cursor_visible(layout.editor_height as usize);
        app.clamp_preview_scroll(layout.preview_height.unwrap_or(0) as usize);

        terminal.draw(|f| ui(f, &mut app, &layout))?;

        if event::poll(app.poll_timeout(Instant::now()))? {
            let quit = match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => app.handle_key(key),
                Event::Mouse(mouse) => {
                    app.handle_mouse(mouse, &layout);
                    false
                }
                Event::Paste(text) => {
                    app.handle_paste(&text);
                    false
                }
                _ => false,
            };
            if quit {
                break;
            }
        }

        while let Ok(msg) = rx.try_recv() {
            if let Ok(event) = msg {
                app.on_fs_event(event);
            }
        }

        app.handle_pending_reload();
        app.tick(Instant::now());
    }

    Ok(())
}

struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = execute!(
            stdout,
            DisableBracketedPaste,
            DisableMouseCapture,
            LeaveAlternateScreen
        );
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        EnableBracketedPaste
    )?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

#[derive(Default)]
struct FsReload {
    pending: bool,
    deadline: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Posts,
    Editor,
    Preview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptKind {
    NewPost,
    Upload,
    Search,
    Meta,
}

impl PromptKind {
    fn label(self) -> &'static str {
        match self {
            PromptKind::NewPost => "new post title: ",
            PromptKind::Upload => "upload image: ",
            PromptKind::Search => "search: ",
            PromptKind::Meta => "set (title|date|status) ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Prompt(PromptKind),
    Gallery,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Confirm {
    Quit,
    Open(String),
}

struct LayoutInfo {
    main: Rect,
    status: Rect,
    posts: Option<Rect>,
    editor: Rect,
    preview: Option<Rect>,
    editor_width: u16,
    editor_height: u16,
    preview_width: Option<u16>,
    preview_height: Option<u16>,
}

struct App {
    config: Config,
    ui: UiPalette,
    base_style: Style,
    posts: FsPostStore,
    images: FsImageStore,
    post_list: Vec<PostSummary>,
    post_selected: usize,
    filter: PostFilter,
    search: String,
    gallery: Vec<StoredImage>,
    gallery_selected: usize,
    session: EditorSession,
    focus: Focus,
    mode: Mode,
    prompt_input: String,
    edit_scroll: usize,
    preview_scroll: usize,
    preview_selected: Option<usize>,
    show_posts: bool,
    show_preview: bool,
    status: Option<String>,
    confirm: Option<Confirm>,
    reload: FsReload,
}

impl App {
    fn new(config: Config) -> Self {
        let ui = UiPalette::resolve(&config.theme);
        let session = EditorSession::new(
            config.preview_delay(),
            config.autosave_delay(),
            ui.preview_styles(),
        );
        Self {
            posts: FsPostStore::new(&config.blog_dir, &config.author),
            images: FsImageStore::new(&config.images_dir),
            base_style: ui.base_style(),
            ui,
            post_list: Vec::new(),
            post_selected: 0,
            filter: PostFilter::All,
            search: String::new(),
            gallery: Vec::new(),
            gallery_selected: 0,
            session,
            focus: Focus::Editor,
            mode: Mode::Normal,
            prompt_input: String::new(),
            edit_scroll: 0,
            preview_scroll: 0,
            preview_selected: None,
            show_posts: config.show_posts,
            show_preview: config.show_preview,
            status: None,
            confirm: None,
            reload: FsReload::default(),
            config,
        }
    }

    fn layout(&self, size: Rect) -> LayoutInfo {
        let vertical = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(1)])
            .split(size);
        let main = vertical[0];
        let status = vertical[1];

        let (posts, body) = if self.show_posts {
            let posts_width = self.config.posts_width.min(main.width.saturating_sub(20));
            let horiz = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Length(posts_width), Constraint::Min(20)])
                .split(main);
            (Some(horiz[0]), horiz[1])
        } else {
            (None, main)
        };

        let (editor, preview) = if self.show_preview {
            let split = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
                .split(body);
            (split[0], Some(split[1]))
        } else {
            (body, None)
        };

        LayoutInfo {
            main,
            status,
            posts,
            editor,
            preview,
            editor_width: editor.width.saturating_sub(2).max(1),
            editor_height: editor.height.saturating_sub(2).max(1),
            preview_width: preview.map(|p| p.width.saturating_sub(2).max(1)),
            preview_height: preview.map(|p| p.height.saturating_sub(2).max(1)),
        }
    }

    fn poll_timeout(&self, now: Instant) -> Duration {
        [self.session.next_deadline(), self.reload.deadline]
            .into_iter()
            .flatten()
            .map(|deadline| deadline.saturating_duration_since(now))
            .fold(IDLE_POLL, Duration::min)
    }

    fn tick(&mut self, now: Instant) {
        let fired = self.session.tick(now, &mut self.posts);
        if fired.preview {
            self.clamp_preview_selection();
        }
        if fired.autosave {
            self.after_save();
        }
    }

    fn after_save(&mut self) {
        match self.session.save_status() {
            SaveStatus::Error(msg) => self.status = Some(format!("Save failed: {msg}")),
            _ => self.refresh_posts(),
        }
    }

    fn visible_posts(&self) -> Vec<&PostSummary> {
        filter_posts(&self.post_list, &self.search, self.filter)
    }

    fn refresh_posts(&mut self) {
        match self.posts.list() {
            Ok(list) => self.post_list = list,
            Err(err) => self.status = Some(format!("Failed to list posts: {err}")),
        }
        self.clamp_post_selection();
    }

    fn clamp_post_selection(&mut self) {
        let total = self.visible_posts().len();
        self.post_selected = self.post_selected.min(total.saturating_sub(1));
    }

    fn refresh_gallery(&mut self) {
        match self.images.list() {
            Ok(mut list) => {
                list.truncate(GALLERY_SIZE);
                self.gallery = list;
            }
            Err(err) => self.status = Some(format!("Failed to list images: {err}")),
        }
        self.gallery_selected = self
            .gallery_selected
            .min(self.gallery.len().saturating_sub(1));
    }

    fn request_reload(&mut self) {
        self.reload.pending = true;
        self.reload.deadline = Some(Instant::now() + RELOAD_DELAY);
    }

    fn on_fs_event(&mut self, _event: notify::Event) {
        self.request_reload();
    }

    fn handle_pending_reload(&mut self) {
        if !self.reload.pending {
            return;
        }
        if let Some(deadline) = self.reload.deadline {
            if Instant::now() < deadline {
                return;
            }
        }
        self.reload.pending = false;
        self.reload.deadline = None;
        self.refresh_posts();
        self.refresh_gallery();
    }

    fn current_id(&self) -> Option<&str> {
        self.session.document().map(|doc| doc.id.as_str())
    }

    fn open_post(&mut self, id: &str) {
        if self.current_id() == Some(id) {
            self.focus = Focus::Editor;
            return;
        }
        if self.session.is_dirty() && self.confirm != Some(Confirm::Open(id.to_string())) {
            self.confirm = Some(Confirm::Open(id.to_string()));
            self.status =
                Some("Unsaved changes will be lost; open again to confirm, Ctrl+S to save".into());
            return;
        }
        self.confirm = None;
        match self.session.open(&self.posts, id) {
            Ok(()) => {
                self.edit_scroll = 0;
                self.preview_scroll = 0;
                self.preview_selected = None;
                self.focus = Focus::Editor;
                self.status = Some(format!("Opened {id}"));
                if let Some(idx) = self.visible_posts().iter().position(|p| p.id == id) {
                    self.post_selected = idx;
                }
            }
            Err(err) => self.status = Some(format!("Failed to open {id}: {err}")),
        }
    }

    fn create_post(&mut self, title: &str) {
        let title = if title.trim().is_empty() {
            DEFAULT_TITLE
        } else {
            title.trim()
        };
        match self.posts.create(title) {
            Ok(summary) => {
                self.refresh_posts();
                self.open_post(&summary.id);
            }
            Err(err) => self.status = Some(format!("Failed to create post: {err}")),
        }
    }

    fn save_now(&mut self) {
        if self.session.document().is_none() {
            self.status = Some("No post open".into());
            return;
        }
        if self.session.save_now(&mut self.posts) {
            self.status = Some("Saved".into());
        }
        self.after_save();
    }

    fn upload_path(&mut self, raw: &str) {
        if self.session.document().is_none() {
            self.status = Some("Open a post before adding images".into());
            return;
        }
        let Some(path) = parse_dropped_path(raw) else {
            self.status = Some("No file given".into());
            return;
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.status = Some(format!("Failed to read {}: {err}", path.display()));
                return;
            }
        };
        match self.images.upload(&name, &bytes) {
            Ok(stored) => {
                self.status = Some(format!("Uploaded {} as {}", name, stored.url));
                self.refresh_gallery();
                self.session.open_insert_dialog(ImageRef::new(stored.filename));
            }
            Err(err) => self.status = Some(format!("Upload failed: {err}")),
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let alt = key.modifiers.contains(KeyModifiers::ALT);
        if self.confirm == Some(Confirm::Quit) && !(ctrl && key.code == KeyCode::Char('q')) {
            self.confirm = None;
        }
        if self.session.dialog().is_open() {
            self.handle_dialog_key(key);
            return false;
        }
        match self.mode {
            Mode::Prompt(kind) => {
                self.handle_prompt_key(kind, key);
                return false;
            }
            Mode::Gallery => {
                self.handle_gallery_key(key);
                return false;
            }
            Mode::Normal => {}
        }

        let now = Instant::now();
        match key.code {
            KeyCode::Char('q') if ctrl => {
                if self.session.is_dirty() && self.confirm != Some(Confirm::Quit) {
                    self.confirm = Some(Confirm::Quit);
                    self.status = Some("Unsaved changes; Ctrl+Q again to quit".into());
                    return false;
                }
                return true;
            }
            KeyCode::Char('s') if ctrl => self.save_now(),
            KeyCode::Char('n') if ctrl || alt => self.start_prompt(PromptKind::NewPost, ""),
            KeyCode::Char('o') if ctrl => self.start_prompt(PromptKind::Upload, ""),
            KeyCode::Char('f') if ctrl => {
                let current = self.search.clone();
                self.start_prompt(PromptKind::Search, &current);
            }
            KeyCode::Char('e') if ctrl => self.start_prompt(PromptKind::Meta, ""),
            KeyCode::Char('g') if ctrl => {
                self.refresh_gallery();
                if self.gallery.is_empty() {
                    self.status = Some("No images yet; Ctrl+O to upload".into());
                } else {
                    self.mode = Mode::Gallery;
                }
            }
            KeyCode::Char('t') if ctrl => {
                self.filter = self.filter.next();
                self.clamp_post_selection();
                self.status = Some(format!("Showing {} posts", self.filter.label()));
            }
            KeyCode::Char('w') if ctrl => self.cycle_focus(),
            KeyCode::Char('p') if ctrl => {
                self.show_preview = !self.show_preview;
                if !self.show_preview && self.focus == Focus::Preview {
                    self.focus = Focus::Editor;
                }
            }
            KeyCode::Char('b') if ctrl => {
                self.show_posts = !self.show_posts;
                if !self.show_posts && self.focus == Focus::Posts {
                    self.focus = Focus::Editor;
                }
            }
            KeyCode::Char('z') if ctrl => {
                if !self.session.edit(now, |b| b.undo()) {
                    self.status = Some("Nothing to undo".into());
                }
            }
            KeyCode::Char('y') if ctrl => {
                if !self.session.edit(now, |b| b.redo()) {
                    self.status = Some("Nothing to redo".into());
                }
            }
            _ => match self.focus {
                Focus::Posts => self.handle_posts_key(key),
                Focus::Editor => self.handle_editor_key(key, now),
                Focus::Preview => self.handle_preview_key(key),
            },
        }
        false
    }

    fn cycle_focus(&mut self) {
        let order = [Focus::Posts, Focus::Editor, Focus::Preview];
        let mut idx = order.iter().position(|f| *f == self.focus).unwrap_or(1);
        for _ in 0..order.len() {
            idx = (idx + 1) % order.len();
            let candidate = order[idx];
            let visible = match candidate {
                Focus::Posts => self.show_posts,
                Focus::Editor => true,
                Focus::Preview => self.show_preview,
            };
            if visible {
                self.focus = candidate;
                return;
            }
        }
    }

    fn start_prompt(&mut self, kind: PromptKind, initial: &str) {
        self.mode = Mode::Prompt(kind);
        self.prompt_input = initial.to_string();
    }

    fn handle_prompt_key(&mut self, kind: PromptKind, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                if kind == PromptKind::Search {
                    self.search.clear();
                    self.clamp_post_selection();
                }
                self.mode = Mode::Normal;
                self.prompt_input.clear();
            }
            KeyCode::Enter => {
                self.mode = Mode::Normal;
                let input = std::mem::take(&mut self.prompt_input);
                self.execute_prompt(kind, &input);
            }
            KeyCode::Backspace => {
                self.prompt_input.pop();
                if kind == PromptKind::Search {
                    self.search = self.prompt_input.clone();
                    self.clamp_post_selection();
                }
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.prompt_input.push(c);
                if kind == PromptKind::Search {
                    self.search = self.prompt_input.clone();
                    self.clamp_post_selection();
                }
            }
            _ => {}
        }
    }

    fn execute_prompt(&mut self, kind: PromptKind, input: &str) {
        match kind {
            PromptKind::NewPost => self.create_post(input),
            PromptKind::Upload => self.upload_path(input),
            PromptKind::Search => {
                self.search = input.trim().to_string();
                self.clamp_post_selection();
                if self.show_posts {
                    self.focus = Focus::Posts;
                }
            }
            PromptKind::Meta => self.execute_meta(input),
        }
    }

    fn execute_meta(&mut self, command: &str) {
        let command = command.trim();
        let (name, value) = command.split_once(' ').unwrap_or((command, ""));
        let Some(field) = MetaField::parse(name) else {
            self.status = Some(format!("Unknown field: {name}"));
            return;
        };
        let value = value.trim();
        if field == MetaField::Status && !matches!(value, "draft" | "published") {
            self.status = Some("Status must be draft or published".into());
            return;
        }
        self.session.set_meta(field, value, Instant::now());
    }

    fn handle_gallery_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.mode = Mode::Normal,
            KeyCode::Up | KeyCode::Char('k') => {
                self.gallery_selected = self.gallery_selected.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.gallery_selected + 1 < self.gallery.len() {
                    self.gallery_selected += 1;
                }
            }
            KeyCode::Enter => {
                self.mode = Mode::Normal;
                if self.session.document().is_none() {
                    self.status = Some("Open a post before adding images".into());
                    return;
                }
                if let Some(image) = self.gallery.get(self.gallery_selected) {
                    self.session
                        .open_insert_dialog(ImageRef::new(image.filename.clone()));
                }
            }
            _ => {}
        }
    }

    fn handle_dialog_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.session.cancel_dialog();
                return;
            }
            KeyCode::Enter => {
                self.submit_dialog();
                return;
            }
            _ => {}
        }

        let default_width = self.config.default_custom_width;
        let Some(form) = self.session.dialog_mut().form_mut() else {
            return;
        };
        match key.code {
            KeyCode::Tab | KeyCode::Down => form.field = form.field.next(),
            KeyCode::BackTab | KeyCode::Up => form.field = form.field.prev(),
            KeyCode::Left => match form.field {
                Field::Alignment => form.alignment = form.alignment.prev(),
                Field::Width => form.toggle_width(default_width),
                _ => {}
            },
            KeyCode::Right => match form.field {
                Field::Alignment => form.alignment = form.alignment.next(),
                Field::Width => form.toggle_width(default_width),
                _ => {}
            },
            KeyCode::Char(' ') if form.field == Field::Width => form.toggle_width(default_width),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                form.input_char(c)
            }
            _ => {}
        }
    }

    fn submit_dialog(&mut self) {
        let editing = matches!(
            self.session.dialog().state(),
            DialogState::Edit { .. }
        );
        match self.session.submit_dialog(Instant::now()) {
            Some(span) => {
                self.status = Some(if editing {
                    "Image updated".into()
                } else {
                    "Image inserted".into()
                });
                if !editing {
                    self.focus = Focus::Editor;
                }
                tracing::debug!(
                    start = span.start_line,
                    lines = span.line_count(),
                    "directive written"
                );
            }
            None => self.status = Some("Image markup changed; nothing replaced".into()),
        }
    }

    fn handle_posts_key(&mut self, key: KeyEvent) {
        let total = self.visible_posts().len();
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.post_selected = self.post_selected.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.post_selected + 1 < total {
                    self.post_selected += 1;
                }
            }
            KeyCode::Home => self.post_selected = 0,
            KeyCode::End => self.post_selected = total.saturating_sub(1),
            KeyCode::Enter => {
                let id = self
                    .visible_posts()
                    .get(self.post_selected)
                    .map(|p| p.id.clone());
                if let Some(id) = id {
                    self.open_post(&id);
                }
            }
            _ => {}
        }
    }

    fn handle_editor_key(&mut self, key: KeyEvent, now: Instant) {
        if self.session.document().is_none() {
            return;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return;
        }
        let tab = " ".repeat(self.config.tab_width.max(1));
        self.session.edit(now, |b| match key.code {
            KeyCode::Char(c) => b.insert_char(c),
            KeyCode::Enter => b.insert_char('\n'),
            KeyCode::Tab => b.insert_str(&tab),
            KeyCode::Backspace => b.backspace(),
            KeyCode::Delete => b.delete(),
            KeyCode::Left => b.move_left(),
            KeyCode::Right => b.move_right(),
            KeyCode::Up => b.move_up(),
            KeyCode::Down => b.move_down(),
            KeyCode::Home => b.move_line_start(),
            KeyCode::End => b.move_line_end(),
            KeyCode::PageUp => b.move_lines(-20),
            KeyCode::PageDown => b.move_lines(20),
            _ => {}
        });
    }

    fn handle_preview_key(&mut self, key: KeyEvent) {
        let count = self.session.preview().images.len();
        match key.code {
            KeyCode::Tab if count > 0 => {
                let next = self.preview_selected.map_or(0, |i| (i + 1) % count);
                self.select_preview_image(next);
            }
            KeyCode::BackTab if count > 0 => {
                let prev = self
                    .preview_selected
                    .map_or(count - 1, |i| (i + count - 1) % count);
                self.select_preview_image(prev);
            }
            KeyCode::Enter => {
                if let Some(idx) = self.preview_selected {
                    self.edit_preview_image(idx);
                }
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.preview_scroll = self.preview_scroll.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => self.preview_scroll += 1,
            KeyCode::PageUp => self.preview_scroll = self.preview_scroll.saturating_sub(20),
            KeyCode::PageDown => self.preview_scroll += 20,
            _ => {}
        }
    }

    fn select_preview_image(&mut self, idx: usize) {
        self.preview_selected = Some(idx);
        if let Some(row) = self.session.preview().image_lines.get(idx) {
            if *row < self.preview_scroll {
                self.preview_scroll = *row;
            } else if *row > self.preview_scroll + 10 {
                self.preview_scroll = row.saturating_sub(3);
            }
        }
    }

    fn edit_preview_image(&mut self, idx: usize) {
        if !self.session.click_image(idx) {
            tracing::debug!(idx, "preview click ignored");
        }
    }

    fn clamp_preview_selection(&mut self) {
        let count = self.session.preview().images.len();
        if let Some(idx) = self.preview_selected {
            if idx >= count {
                self.preview_selected = None;
            }
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent, layout: &LayoutInfo) {
        if self.session.dialog().is_open() || self.mode != Mode::Normal {
            return;
        }
        let (col, row) = (mouse.column, mouse.row);
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                if let Some(area) = layout.preview.filter(|a| inside(*a, col, row)) {
                    self.focus = Focus::Preview;
                    let Some(line) = inner_row(area, row).map(|r| r + self.preview_scroll) else {
                        return;
                    };
                    if let Some(idx) = self.session.preview().image_at_line(line) {
                        self.preview_selected = Some(idx);
                        self.edit_preview_image(idx);
                    }
                } else if let Some(area) = layout.posts.filter(|a| inside(*a, col, row)) {
                    self.focus = Focus::Posts;
                    if let Some(r) = inner_row(area, row) {
                        let id = self.visible_posts().get(r).map(|p| p.id.clone());
                        if let Some(id) = id {
                            self.post_selected = r;
                            self.open_post(&id);
                        }
                    }
                } else if inside(layout.editor, col, row) {
                    self.focus = Focus::Editor;
                    if let Some(r) = inner_row(layout.editor, row) {
                        let line = r + self.edit_scroll;
                        let x = col.saturating_sub(layout.editor.x + 1) as usize;
                        let col = char_col_for_width(&self.session.buffer().line(line), x);
                        self.session
                            .edit(Instant::now(), |b| b.set_cursor_line_col(line, col));
                    }
                }
            }
            MouseEventKind::ScrollUp => {
                if layout.preview.is_some_and(|a| inside(a, col, row)) {
                    self.preview_scroll = self.preview_scroll.saturating_sub(3);
                } else {
                    self.edit_scroll = self.edit_scroll.saturating_sub(3);
                }
            }
            MouseEventKind::ScrollDown => {
                if layout.preview.is_some_and(|a| inside(a, col, row)) {
                    self.preview_scroll += 3;
                } else {
                    self.edit_scroll += 3;
                }
            }
            _ => {}
        }
    }

    fn handle_paste(&mut self, text: &str) {
        if self.session.dialog().is_open() {
            if let Some(form) = self.session.dialog_mut().form_mut() {
                for c in text.chars().filter(|c| *c != '\n' && *c != '\r') {
                    form.input_char(c);
                }
            }
            return;
        }
        if let Mode::Prompt(_) = self.mode {
            self.prompt_input
                .extend(text.chars().filter(|c| *c != '\n' && *c != '\r'));
            return;
        }
        if self.session.document().is_none() {
            return;
        }
        if parse_dropped_path(text).is_some_and(|p| is_image_file(&p)) {
            self.upload_path(text);
            return;
        }
        if self.focus == Focus::Editor {
            self.session.edit(Instant::now(), |b| b.insert_str(text));
        }
    }

    fn ensure_cursor_visible(&mut self, height: usize) {
        let (line, _) = self.session.buffer().cursor_line_col();
        if line < self.edit_scroll {
            self.edit_scroll = line;
        } else if line >= self.edit_scroll + height {
            self.edit_scroll = line + 1 - height;
        }
        let max = self.session.buffer().len_lines().saturating_sub(1);
        self.edit_scroll = self.edit_scroll.min(max);
    }

    fn clamp_preview_scroll(&mut self, height: usize) {
        let max_scroll = self
            .session
            .preview()
            .lines
            .len()
            .saturating_sub(height.max(1));
        if self.preview_scroll > max_scroll {
            self.preview_scroll = max_scroll;
        }
    }
}

fn inside(area: Rect, col: u16, row: u16) -> bool {
    col >= area.x && col < area.x + area.width && row >= area.y && row < area.y + area.height
}

fn inner_row(area: Rect, row: u16) -> Option<usize> {
    let first = area.y + 1;
    let last = area.y + area.height.saturating_sub(1);
    (row >= first && row < last).then(|| (row - first) as usize)
}

fn char_col_for_width(line: &str, target: usize) -> usize {
    let mut width = 0usize;
    for (idx, ch) in line.chars().enumerate() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + w > target {
            return idx;
        }
        width += w;
    }
    line.chars().count()
}

/// Terminals paste dropped files as shell-quoted paths, sometimes as `file://` URLs.
fn parse_dropped_path(raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.contains('\n') {
        return None;
    }
    let unquoted = match shell_words::split(trimmed) {
        Ok(parts) if parts.len() == 1 => parts.into_iter().next()?,
        _ => trimmed.to_string(),
    };
    let path = unquoted.strip_prefix("file://").unwrap_or(&unquoted);
    Some(PathBuf::from(path))
}

fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(crate::images::is_allowed_image)
}

fn ui(f: &mut ratatui::Frame, app: &mut App, layout: &LayoutInfo) {
    let highlight_fg = app.ui.base_bg.unwrap_or(app.ui.base_fg);
    let highlight_style = Style::default().bg(app.ui.accent).fg(highlight_fg);

    f.render_widget(
        Paragraph::new(app.status_line())
            .style(app.base_style)
            .block(Block::default().style(app.base_style)),
        layout.status,
    );

    if let Some(posts_area) = layout.posts {
        let current = app.current_id().map(str::to_string);
        let items: Vec<ListItem> = app
            .visible_posts()
            .iter()
            .map(|p| {
                let marker = if Some(&p.id) == current.as_ref() {
                    "● "
                } else {
                    "  "
                };
                let mut spans = vec![
                    Span::styled(marker, Style::default().fg(app.ui.accent)),
                    Span::styled(p.title.clone(), app.base_style),
                ];
                if p.is_draft() {
                    spans.push(Span::styled(" (draft)", Style::default().fg(app.ui.muted)));
                }
                ListItem::new(Line::from(spans))
            })
            .collect();
        let mut state = ListState::default();
        if !items.is_empty() {
            state.select(Some(app.post_selected));
        }
        let title = if app.search.is_empty() {
            format!(" Posts [{}] ", app.filter.label())
        } else {
            format!(" Posts [{}] /{} ", app.filter.label(), app.search)
        };
        let list = List::new(items)
            .block(pane_block(app, title, app.focus == Focus::Posts))
            .style(app.base_style)
            .highlight_style(highlight_style);
        f.render_stateful_widget(list, posts_area, &mut state);
    }

    let editor_title = match app.session.document() {
        Some(doc) if app.session.is_dirty() => format!(" *{} ", doc.id),
        Some(doc) => format!(" {} ", doc.id),
        None => " no post open ".to_string(),
    };
    let editor_paragraph = Paragraph::new(app.editor_text(layout.editor_height as usize))
        .block(pane_block(app, editor_title, app.focus == Focus::Editor))
        .style(app.base_style);
    f.render_widget(editor_paragraph, layout.editor);

    if let Some(preview_area) = layout.preview {
        let preview_paragraph = Paragraph::new(app.preview_text())
            .block(pane_block(
                app,
                " Preview ".to_string(),
                app.focus == Focus::Preview,
            ))
            .style(app.base_style)
            .scroll((app.preview_scroll as u16, 0));
        f.render_widget(preview_paragraph, preview_area);
    }

    if app.mode == Mode::Gallery {
        let popup = centered_rect(50, 60, layout.main);
        f.render_widget(Clear, popup);
        let items: Vec<ListItem> = app
            .gallery
            .iter()
            .map(|img| ListItem::new(img.filename.clone()))
            .collect();
        let mut state = ListState::default();
        state.select(Some(app.gallery_selected));
        let list = List::new(items)
            .block(pane_block(app, " Recent images ".to_string(), true))
            .style(app.base_style)
            .highlight_style(highlight_style);
        f.render_stateful_widget(list, popup, &mut state);
    }

    if app.session.dialog().is_open() {
        let popup = centered_rect(70, 60, layout.main);
        f.render_widget(Clear, popup);
        let title = match app.session.dialog().state() {
            DialogState::Edit { .. } => " Edit image ",
            _ => " Insert image ",
        };
        f.render_widget(
            Paragraph::new(app.dialog_text())
                .block(pane_block(app, title.to_string(), true))
                .style(app.base_style),
            popup,
        );
        return;
    }

    if let Some((x, y)) = app.cursor_screen_position(layout) {
        f.set_cursor(x, y);
    }
}

fn pane_block(app: &App, title: String, focused: bool) -> Block<'static> {
    let border = if focused { app.ui.accent } else { app.ui.border };
    Block::bordered()
        .title(title)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(border))
        .style(app.base_style)
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

impl App {
    fn status_line(&self) -> Line<'static> {
        let accent = Style::default().fg(self.ui.accent);
        let muted = Style::default().fg(self.ui.muted);
        if let Mode::Prompt(kind) = self.mode {
            return Line::from(vec![
                Span::styled(kind.label(), accent),
                Span::styled(self.prompt_input.clone(), self.base_style),
            ]);
        }

        let mut parts = vec![Span::styled("blogpad", accent.add_modifier(Modifier::BOLD))];
        parts.push(Span::styled(" | ", muted));
        let focus = match self.focus {
            Focus::Posts => "posts",
            Focus::Editor => "editor",
            Focus::Preview => "preview",
        };
        parts.push(Span::styled(focus, accent));
        if let Some(doc) = self.session.document() {
            parts.push(Span::styled(" | ", muted));
            parts.push(Span::styled(
                format!("{} [{}] {}", doc.title, doc.status, doc.date),
                self.base_style,
            ));
            let (line, col) = self.session.buffer().cursor_line_col();
            parts.push(Span::styled(format!(" {}:{}", line + 1, col + 1), muted));
        }
        parts.push(Span::styled(" | ", muted));
        let save = self.session.save_status();
        let save_style = match save {
            SaveStatus::Error(_) => Style::default().fg(self.ui.error),
            SaveStatus::Pending | SaveStatus::Saving => accent,
            SaveStatus::Ready | SaveStatus::Saved => muted,
        };
        parts.push(Span::styled(save.label().to_string(), save_style));
        if let Some(msg) = &self.status {
            parts.push(Span::styled(" | ", muted));
            parts.push(Span::styled(msg.clone(), accent));
        }
        Line::from(parts)
    }

    fn editor_text(&self, height: usize) -> Text<'static> {
        let buffer = self.session.buffer();
        let directive_style = self.base_style.fg(self.ui.image);
        let end = (self.edit_scroll + height).min(buffer.len_lines());
        let mut lines: Vec<Line<'static>> = (self.edit_scroll..end)
            .map(|idx| {
                let text = buffer.line(idx).into_owned();
                let style = if looks_like_directive(&text) {
                    directive_style
                } else {
                    self.base_style
                };
                Line::from(Span::styled(text, style))
            })
            .collect();
        if lines.is_empty() {
            lines.push(Line::from(Span::styled("", self.base_style)));
        }
        Text::from(lines)
    }

    fn preview_text(&self) -> Text<'static> {
        let preview = self.session.preview();
        let selected_row = self
            .preview_selected
            .and_then(|idx| preview.image_lines.get(idx).copied());
        let highlight = Style::default().add_modifier(Modifier::REVERSED);
        let lines: Vec<Line<'static>> = preview
            .lines
            .iter()
            .enumerate()
            .map(|(row, line)| {
                if Some(row) == selected_row && self.focus == Focus::Preview {
                    Line::from(
                        line.spans
                            .iter()
                            .map(|s| Span::styled(s.content.clone(), s.style.patch(highlight)))
                            .collect::<Vec<_>>(),
                    )
                } else {
                    line.clone()
                }
            })
            .collect();
        Text::from(lines)
    }

    fn dialog_text(&self) -> Text<'static> {
        let Some(form) = self.session.dialog().form() else {
            return Text::default();
        };
        let accent = Style::default().fg(self.ui.accent);
        let muted = Style::default().fg(self.ui.muted);
        let row = |field: Field, label: &str, value: String| {
            let marker = if form.field == field { "> " } else { "  " };
            Line::from(vec![
                Span::styled(marker.to_string(), accent),
                Span::styled(format!("{label:<10}"), muted),
                Span::styled(value, self.base_style),
            ])
        };
        let alignment = Alignment::ALL
            .iter()
            .map(|a| {
                if *a == form.alignment {
                    format!("[{}]", a.label())
                } else {
                    a.label().to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        let width = match form.width_mode {
            WidthMode::Auto => "auto".to_string(),
            WidthMode::Custom => format!("custom {}px", form.width_input),
        };

        let mut lines = vec![
            Line::from(Span::styled(form.image.filename().to_string(), accent)),
            Line::default(),
            row(Field::Alt, "Alt", form.alt.clone()),
            row(Field::Caption, "Caption", form.caption.clone()),
            row(Field::Alignment, "Align", alignment),
            row(Field::Width, "Width", width),
            Line::default(),
        ];
        lines.extend(
            form.markup()
                .lines()
                .map(|l| Line::from(Span::styled(l.to_string(), muted))),
        );
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            "Tab field  ←/→ change  Enter apply  Esc cancel",
            muted,
        )));
        Text::from(lines)
    }

    fn cursor_screen_position(&self, layout: &LayoutInfo) -> Option<(u16, u16)> {
        if self.mode != Mode::Normal || self.focus != Focus::Editor {
            return None;
        }
        self.session.document()?;
        let (line, col) = self.session.buffer().cursor_line_col();
        if line < self.edit_scroll {
            return None;
        }
        let visible_line = line - self.edit_scroll;
        if visible_line >= layout.editor_height as usize {
            return None;
        }

        let line_str = self.session.buffer().line(line);
        let mut width = 0usize;
        for ch in line_str.chars().take(col) {
            width += UnicodeWidthChar::width(ch).unwrap_or(0);
        }
        let x = layout
            .editor
            .x
            .saturating_add(1)
            .saturating_add(width.min(layout.editor_width as usize).try_into().ok()?);
        let y = layout
            .editor
            .y
            .saturating_add(1)
            .saturating_add(visible_line.try_into().ok()?);
        Some((x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::{char_col_for_width, inner_row, parse_dropped_path};
    use ratatui::layout::Rect;
    use std::path::PathBuf;

    #[test]
    fn dropped_paths_are_unquoted() {
        assert_eq!(
            parse_dropped_path("'/tmp/My Photo.png'\n"),
            Some(PathBuf::from("/tmp/My Photo.png"))
        );
        assert_eq!(
            parse_dropped_path("/tmp/My\\ Photo.png"),
            Some(PathBuf::from("/tmp/My Photo.png"))
        );
        assert_eq!(
            parse_dropped_path("file:///tmp/cat.png"),
            Some(PathBuf::from("/tmp/cat.png"))
        );
        assert_eq!(parse_dropped_path("two\nlines"), None);
        assert_eq!(parse_dropped_path("   "), None);
    }

    #[test]
    fn rows_inside_borders() {
        let area = Rect::new(0, 2, 10, 5);
        assert_eq!(inner_row(area, 2), None);
        assert_eq!(inner_row(area, 3), Some(0));
        assert_eq!(inner_row(area, 5), Some(2));
        assert_eq!(inner_row(area, 6), None);
    }

    #[test]
    fn click_column_accounts_for_wide_chars() {
        assert_eq!(char_col_for_width("abc", 1), 1);
        assert_eq!(char_col_for_width("日本語", 2), 1);
        assert_eq!(char_col_for_width("ab", 9), 2);
    }
}
