use crate::store::{DocumentStore, Post, PostSummary, StoreError};
use chrono::Local;
use std::fs;
use std::path::PathBuf;
use walkdir::WalkDir;

pub const NEW_POST_BODY: &str = "Write here...";
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

const HEADER_ORDER: [&str; 4] = ["title", "date", "author", "status"];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrontMatter {
    entries: Vec<(String, String)>,
}

impl FrontMatter {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn insert(&mut self, key: String, value: String) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }
}

pub fn parse_frontmatter(content: &str) -> (FrontMatter, String) {
    let lines: Vec<&str> = content.split('\n').collect();
    let mut meta = FrontMatter::default();
    let mut body_start = 0;

    for (i, raw) in lines.iter().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            body_start = i + 1;
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            meta.insert(key.trim().to_lowercase(), value.trim().to_string());
            body_start = i + 1;
        }
    }

    (meta, lines[body_start.min(lines.len())..].join("\n"))
}

pub fn build_frontmatter(post: &Post) -> String {
    let values = [&post.title, &post.date, &post.author, &post.status];
    HEADER_ORDER
        .iter()
        .zip(values)
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{}: {}", capitalize(key), value))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_post(post: &Post) -> String {
    format!("{}\n\n{}", build_frontmatter(post), post.body)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn fold_accent(c: char) -> Option<char> {
    let folded = match c {
        'á' | 'à' | 'ã' | 'â' | 'Á' | 'À' | 'Ã' | 'Â' => 'a',
        'é' | 'ê' | 'É' | 'Ê' => 'e',
        'í' | 'Í' => 'i',
        'ó' | 'õ' | 'ô' | 'Ó' | 'Õ' | 'Ô' => 'o',
        'ú' | 'Ú' => 'u',
        'ç' | 'Ç' => 'c',
        _ => return None,
    };
    Some(folded)
}

pub fn title_to_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_space = true;

    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_space = false;
        } else if c == ' ' || c == '\t' {
            if !last_was_space {
                slug.push('-');
                last_was_space = true;
            }
        } else if let Some(folded) = fold_accent(c) {
            slug.push(folded);
            last_was_space = false;
        }
    }

    let trimmed = slug.trim_end_matches('-');
    if trimmed.is_empty() {
        "post".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn validate_id(id: &str) -> Result<(), StoreError> {
    if id.is_empty() || id.contains('/') || id.contains('\\') || id == "." || id == ".." {
        return Err(StoreError::InvalidId(id.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct FsPostStore {
    dir: PathBuf,
    author: String,
}

impl FsPostStore {
    pub fn new(dir: impl Into<PathBuf>, author: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            author: author.into(),
        }
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        validate_id(id)?;
        Ok(self.dir.join(id))
    }

    fn unique_id(&self, slug: &str) -> String {
        let mut id = format!("{slug}.md");
        let mut counter = 1;
        while self.dir.join(&id).exists() {
            id = format!("{slug}-{counter}.md");
            counter += 1;
        }
        id
    }

    fn ensure_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|err| StoreError::io("create", &self.dir, err))
    }
}

impl DocumentStore for FsPostStore {
    fn list(&self) -> Result<Vec<PostSummary>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut posts = Vec::new();
        for entry in WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
        {
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|ext| ext.to_str()) != Some("md")
            {
                continue;
            }
            let content = match fs::read_to_string(path) {
                Ok(content) => content,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable post");
                    continue;
                }
            };
            let (meta, _) = parse_frontmatter(&content);
            let id = entry.file_name().to_string_lossy().into_owned();
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| id.clone());
            posts.push(PostSummary {
                title: meta.get("title").map(str::to_string).unwrap_or(stem),
                date: meta.get("date").unwrap_or_default().to_string(),
                status: meta.get("status").unwrap_or("published").to_string(),
                id,
            });
        }

        // Dates sort lexically; an empty date sorts last when reversed.
        posts.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
        Ok(posts)
    }

    fn get(&self, id: &str) -> Result<Post, StoreError> {
        let path = self.path_for(id)?;
        if !path.is_file() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let content =
            fs::read_to_string(&path).map_err(|err| StoreError::io("read", &path, err))?;
        let (meta, body) = parse_frontmatter(&content);
        let field = |key: &str| meta.get(key).unwrap_or_default().to_string();
        Ok(Post {
            title: field("title"),
            date: field("date"),
            author: field("author"),
            status: field("status"),
            body,
        })
    }

    fn put(&mut self, id: &str, post: &Post) -> Result<(), StoreError> {
        let path = self.path_for(id)?;
        self.ensure_dir()?;
        fs::write(&path, render_post(post)).map_err(|err| StoreError::io("write", &path, err))?;
        tracing::debug!(id, bytes = post.body.len(), "post saved");
        Ok(())
    }

    fn create(&mut self, title: &str) -> Result<PostSummary, StoreError> {
        self.ensure_dir()?;
        let id = self.unique_id(&title_to_slug(title));
        let post = Post {
            title: title.to_string(),
            date: Local::now().format(DATE_FORMAT).to_string(),
            author: self.author.clone(),
            status: "draft".to_string(),
            body: NEW_POST_BODY.to_string(),
        };
        let path = self.dir.join(&id);
        fs::write(&path, render_post(&post)).map_err(|err| StoreError::io("write", &path, err))?;
        tracing::info!(id = %id, "post created");
        Ok(PostSummary {
            id,
            title: post.title,
            date: post.date,
            status: post.status,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostFilter {
    #[default]
    All,
    Draft,
    Published,
}

impl PostFilter {
    pub fn label(self) -> &'static str {
        match self {
            PostFilter::All => "all",
            PostFilter::Draft => "draft",
            PostFilter::Published => "published",
        }
    }

    pub fn next(self) -> Self {
        match self {
            PostFilter::All => PostFilter::Draft,
            PostFilter::Draft => PostFilter::Published,
            PostFilter::Published => PostFilter::All,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "all" => Some(PostFilter::All),
            "draft" | "drafts" => Some(PostFilter::Draft),
            "published" => Some(PostFilter::Published),
            _ => None,
        }
    }

    fn accepts(self, post: &PostSummary) -> bool {
        match self {
            PostFilter::All => true,
            PostFilter::Draft => post.is_draft(),
            PostFilter::Published => !post.is_draft(),
        }
    }
}

pub fn filter_posts<'a>(
    posts: &'a [PostSummary],
    search: &str,
    filter: PostFilter,
) -> Vec<&'a PostSummary> {
    let needle = search.trim().to_lowercase();
    posts
        .iter()
        .filter(|post| filter.accepts(post))
        .filter(|post| needle.is_empty() || post.title.to_lowercase().contains(&needle))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        FsPostStore, NEW_POST_BODY, PostFilter, build_frontmatter, filter_posts,
        parse_frontmatter, title_to_slug,
    };
    use crate::store::{DocumentStore, Post, PostSummary, StoreError};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn slug_folds_accents_and_collapses_spaces() {
        assert_eq!(title_to_slug("Olá  Mundo!"), "ola-mundo");
        assert_eq!(title_to_slug("  Ação e Reação  "), "acao-e-reacao");
        assert_eq!(title_to_slug("C++ in\t2024"), "c-in-2024");
        assert_eq!(title_to_slug("???"), "post");
    }

    #[test]
    fn header_stops_at_first_blank_line() {
        let (meta, body) =
            parse_frontmatter("Title: Hi\nDATE: 2024-01-02 10:00\n\nBody: not a key\nmore");
        assert_eq!(meta.get("title"), Some("Hi"));
        assert_eq!(meta.get("date"), Some("2024-01-02 10:00"));
        assert_eq!(meta.get("body"), None);
        assert_eq!(body, "Body: not a key\nmore");
    }

    #[test]
    fn header_keeps_order_and_skips_empty_values() {
        let post = Post {
            title: "T".into(),
            date: String::new(),
            author: "Ana".into(),
            status: "draft".into(),
            body: String::new(),
        };
        assert_eq!(build_frontmatter(&post), "Title: T\nAuthor: Ana\nStatus: draft");
    }

    #[test]
    fn create_picks_free_names_and_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let mut store = FsPostStore::new(dir.path(), "Ana");
        let first = store.create("Hello World").unwrap();
        let second = store.create("Hello World").unwrap();
        let third = store.create("Hello World").unwrap();
        assert_eq!(first.id, "hello-world.md");
        assert_eq!(second.id, "hello-world-1.md");
        assert_eq!(third.id, "hello-world-2.md");

        let post = store.get(&first.id).unwrap();
        assert_eq!(post.title, "Hello World");
        assert_eq!(post.author, "Ana");
        assert_eq!(post.status, "draft");
        assert_eq!(post.body, NEW_POST_BODY);
        assert_eq!(post.date.len(), "2024-01-01 00:00".len());
    }

    #[test]
    fn put_then_get_preserves_body() {
        let dir = TempDir::new().unwrap();
        let mut store = FsPostStore::new(dir.path(), "");
        let post = Post {
            title: "A".into(),
            date: "2024-05-01 09:30".into(),
            author: "Ana".into(),
            status: "published".into(),
            body: "para one\n\n<div class=\"figure\">\n</div>\n".into(),
        };
        store.put("a.md", &post).unwrap();
        assert_eq!(store.get("a.md").unwrap(), post);
    }

    #[test]
    fn list_sorts_by_date_with_undated_last() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("old.md"), "Title: Old\nDate: 2023-01-01 00:00\n\nx").unwrap();
        fs::write(dir.path().join("new.md"), "Title: New\nDate: 2024-01-01 00:00\n\nx").unwrap();
        fs::write(dir.path().join("bare.md"), "just text").unwrap();
        fs::write(dir.path().join("notes.txt"), "Title: Skip\n\n").unwrap();

        let store = FsPostStore::new(dir.path(), "");
        let posts = store.list().unwrap();
        let ids: Vec<_> = posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["new.md", "old.md", "bare.md"]);
        assert_eq!(posts[2].title, "bare");
        assert_eq!(posts[2].status, "published");
    }

    #[test]
    fn missing_and_invalid_ids_are_errors() {
        let dir = TempDir::new().unwrap();
        let mut store = FsPostStore::new(dir.path(), "");
        assert!(matches!(store.get("nope.md"), Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.put("../escape.md", &Post::default()),
            Err(StoreError::InvalidId(_))
        ));
    }

    #[test]
    fn filter_combines_status_and_search() {
        let post = |id: &str, title: &str, status: &str| PostSummary {
            id: id.into(),
            title: title.into(),
            date: String::new(),
            status: status.into(),
        };
        let posts = vec![
            post("a", "Rust Notes", "draft"),
            post("b", "Travel", "published"),
            post("c", "rusty bikes", "published"),
        ];
        let ids = |f: PostFilter, s: &str| {
            filter_posts(&posts, s, f)
                .into_iter()
                .map(|p| p.id.as_str())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(PostFilter::All, ""), ["a", "b", "c"]);
        assert_eq!(ids(PostFilter::Draft, ""), ["a"]);
        assert_eq!(ids(PostFilter::Published, "RUST"), ["c"]);
        assert_eq!(ids(PostFilter::All, "rust"), ["a", "c"]);
    }
}
