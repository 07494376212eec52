use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("post not found: {0}")]
    NotFound(String),
    #[error("invalid post id: {0}")]
    InvalidId(String),
    #[error("invalid file type; allowed: {allowed}")]
    InvalidImageType { allowed: String },
    #[error("no filename")]
    MissingFilename,
    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostSummary {
    pub id: String,
    pub title: String,
    pub date: String,
    pub status: String,
}

impl PostSummary {
    pub fn is_draft(&self) -> bool {
        self.status == "draft"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Post {
    pub title: String,
    pub date: String,
    pub author: String,
    pub status: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub filename: String,
    pub url: String,
}

pub trait DocumentStore {
    fn list(&self) -> Result<Vec<PostSummary>, StoreError>;
    fn get(&self, id: &str) -> Result<Post, StoreError>;
    fn put(&mut self, id: &str, post: &Post) -> Result<(), StoreError>;
    fn create(&mut self, title: &str) -> Result<PostSummary, StoreError>;
}

pub trait ImageStore {
    fn list(&self) -> Result<Vec<StoredImage>, StoreError>;
    fn upload(&mut self, name: &str, bytes: &[u8]) -> Result<StoredImage, StoreError>;
}

#[cfg(test)]
pub mod memory {
    use super::{DocumentStore, Post, PostSummary, StoreError};
    use std::collections::BTreeMap;

    #[derive(Debug, Default)]
    pub struct MemoryStore {
        pub posts: BTreeMap<String, Post>,
        pub puts: Vec<(String, Post)>,
        pub fail_puts: bool,
    }

    impl MemoryStore {
        pub fn with_posts(posts: &[(&str, &str)]) -> Self {
            let mut store = Self::default();
            for (id, body) in posts {
                store.posts.insert(
                    id.to_string(),
                    Post {
                        title: id.to_string(),
                        status: "draft".to_string(),
                        body: body.to_string(),
                        ..Post::default()
                    },
                );
            }
            store
        }
    }

    impl DocumentStore for MemoryStore {
        fn list(&self) -> Result<Vec<PostSummary>, StoreError> {
            Ok(self
                .posts
                .iter()
                .map(|(id, post)| PostSummary {
                    id: id.clone(),
                    title: post.title.clone(),
                    date: post.date.clone(),
                    status: post.status.clone(),
                })
                .collect())
        }

        fn get(&self, id: &str) -> Result<Post, StoreError> {
            self.posts
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(id.to_string()))
        }

        fn put(&mut self, id: &str, post: &Post) -> Result<(), StoreError> {
            if self.fail_puts {
                return Err(StoreError::io(
                    "write",
                    id,
                    std::io::Error::other("disk full"),
                ));
            }
            self.puts.push((id.to_string(), post.clone()));
            self.posts.insert(id.to_string(), post.clone());
            Ok(())
        }

        fn create(&mut self, title: &str) -> Result<PostSummary, StoreError> {
            let id = format!("post-{}.md", self.posts.len() + 1);
            let post = Post {
                title: title.to_string(),
                status: "draft".to_string(),
                body: "Write here...".to_string(),
                ..Post::default()
            };
            self.posts.insert(id.clone(), post);
            Ok(PostSummary {
                id,
                title: title.to_string(),
                date: String::new(),
                status: "draft".to_string(),
            })
        }
    }
}
