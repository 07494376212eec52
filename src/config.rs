use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub blog_dir: PathBuf,
    pub images_dir: PathBuf,
    pub author: String,
    pub theme: String,
    pub preview_delay_ms: u64,
    pub autosave_delay_ms: u64,
    pub default_custom_width: u32,
    pub show_posts: bool,
    pub show_preview: bool,
    pub posts_width: u16,
    pub tab_width: usize,
    pub log_file: Option<PathBuf>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            blog_dir: PathBuf::from("site").join("blog"),
            images_dir: PathBuf::from("site").join("images"),
            author: env::var("USER").unwrap_or_default(),
            theme: "dark".to_string(),
            preview_delay_ms: 200,
            autosave_delay_ms: 1000,
            default_custom_width: 400,
            show_posts: true,
            show_preview: true,
            posts_width: 32,
            tab_width: 4,
            log_file: dirs::cache_dir().map(|dir| dir.join("blogpad").join("blogpad.log")),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn preview_delay(&self) -> Duration {
        Duration::from_millis(self.preview_delay_ms)
    }

    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PartialConfig {
    blog_dir: Option<PathBuf>,
    images_dir: Option<PathBuf>,
    author: Option<String>,
    theme: Option<String>,
    preview_delay_ms: Option<u64>,
    autosave_delay_ms: Option<u64>,
    default_custom_width: Option<u32>,
    show_posts: Option<bool>,
    show_preview: Option<bool>,
    posts_width: Option<u16>,
    tab_width: Option<usize>,
    log_file: Option<PathBuf>,
    log_level: Option<String>,
}

fn or_default<T>(value: Option<T>, default: T, changed: &mut bool) -> T {
    match value {
        Some(v) => v,
        None => {
            *changed = true;
            default
        }
    }
}

impl PartialConfig {
    fn apply_defaults(self) -> (Config, bool) {
        let defaults = Config::default();
        let mut changed = false;
        let log_file = match self.log_file {
            Some(path) => Some(path),
            None => {
                changed = true;
                defaults.log_file
            }
        };

        (
            Config {
                blog_dir: or_default(self.blog_dir, defaults.blog_dir, &mut changed),
                images_dir: or_default(self.images_dir, defaults.images_dir, &mut changed),
                author: or_default(self.author, defaults.author, &mut changed),
                theme: or_default(self.theme, defaults.theme, &mut changed),
                preview_delay_ms: or_default(
                    self.preview_delay_ms,
                    defaults.preview_delay_ms,
                    &mut changed,
                ),
                autosave_delay_ms: or_default(
                    self.autosave_delay_ms,
                    defaults.autosave_delay_ms,
                    &mut changed,
                ),
                default_custom_width: or_default(
                    self.default_custom_width,
                    defaults.default_custom_width,
                    &mut changed,
                ),
                show_posts: or_default(self.show_posts, defaults.show_posts, &mut changed),
                show_preview: or_default(self.show_preview, defaults.show_preview, &mut changed),
                posts_width: or_default(self.posts_width, defaults.posts_width, &mut changed),
                tab_width: or_default(self.tab_width, defaults.tab_width, &mut changed),
                log_file,
                log_level: or_default(self.log_level, defaults.log_level, &mut changed),
            },
            changed,
        )
    }
}

pub fn config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("Could not determine config directory")?;
    Ok(base.join("blogpad").join("config.toml"))
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        let cfg = Config::default();
        write_config_to(path, &cfg)?;
        return Ok(cfg);
    }

    let raw =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let partial: PartialConfig =
        toml::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))?;
    let (cfg, changed) = partial.apply_defaults();
    if changed {
        write_config_to(path, &cfg)?;
    }
    Ok(cfg)
}

pub fn write_config_to(path: &Path, cfg: &Config) -> Result<()> {
    ensure_parent_dir(path)?;
    let text = toml::to_string_pretty(cfg).context("Failed to serialize config")?;
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn open_config_in_editor() -> Result<()> {
    let path = config_path()?;
    if !path.exists() {
        write_config_to(&path, &Config::default())?;
    }

    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let mut parts = match shell_words::split(&editor) {
        Ok(p) if !p.is_empty() => p,
        _ => vec![editor],
    };
    let cmd = parts.remove(0);
    let status = Command::new(cmd)
        .args(parts)
        .arg(&path)
        .status()
        .with_context(|| format!("Failed to launch editor for {}", path.display()))?;
    if !status.success() {
        anyhow::bail!("Editor exited with status {}", status);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Config, load_config_from};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn partial_file_keeps_values_and_fills_the_rest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "autosave_delay_ms = 2500\nauthor = \"Ana\"\n").unwrap();

        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.autosave_delay_ms, 2500);
        assert_eq!(cfg.author, "Ana");
        assert_eq!(cfg.preview_delay_ms, 200);

        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("preview_delay_ms = 200"));
        assert!(rewritten.contains("autosave_delay_ms = 2500"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "preview_delay_ms = \"soon\"").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }
}
