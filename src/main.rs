mod app;
mod buffer;
mod config;
mod dialog;
mod directive;
mod images;
mod locate;
mod posts;
mod preview;
mod scheduler;
mod session;
mod store;
mod theme;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use store::{DocumentStore, ImageStore};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "BLOGPAD_LOG";
const MAX_LOG_BYTES: u64 = 8 * 1024 * 1024;

#[derive(Parser)]
#[command(
    name = "blogpad",
    version,
    about = "Blog post editor for the terminal with live preview"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Blog directory (overrides the config file)
    #[arg(long, global = true)]
    blog_dir: Option<PathBuf>,

    /// Image directory (overrides the config file)
    #[arg(long, global = true)]
    images_dir: Option<PathBuf>,

    /// Post to open, by file name
    post: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the config file in $EDITOR (default: vi)
    Config,
    /// List posts, newest first
    Posts {
        /// all, draft or published
        #[arg(long, default_value = "all")]
        filter: String,
        /// Case-insensitive title search
        #[arg(long)]
        search: Option<String>,
    },
    /// Create a draft post and print its id
    New {
        title: Vec<String>,
    },
    /// Store an image and print the markup that embeds it
    Upload {
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let dirs = (cli.blog_dir, cli.images_dir);

    match cli.command {
        Some(Commands::Config) => config::open_config_in_editor(),
        Some(Commands::Posts { filter, search }) => {
            let (cfg, _log_guard) = prepare(dirs)?;
            let filter = posts::PostFilter::parse(&filter)
                .ok_or_else(|| anyhow!("Unknown filter: {filter}. Try all, draft or published."))?;
            let store = posts::FsPostStore::new(&cfg.blog_dir, &cfg.author);
            let list = store.list()?;
            for post in posts::filter_posts(&list, search.as_deref().unwrap_or(""), filter) {
                println!("{}\t{}\t{}\t{}", post.id, post.date, post.status, post.title);
            }
            Ok(())
        }
        Some(Commands::New { title }) => {
            let (cfg, _log_guard) = prepare(dirs)?;
            let title = title.join(" ");
            let title = match title.trim() {
                "" => "New Blog Post",
                trimmed => trimmed,
            };
            let mut store = posts::FsPostStore::new(&cfg.blog_dir, &cfg.author);
            let created = store.create(title)?;
            println!("{}", created.id);
            Ok(())
        }
        Some(Commands::Upload { file }) => {
            let (cfg, _log_guard) = prepare(dirs)?;
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| anyhow!("No file name in {}", file.display()))?;
            let bytes =
                fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let mut store = images::FsImageStore::new(&cfg.images_dir);
            let stored = store.upload(&name, &bytes)?;
            let image = directive::ImageRef::new(stored.filename);
            println!(
                "{}",
                directive::generate(&image, &directive::PresentationOptions::default())
            );
            Ok(())
        }
        None => {
            let (cfg, _log_guard) = prepare(dirs)?;
            app::run_app(cfg, cli.post)
        }
    }
}

fn prepare(
    (blog_dir, images_dir): (Option<PathBuf>, Option<PathBuf>),
) -> Result<(config::Config, Option<WorkerGuard>)> {
    let mut cfg = config::load_config()?;
    if let Some(dir) = blog_dir {
        cfg.blog_dir = dir;
    }
    if let Some(dir) = images_dir {
        cfg.images_dir = dir;
    }
    let guard = init_logging(&cfg)?;
    Ok((cfg, guard))
}

/// Log to a file; the terminal belongs to the UI. `BLOGPAD_LOG` overrides the level.
fn init_logging(cfg: &config::Config) -> Result<Option<WorkerGuard>> {
    let Some(log_path) = cfg.log_file.as_deref() else {
        return Ok(None);
    };
    rotate_if_large(log_path)?;
    config::ensure_parent_dir(log_path)?;

    let file_name = log_path
        .file_name()
        .ok_or_else(|| anyhow!("no file name in {}", log_path.display()))?;
    let directory = log_path
        .parent()
        .ok_or_else(|| anyhow!("{} has no parent", log_path.display()))?;

    let file_appender = tracing_appender::rolling::never(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    match tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .try_init()
    {
        Ok(()) => Ok(Some(guard)),
        Err(_) => Ok(None),
    }
}

fn rotate_if_large(log_path: &Path) -> Result<()> {
    if let Ok(metadata) = fs::metadata(log_path) {
        if metadata.is_file() && metadata.len() > MAX_LOG_BYTES {
            fs::remove_file(log_path)
                .with_context(|| format!("Failed to remove {}", log_path.display()))?;
        }
    }
    Ok(())
}
