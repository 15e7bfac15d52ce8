use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

pub const DEFAULT_HOST: &str = "https://store.epicgames.com";
pub const LENS_ENDPOINT: &str = "https://lens.google.com/uploadbyurl";

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Exported games file (JSON)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Result page path (HTML)
    #[arg(short, long)]
    pub output: PathBuf,

    /// Number of entities allowed in the search/pick phase at once
    #[arg(long, default_value_t = 5)]
    pub slots: usize,

    /// Delay between dispatched entities (ms), also the first retry backoff
    #[arg(long, default_value_t = 300)]
    pub delay_ms: u64,

    /// Attempts per request before giving up on an anti-bot page
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Catalog results requested per search
    #[arg(long, default_value_t = 40)]
    pub page_size: usize,

    /// Store host
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Where failed response bodies are dumped (defaults to the temp dir)
    #[arg(long)]
    pub dump_dir: Option<PathBuf>,

    /// Use a numbered stdin menu instead of the full-screen picker
    #[arg(long, default_value_t = false)]
    pub plain: bool,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub input: PathBuf,
    pub output: PathBuf,
    pub slots: usize,
    pub delay: Duration,
    pub retries: u32,
    pub page_size: usize,
    pub host: String,
    pub lens_endpoint: String,
    pub dump_dir: PathBuf,
    pub plain: bool,
}

impl Config {
    pub fn from_args(args: &Args) -> Self {
        Self {
            input: args.input.clone(),
            output: args.output.clone(),
            slots: args.slots.max(1),
            delay: Duration::from_millis(args.delay_ms),
            retries: args.retries.max(1),
            page_size: args.page_size.max(1),
            host: args.host.trim().trim_end_matches('/').to_string(),
            lens_endpoint: LENS_ENDPOINT.to_string(),
            dump_dir: args.dump_dir.clone().unwrap_or_else(std::env::temp_dir),
            plain: args.plain,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output: PathBuf::new(),
            slots: 5,
            delay: Duration::from_millis(300),
            retries: 3,
            page_size: 40,
            host: DEFAULT_HOST.to_string(),
            lens_endpoint: LENS_ENDPOINT.to_string(),
            dump_dir: std::env::temp_dir(),
            plain: false,
        }
    }
}
