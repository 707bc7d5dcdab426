use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bluesnake", about = "Site crawler & link-graph extractor")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Crawl a site starting from a seed URL
    Crawl {
        /// Seed URL
        seed: String,

        /// Maximum crawl depth (0 = unlimited)
        #[arg(short, long)]
        depth: Option<u32>,

        /// Number of fetch workers
        #[arg(short, long)]
        parallelism: Option<usize>,

        /// Stop after visiting this many URLs (0 = unlimited)
        #[arg(short = 'n', long)]
        max_urls: Option<u64>,

        /// Also load URLs from the site's sitemap
        #[arg(long)]
        sitemap: bool,

        /// Don't follow links found on pages (sitemap/seed only)
        #[arg(long)]
        no_spider: bool,

        /// State file for pause/resume across runs
        #[arg(long)]
        state: Option<String>,
    },
}
