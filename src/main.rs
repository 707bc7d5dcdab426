mod cli;
mod crawl;

use anyhow::Result;
use clap::Parser;
use tracing::warn;

// mimalloc keeps memory in check under high fetch concurrency.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use bluesnake_core::CrawlConfig;

use crate::cli::{Cli, Commands};
use crate::crawl::run_crawl;

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config: CrawlConfig = match std::fs::read_to_string(&cli.config) {
        Ok(raw) => toml::from_str(&raw)?,
        Err(_) => {
            warn!(path = %cli.config, "config file not found, using defaults");
            CrawlConfig::default()
        }
    };

    match cli.command {
        Commands::Crawl {
            seed,
            depth,
            parallelism,
            max_urls,
            sitemap,
            no_spider,
            state,
        } => {
            run_crawl(
                config, seed, depth, parallelism, max_urls, sitemap, no_spider, state,
            )
            .await?;
        }
    }

    Ok(())
}
