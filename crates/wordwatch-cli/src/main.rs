//! Wordwatch CLI
//!
//! Watches files and directories and reports which of them contain the
//! given words, optionally re-checking on an interval.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use wordwatch_indexer::{IndexerConfig, TokenizerKind, WatchManager};

#[derive(Parser, Debug)]
#[command(name = "wordwatch")]
#[command(about = "Wordwatch - live word index over watched files")]
#[command(version)]
struct Cli {
    /// Configuration file (default: <config dir>/wordwatch/config.yaml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory name to skip (repeatable)
    #[arg(long = "exclude-dir", value_name = "NAME")]
    exclude_dirs: Vec<String>,

    /// Only index files with this extension (repeatable)
    #[arg(long = "ext", value_name = "EXT")]
    extensions: Vec<String>,

    /// How file content is split into words
    #[arg(long, value_enum)]
    tokenizer: Option<TokenizerArg>,

    /// Re-print matches every SECS seconds until Ctrl+C
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,

    /// File or directory to watch (repeatable)
    #[arg(long = "watch", value_name = "PATH", required = true)]
    watch: Vec<PathBuf>,

    /// Words to look up
    #[arg(required = true)]
    words: Vec<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TokenizerArg {
    Delimiter,
    Regex,
}

impl From<TokenizerArg> for TokenizerKind {
    fn from(arg: TokenizerArg) -> Self {
        match arg {
            TokenizerArg::Delimiter => TokenizerKind::Delimiter,
            TokenizerArg::Regex => TokenizerKind::Regex,
        }
    }
}

impl Cli {
    fn load_config(&self) -> Result<IndexerConfig> {
        let mut config = match &self.config {
            Some(path) => IndexerConfig::load_from(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => IndexerConfig::load(),
        };

        if !self.exclude_dirs.is_empty() {
            config.excluded_dirs = self.exclude_dirs.clone();
        }
        if !self.extensions.is_empty() {
            config.extensions = self.extensions.clone();
        }
        if let Some(tokenizer) = self.tokenizer {
            config.tokenizer = tokenizer.into();
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_target(false)
        .init();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli, config))
}

async fn run(cli: Cli, config: IndexerConfig) -> Result<()> {
    let manager = WatchManager::new(&config);

    let mut watched = 0;
    for path in &cli.watch {
        let outcome = manager.start_watching(path).await;
        if outcome.accepted {
            println!("✓ {}", outcome.message);
            watched += 1;
        } else {
            eprintln!("✗ {}", outcome.message);
        }
    }
    if watched == 0 {
        anyhow::bail!("None of the given paths can be watched");
    }

    while !manager.scans_complete() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    for line in manager.describe_roots() {
        println!("  {}", line);
    }
    println!();
    print_matches(&manager, &cli.words);

    let Some(secs) = cli.interval else {
        return Ok(());
    };

    let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
    // First tick completes immediately
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => print_matches(&manager, &cli.words),
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                break;
            }
        }
    }

    for root in manager.list_watched_roots() {
        manager.stop_watching(&root).await;
    }
    Ok(())
}

fn print_matches(manager: &WatchManager, words: &[String]) {
    for word in words {
        let mut paths: Vec<PathBuf> = manager.query_index(word).into_iter().collect();
        paths.sort();
        println!("{}: {} file(s)", word, paths.len());
        for path in paths {
            println!("  {}", path.display());
        }
    }
}
