//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use topicmap_core::config::{DEFAULT_DATA_DIR, DEFAULT_LISTING_URL, DEFAULT_RATE_LIMIT_MS};
use topicmap_core::{DEFAULT_CLUSTERS, DEFAULT_MAX_FEATURES, DEFAULT_MAX_PAGES, DEFAULT_SEED};

/// Crawl journal article metadata, clean it, and map it into topic clusters.
///
/// Each subcommand runs one pipeline stage against the data directory;
/// `run` executes all of them in order.
#[derive(Parser, Debug)]
#[command(name = "topicmap")]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

/// Pipeline stages.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Collect volume links from the listing page
    Discover,
    /// Crawl article metadata for every discovered volume
    Crawl,
    /// Merge crawled partial files into the cleaned dataset
    Merge,
    /// Cluster the cleaned dataset and extract topics per cluster
    Model,
    /// Run discover, crawl, merge and model in order
    Run,
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Config subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
}

/// Flags shared by every stage. File config values apply unless a flag is
/// given on the command line.
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored log output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Config file (default: $XDG_CONFIG_HOME/topicmap/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Root directory for raw, cleaned and log files
    #[arg(short = 'd', long, global = true, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Archive page listing the journal volumes
    #[arg(long, global = true, default_value = DEFAULT_LISTING_URL)]
    pub listing_url: String,

    /// Volumes crawled in parallel (1-32)
    #[arg(short = 'c', long, global = true, default_value_t = 4, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub concurrency: u8,

    /// Maximum attempts for transient fetch failures (0-10)
    #[arg(short = 'r', long, global = true, default_value_t = 3, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: u8,

    /// Minimum delay between requests to the same domain in milliseconds (0 to disable, max 60000)
    #[arg(short = 'l', long, global = true, default_value_t = DEFAULT_RATE_LIMIT_MS, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub rate_limit: u64,

    /// Seconds to wait for a page to render (1-60)
    #[arg(long, global = true, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..=60))]
    pub page_wait: u64,

    /// Listing pages per volume (0 for unlimited)
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_PAGES)]
    pub max_pages: u32,

    /// Number of clusters (2-50)
    #[arg(short = 'k', long, global = true, default_value_t = DEFAULT_CLUSTERS as u8, value_parser = clap::value_parser!(u8).range(2..=50))]
    pub clusters: u8,

    /// Lower the cluster count when there are few articles
    #[arg(long, global = true)]
    pub adaptive_clusters: bool,

    /// Seed for clustering and topic projections
    #[arg(long, global = true, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Vectorizer vocabulary size (2-10000)
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_FEATURES as u16, value_parser = clap::value_parser!(u16).range(2..=10000))]
    pub max_features: u16,
}
