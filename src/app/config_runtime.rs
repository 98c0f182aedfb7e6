use std::time::Duration;

use anyhow::{Result, bail};
use clap::{ArgMatches, CommandFactory, FromArgMatches, parser::ValueSource};
use topicmap_core::PipelineConfig;

use crate::app_config::FileConfig;
use crate::cli::{Cli, PipelineArgs};

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CliValueSources {
    pub(crate) data_dir: bool,
    pub(crate) listing_url: bool,
    pub(crate) concurrency: bool,
    pub(crate) max_retries: bool,
    pub(crate) rate_limit: bool,
    pub(crate) page_wait: bool,
    pub(crate) max_pages: bool,
    pub(crate) clusters: bool,
    pub(crate) adaptive_clusters: bool,
    pub(crate) seed: bool,
    pub(crate) max_features: bool,
    pub(crate) verbose: bool,
    pub(crate) quiet: bool,
}

pub(crate) fn parse_cli_with_sources() -> (Cli, CliValueSources) {
    let command = Cli::command();
    let matches = command.get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());

    let sources = CliValueSources {
        data_dir: is_commandline_value(&matches, "data_dir"),
        listing_url: is_commandline_value(&matches, "listing_url"),
        concurrency: is_commandline_value(&matches, "concurrency"),
        max_retries: is_commandline_value(&matches, "max_retries"),
        rate_limit: is_commandline_value(&matches, "rate_limit"),
        page_wait: is_commandline_value(&matches, "page_wait"),
        max_pages: is_commandline_value(&matches, "max_pages"),
        clusters: is_commandline_value(&matches, "clusters"),
        adaptive_clusters: is_commandline_value(&matches, "adaptive_clusters"),
        seed: is_commandline_value(&matches, "seed"),
        max_features: is_commandline_value(&matches, "max_features"),
        verbose: is_commandline_value(&matches, "verbose"),
        quiet: is_commandline_value(&matches, "quiet"),
    };
    (cli, sources)
}

// Global flags may follow the subcommand, so look at nested matches too.
fn is_commandline_value(matches: &ArgMatches, id: &str) -> bool {
    matches.value_source(id) == Some(ValueSource::CommandLine)
        || matches
            .subcommand()
            .is_some_and(|(_, sub)| is_commandline_value(sub, id))
}

pub(crate) fn apply_config_defaults(
    mut args: PipelineArgs,
    cli_sources: &CliValueSources,
    file_config: Option<&FileConfig>,
) -> Result<PipelineArgs> {
    if let Some(file_config) = file_config {
        if !cli_sources.data_dir
            && let Some(data_dir) = &file_config.data_dir
        {
            args.data_dir.clone_from(data_dir);
        }

        if !cli_sources.listing_url
            && let Some(listing_url) = &file_config.listing_url
        {
            args.listing_url.clone_from(listing_url);
        }

        if !cli_sources.concurrency
            && let Some(concurrency) = file_config.concurrency
        {
            args.concurrency = concurrency;
        }

        if !cli_sources.max_retries
            && let Some(max_retries) = file_config.max_retries
        {
            args.max_retries = max_retries;
        }

        if !cli_sources.rate_limit
            && let Some(rate_limit) = file_config.rate_limit
        {
            args.rate_limit = rate_limit;
        }

        if !cli_sources.page_wait
            && let Some(page_wait) = file_config.page_wait_secs
        {
            args.page_wait = page_wait;
        }

        if !cli_sources.max_pages
            && let Some(max_pages) = file_config.max_pages
        {
            args.max_pages = max_pages;
        }

        if !cli_sources.clusters
            && let Some(n_clusters) = file_config.n_clusters
        {
            args.clusters = n_clusters;
        }

        if !cli_sources.adaptive_clusters
            && !args.adaptive_clusters
            && let Some(adaptive) = file_config.adaptive_clusters
        {
            args.adaptive_clusters = adaptive;
        }

        if !cli_sources.seed
            && let Some(seed) = file_config.seed
        {
            args.seed = seed;
        }

        if !cli_sources.max_features
            && let Some(max_features) = file_config.max_features
        {
            args.max_features = u16::try_from(max_features).map_err(|_| {
                anyhow::anyhow!("Invalid config value for `max_features`: {max_features}")
            })?;
        }
    }

    if !(1..=32).contains(&args.concurrency) {
        bail!(
            "Invalid effective concurrency value: {}. Expected range: 1..=32",
            args.concurrency
        );
    }
    if args.rate_limit > 60_000 {
        bail!(
            "Invalid effective rate_limit value: {}. Expected range: 0..=60000",
            args.rate_limit
        );
    }

    Ok(args)
}

/// Library settings for the effective arguments.
pub(crate) fn pipeline_config(args: &PipelineArgs) -> PipelineConfig {
    PipelineConfig {
        data_dir: args.data_dir.clone(),
        listing_url: args.listing_url.clone(),
        concurrency: usize::from(args.concurrency),
        max_retries: u32::from(args.max_retries),
        rate_limit_ms: args.rate_limit,
        page_wait: Duration::from_secs(args.page_wait),
        max_pages: (args.max_pages > 0).then_some(args.max_pages),
        n_clusters: usize::from(args.clusters),
        adaptive_clusters: args.adaptive_clusters,
        seed: args.seed,
        max_features: usize::from(args.max_features),
        ..PipelineConfig::default()
    }
}

pub(crate) fn resolve_default_log_level(args: &PipelineArgs) -> &'static str {
    if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

pub(crate) fn should_force_cli_log_level(cli_sources: &CliValueSources) -> bool {
    cli_sources.verbose || cli_sources.quiet
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    fn args(argv: &[&str]) -> PipelineArgs {
        Cli::try_parse_from(argv).expect("args should parse").pipeline
    }

    #[test]
    fn test_file_config_fills_values_not_given_on_command_line() {
        let file = FileConfig {
            data_dir: Some(PathBuf::from("/srv/topicmap")),
            concurrency: Some(2),
            n_clusters: Some(5),
            adaptive_clusters: Some(true),
            ..FileConfig::default()
        };
        let sources = CliValueSources {
            concurrency: true,
            ..CliValueSources::default()
        };

        let effective = apply_config_defaults(
            args(&["topicmap", "run", "-c", "8"]),
            &sources,
            Some(&file),
        )
        .expect("config should apply");

        assert_eq!(effective.concurrency, 8);
        assert_eq!(effective.data_dir, PathBuf::from("/srv/topicmap"));
        assert_eq!(effective.clusters, 5);
        assert!(effective.adaptive_clusters);
    }

    #[test]
    fn test_no_file_config_keeps_cli_defaults() {
        let effective =
            apply_config_defaults(args(&["topicmap", "model"]), &CliValueSources::default(), None)
                .expect("defaults should apply");
        assert_eq!(effective.clusters, 3);
        assert_eq!(effective.rate_limit, 1000);
    }

    #[test]
    fn test_pipeline_config_maps_zero_pages_to_unlimited() {
        let config = pipeline_config(&args(&["topicmap", "crawl", "--max-pages", "0"]));
        assert_eq!(config.max_pages, None);
        let config = pipeline_config(&args(&["topicmap", "crawl"]));
        assert_eq!(config.max_pages, Some(5));
        assert_eq!(config.page_wait, Duration::from_secs(10));
        config.validate().expect("default CLI config is valid");
    }

    #[test]
    fn test_resolve_default_log_level() {
        assert_eq!(resolve_default_log_level(&args(&["topicmap", "run"])), "info");
        assert_eq!(resolve_default_log_level(&args(&["topicmap", "run", "-v"])), "debug");
        assert_eq!(resolve_default_log_level(&args(&["topicmap", "run", "-vv"])), "trace");
        assert_eq!(resolve_default_log_level(&args(&["topicmap", "run", "-q"])), "error");
    }

    #[test]
    fn test_should_force_cli_log_level_only_for_explicit_flags() {
        assert!(!should_force_cli_log_level(&CliValueSources::default()));
        assert!(should_force_cli_log_level(&CliValueSources {
            quiet: true,
            ..CliValueSources::default()
        }));
    }
}
