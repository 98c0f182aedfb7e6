//! Configuration lifecycle: load the file config, merge CLI overrides, and
//! build the library settings.

use std::path::PathBuf;

use anyhow::Result;
use topicmap_core::PipelineConfig;

use crate::app::config_runtime::{self, CliValueSources};
use crate::app_config::load_file_config_from;
use crate::cli::{Cli, PipelineArgs};

/// Effective configuration for one invocation.
pub(crate) struct ResolvedConfig {
    pub(crate) args: PipelineArgs,
    pub(crate) pipeline: PipelineConfig,
    pub(crate) config_path: Option<PathBuf>,
    pub(crate) loaded_from_file: bool,
}

/// Loads the file config (`--config` or the default path), applies CLI
/// overrides and validates the result.
pub(crate) fn resolve_config(cli: &Cli, cli_sources: &CliValueSources) -> Result<ResolvedConfig> {
    let loaded_config = load_file_config_from(cli.pipeline.config.as_deref())?;
    let args = config_runtime::apply_config_defaults(
        cli.pipeline.clone(),
        cli_sources,
        loaded_config.config.as_ref(),
    )?;
    let pipeline = config_runtime::pipeline_config(&args);
    pipeline.validate()?;
    Ok(ResolvedConfig {
        args,
        pipeline,
        config_path: loaded_config.path,
        loaded_from_file: loaded_config.loaded_from_file,
    })
}

/// Renders the effective configuration as `key = value` lines.
pub(crate) fn render_config(resolved: &ResolvedConfig) -> String {
    let config = &resolved.pipeline;
    let resolved_path = resolved.config_path.as_ref().map_or_else(
        || "<unresolved>".to_string(),
        |path| path.display().to_string(),
    );
    let file_state = if resolved.loaded_from_file {
        "loaded"
    } else {
        "not found (using defaults)"
    };
    [
        format!("config_path = {resolved_path}"),
        format!("config_file = {file_state}"),
        format!("data_dir = {}", config.data_dir.display()),
        format!("listing_url = {}", config.listing_url),
        format!("concurrency = {}", config.concurrency),
        format!("max_retries = {}", config.max_retries),
        format!("rate_limit = {}", config.rate_limit_ms),
        format!("page_wait_secs = {}", config.page_wait.as_secs()),
        format!("max_pages = {}", config.max_pages.unwrap_or(0)),
        format!("n_clusters = {}", config.n_clusters),
        format!("adaptive_clusters = {}", config.adaptive_clusters),
        format!("seed = {}", config.seed),
        format!("max_features = {}", config.max_features),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_config_with_explicit_file() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "n_clusters = 6\nmax_pages = 0\n").expect("write config");
        let cli = Cli::try_parse_from([
            "topicmap",
            "model",
            "--config",
            path.to_str().expect("utf-8 path"),
        ])
        .expect("args should parse");

        let resolved = resolve_config(&cli, &CliValueSources::default()).expect("config resolves");

        assert!(resolved.loaded_from_file);
        assert_eq!(resolved.pipeline.n_clusters, 6);
        assert_eq!(resolved.pipeline.max_pages, None);
        let rendered = render_config(&resolved);
        assert!(rendered.contains("config_file = loaded"));
        assert!(rendered.contains("n_clusters = 6"));
        assert!(rendered.contains("max_pages = 0"));
    }

    #[test]
    fn test_resolve_config_rejects_invalid_file() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "colour = \"blue\"\n").expect("write config");
        let cli = Cli::try_parse_from([
            "topicmap",
            "run",
            "--config",
            path.to_str().expect("utf-8 path"),
        ])
        .expect("args should parse");

        let err = resolve_config(&cli, &CliValueSources::default())
            .err()
            .expect("unknown key should fail");
        assert!(format!("{err:#}").contains("Unknown configuration key"));
    }
}
