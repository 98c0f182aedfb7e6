//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use topicmap_core::config::{
    MAX_CLUSTERS, MAX_FEATURES, MAX_PAGE_WAIT_SECS, MAX_RATE_LIMIT_MS, MAX_RETRIES, MIN_CLUSTERS,
    MIN_FEATURES, MIN_PAGE_WAIT_SECS,
};
use topicmap_core::{MAX_CONCURRENCY, MIN_CONCURRENCY};

/// `key = value` file configuration for pipeline defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Root directory for raw, cleaned and log files.
    pub data_dir: Option<PathBuf>,
    /// Archive page listing the journal volumes.
    pub listing_url: Option<String>,
    /// Volumes crawled in parallel.
    pub concurrency: Option<u8>,
    /// Attempt budget for transient failures.
    pub max_retries: Option<u8>,
    /// Per-domain rate limit in milliseconds.
    pub rate_limit: Option<u64>,
    /// Bounded page wait in seconds.
    pub page_wait_secs: Option<u64>,
    /// Listing pages per volume; 0 is unlimited.
    pub max_pages: Option<u32>,
    pub n_clusters: Option<u8>,
    pub adaptive_clusters: Option<bool>,
    pub seed: Option<u64>,
    pub max_features: Option<u64>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&usize::from(concurrency))
        {
            bail!(
                "Invalid config value for `concurrency`: {concurrency}. Expected range: {MIN_CONCURRENCY}..={MAX_CONCURRENCY}"
            );
        }

        if let Some(max_retries) = self.max_retries
            && u32::from(max_retries) > MAX_RETRIES
        {
            bail!(
                "Invalid config value for `max_retries`: {max_retries}. Expected range: 0..={MAX_RETRIES}"
            );
        }

        if let Some(rate_limit) = self.rate_limit
            && rate_limit > MAX_RATE_LIMIT_MS
        {
            bail!(
                "Invalid config value for `rate_limit`: {rate_limit}. Expected range: 0..={MAX_RATE_LIMIT_MS}"
            );
        }

        if let Some(page_wait) = self.page_wait_secs
            && !(MIN_PAGE_WAIT_SECS..=MAX_PAGE_WAIT_SECS).contains(&page_wait)
        {
            bail!(
                "Invalid config value for `page_wait_secs`: {page_wait}. Expected range: {MIN_PAGE_WAIT_SECS}..={MAX_PAGE_WAIT_SECS}"
            );
        }

        if let Some(n_clusters) = self.n_clusters
            && !(MIN_CLUSTERS..=MAX_CLUSTERS).contains(&usize::from(n_clusters))
        {
            bail!(
                "Invalid config value for `n_clusters`: {n_clusters}. Expected range: {MIN_CLUSTERS}..={MAX_CLUSTERS}"
            );
        }

        if let Some(max_features) = self.max_features
            && !(MIN_FEATURES as u64..=MAX_FEATURES as u64).contains(&max_features)
        {
            bail!(
                "Invalid config value for `max_features`: {max_features}. Expected range: {MIN_FEATURES}..={MAX_FEATURES}"
            );
        }

        Ok(())
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
    /// Indicates whether configuration was loaded from disk.
    pub loaded_from_file: bool,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/topicmap/config.toml`
/// 2. `$HOME/.config/topicmap/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("topicmap")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("topicmap")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from `explicit` when given, else from the default path if
/// present. An explicit path that does not exist is an error.
pub fn load_file_config_from(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        if !path.exists() {
            bail!("Config file '{}' does not exist", path.display());
        }
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
            loaded_from_file: true,
        });
    }

    let path = resolve_default_config_path();
    let Some(path_ref) = path.as_deref() else {
        return Ok(LoadedConfig {
            path,
            config: None,
            loaded_from_file: false,
        });
    };

    if !path_ref.exists() {
        return Ok(LoadedConfig {
            path,
            config: None,
            loaded_from_file: false,
        });
    }

    let config = load_file_config(path_ref)?;
    Ok(LoadedConfig {
        path,
        config: Some(config),
        loaded_from_file: true,
    })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let line_context = || format!("Invalid `{key}` value on line {}", line_index + 1);

        match key {
            "data_dir" => {
                cfg.data_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(line_context)?,
                ));
            }
            "listing_url" => {
                cfg.listing_url = Some(parse_string_literal(value).with_context(line_context)?);
            }
            "concurrency" => {
                cfg.concurrency = Some(parse_integer_u8(value).with_context(line_context)?);
            }
            "max_retries" => {
                cfg.max_retries = Some(parse_integer_u8(value).with_context(line_context)?);
            }
            "rate_limit" => {
                cfg.rate_limit = Some(parse_integer_u64(value).with_context(line_context)?);
            }
            "page_wait_secs" => {
                cfg.page_wait_secs = Some(parse_integer_u64(value).with_context(line_context)?);
            }
            "max_pages" => {
                let parsed = parse_integer_u64(value).with_context(line_context)?;
                let pages = u32::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("max_pages out of range for u32"))?;
                cfg.max_pages = Some(pages);
            }
            "n_clusters" => {
                cfg.n_clusters = Some(parse_integer_u8(value).with_context(line_context)?);
            }
            "adaptive_clusters" => {
                cfg.adaptive_clusters = Some(parse_boolean(value).with_context(line_context)?);
            }
            "seed" => {
                cfg.seed = Some(parse_integer_u64(value).with_context(line_context)?);
            }
            "max_features" => {
                cfg.max_features = Some(parse_integer_u64(value).with_context(line_context)?);
            }
            unknown => {
                bail!(
                    "Unknown configuration key: '{}' on line {}",
                    unknown,
                    line_index + 1
                );
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u8(raw_value: &str) -> Result<u8> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<u16>()?;
    u8::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}
