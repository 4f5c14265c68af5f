use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::accession::CorrectionTable;
use crate::domain::{PageKey, ResearchId};
use crate::error::PipelineError;
use crate::portal::DEFAULT_PORTAL_BASE;
use crate::store;
use crate::xref::DEFAULT_XREF_BASE;

pub const DEFAULT_CONFIG_FILE: &str = "humandbs.json";

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const MAX_CONCURRENCY: usize = 16;
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 500;
pub const MAX_REQUEST_DELAY_MS: u64 = 10_000;
pub const DEFAULT_MAX_VERSION: u32 = 20;
pub const MAX_MAX_VERSION: u32 = 100;
pub const DEFAULT_FLUSH_EVERY: usize = 50;

/// `humandbs.json` as written by hand; every field may be omitted.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub research_ids: Vec<String>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub request_delay_ms: Option<u64>,
    #[serde(default)]
    pub max_version: Option<u32>,
    #[serde(default)]
    pub flush_every: Option<usize>,
    #[serde(default)]
    pub parsed_dir: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub xref_base_url: Option<String>,
    #[serde(default)]
    pub portal_base_url: Option<String>,
    #[serde(default)]
    pub probe_portal: Option<bool>,
    #[serde(default)]
    pub dead_pages: Vec<String>,
    #[serde(default)]
    pub corrections: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub research_ids: Vec<ResearchId>,
    pub concurrency: usize,
    pub request_delay_ms: u64,
    pub max_version: u32,
    pub flush_every: usize,
    pub parsed_dir: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub cache_dir: Utf8PathBuf,
    pub xref_base_url: String,
    pub portal_base_url: String,
    pub probe_portal: bool,
    pub dead_pages: BTreeSet<PageKey>,
    pub corrections: CorrectionTable,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub concurrency: Option<usize>,
    pub request_delay_ms: Option<u64>,
}

impl ResolvedConfig {
    pub fn apply(mut self, overrides: &ConfigOverrides) -> Self {
        if let Some(concurrency) = overrides.concurrency {
            self.concurrency = clamp_concurrency(concurrency);
        }
        if let Some(delay) = overrides.request_delay_ms {
            self.request_delay_ms = delay.min(MAX_REQUEST_DELAY_MS);
        }
        self
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, PipelineError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(PipelineError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| PipelineError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| PipelineError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    /// Like [`ConfigLoader::resolve`], but a missing default file yields the
    /// built-in defaults. Commands that do not crawl use this.
    pub fn resolve_or_default(path: Option<&str>) -> Result<ResolvedConfig, PipelineError> {
        match Self::resolve(path) {
            Err(PipelineError::MissingConfig) => Self::resolve_config(Config::default()),
            other => other,
        }
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, PipelineError> {
        let research_ids = config
            .research_ids
            .iter()
            .map(|value| value.parse::<ResearchId>())
            .collect::<Result<Vec<_>, PipelineError>>()?;

        let dead_pages = config
            .dead_pages
            .iter()
            .map(|value| value.parse::<PageKey>())
            .collect::<Result<BTreeSet<_>, PipelineError>>()?;

        let cache_dir = match config.cache_dir {
            Some(dir) => Utf8PathBuf::from(dir),
            None => store::default_cache_root()?,
        };

        let corrections =
            CorrectionTable::builtin().merge(CorrectionTable::from_entries(config.corrections));

        Ok(ResolvedConfig {
            research_ids,
            concurrency: clamp_concurrency(config.concurrency.unwrap_or(DEFAULT_CONCURRENCY)),
            request_delay_ms: config
                .request_delay_ms
                .unwrap_or(DEFAULT_REQUEST_DELAY_MS)
                .min(MAX_REQUEST_DELAY_MS),
            max_version: config
                .max_version
                .unwrap_or(DEFAULT_MAX_VERSION)
                .clamp(1, MAX_MAX_VERSION),
            flush_every: config.flush_every.unwrap_or(DEFAULT_FLUSH_EVERY).max(1),
            parsed_dir: Utf8PathBuf::from(config.parsed_dir.unwrap_or_else(|| "parsed".to_string())),
            output_dir: Utf8PathBuf::from(config.output_dir.unwrap_or_else(|| "output".to_string())),
            cache_dir,
            xref_base_url: config
                .xref_base_url
                .unwrap_or_else(|| DEFAULT_XREF_BASE.to_string()),
            portal_base_url: config
                .portal_base_url
                .unwrap_or_else(|| DEFAULT_PORTAL_BASE.to_string()),
            probe_portal: config.probe_portal.unwrap_or(false),
            dead_pages,
            corrections,
        })
    }
}

fn clamp_concurrency(value: usize) -> usize {
    value.clamp(1, MAX_CONCURRENCY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = Config {
            cache_dir: Some("/tmp/humandbs".to_string()),
            ..Default::default()
        };
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(resolved.request_delay_ms, DEFAULT_REQUEST_DELAY_MS);
        assert_eq!(resolved.max_version, DEFAULT_MAX_VERSION);
        assert_eq!(resolved.flush_every, DEFAULT_FLUSH_EVERY);
        assert!(!resolved.probe_portal);
        assert_eq!(resolved.corrections, CorrectionTable::builtin());
    }

    #[test]
    fn knobs_are_clamped() {
        let config = Config {
            concurrency: Some(0),
            request_delay_ms: Some(60_000),
            max_version: Some(1_000),
            flush_every: Some(0),
            cache_dir: Some("/tmp/humandbs".to_string()),
            ..Default::default()
        };
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.concurrency, 1);
        assert_eq!(resolved.request_delay_ms, MAX_REQUEST_DELAY_MS);
        assert_eq!(resolved.max_version, MAX_MAX_VERSION);
        assert_eq!(resolved.flush_every, 1);

        let overridden = resolved.apply(&ConfigOverrides {
            concurrency: Some(64),
            request_delay_ms: Some(0),
        });
        assert_eq!(overridden.concurrency, MAX_CONCURRENCY);
        assert_eq!(overridden.request_delay_ms, 0);
    }
}
