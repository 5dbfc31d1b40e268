use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::checksum_store::{DEFAULT_PROGRESS_INTERVAL, HashOptions, StoreOptions};
use crate::domain::{ChecksumFormat, CopyMode};
use crate::error::RetrieverError;
use crate::format::{HeaderOptions, parse_manifest_date};

pub const DEFAULT_CONFIG_FILE: &str = "dataset-retriever.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub checksum_format: Option<String>,
    #[serde(default)]
    pub base_output_dir: Option<String>,
    #[serde(default)]
    pub manifest_date: Option<String>,
    #[serde(default)]
    pub preview: Option<bool>,
    #[serde(default)]
    pub force_hash: Option<bool>,
    #[serde(default)]
    pub progress_interval_secs: Option<u64>,
    #[serde(default)]
    pub copy_mode: Option<CopyMode>,
    #[serde(default)]
    pub overwrite: Option<bool>,
    #[serde(default)]
    pub storage_roots: Vec<String>,
    #[serde(default)]
    pub header: Option<HeaderOptions>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub checksum_format: ChecksumFormat,
    pub base_output_dir: Option<Utf8PathBuf>,
    pub manifest_date: Option<NaiveDate>,
    pub preview: bool,
    pub force_hash: bool,
    pub progress_interval: Duration,
    pub copy_mode: CopyMode,
    pub overwrite: bool,
    pub storage_roots: Vec<Utf8PathBuf>,
    pub header: HeaderOptions,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            checksum_format: ChecksumFormat::default(),
            base_output_dir: None,
            manifest_date: None,
            preview: false,
            force_hash: false,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            copy_mode: CopyMode::default(),
            overwrite: false,
            storage_roots: Vec::new(),
            header: HeaderOptions::default(),
        }
    }
}

impl ResolvedConfig {
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            base_output: self.base_output_dir.clone(),
            manifest_date: self.manifest_date,
            header: self.header,
            preview: self.preview,
        }
    }

    pub fn hash_options(&self) -> HashOptions {
        HashOptions {
            force: self.force_hash,
            progress_interval: self.progress_interval,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub checksum_format: Option<ChecksumFormat>,
    pub base_output_dir: Option<String>,
    pub manifest_date: Option<String>,
    pub preview: bool,
    pub force_hash: bool,
    pub link: bool,
    pub overwrite: bool,
    pub storage_roots: Vec<String>,
}

impl ConfigOverrides {
    pub fn apply(self, config: &mut ResolvedConfig) -> Result<(), RetrieverError> {
        if let Some(format) = self.checksum_format {
            config.checksum_format = format;
        }
        if let Some(base) = self.base_output_dir {
            config.base_output_dir = Some(Utf8PathBuf::from(base));
        }
        if let Some(date) = self.manifest_date {
            config.manifest_date = Some(parse_manifest_date(&date)?);
        }
        config.preview |= self.preview;
        config.force_hash |= self.force_hash;
        config.overwrite |= self.overwrite;
        if self.link {
            config.copy_mode = CopyMode::Link;
        }
        if !self.storage_roots.is_empty() {
            config.storage_roots = self.storage_roots.into_iter().map(Utf8PathBuf::from).collect();
        }
        Ok(())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, RetrieverError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| RetrieverError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| RetrieverError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, RetrieverError> {
        let defaults = ResolvedConfig::default();
        let checksum_format = match config.checksum_format {
            Some(value) => value.parse()?,
            None => defaults.checksum_format,
        };
        let manifest_date = config
            .manifest_date
            .as_deref()
            .map(parse_manifest_date)
            .transpose()?;
        let progress_interval = config
            .progress_interval_secs
            .map(|secs| Duration::from_secs(secs.max(1)))
            .unwrap_or(defaults.progress_interval);

        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(defaults.schema_version),
            checksum_format,
            base_output_dir: config.base_output_dir.map(Utf8PathBuf::from),
            manifest_date,
            preview: config.preview.unwrap_or(defaults.preview),
            force_hash: config.force_hash.unwrap_or(defaults.force_hash),
            progress_interval,
            copy_mode: config.copy_mode.unwrap_or(defaults.copy_mode),
            overwrite: config.overwrite.unwrap_or(defaults.overwrite),
            storage_roots: config.storage_roots.into_iter().map(Utf8PathBuf::from).collect(),
            header: config.header.unwrap_or(defaults.header),
        })
    }
}
