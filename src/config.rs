use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

pub const DEFAULT_CONFIG_FILE: &str = "kira-geo.json";
pub const DEFAULT_PATTERN: &str = "!Platform_series_id";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloadConfig {
    pub output_dir: Utf8PathBuf,
    pub parallel: bool,
    pub workers: usize,
    pub delay: f64,
    pub chunk_size: usize,
    pub max_retries: u32,
    pub retry_delay: f64,
    pub verify_integrity: bool,
    pub force: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: Utf8PathBuf::from("downloads"),
            parallel: false,
            workers: default_workers(),
            delay: 0.4,
            chunk_size: 32 * 1024,
            max_retries: 3,
            retry_delay: 2.0,
            verify_integrity: true,
            force: false,
        }
    }
}

impl DownloadConfig {
    pub fn validate(&self) -> Result<(), KiraError> {
        if self.output_dir.as_str().trim().is_empty() {
            return Err(KiraError::InvalidConfig(
                "output_dir must not be empty".to_string(),
            ));
        }
        if self.workers < 1 {
            return Err(KiraError::InvalidConfig(
                "workers must be a positive integer".to_string(),
            ));
        }
        if !self.delay.is_finite() || self.delay < 0.0 {
            return Err(KiraError::InvalidConfig(
                "delay must be a non-negative number".to_string(),
            ));
        }
        if self.chunk_size < 1 {
            return Err(KiraError::InvalidConfig(
                "chunk_size must be a positive integer".to_string(),
            ));
        }
        if !self.retry_delay.is_finite() || self.retry_delay < 0.0 {
            return Err(KiraError::InvalidConfig(
                "retry_delay must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }

    pub fn delay_duration(&self) -> Duration {
        Duration::from_secs_f64(self.delay)
    }

    pub fn retry_delay_duration(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay)
    }

    pub fn status_file(&self) -> Utf8PathBuf {
        self.output_dir.join(crate::status::STATUS_FILE_NAME)
    }
}

pub fn default_workers() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1);
    (cpus * 3 / 4).max(1)
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub output_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub parallel: Option<bool>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub delay: Option<f64>,
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub retry_delay: Option<f64>,
    #[serde(default)]
    pub verify_integrity: Option<bool>,
    #[serde(default)]
    pub force: Option<bool>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub gse_ids: Vec<String>,
    #[serde(default)]
    pub gse_text: Option<String>,
    #[serde(default)]
    pub gse_file: Option<String>,
}

impl ConfigFile {
    pub fn apply_to(&self, mut config: DownloadConfig) -> DownloadConfig {
        if let Some(value) = &self.output_dir {
            config.output_dir = value.clone();
        }
        if let Some(value) = self.parallel {
            config.parallel = value;
        }
        if let Some(value) = self.workers {
            config.workers = value;
        }
        if let Some(value) = self.delay {
            config.delay = value;
        }
        if let Some(value) = self.chunk_size {
            config.chunk_size = value;
        }
        if let Some(value) = self.max_retries {
            config.max_retries = value;
        }
        if let Some(value) = self.retry_delay {
            config.retry_delay = value;
        }
        if let Some(value) = self.verify_integrity {
            config.verify_integrity = value;
        }
        if let Some(value) = self.force {
            config.force = value;
        }
        config
    }
}

#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub output_dir: Option<Utf8PathBuf>,
    pub parallel: bool,
    pub workers: Option<usize>,
    pub delay: Option<f64>,
    pub chunk_size: Option<usize>,
    pub max_retries: Option<u32>,
    pub retry_delay: Option<f64>,
    pub no_verify: bool,
    pub force: bool,
}

impl ConfigOverrides {
    pub fn apply_to(&self, mut config: DownloadConfig) -> DownloadConfig {
        if let Some(value) = &self.output_dir {
            config.output_dir = value.clone();
        }
        if self.parallel {
            config.parallel = true;
        }
        if let Some(value) = self.workers {
            config.workers = value;
        }
        if let Some(value) = self.delay {
            config.delay = value;
        }
        if let Some(value) = self.chunk_size {
            config.chunk_size = value;
        }
        if let Some(value) = self.max_retries {
            config.max_retries = value;
        }
        if let Some(value) = self.retry_delay {
            config.retry_delay = value;
        }
        if self.no_verify {
            config.verify_integrity = false;
        }
        if self.force {
            config.force = true;
        }
        config
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub download: DownloadConfig,
    pub file: ConfigFile,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(
        path: Option<&str>,
        overrides: &ConfigOverrides,
    ) -> Result<ResolvedConfig, KiraError> {
        let file = match path {
            Some(path) => Self::load(PathBuf::from(path))?,
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load(default_path)?
                } else {
                    ConfigFile::default()
                }
            }
        };
        Self::resolve_config(file, overrides)
    }

    pub fn load(path: PathBuf) -> Result<ConfigFile, KiraError> {
        let content = fs::read_to_string(&path).map_err(|_| KiraError::ConfigRead(path.clone()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<ConfigFile, KiraError> {
        serde_json::from_str(content).map_err(|err| KiraError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(
        file: ConfigFile,
        overrides: &ConfigOverrides,
    ) -> Result<ResolvedConfig, KiraError> {
        let download = overrides.apply_to(file.apply_to(DownloadConfig::default()));
        download.validate()?;
        Ok(ResolvedConfig { download, file })
    }
}
