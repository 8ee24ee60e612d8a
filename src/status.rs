use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{DatasetResult, GeoSeriesAccession};
use crate::error::KiraError;

pub const STATUS_FILE_NAME: &str = "download_status.json";

pub type RunStatus = BTreeMap<GeoSeriesAccession, DatasetResult>;

#[derive(Debug, Clone)]
pub struct StatusStore {
    path: Utf8PathBuf,
}

impl StatusStore {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }

    pub fn in_dir(output_dir: &Utf8Path) -> Self {
        Self::new(output_dir.join(STATUS_FILE_NAME))
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn load(&self) -> RunStatus {
        match self.try_load() {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!(path = %self.path, error = %err, "ignoring unreadable status file");
                RunStatus::new()
            }
        }
    }

    pub fn try_load(&self) -> Result<RunStatus, KiraError> {
        let content = match fs::read_to_string(self.path.as_std_path()) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(RunStatus::new()),
            Err(err) => return Err(KiraError::Filesystem(format!("read {}: {err}", self.path))),
        };
        serde_json::from_str(&content)
            .map_err(|err| KiraError::Filesystem(format!("parse {}: {err}", self.path)))
    }

    pub fn save(&self, status: &RunStatus) -> Result<(), KiraError> {
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."));
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let content = serde_json::to_vec_pretty(status)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix("kira-geo-status")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        temp.write_all(&content)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        temp.persist(self.path.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn save_best_effort(&self, status: &RunStatus) {
        match self.save(status) {
            Ok(()) => tracing::debug!(path = %self.path, datasets = status.len(), "status saved"),
            Err(err) => tracing::warn!(path = %self.path, error = %err, "failed to save status"),
        }
    }
}
