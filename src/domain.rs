use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

pub const GEO_SERIES_PREFIX: &str = "GSE";

pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GeoSeriesAccession(String);

impl GeoSeriesAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn digits(&self) -> &str {
        &self.0[GEO_SERIES_PREFIX.len()..]
    }
}

impl fmt::Display for GeoSeriesAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GeoSeriesAccession {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let digits = normalized.strip_prefix(GEO_SERIES_PREFIX).unwrap_or("");
        if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(KiraError::InvalidAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

impl TryFrom<String> for GeoSeriesAccession {
    type Error = KiraError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GeoSeriesAccession> for String {
    fn from(value: GeoSeriesAccession) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub filename: String,
    pub url: String,
    pub size_bytes: Option<u64>,
    pub size_human: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub gse_id: GeoSeriesAccession,
    pub title: String,
    pub summary: String,
    pub organism: String,
    pub submission_date: String,
    pub platforms: Vec<String>,
    pub sample_count: u32,
    pub experiment_type: String,
    pub raw_files: Vec<RemoteFile>,
    pub error: Option<String>,
}

impl DatasetMetadata {
    pub fn empty(gse_id: GeoSeriesAccession) -> Self {
        Self {
            gse_id,
            title: NOT_AVAILABLE.to_string(),
            summary: NOT_AVAILABLE.to_string(),
            organism: NOT_AVAILABLE.to_string(),
            submission_date: NOT_AVAILABLE.to_string(),
            platforms: Vec::new(),
            sample_count: 0,
            experiment_type: NOT_AVAILABLE.to_string(),
            raw_files: Vec::new(),
            error: None,
        }
    }

    pub fn has_raw_data(&self) -> bool {
        !self.raw_files.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResult {
    pub filename: String,
    pub local_path: Utf8PathBuf,
    pub status: FileStatus,
    pub error: Option<String>,
    pub size_bytes: u64,
}

impl FileResult {
    pub fn completed(filename: &str, local_path: Utf8PathBuf, size_bytes: u64) -> Self {
        Self {
            filename: filename.to_string(),
            local_path,
            status: FileStatus::Completed,
            error: None,
            size_bytes,
        }
    }

    pub fn failed(filename: &str, local_path: Utf8PathBuf, error: impl Into<String>) -> Self {
        Self {
            filename: filename.to_string(),
            local_path,
            status: FileStatus::Failed,
            error: Some(error.into()),
            size_bytes: 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == FileStatus::Completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetStatus {
    Completed,
    Partial,
    Failed,
    NoRawData,
}

impl DatasetStatus {
    pub fn from_counts(succeeded: usize, total: usize) -> Self {
        if total == 0 {
            DatasetStatus::NoRawData
        } else if succeeded == total {
            DatasetStatus::Completed
        } else if succeeded > 0 {
            DatasetStatus::Partial
        } else {
            DatasetStatus::Failed
        }
    }

    pub fn from_file_results(files: &[FileResult]) -> Self {
        let succeeded = files.iter().filter(|file| file.is_completed()).count();
        Self::from_counts(succeeded, files.len())
    }
}

impl fmt::Display for DatasetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetStatus::Completed => write!(f, "completed"),
            DatasetStatus::Partial => write!(f, "partial"),
            DatasetStatus::Failed => write!(f, "failed"),
            DatasetStatus::NoRawData => write!(f, "no_raw_data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetResult {
    pub gse_id: GeoSeriesAccession,
    pub status: DatasetStatus,
    pub error: Option<String>,
    pub files: Vec<FileResult>,
    pub metadata: DatasetMetadata,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub completed: usize,
    pub partial: usize,
    pub failed: usize,
    pub no_raw_data: usize,
    pub interrupted: bool,
    pub results: Vec<DatasetResult>,
    pub elapsed_seconds: f64,
}

impl RunSummary {
    pub fn from_results(results: Vec<DatasetResult>, elapsed: Duration, interrupted: bool) -> Self {
        let count = |status: DatasetStatus| {
            results
                .iter()
                .filter(|result| result.status == status)
                .count()
        };
        let no_raw_data = count(DatasetStatus::NoRawData);
        Self {
            total: results.len(),
            completed: count(DatasetStatus::Completed),
            partial: count(DatasetStatus::Partial),
            failed: count(DatasetStatus::Failed) + no_raw_data,
            no_raw_data,
            interrupted,
            results,
            elapsed_seconds: elapsed.as_secs_f64(),
        }
    }

    pub fn is_success(&self) -> bool {
        !self.interrupted && self.completed == self.total
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_accession_normalizes_case() {
        let acc: GeoSeriesAccession = " gse42861 ".parse().unwrap();
        assert_eq!(acc.as_str(), "GSE42861");
        assert_eq!(acc.digits(), "42861");
    }

    #[test]
    fn parse_accession_rejects_missing_digits() {
        assert_matches!(
            "GSE".parse::<GeoSeriesAccession>(),
            Err(KiraError::InvalidAccession(_))
        );
        assert_matches!(
            "GSM123".parse::<GeoSeriesAccession>(),
            Err(KiraError::InvalidAccession(_))
        );
        assert_matches!(
            "GSE12a".parse::<GeoSeriesAccession>(),
            Err(KiraError::InvalidAccession(_))
        );
    }

    #[test]
    fn dataset_status_from_counts() {
        assert_eq!(DatasetStatus::from_counts(3, 3), DatasetStatus::Completed);
        assert_eq!(DatasetStatus::from_counts(1, 3), DatasetStatus::Partial);
        assert_eq!(DatasetStatus::from_counts(0, 3), DatasetStatus::Failed);
        assert_eq!(DatasetStatus::from_counts(0, 0), DatasetStatus::NoRawData);
    }

    #[test]
    fn failed_file_result_has_zero_size() {
        let result = FileResult::failed("a.cel", Utf8PathBuf::from("out/a.cel"), "boom");
        assert_eq!(result.size_bytes, 0);
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert!(!result.is_completed());
    }
}
