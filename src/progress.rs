use std::time::Duration;

use crate::domain::{DatasetResult, FileResult, GeoSeriesAccession};

#[derive(Debug, Clone, PartialEq)]
pub struct TransferProgress {
    pub filename: String,
    pub downloaded: u64,
    pub total: Option<u64>,
    pub percent: Option<u8>,
    pub bytes_per_second: f64,
    pub eta: Option<Duration>,
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    DatasetStarted {
        index: usize,
        total: usize,
        gse_id: GeoSeriesAccession,
    },
    Transfer(TransferProgress),
    FileFinished {
        gse_id: GeoSeriesAccession,
        result: FileResult,
    },
    DatasetFinished(DatasetResult),
}

/// Receives progress from the engine. Called from dispatcher workers, so
/// implementations must serialise their own output.
pub trait ProgressSink: Sync {
    fn event(&self, event: ProgressEvent);
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn event(&self, _event: ProgressEvent) {}
}
