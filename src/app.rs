use std::fs;
use std::time::Instant;

use crate::cancel::CancelToken;
use crate::config::DownloadConfig;
use crate::dispatch::{DispatchOptions, Dispatcher};
use crate::domain::{
    DatasetMetadata, DatasetResult, DatasetStatus, FileResult, GeoSeriesAccession, RunSummary,
};
use crate::error::KiraError;
use crate::geo::GeoClient;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::resolver::Resolver;
use crate::status::{RunStatus, StatusStore};
use crate::transfer::FileSource;

pub const SAVE_EVERY: usize = 5;

pub const NO_RAW_DATA_MESSAGE: &str = "no raw data files found";

#[derive(Clone)]
pub struct App<G: GeoClient, F: FileSource> {
    geo: G,
    files: F,
    config: DownloadConfig,
    status: StatusStore,
}

impl<G: GeoClient, F: FileSource> App<G, F> {
    pub fn new(geo: G, files: F, config: DownloadConfig) -> Result<Self, KiraError> {
        config.validate()?;
        fs::create_dir_all(config.output_dir.as_std_path()).map_err(|err| {
            KiraError::Filesystem(format!("create {}: {err}", config.output_dir))
        })?;
        let status = StatusStore::new(config.status_file());
        Ok(Self {
            geo,
            files,
            config,
            status,
        })
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    pub fn status_store(&self) -> &StatusStore {
        &self.status
    }

    pub fn run(
        &self,
        accessions: &[GeoSeriesAccession],
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> RunSummary {
        let started = Instant::now();
        let mut status: RunStatus = self.status.load();
        if !status.is_empty() {
            tracing::info!(datasets = status.len(), "loaded previous download status");
        }

        let total = accessions.len();
        let mut results = Vec::with_capacity(total);
        let mut interrupted = false;

        for (index, accession) in accessions.iter().enumerate() {
            if cancel.is_cancelled() {
                interrupted = true;
                break;
            }
            sink.event(ProgressEvent::DatasetStarted {
                index: index + 1,
                total,
                gse_id: accession.clone(),
            });

            let result = self.process_dataset(accession, sink, cancel);
            if cancel.is_cancelled() && cut_short(&result) {
                tracing::warn!(
                    accession = %accession,
                    "dataset interrupted; keeping previous status"
                );
                interrupted = true;
                break;
            }
            status.insert(accession.clone(), result.clone());
            sink.event(ProgressEvent::DatasetFinished(result.clone()));
            results.push(result);

            if (index + 1) % SAVE_EVERY == 0 {
                self.status.save_best_effort(&status);
            }
            if cancel.is_cancelled() {
                interrupted = true;
                break;
            }
        }

        self.status.save_best_effort(&status);
        if interrupted {
            tracing::warn!(
                processed = results.len(),
                total,
                "run interrupted; progress saved"
            );
        }
        RunSummary::from_results(results, started.elapsed(), interrupted)
    }

    /// Resolves one series and downloads its raw files. Never fails: every
    /// problem ends up in the returned result.
    pub fn process_dataset(
        &self,
        accession: &GeoSeriesAccession,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> DatasetResult {
        tracing::info!(accession = %accession, "processing dataset");
        let metadata = Resolver::new(&self.geo).resolve(accession);

        if let Some(error) = metadata.error.clone() {
            return dataset_result(
                accession,
                DatasetStatus::Failed,
                Some(error),
                Vec::new(),
                metadata,
            );
        }
        if !metadata.has_raw_data() {
            tracing::warn!(accession = %accession, "no raw data files found");
            return dataset_result(
                accession,
                DatasetStatus::NoRawData,
                Some(NO_RAW_DATA_MESSAGE.to_string()),
                Vec::new(),
                metadata,
            );
        }

        tracing::info!(
            accession = %accession,
            files = metadata.raw_files.len(),
            "found raw data files"
        );
        let dispatcher = Dispatcher::new(
            &self.files,
            &self.config.output_dir,
            DispatchOptions::from(&self.config),
            sink,
            cancel,
        );
        let files = dispatcher.dispatch(accession, &metadata.raw_files);
        let status = DatasetStatus::from_file_results(&files);
        tracing::info!(accession = %accession, %status, "dataset finished");
        dataset_result(accession, status, None, files, metadata)
    }
}

fn cut_short(result: &DatasetResult) -> bool {
    let interrupted = KiraError::Interrupted.to_string();
    result
        .files
        .iter()
        .any(|file| file.error.as_deref() == Some(interrupted.as_str()))
}

fn dataset_result(
    accession: &GeoSeriesAccession,
    status: DatasetStatus,
    error: Option<String>,
    files: Vec<FileResult>,
    metadata: DatasetMetadata,
) -> DatasetResult {
    DatasetResult {
        gse_id: accession.clone(),
        status,
        error,
        files,
        metadata,
        updated_at: chrono::Utc::now().to_rfc3339(),
    }
}
