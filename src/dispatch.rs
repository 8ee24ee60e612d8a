use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError, mpsc};
use std::thread;
use std::time::Duration;

use camino::Utf8Path;

use crate::cancel::CancelToken;
use crate::config::DownloadConfig;
use crate::domain::{FileResult, GeoSeriesAccession, RemoteFile};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::retry::{RetryOptions, fetch_with_retry, local_path_for};
use crate::transfer::FileSource;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchOptions {
    pub parallel: bool,
    pub workers: usize,
    pub delay: Duration,
    pub retry: RetryOptions,
}

impl From<&DownloadConfig> for DispatchOptions {
    fn from(config: &DownloadConfig) -> Self {
        Self {
            parallel: config.parallel,
            workers: config.workers,
            delay: config.delay_duration(),
            retry: RetryOptions::from(config),
        }
    }
}

pub struct Dispatcher<'a> {
    source: &'a dyn FileSource,
    output_dir: &'a Utf8Path,
    options: DispatchOptions,
    sink: &'a dyn ProgressSink,
    cancel: &'a CancelToken,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        source: &'a dyn FileSource,
        output_dir: &'a Utf8Path,
        options: DispatchOptions,
        sink: &'a dyn ProgressSink,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            source,
            output_dir,
            options,
            sink,
            cancel,
        }
    }

    pub fn dispatch(&self, gse_id: &GeoSeriesAccession, files: &[RemoteFile]) -> Vec<FileResult> {
        if self.options.parallel && files.len() > 1 {
            self.dispatch_parallel(gse_id, files)
        } else {
            self.dispatch_sequential(gse_id, files)
        }
    }

    fn dispatch_sequential(
        &self,
        gse_id: &GeoSeriesAccession,
        files: &[RemoteFile],
    ) -> Vec<FileResult> {
        let mut results = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            let result = self.run_one(file);
            self.finished(gse_id, &result);
            results.push(result);
            if index + 1 < files.len() && !self.cancel.is_cancelled() {
                thread::sleep(self.options.delay);
            }
        }
        results
    }

    fn dispatch_parallel(&self, gse_id: &GeoSeriesAccession, files: &[RemoteFile]) -> Vec<FileResult> {
        let workers = self.options.workers.clamp(1, files.len());
        tracing::info!(
            accession = %gse_id,
            files = files.len(),
            workers,
            "downloading in parallel"
        );
        let queue = Mutex::new(files.iter().collect::<VecDeque<_>>());
        let (tx, rx) = mpsc::channel::<FileResult>();

        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let queue = &queue;
                scope.spawn(move || {
                    while let Some(file) = next_file(queue) {
                        if tx.send(self.run_one(file)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            let mut results = Vec::with_capacity(files.len());
            for result in rx {
                self.finished(gse_id, &result);
                results.push(result);
            }
            results
        })
    }

    /// Never panics past this point: an unexpected panic inside the retry
    /// wrapper becomes a failed result with zero size.
    fn run_one(&self, file: &RemoteFile) -> FileResult {
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
            fetch_with_retry(
                self.source,
                file,
                self.output_dir,
                &self.options.retry,
                self.sink,
                self.cancel,
            )
        }));
        attempt.unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            tracing::error!(file = %file.filename, error = %message, "download task panicked");
            FileResult::failed(
                &file.filename,
                local_path_for(self.output_dir, &file.filename),
                message,
            )
        })
    }

    fn finished(&self, gse_id: &GeoSeriesAccession, result: &FileResult) {
        self.sink.event(ProgressEvent::FileFinished {
            gse_id: gse_id.clone(),
            result: result.clone(),
        });
    }
}

fn next_file<'f>(queue: &Mutex<VecDeque<&'f RemoteFile>>) -> Option<&'f RemoteFile> {
    queue
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .pop_front()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("unexpected error: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("unexpected error: {message}")
    } else {
        "unexpected error".to_string()
    }
}
