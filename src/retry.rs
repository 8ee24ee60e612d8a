use std::fs;
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

use crate::cancel::CancelToken;
use crate::config::DownloadConfig;
use crate::domain::{FileResult, RemoteFile};
use crate::error::KiraError;
use crate::progress::ProgressSink;
use crate::transfer::{FileSource, TransferRequest, transfer};

pub const UNNAMED_FILE: &str = "unnamed_file";

const UNSAFE_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryOptions {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub verify_integrity: bool,
    pub chunk_size: usize,
}

impl From<&DownloadConfig> for RetryOptions {
    fn from(config: &DownloadConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: config.retry_delay_duration(),
            verify_integrity: config.verify_integrity,
            chunk_size: config.chunk_size,
        }
    }
}

pub fn safe_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|ch| if UNSAFE_CHARS.contains(&ch) { '_' } else { ch })
        .collect();
    let trimmed = replaced.trim_matches(|ch| ch == '.' || ch == ' ');
    if trimmed.is_empty() {
        UNNAMED_FILE.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn local_path_for(output_dir: &Utf8Path, filename: &str) -> Utf8PathBuf {
    output_dir.join(safe_filename(filename))
}

/// Downloads `file` into `output_dir`, retrying failed or short transfers.
/// Never returns an error: the outcome is carried by the `FileResult`.
pub fn fetch_with_retry(
    source: &dyn FileSource,
    file: &RemoteFile,
    output_dir: &Utf8Path,
    options: &RetryOptions,
    sink: &dyn ProgressSink,
    cancel: &CancelToken,
) -> FileResult {
    let local_path = local_path_for(output_dir, &file.filename);

    if let Some(expected) = file.size_bytes {
        if file_size(&local_path) == Some(expected) {
            tracing::info!(file = %file.filename, "file already exists and is complete");
            return FileResult::completed(&file.filename, local_path, expected);
        }
    }

    if cancel.is_cancelled() {
        return FileResult::failed(
            &file.filename,
            local_path,
            KiraError::Interrupted.to_string(),
        );
    }

    let attempts = options.max_retries.saturating_add(1);
    let request = TransferRequest {
        filename: &file.filename,
        url: &file.url,
        local_path: local_path.as_std_path(),
        expected_size: file.size_bytes,
        chunk_size: options.chunk_size,
    };

    for attempt in 1..=attempts {
        let outcome = transfer(source, &request, sink, cancel)
            .and_then(|_| verify_size(&local_path, file.size_bytes, options.verify_integrity));
        let err = match outcome {
            Ok(size) => {
                tracing::info!(file = %file.filename, size, "downloaded");
                return FileResult::completed(&file.filename, local_path, size);
            }
            Err(err) => err,
        };

        if matches!(err, KiraError::Interrupted) {
            tracing::warn!(file = %file.filename, "download interrupted");
            return FileResult::failed(&file.filename, local_path, err.to_string());
        }
        if attempt < attempts {
            tracing::warn!(
                file = %file.filename,
                attempt,
                attempts,
                error = %err,
                "download failed; retrying in {:.1}s",
                options.retry_delay.as_secs_f64()
            );
            thread::sleep(options.retry_delay);
        } else {
            tracing::error!(
                file = %file.filename,
                attempts,
                error = %err,
                "download failed after all attempts"
            );
            return FileResult::failed(&file.filename, local_path, err.to_string());
        }
    }

    FileResult::failed(&file.filename, local_path, "no download attempt made")
}

fn verify_size(
    path: &Utf8Path,
    expected: Option<u64>,
    verify_integrity: bool,
) -> Result<u64, KiraError> {
    let actual = fs::metadata(path.as_std_path())
        .map_err(|err| KiraError::Filesystem(err.to_string()))?
        .len();
    match expected {
        Some(expected) if verify_integrity && actual != expected => {
            Err(KiraError::SizeMismatch { expected, actual })
        }
        _ => Ok(actual),
    }
}

fn file_size(path: &Utf8Path) -> Option<u64> {
    fs::metadata(path.as_std_path()).ok().map(|meta| meta.len())
}
