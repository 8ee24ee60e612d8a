use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::error::KiraError;
use crate::progress::{ProgressEvent, ProgressSink, TransferProgress};

const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

pub struct RemoteBody {
    pub partial: bool,
    pub content_length: Option<u64>,
    pub content_range_total: Option<u64>,
    pub reader: Box<dyn Read + Send>,
}

pub trait FileSource: Send + Sync {
    fn open(&self, url: &str, offset: u64) -> Result<RemoteBody, KiraError>;
}

#[derive(Debug, Clone, Copy)]
pub struct TransferRequest<'a> {
    pub filename: &'a str,
    pub url: &'a str,
    pub local_path: &'a Path,
    pub expected_size: Option<u64>,
    pub chunk_size: usize,
}

pub fn transfer(
    source: &dyn FileSource,
    request: &TransferRequest<'_>,
    sink: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<u64, KiraError> {
    cancel.check()?;
    let existing = existing_size(request.local_path)?;
    let mut resume_from = match (existing, request.expected_size) {
        (Some(size), Some(expected)) if size > 0 && size < expected => size,
        _ => 0,
    };
    if resume_from > 0 {
        tracing::info!(
            file = request.filename,
            offset = resume_from,
            "resuming download from {}",
            crate::human::format_size(resume_from)
        );
    }

    let mut body = source.open(request.url, resume_from)?;
    if resume_from > 0 && !body.partial {
        tracing::warn!(
            file = request.filename,
            "server ignored range request; restarting from zero"
        );
        resume_from = 0;
    }

    let total = if resume_from > 0 {
        body.content_range_total.or(request.expected_size)
    } else {
        body.content_length.or(request.expected_size)
    };

    let mut file = open_target(request.local_path, resume_from > 0)?;
    let mut buffer = vec![0u8; request.chunk_size.max(1)];
    let mut downloaded = resume_from;
    let mut written = 0u64;
    let started = Instant::now();
    let mut last_sample = started;

    loop {
        cancel.check()?;
        let read = match body.reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(KiraError::GeoHttp(format!("read failed: {err}"))),
        };
        file.write_all(&buffer[..read])
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        downloaded += read as u64;
        written += read as u64;

        let now = Instant::now();
        if now.duration_since(last_sample) >= SAMPLE_INTERVAL {
            last_sample = now;
            sink.event(ProgressEvent::Transfer(sample_progress(
                request.filename,
                downloaded,
                written,
                total,
                now.duration_since(started),
            )));
        }
    }

    file.flush()
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    Ok(written)
}

pub fn sample_progress(
    filename: &str,
    downloaded: u64,
    transferred: u64,
    total: Option<u64>,
    elapsed: Duration,
) -> TransferProgress {
    let seconds = elapsed.as_secs_f64();
    let bytes_per_second = if seconds > 0.0 {
        transferred as f64 / seconds
    } else {
        0.0
    };
    let percent = total
        .filter(|total| *total > 0)
        .map(|total| ((downloaded.saturating_mul(100) / total).min(100)) as u8);
    let eta = match total {
        Some(total) if bytes_per_second > 0.0 => Some(Duration::from_secs_f64(
            total.saturating_sub(downloaded) as f64 / bytes_per_second,
        )),
        _ => None,
    };
    TransferProgress {
        filename: filename.to_string(),
        downloaded,
        total,
        percent,
        bytes_per_second,
        eta,
    }
}

fn existing_size(path: &Path) -> Result<Option<u64>, KiraError> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.len())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(KiraError::Filesystem(err.to_string())),
    }
}

fn open_target(path: &Path, append: bool) -> Result<File, KiraError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| KiraError::Filesystem(err.to_string()))?;
    }
    let file = if append {
        OpenOptions::new().append(true).open(path)
    } else {
        File::create(path)
    };
    file.map_err(|err| KiraError::Filesystem(format!("open {}: {err}", path.display())))
}
