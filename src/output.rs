use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::style::Stylize;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use serde::Serialize;

use crate::config::DownloadConfig;
use crate::domain::{DatasetStatus, GeoSeriesAccession, RunSummary};
use crate::human::{format_duration, format_size, format_speed};
use crate::progress::{ProgressEvent, ProgressSink, TransferProgress};

const PREVIEW_LIMIT: usize = 20;
const PREVIEW_EDGE: usize = 10;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct ConsoleProgress {
    lock: Mutex<()>,
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            lock: Mutex::new(()),
        }
    }

    fn write_line(&self, line: &str) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "{line}");
    }
}

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::DatasetStarted {
                index,
                total,
                gse_id,
            } => {
                self.write_line(&format!(
                    "{} {}",
                    format!("[{index}/{total}]").cyan(),
                    gse_id.as_str().bold()
                ));
            }
            ProgressEvent::Transfer(progress) => self.write_line(&format_transfer(&progress)),
            ProgressEvent::FileFinished { result, .. } => {
                let line = if result.is_completed() {
                    format!(
                        "  {} {} ({})",
                        "ok".green(),
                        result.filename,
                        format_size(result.size_bytes)
                    )
                } else {
                    format!(
                        "  {} {}: {}",
                        "failed".red(),
                        result.filename,
                        result.error.as_deref().unwrap_or("unknown error")
                    )
                };
                self.write_line(&line);
            }
            ProgressEvent::DatasetFinished(result) => {
                let succeeded = result.files.iter().filter(|file| file.is_completed()).count();
                self.write_line(&format!(
                    "  {} {} ({succeeded}/{} files)",
                    result.gse_id,
                    status_label(result.status),
                    result.files.len()
                ));
            }
        }
    }
}

fn format_transfer(progress: &TransferProgress) -> String {
    let mut line = format!("  {} ", progress.filename);
    match (progress.percent, progress.total) {
        (Some(percent), Some(total)) => line.push_str(&format!(
            "{percent:>3}% {}/{}",
            format_size(progress.downloaded),
            format_size(total)
        )),
        _ => line.push_str(&format_size(progress.downloaded)),
    }
    line.push_str(&format!(" {}", format_speed(progress.bytes_per_second)));
    if let Some(eta) = progress.eta {
        line.push_str(&format!(" eta {}", format_duration(eta)));
    }
    line
}

fn status_label(status: DatasetStatus) -> String {
    let text = status.to_string();
    match status {
        DatasetStatus::Completed => text.green().to_string(),
        DatasetStatus::Partial => text.yellow().to_string(),
        DatasetStatus::Failed | DatasetStatus::NoRawData => text.red().to_string(),
    }
}

pub fn format_accession_list(accessions: &[GeoSeriesAccession]) -> String {
    if accessions.is_empty() {
        return "No GSE accessions found\n".to_string();
    }
    let mut out = format!("Found {} GSE accession(s):\n", accessions.len());
    let line = |index: usize, acc: &GeoSeriesAccession| format!("  {:>2}. {acc}\n", index + 1);
    if accessions.len() <= PREVIEW_LIMIT {
        for (index, acc) in accessions.iter().enumerate() {
            out.push_str(&line(index, acc));
        }
    } else {
        for (index, acc) in accessions.iter().enumerate().take(PREVIEW_EDGE) {
            out.push_str(&line(index, acc));
        }
        out.push_str(&format!(
            "  ... ({} more) ...\n",
            accessions.len() - 2 * PREVIEW_EDGE
        ));
        let tail = accessions.len() - PREVIEW_EDGE;
        for (index, acc) in accessions.iter().enumerate().skip(tail) {
            out.push_str(&line(index, acc));
        }
    }
    out
}

pub fn format_config(config: &DownloadConfig) -> String {
    let mode = if config.parallel {
        format!("parallel ({} workers)", config.workers)
    } else {
        format!("sequential ({:.1}s delay)", config.delay)
    };
    format!(
        "Output directory: {}\nMode: {mode}\nRetries: {} ({:.1}s apart)\nChunk size: {}\nVerify size: {}\n",
        config.output_dir,
        config.max_retries,
        config.retry_delay,
        format_size(config.chunk_size as u64),
        if config.verify_integrity { "yes" } else { "no" },
    )
}

pub fn print_preview(accessions: &[GeoSeriesAccession], config: &DownloadConfig) {
    println!("{}", "GEO raw data download".cyan().bold());
    print!("{}", format_accession_list(accessions));
    println!();
    print!("{}", format_config(config));
}

pub fn print_text_summary(summary: &RunSummary) {
    println!();
    println!("{}", "Download summary".cyan().bold());
    println!("Datasets: {}", summary.total);
    println!("{}", format!("Completed: {}", summary.completed).green());
    println!("{}", format!("Partial: {}", summary.partial).yellow());
    println!(
        "{}",
        format!(
            "Failed: {} ({} without raw data)",
            summary.failed, summary.no_raw_data
        )
        .red()
    );
    println!(
        "Elapsed: {}",
        format_duration(Duration::from_secs_f64(summary.elapsed_seconds))
    );
    if summary.interrupted {
        println!("{}", "Interrupted: remaining datasets were skipped".yellow());
    }

    for result in &summary.results {
        println!("  {} {}", result.gse_id, status_label(result.status));
        if let Some(error) = &result.error {
            println!("     {error}");
        }
        for file in result.files.iter().filter(|file| !file.is_completed()) {
            println!(
                "     {} {}",
                file.filename,
                file.error.as_deref().unwrap_or("failed").red()
            );
        }
    }
}

pub fn confirm_download(prompt: &str) -> io::Result<bool> {
    let mut stdout = io::stdout();
    write!(stdout, "{prompt} [y/N] ")?;
    stdout.flush()?;

    enable_raw_mode()?;
    let answer = read_answer();
    disable_raw_mode()?;
    let answer = answer?;
    writeln!(stdout, "{}", if answer { "y" } else { "n" })?;
    Ok(answer)
}

fn read_answer() -> io::Result<bool> {
    loop {
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            return Ok(match key.code {
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => false,
                KeyCode::Char('y') | KeyCode::Char('Y') => true,
                _ => false,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accessions(count: usize) -> Vec<GeoSeriesAccession> {
        (1..=count)
            .map(|n| format!("GSE{n}").parse().unwrap())
            .collect()
    }

    #[test]
    fn short_list_is_shown_in_full() {
        let text = format_accession_list(&accessions(3));
        assert!(text.starts_with("Found 3 GSE accession(s):"));
        assert!(text.contains("   1. GSE1\n"));
        assert!(text.contains("   3. GSE3\n"));
    }

    #[test]
    fn long_list_shows_head_and_tail() {
        let text = format_accession_list(&accessions(25));
        assert!(text.contains("  10. GSE10\n"));
        assert!(!text.contains(" GSE11\n"));
        assert!(text.contains("... (5 more) ..."));
        assert!(text.contains("  16. GSE16\n"));
        assert!(text.contains("  25. GSE25\n"));
        assert!(!text.contains(" GSE15\n"));
    }

    #[test]
    fn transfer_line_with_unknown_total() {
        let line = format_transfer(&TransferProgress {
            filename: "a.cel".to_string(),
            downloaded: 2048,
            total: None,
            percent: None,
            bytes_per_second: 1024.0,
            eta: None,
        });
        assert!(line.contains("a.cel"));
        assert!(line.contains("2.00 KB"));
        assert!(!line.contains("eta"));
    }
}
