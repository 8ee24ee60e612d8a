use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("invalid GEO series accession: {0}")]
    InvalidAccession(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to read input file at {0}")]
    InputRead(PathBuf),

    #[error("no valid GSE accessions found")]
    #[diagnostic(help("pass accessions directly, or use --input / --config"))]
    NoAccessions,

    #[error("GEO request failed: {0}")]
    GeoHttp(String),

    #[error("GEO returned status {status}: {message}")]
    GeoStatus { status: u16, message: String },

    #[error("{0}")]
    GeoResolution(String),

    #[error("downloaded file size {actual} does not match expected size {expected}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("interrupted")]
    Interrupted,
}

impl KiraError {
    pub fn is_network(&self) -> bool {
        matches!(self, KiraError::GeoHttp(_) | KiraError::GeoStatus { .. })
    }
}
