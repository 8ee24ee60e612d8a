use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::{ConfigFile, DEFAULT_PATTERN};
use crate::domain::GeoSeriesAccession;
use crate::error::KiraError;

fn accession_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)GSE\d+").expect("valid regex"))
}

#[derive(Debug, Clone)]
pub struct GseExtractor {
    pattern: String,
}

impl Default for GseExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERN)
    }
}

impl GseExtractor {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn extract_from_text(&self, text: &str) -> Vec<GeoSeriesAccession> {
        let mut found = BTreeSet::new();
        for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
            if !self.pattern.is_empty() && line.contains(&self.pattern) {
                if let Some(acc) = accession_regex()
                    .find(line)
                    .and_then(|m| m.as_str().parse().ok())
                {
                    found.insert(acc);
                }
            } else {
                found.extend(
                    accession_regex()
                        .find_iter(line)
                        .filter_map(|m| m.as_str().parse::<GeoSeriesAccession>().ok()),
                );
            }
        }
        found.into_iter().collect()
    }

    pub fn extract_from_file(&self, path: &Path) -> Result<Vec<GeoSeriesAccession>, KiraError> {
        let bytes = fs::read(path).map_err(|_| KiraError::InputRead(path.to_path_buf()))?;
        Ok(self.extract_from_text(&String::from_utf8_lossy(&bytes)))
    }

    pub fn extract_from_args<S: AsRef<str>>(&self, args: &[S]) -> Vec<GeoSeriesAccession> {
        args.iter()
            .filter_map(|arg| arg.as_ref().parse::<GeoSeriesAccession>().ok())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn extract_from_config(
        &self,
        config: &ConfigFile,
    ) -> Result<Vec<GeoSeriesAccession>, KiraError> {
        let mut found: BTreeSet<GeoSeriesAccession> =
            self.extract_from_args(&config.gse_ids).into_iter().collect();
        if let Some(text) = &config.gse_text {
            found.extend(self.extract_from_text(text));
        }
        if let Some(file) = &config.gse_file {
            let path = Path::new(file);
            if path.exists() {
                found.extend(self.extract_from_file(path)?);
            } else {
                tracing::warn!(path = %file, "gse_file from config does not exist");
            }
        }
        Ok(found.into_iter().collect())
    }
}

pub fn merge_identifiers<I>(sources: I) -> Vec<GeoSeriesAccession>
where
    I: IntoIterator<Item = Vec<GeoSeriesAccession>>,
{
    sources
        .into_iter()
        .flatten()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
