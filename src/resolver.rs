use std::sync::OnceLock;

use regex::Regex;

use crate::domain::{DatasetMetadata, GeoSeriesAccession, NOT_AVAILABLE, RemoteFile};
use crate::error::KiraError;
use crate::geo::GeoClient;
use crate::human::format_optional_size;

const RAW_KEYWORDS: [&str; 12] = [
    "raw",
    "idat",
    "cel",
    "fastq",
    "fq",
    "sra",
    "bam",
    "cram",
    "signal",
    "intensity",
    "reads",
    "sequencing",
];

const EXCLUDED_ENTRIES: [&str; 2] = ["Parent Directory", "filelist.txt"];

fn id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<Id>\s*(\d+)\s*</Id>").expect("valid regex"))
}

fn error_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<ERROR>(.*?)</ERROR>").expect("valid regex"))
}

fn item_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<Item\s+Name="([^"]+)"[^>]*>([^<]*)</Item>"#).expect("valid regex")
    })
}

fn sample_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<Sample[\s>/]").expect("valid regex"))
}

fn anchor_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"<a href="([^"]+)">([^<]+)</a>"#).expect("valid regex"))
}

pub fn is_raw_filename(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    RAW_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
        || lower.contains("_raw.")
        || lower.ends_with("_raw.tar")
}

pub fn parse_esearch_uid(xml: &str) -> Result<Option<String>, KiraError> {
    if let Some(found) = id_regex().captures(xml).and_then(|caps| caps.get(1)) {
        return Ok(Some(found.as_str().to_string()));
    }
    if let Some(message) = error_regex().captures(xml).and_then(|caps| caps.get(1)) {
        return Err(KiraError::GeoResolution(format!(
            "esearch error: {}",
            unescape_xml(message.as_str().trim())
        )));
    }
    Ok(None)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesSummary {
    pub title: String,
    pub summary: String,
    pub organism: String,
    pub submission_date: String,
    pub platforms: Vec<String>,
    pub experiment_type: String,
}

impl Default for SeriesSummary {
    fn default() -> Self {
        Self {
            title: NOT_AVAILABLE.to_string(),
            summary: NOT_AVAILABLE.to_string(),
            organism: NOT_AVAILABLE.to_string(),
            submission_date: NOT_AVAILABLE.to_string(),
            platforms: Vec::new(),
            experiment_type: NOT_AVAILABLE.to_string(),
        }
    }
}

pub fn parse_esummary(xml: &str) -> Result<SeriesSummary, KiraError> {
    if !xml.contains("<DocSum") {
        if let Some(message) = error_regex().captures(xml).and_then(|caps| caps.get(1)) {
            return Err(KiraError::GeoResolution(format!(
                "esummary error: {}",
                unescape_xml(message.as_str().trim())
            )));
        }
        return Err(KiraError::GeoResolution(
            "esummary response has no DocSum".to_string(),
        ));
    }

    let mut summary = SeriesSummary::default();
    for caps in item_regex().captures_iter(xml) {
        let (Some(name), Some(value)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let value = unescape_xml(value.as_str().trim());
        let text = if value.is_empty() {
            NOT_AVAILABLE.to_string()
        } else {
            value.clone()
        };
        match name.as_str() {
            "title" => summary.title = text,
            "summary" => summary.summary = text,
            "gdsType" => summary.experiment_type = text,
            "taxon" => summary.organism = text,
            "PDAT" => summary.submission_date = text,
            "GPL" => {
                summary.platforms = value
                    .split(';')
                    .map(str::trim)
                    .filter(|platform| !platform.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            _ => {}
        }
    }
    Ok(summary)
}

pub fn count_samples(xml: &str) -> u32 {
    sample_regex().find_iter(xml).count() as u32
}

pub fn parse_directory_listing(html: &str) -> Vec<String> {
    anchor_regex()
        .captures_iter(html)
        .filter_map(|caps| caps.get(2))
        .map(|name| unescape_xml(name.as_str().trim()))
        .filter(|name| !name.is_empty() && !EXCLUDED_ENTRIES.contains(&name.as_str()))
        .collect()
}

fn unescape_xml(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

pub struct Resolver<'a, G: GeoClient> {
    client: &'a G,
}

impl<'a, G: GeoClient> Resolver<'a, G> {
    pub fn new(client: &'a G) -> Self {
        Self { client }
    }

    /// Never fails: resolution problems are recorded in `DatasetMetadata::error`.
    pub fn resolve(&self, accession: &GeoSeriesAccession) -> DatasetMetadata {
        let mut metadata = DatasetMetadata::empty(accession.clone());
        if let Err(err) = self.resolve_into(accession, &mut metadata) {
            tracing::error!(accession = %accession, error = %err, "failed to fetch metadata");
            metadata.error = Some(err.to_string());
        }
        metadata
    }

    fn resolve_into(
        &self,
        accession: &GeoSeriesAccession,
        metadata: &mut DatasetMetadata,
    ) -> Result<(), KiraError> {
        let search = self.client.esearch(accession)?;
        let Some(uid) = parse_esearch_uid(&search)? else {
            tracing::warn!(accession = %accession, "no GEO record found");
            return Ok(());
        };

        let summary = parse_esummary(&self.client.esummary(&uid)?)?;
        metadata.title = summary.title;
        metadata.summary = summary.summary;
        metadata.organism = summary.organism;
        metadata.submission_date = summary.submission_date;
        metadata.platforms = summary.platforms;
        metadata.experiment_type = summary.experiment_type;

        metadata.sample_count = match self.client.quick_view(accession) {
            Ok(xml) => count_samples(&xml),
            Err(err) => {
                tracing::debug!(accession = %accession, error = %err, "sample count unavailable");
                0
            }
        };

        metadata.raw_files = self.list_raw_files(accession)?;
        Ok(())
    }

    fn list_raw_files(&self, accession: &GeoSeriesAccession) -> Result<Vec<RemoteFile>, KiraError> {
        let dir_url = self.client.supplementary_dir(accession);
        let listing = self.client.directory_listing(&dir_url)?;
        let files = parse_directory_listing(&listing)
            .into_iter()
            .filter(|name| is_raw_filename(name))
            .map(|filename| {
                let url = format!("{dir_url}{filename}");
                let size_bytes = match self.client.probe_size(&url) {
                    Ok(size) => size,
                    Err(err) => {
                        tracing::debug!(file = %filename, error = %err, "size probe failed");
                        None
                    }
                };
                RemoteFile {
                    size_human: format_optional_size(size_bytes),
                    filename,
                    url,
                    size_bytes,
                }
            })
            .collect::<Vec<_>>();
        tracing::info!(accession = %accession, raw_files = files.len(), "resolved supplementary files");
        Ok(files)
    }
}
