use std::fs;

use assert_matches::assert_matches;

use kira_geo_fetch::config::ConfigLoader;
use kira_geo_fetch::domain::GeoSeriesAccession;
use kira_geo_fetch::error::KiraError;
use kira_geo_fetch::extractor::{GseExtractor, merge_identifiers};

const GPL_EXCERPT: &str = "^PLATFORM = GPL13534
!Platform_title = Illumina HumanMethylation450 BeadChip
!Platform_series_id = GSE42861
!Platform_series_id = GSE49064
!Platform_series_id = GSE50498
!Platform_sample_id = GSM1051525
";

fn ids(values: &[GeoSeriesAccession]) -> Vec<&str> {
    values.iter().map(GeoSeriesAccession::as_str).collect()
}

#[test]
fn gpl_file_yields_series_ids() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("GPL13534.txt");
    fs::write(&path, GPL_EXCERPT).unwrap();

    let found = GseExtractor::default().extract_from_file(&path).unwrap();

    assert_eq!(ids(&found), vec!["GSE42861", "GSE49064", "GSE50498"]);
}

#[test]
fn custom_pattern_limits_pattern_lines_to_first_match() {
    let extractor = GseExtractor::new("!Series_relation");
    let text = "!Series_relation = SuperSeries of: GSE300 GSE301\nGSE5";
    assert_eq!(ids(&extractor.extract_from_text(text)), vec!["GSE300", "GSE5"]);
}

#[test]
fn latin1_bytes_are_tolerated() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("list.txt");
    fs::write(&path, b"caf\xe9 GSE11\n\xff\xfeGSE12\n").unwrap();

    let found = GseExtractor::default().extract_from_file(&path).unwrap();

    assert_eq!(ids(&found), vec!["GSE11", "GSE12"]);
}

#[test]
fn missing_input_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let err = GseExtractor::default()
        .extract_from_file(&temp.path().join("absent.txt"))
        .unwrap_err();
    assert_matches!(err, KiraError::InputRead(_));
}

#[test]
fn config_sources_are_combined() {
    let temp = tempfile::tempdir().unwrap();
    let list = temp.path().join("ids.txt");
    fs::write(&list, "GSE3\nGSE4\n").unwrap();
    let json = format!(
        r#"{{"gse_ids": ["gse1", "not-an-id", "GSE2x"], "gse_text": "GSE2 and GSE1", "gse_file": {}}}"#,
        serde_json::to_string(list.to_str().unwrap()).unwrap()
    );
    let file = ConfigLoader::parse(&json).unwrap();

    let found = GseExtractor::default().extract_from_config(&file).unwrap();

    assert_eq!(ids(&found), vec!["GSE1", "GSE2", "GSE3", "GSE4"]);
}

#[test]
fn config_with_missing_gse_file_is_skipped() {
    let file = ConfigLoader::parse(r#"{"gse_file": "/nonexistent/kira-geo/ids.txt"}"#).unwrap();
    let found = GseExtractor::default().extract_from_config(&file).unwrap();
    assert!(found.is_empty());
}

#[test]
fn merged_sources_are_unique_and_sorted() {
    let extractor = GseExtractor::default();
    let merged = merge_identifiers([
        extractor.extract_from_args(&["GSE9", "GSE10"]),
        extractor.extract_from_text("GSE9, GSE100"),
        Vec::new(),
    ]);
    assert_eq!(ids(&merged), vec!["GSE10", "GSE100", "GSE9"]);
}
