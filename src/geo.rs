use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, HeaderMap, HeaderValue, RANGE, USER_AGENT};

use crate::domain::{GEO_SERIES_PREFIX, GeoSeriesAccession};
use crate::error::KiraError;
use crate::transfer::{FileSource, RemoteBody};

pub const DEFAULT_EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
pub const DEFAULT_QUERY_BASE: &str = "https://www.ncbi.nlm.nih.gov/geo/query";
pub const DEFAULT_SERIES_ROOT: &str = "https://ftp.ncbi.nlm.nih.gov/geo/series";

const CATALOG_TIMEOUT: Duration = Duration::from_secs(30);
const TRANSFER_READ_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub trait GeoClient: Send + Sync {
    fn esearch(&self, accession: &GeoSeriesAccession) -> Result<String, KiraError>;
    fn esummary(&self, uid: &str) -> Result<String, KiraError>;
    fn quick_view(&self, accession: &GeoSeriesAccession) -> Result<String, KiraError>;
    fn directory_listing(&self, url: &str) -> Result<String, KiraError>;
    fn probe_size(&self, url: &str) -> Result<Option<u64>, KiraError>;

    fn supplementary_dir(&self, accession: &GeoSeriesAccession) -> String {
        supplementary_dir_url(DEFAULT_SERIES_ROOT, accession)
    }
}

#[derive(Debug, Clone)]
pub struct GeoEndpoints {
    pub eutils_base: String,
    pub query_base: String,
    pub series_root: String,
}

impl Default for GeoEndpoints {
    fn default() -> Self {
        Self {
            eutils_base: DEFAULT_EUTILS_BASE.to_string(),
            query_base: DEFAULT_QUERY_BASE.to_string(),
            series_root: DEFAULT_SERIES_ROOT.to_string(),
        }
    }
}

impl GeoEndpoints {
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            eutils_base: base.to_string(),
            query_base: base.to_string(),
            series_root: format!("{base}/series"),
        }
    }
}

#[derive(Clone)]
pub struct GeoHttpClient {
    client: Client,
    transfer_client: Client,
    endpoints: GeoEndpoints,
    api_key: Option<String>,
}

impl GeoHttpClient {
    pub fn new() -> Result<Self, KiraError> {
        Self::with_endpoints(GeoEndpoints::default())
    }

    pub fn with_endpoints(endpoints: GeoEndpoints) -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-geo/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::GeoHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers.clone())
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(CATALOG_TIMEOUT)
            .build()
            .map_err(|err| KiraError::GeoHttp(err.to_string()))?;
        // Blocking reads are bounded per read, so large bodies are not cut off.
        let transfer_client = Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(TRANSFER_READ_TIMEOUT)
            .build()
            .map_err(|err| KiraError::GeoHttp(err.to_string()))?;
        let api_key = std::env::var("NCBI_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        Ok(Self {
            client,
            transfer_client,
            endpoints,
            api_key,
        })
    }

    pub fn endpoints(&self) -> &GeoEndpoints {
        &self.endpoints
    }

    fn eutils_request(&self, tool: &str, params: &[(&str, &str)]) -> Result<String, KiraError> {
        let url = format!("{}/{tool}", self.endpoints.eutils_base);
        let response = self.send_with_retries(|| {
            let mut request = self.client.get(&url).query(params);
            if let Some(key) = &self.api_key {
                request = request.query(&[("api_key", key.as_str())]);
            }
            request
        })?;
        read_text(response)
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, KiraError>
    where
        F: FnMut() -> RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        tracing::debug!(status, attempt, "retrying GEO catalog request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        tracing::debug!(error = %err, attempt, "retrying GEO catalog request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(KiraError::GeoHttp(err.to_string()));
                }
            }
        }
    }
}

impl GeoClient for GeoHttpClient {
    fn esearch(&self, accession: &GeoSeriesAccession) -> Result<String, KiraError> {
        let term = format!("{}[Accession]", accession.as_str());
        self.eutils_request(
            "esearch.fcgi",
            &[("db", "gds"), ("term", term.as_str()), ("retmode", "xml")],
        )
    }

    fn esummary(&self, uid: &str) -> Result<String, KiraError> {
        self.eutils_request(
            "esummary.fcgi",
            &[("db", "gds"), ("id", uid), ("retmode", "xml")],
        )
    }

    fn quick_view(&self, accession: &GeoSeriesAccession) -> Result<String, KiraError> {
        let url = format!("{}/acc.cgi", self.endpoints.query_base);
        let response = self.send_with_retries(|| {
            self.client.get(&url).query(&[
                ("acc", accession.as_str()),
                ("targ", "self"),
                ("form", "xml"),
                ("view", "quick"),
            ])
        })?;
        read_text(response)
    }

    fn directory_listing(&self, url: &str) -> Result<String, KiraError> {
        let response = self.send_with_retries(|| self.client.get(url))?;
        read_text(response)
    }

    fn probe_size(&self, url: &str) -> Result<Option<u64>, KiraError> {
        let response = self
            .client
            .head(url)
            .send()
            .map_err(|err| KiraError::GeoHttp(err.to_string()))?;
        let response = handle_status(response)?;
        Ok(header_u64(response.headers(), CONTENT_LENGTH.as_str()))
    }

    fn supplementary_dir(&self, accession: &GeoSeriesAccession) -> String {
        supplementary_dir_url(&self.endpoints.series_root, accession)
    }
}

impl FileSource for GeoHttpClient {
    fn open(&self, url: &str, offset: u64) -> Result<RemoteBody, KiraError> {
        let mut request = self.transfer_client.get(url);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }
        let response = request
            .send()
            .map_err(|err| KiraError::GeoHttp(err.to_string()))?;
        let response = handle_status(response)?;
        let partial = response.status() == StatusCode::PARTIAL_CONTENT;
        let content_length = header_u64(response.headers(), CONTENT_LENGTH.as_str());
        let content_range_total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range_total);
        Ok(RemoteBody {
            partial,
            content_length,
            content_range_total,
            reader: Box::new(response),
        })
    }
}

fn handle_status(response: Response) -> Result<Response, KiraError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response
        .text()
        .ok()
        .map(|text| text.trim().chars().take(200).collect::<String>())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| "GEO request failed".to_string());
    Err(KiraError::GeoStatus { status, message })
}

fn read_text(response: Response) -> Result<String, KiraError> {
    handle_status(response)?
        .text()
        .map_err(|err| KiraError::GeoHttp(err.to_string()))
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

pub fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

pub fn geo_series_prefix(accession: &GeoSeriesAccession) -> String {
    let digits = accession.digits();
    let head = if digits.len() < 3 {
        "0"
    } else {
        &digits[..digits.len() - 3]
    };
    format!("{GEO_SERIES_PREFIX}{head}nnn")
}

pub fn supplementary_dir_url(series_root: &str, accession: &GeoSeriesAccession) -> String {
    format!(
        "{}/{}/{}/suppl/",
        series_root.trim_end_matches('/'),
        geo_series_prefix(accession),
        accession.as_str()
    )
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
