//! Minimal HTTP/1.1 server standing in for the GEO catalog and file store.
//!
//! Routes match on path plus an optional query substring. GET honours
//! `Range: bytes=N-` with 206 responses unless ranges are disabled for the
//! route; HEAD answers with `Content-Length` only. Every request is logged.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Route {
    path: String,
    query: Option<String>,
    status: u16,
    body: Vec<u8>,
    ranges: bool,
    head_allowed: bool,
}

impl Route {
    pub fn new(path: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.to_string(),
            query: None,
            status: 200,
            body: body.into(),
            ranges: true,
            head_allowed: true,
        }
    }

    /// Only matches when the raw query string contains `needle`.
    pub fn with_query(mut self, needle: &str) -> Self {
        self.query = Some(needle.to_string());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn without_ranges(mut self) -> Self {
        self.ranges = false;
        self
    }

    pub fn without_head(mut self) -> Self {
        self.head_allowed = false;
        self
    }

    fn matches(&self, path: &str, query: &str) -> bool {
        self.path == path
            && self
                .query
                .as_deref()
                .map(|needle| query.contains(needle))
                .unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedRequest {
    pub method: String,
    pub path: String,
    pub range_start: Option<u64>,
}

pub struct GeoServer {
    base_url: String,
    log: Arc<Mutex<Vec<LoggedRequest>>>,
}

impl GeoServer {
    /// Serves `routes` from a background thread until the process exits.
    pub fn start(routes: Vec<Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let routes = Arc::new(routes);
        let log = Arc::new(Mutex::new(Vec::new()));
        let server_log = Arc::clone(&log);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let routes = Arc::clone(&routes);
                let log = Arc::clone(&server_log);
                thread::spawn(move || handle(stream, &routes, &log));
            }
        });
        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            log,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn requests(&self) -> Vec<LoggedRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<LoggedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.path == path)
            .collect()
    }
}

fn handle(mut stream: TcpStream, routes: &[Route], log: &Mutex<Vec<LoggedRequest>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let Some(head) = read_head(&mut stream) else {
        return;
    };
    let (method, target, range_start) = parse_request(&head);
    let (path, query) = target.split_once('?').unwrap_or((target.as_str(), ""));
    log.lock().unwrap().push(LoggedRequest {
        method: method.clone(),
        path: path.to_string(),
        range_start,
    });

    let Some(route) = routes.iter().find(|route| route.matches(path, query)) else {
        write_response(&mut stream, "404 Not Found", &[], b"not found", true);
        return;
    };
    let total = route.body.len() as u64;

    if method.eq_ignore_ascii_case("HEAD") {
        if !route.head_allowed {
            write_response(&mut stream, "405 Method Not Allowed", &[], b"", false);
            return;
        }
        let length = format!("Content-Length: {total}");
        write_response(&mut stream, &status_line(route.status), &[length], b"", false);
        return;
    }

    match range_start {
        Some(start) if route.ranges && route.status == 200 && start < total => {
            let slice = &route.body[start as usize..];
            let content_range = format!("Content-Range: bytes {start}-{}/{total}", total - 1);
            write_response(&mut stream, "206 Partial Content", &[content_range], slice, true);
        }
        _ => write_response(&mut stream, &status_line(route.status), &[], &route.body, true),
    }
}

fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    while !data.windows(4).any(|window| window == b"\r\n\r\n") {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
    }
    String::from_utf8(data).ok()
}

/// Returns (method, target, start offset of a `Range: bytes=N-` header).
fn parse_request(head: &str) -> (String, String, Option<u64>) {
    let mut lines = head.lines();
    let mut first = lines.next().unwrap_or("").split_whitespace();
    let method = first.next().unwrap_or("").to_string();
    let target = first.next().unwrap_or("/").to_string();
    let mut range_start = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                range_start = value
                    .trim()
                    .strip_prefix("bytes=")
                    .and_then(|spec| spec.split('-').next())
                    .and_then(|start| start.trim().parse().ok());
            }
        }
    }
    (method, target, range_start)
}

fn status_line(status: u16) -> String {
    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    };
    format!("{status} {reason}")
}

fn write_response(
    stream: &mut TcpStream,
    status: &str,
    headers: &[String],
    body: &[u8],
    with_body: bool,
) {
    let mut response = format!("HTTP/1.1 {status}\r\nConnection: close\r\n");
    if with_body {
        response.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    for header in headers {
        response.push_str(header);
        response.push_str("\r\n");
    }
    response.push_str("\r\n");
    let _ = stream.write_all(response.as_bytes());
    if with_body {
        let _ = stream.write_all(body);
    }
    let _ = stream.flush();
}
