//! Read-only dashboard over the detections table.
//!
//! A small blocking HTTP/1.1 server on a background thread. Every request opens
//! its own read-only SQLite connection, so the dashboard never holds a lock
//! against the capture process.
//!
//! Routes (GET only):
//! - `/`: HTML page with totals and the most recent detections
//! - `/api/detections?limit=N`: recent detections as JSON, newest first
//! - `/api/summary`: `{"total_detections": .., "last_detection_time": ..}`
//! - `/health`: liveness probe

mod html;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::storage::{DetectionSummary, SqliteRecordStore};

const MAX_REQUEST_BYTES: usize = 8192;
/// Upper bound for `?limit=` on `/api/detections`.
pub const MAX_PAGE_SIZE: usize = 1000;

#[derive(Clone, Debug)]
pub struct DashboardConfig {
    pub addr: String,
    pub db_path: String,
    /// Rows shown on the HTML page and the default JSON limit.
    pub page_size: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:5001".to_string(),
            db_path: "data/openparking.db".to_string(),
            page_size: 100,
        }
    }
}

#[derive(Debug)]
pub struct DashboardHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl DashboardHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("dashboard server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct DashboardServer {
    cfg: DashboardConfig,
}

impl DashboardServer {
    pub fn new(cfg: DashboardConfig) -> Self {
        Self { cfg }
    }

    /// Bind the listener and serve on a background thread.
    pub fn spawn(self) -> Result<DashboardHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .with_context(|| format!("invalid dashboard address '{}'", self.cfg.addr))?;
        let listener = TcpListener::bind(configured_addr)
            .with_context(|| format!("bind dashboard to {}", configured_addr))?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_dashboard(listener, &cfg, shutdown_thread) {
                log::error!("dashboard stopped: {}", err);
            }
        });

        Ok(DashboardHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_dashboard(
    listener: TcpListener,
    cfg: &DashboardConfig,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, cfg) {
                    log::warn!("dashboard request failed: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, cfg: &DashboardConfig) -> Result<()> {
    // Accepted sockets inherit non-blocking mode on some platforms.
    stream.set_nonblocking(false)?;
    let request = read_request(&mut stream)?;
    log::debug!("{} {}", request.method, request.raw_path);

    if request.method != "GET" {
        return write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#);
    }
    match request.path.as_str() {
        "/" => {
            let summary = load_summary(cfg, cfg.page_size);
            let page = html::render_index(&summary);
            write_response(&mut stream, 200, "text/html; charset=utf-8", page.as_bytes())
        }
        "/api/detections" => {
            let limit = match request.query_param("limit") {
                Some(raw) => match raw.parse::<usize>() {
                    Ok(limit) => limit.clamp(1, MAX_PAGE_SIZE),
                    Err(_) => {
                        return write_json_response(
                            &mut stream,
                            400,
                            r#"{"error":"invalid_limit"}"#,
                        )
                    }
                },
                None => cfg.page_size.clamp(1, MAX_PAGE_SIZE),
            };
            let summary = load_summary(cfg, limit);
            let payload = serde_json::to_vec(&summary.detections)?;
            write_response(&mut stream, 200, "application/json", &payload)
        }
        "/api/summary" => {
            let summary = load_summary(cfg, 0);
            let payload = serde_json::to_vec(&SummaryBody {
                total_detections: summary.total_detections,
                last_detection_time: summary.last_detection_time.as_deref(),
            })?;
            write_response(&mut stream, 200, "application/json", &payload)
        }
        "/health" => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

#[derive(Serialize)]
struct SummaryBody<'a> {
    total_detections: u64,
    last_detection_time: Option<&'a str>,
}

/// Read totals and the newest `limit` rows. Store failures render as an empty view.
fn load_summary(cfg: &DashboardConfig, limit: usize) -> DetectionSummary {
    let result = SqliteRecordStore::open_read_only(&cfg.db_path).and_then(|store| store.summary(limit));
    match result {
        Ok(summary) => summary,
        Err(err) => {
            log::warn!("dashboard could not read {}: {:#}", cfg.db_path, err);
            DetectionSummary::default()
        }
    }
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let (path, query) = match raw_path.split_once('?') {
        Some((path, query)) => (path, query),
        None => (raw_path, ""),
    };
    let query = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Ok(HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        query,
        raw_path: raw_path.to_string(),
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    query: HashMap<String, String>,
    raw_path: String,
}

impl HttpRequest {
    fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }
}
