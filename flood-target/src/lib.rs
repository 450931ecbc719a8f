//! Instrumented HTTP target: answers a handful of cheap endpoints and keeps track of who
//! asked what, so a load run can be checked from the receiving end.
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use axum::body::{Body, Bytes, HttpBody};
use axum::extract::{ConnectInfo, DefaultBodyLimit, Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::SecondsFormat;
use flood_http::{
    LogEntry, LogsQuery, LogsResponse, NotFoundResponse, PreviousStats, RankedEndpoint, RankedIp,
    ResetResponse, ServerStatsResponse, StatusResponse, TestResponse,
};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_LOGS: usize = 5000;
const BODY_LIMIT: usize = 10 * 1024 * 1024;
const TOP_N: usize = 10;
const DEFAULT_LOG_LIMIT: usize = 100;

struct Counters {
    started_at: Instant,
    total_requests: u64,
    unique_ips: HashSet<String>,
    requests_by_ip: HashMap<String, u64>,
    requests_by_endpoint: HashMap<String, u64>,
    bytes_received: u64,
    bytes_sent: u64,
    logs: VecDeque<LogEntry>,
}

impl Counters {
    fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_requests: 0,
            unique_ips: HashSet::new(),
            requests_by_ip: HashMap::new(),
            requests_by_endpoint: HashMap::new(),
            bytes_received: 0,
            bytes_sent: 0,
            logs: VecDeque::new(),
        }
    }
}

/// Request bookkeeping shared by every connection.
#[derive(Clone)]
pub struct SharedStats {
    inner: Arc<Mutex<Counters>>,
    max_logs: usize,
}

impl SharedStats {
    #[must_use]
    pub fn new(max_logs: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Counters::new())),
            max_logs,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn record_request(&self, ip: &str, path: &str, size: u64) {
        let mut c = self.lock();
        c.total_requests += 1;
        c.bytes_received += size;
        if !c.unique_ips.contains(ip) {
            c.unique_ips.insert(ip.to_string());
        }
        *c.requests_by_ip.entry(ip.to_string()).or_insert(0) += 1;
        *c.requests_by_endpoint.entry(path.to_string()).or_insert(0) += 1;
    }

    fn record_response(&self, entry: LogEntry) {
        let mut c = self.lock();
        c.bytes_sent += entry.response_size;
        c.logs.push_back(entry);
        while c.logs.len() > self.max_logs {
            c.logs.pop_front();
        }
    }

    #[must_use]
    pub fn total_requests(&self) -> u64 {
        self.lock().total_requests
    }

    #[must_use]
    pub fn summary(&self) -> ServerStatsResponse {
        let c = self.lock();
        let uptime = c.started_at.elapsed().as_secs_f64();
        let rps = if uptime > 0.0 {
            c.total_requests as f64 / uptime
        } else {
            0.0
        };
        let transfer_mb = (c.bytes_received + c.bytes_sent) as f64 / 1024.0 / 1024.0;
        ServerStatsResponse {
            uptime: format!("{uptime:.2}s"),
            total_requests: c.total_requests,
            unique_ips: c.unique_ips.len(),
            requests_per_second: format!("{rps:.2}"),
            total_bytes_received: c.bytes_received,
            total_bytes_sent: c.bytes_sent,
            total_data_transfer: format!("{transfer_mb:.2} MB"),
            top_ips: top(&c.requests_by_ip)
                .into_iter()
                .map(|(ip, requests)| RankedIp { ip, requests })
                .collect(),
            top_endpoints: top(&c.requests_by_endpoint)
                .into_iter()
                .map(|(endpoint, requests)| RankedEndpoint { endpoint, requests })
                .collect(),
            recent_requests_count: c.logs.len(),
        }
    }

    /// Newest entries first.
    #[must_use]
    pub fn logs(&self, query: &LogsQuery) -> LogsResponse {
        let limit = query.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LOG_LIMIT);
        let offset = query.offset.unwrap_or(0);
        let c = self.lock();
        let filtered: Vec<&LogEntry> = c
            .logs
            .iter()
            .rev()
            .filter(|e| query.ip.as_ref().map_or(true, |ip| &e.ip == ip))
            .filter(|e| query.method.as_ref().map_or(true, |m| &e.method == m))
            .collect();
        LogsResponse {
            total: filtered.len(),
            limit,
            offset,
            logs: filtered
                .into_iter()
                .skip(offset)
                .take(limit)
                .cloned()
                .collect(),
        }
    }

    /// Clears every counter and the log, returning the previous totals.
    pub fn reset(&self) -> PreviousStats {
        let mut c = self.lock();
        let previous = PreviousStats {
            total_requests: c.total_requests,
            unique_ips: c.unique_ips.len(),
        };
        *c = Counters::new();
        previous
    }
}

fn top(counts: &HashMap<String, u64>) -> Vec<(String, u64)> {
    let mut ranked: Vec<(String, u64)> = counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(TOP_N);
    ranked
}

pub fn router(stats: SharedStats) -> Router {
    Router::new()
        .route("/", get(get_index))
        .route("/test", get(get_test).post(post_test))
        .route("/api/stats", get(get_stats))
        .route("/api/logs", get(get_logs))
        .route("/api/stats/reset", post(post_reset))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(stats.clone(), track))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(stats)
}

async fn get_index() -> Json<StatusResponse> {
    Json(StatusResponse::running())
}

async fn get_test() -> Json<TestResponse> {
    Json(TestResponse { ok: true, data: None })
}

async fn post_test(body: Bytes) -> Json<TestResponse> {
    // Anything that isn't json is echoed back as an empty object.
    let data = serde_json::from_slice(&body)
        .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()));
    Json(TestResponse {
        ok: true,
        data: Some(data),
    })
}

async fn get_stats(State(stats): State<SharedStats>) -> Json<ServerStatsResponse> {
    Json(stats.summary())
}

async fn get_logs(
    State(stats): State<SharedStats>,
    Query(query): Query<LogsQuery>,
) -> Json<LogsResponse> {
    Json(stats.logs(&query))
}

async fn post_reset(State(stats): State<SharedStats>) -> Json<ResetResponse> {
    let previous_stats = stats.reset();
    Json(ResetResponse {
        message: "Stats reset successfully".to_string(),
        previous_stats,
    })
}

async fn not_found(req: Request) -> (StatusCode, Json<NotFoundResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(NotFoundResponse {
            error: "Not Found".to_string(),
            path: req.uri().path().to_string(),
        }),
    )
}

/// First `x-forwarded-for` hop, then `x-real-ip`, then the socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    forwarded
        .or(real)
        .map(str::to_string)
        .or_else(|| peer.map(|p| p.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Approximate size of the request on the wire: request line, headers and body.
fn request_size(req: &Request) -> u64 {
    let line = req.method().as_str().len() + 1 + req.uri().to_string().len() + " HTTP/1.1\r\n".len();
    let headers: usize = req
        .headers()
        .iter()
        .map(|(k, v)| k.as_str().len() + 2 + v.as_bytes().len() + 2)
        .sum();
    let body = req.body().size_hint().exact().unwrap_or(0) as usize;
    (line + headers + 2 + body) as u64
}

async fn track(State(stats): State<SharedStats>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(req.headers(), peer);
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let user_agent = req
        .headers()
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let size = request_size(&req);
    stats.record_request(&ip, &path, size);

    let response = next.run(req).await;

    let response_size = response_size(&response);
    let entry = LogEntry {
        timestamp: chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        ip,
        method,
        path,
        user_agent,
        request_size: size,
        response_size,
        response_time: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        status_code: response.status().as_u16(),
    };
    tracing::info!(
        "[{}] {} - {} {} - {} - {}ms",
        entry.timestamp,
        entry.ip,
        entry.method,
        entry.path,
        entry.status_code,
        entry.response_time
    );
    stats.record_response(entry);
    response
}

fn response_size(response: &Response<Body>) -> u64 {
    response.body().size_hint().exact().unwrap_or(0)
}
