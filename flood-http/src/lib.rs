//! HTTP plumbing shared by the load generator and the target server.
pub mod drain;

use bytes::Bytes;
use http_body_util::Full;

#[inline]
pub fn empty_body() -> Full<Bytes> {
    Full::new(Bytes::new())
}

#[inline]
pub fn byte_body<B: Into<Bytes>>(bytes: B) -> Full<Bytes> {
    Full::new(bytes.into())
}

/// `GET /`
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    #[must_use]
    pub fn running() -> Self {
        Self {
            status: "running".to_string(),
        }
    }
}

/// `GET /test` and `POST /test`, the latter echoes the posted json back as `data`.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct TestResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RankedIp {
    pub ip: String,
    pub requests: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RankedEndpoint {
    pub endpoint: String,
    pub requests: u64,
}

/// `GET /api/stats`
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatsResponse {
    pub uptime: String,
    pub total_requests: u64,
    #[serde(rename = "uniqueIPs")]
    pub unique_ips: usize,
    pub requests_per_second: String,
    pub total_bytes_received: u64,
    pub total_bytes_sent: u64,
    pub total_data_transfer: String,
    #[serde(rename = "topIPs")]
    pub top_ips: Vec<RankedIp>,
    pub top_endpoints: Vec<RankedEndpoint>,
    pub recent_requests_count: usize,
}

/// One request as seen by the target server.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: String,
    pub ip: String,
    pub method: String,
    pub path: String,
    pub user_agent: String,
    pub request_size: u64,
    pub response_size: u64,
    pub response_time: u64,
    pub status_code: u16,
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub ip: Option<String>,
    pub method: Option<String>,
}

/// `GET /api/logs`
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct LogsResponse {
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub logs: Vec<LogEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviousStats {
    pub total_requests: u64,
    #[serde(rename = "uniqueIPs")]
    pub unique_ips: usize,
}

/// `POST /api/stats/reset`
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    pub message: String,
    pub previous_stats: PreviousStats,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct NotFoundResponse {
    pub error: String,
    pub path: String,
}
