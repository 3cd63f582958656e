//! Job execution log entries (`worker_executions`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Error,
}

impl ExecutionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// One dispatched job, recorded whatever its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerExecution {
    pub id: String,
    pub job_type: String,
    pub request_id: String,
    pub status: ExecutionStatus,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub duration_ms: i64,
    /// Resident set size at completion, when the platform exposes it.
    pub memory_rss_kb: Option<i64>,
    pub uptime_secs: f64,
    pub created_at: DateTime<Utc>,
}
