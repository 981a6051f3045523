use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Transport error{}: {message}", fmt_status(.status))]
    Transport {
        status: Option<u16>,
        message: String,
    },

    #[error("Authorization failed ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Unexpected payload: {0}")]
    Decode(String),

    #[error("Extraction cancelled")]
    Cancelled,
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" ({})", code),
        None => String::new(),
    }
}

impl ExtractError {
    /// Classify a non-2xx response by status code.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => ExtractError::Auth { status, message },
            404 => ExtractError::NotFound(message),
            _ => ExtractError::Transport {
                status: Some(status),
                message,
            },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExtractError::Cancelled)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ExtractError::Transport { .. } | ExtractError::Decode(_) => StatusCode::BAD_GATEWAY,
            ExtractError::Auth { status: 403, .. } => StatusCode::FORBIDDEN,
            ExtractError::Auth { .. } => StatusCode::UNAUTHORIZED,
            ExtractError::NotFound(_) => StatusCode::NOT_FOUND,
            ExtractError::Validation(_) => StatusCode::BAD_REQUEST,
            ExtractError::Cancelled => StatusCode::REQUEST_TIMEOUT,
        }
    }
}

impl From<reqwest::Error> for ExtractError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return ExtractError::Decode(e.to_string());
        }
        ExtractError::Transport {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for ExtractError {
    fn from(e: serde_json::Error) -> Self {
        ExtractError::Decode(e.to_string())
    }
}

impl IntoResponse for ExtractError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (self.status_code(), axum::Json(body)).into_response()
    }
}

/// Extraction pipeline stages, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validate,
    PlanResolved,
    SuitesFetched,
    CasesExpanded,
    RunsFetched,
    LatestResultsFetched,
    HistoryBuilt,
    MetricsComputed,
    SnapshotReady,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validate => "validate",
            Stage::PlanResolved => "plan_resolved",
            Stage::SuitesFetched => "suites_fetched",
            Stage::CasesExpanded => "cases_expanded",
            Stage::RunsFetched => "runs_fetched",
            Stage::LatestResultsFetched => "latest_results_fetched",
            Stage::HistoryBuilt => "history_built",
            Stage::MetricsComputed => "metrics_computed",
            Stage::SnapshotReady => "snapshot_ready",
        };
        f.write_str(name)
    }
}

/// Terminal failure of an extraction. `stage` is the stage that was being
/// entered when `error` occurred.
#[derive(Debug, thiserror::Error)]
#[error("Extraction failed at stage {stage}: {error}")]
pub struct ExtractionFailure {
    pub stage: Stage,
    #[source]
    pub error: ExtractError,
}

impl IntoResponse for ExtractionFailure {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.error.to_string(),
            "stage": self.stage,
        });

        (self.error.status_code(), axum::Json(body)).into_response()
    }
}
