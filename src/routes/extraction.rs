use axum::extract::{Path, State};
use axum::http::header::{HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregator::ExtractionRequest;
use crate::dto::{Project, TestPlan};
use crate::error::ExtractError;
use crate::state::{InFlightGuard, InFlightSummary, SharedState};

pub const EXTRACTION_ID_HEADER: &str = "x-extraction-id";

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartExtraction {
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub plan_id: Option<u64>,
    /// Lets the caller cancel the extraction while it is running.
    #[serde(default)]
    pub extraction_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct InFlightResponse {
    pub extractions: Vec<InFlightSummary>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Run one extraction and answer with the snapshot.
pub async fn run_extraction(
    State(state): State<SharedState>,
    Json(body): Json<StartExtraction>,
) -> Response {
    let id = body
        .extraction_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    // Echoed back as a response header.
    let header_id = match HeaderValue::from_str(&id) {
        Ok(value) => value,
        Err(_) => {
            return ExtractError::Validation(format!(
                "extraction id {:?} is not a valid header value",
                id
            ))
            .into_response()
        }
    };

    let cancel = match state.register(&id, &body.project, body.plan_id).await {
        Ok(token) => token,
        Err(e) => return e.into_response(),
    };
    let _guard = InFlightGuard::new(state.clone(), id.clone());

    info!(
        "Extraction {} started: project={}, plan={:?}",
        id, body.project, body.plan_id
    );

    let request = ExtractionRequest {
        project: body.project,
        plan_id: body.plan_id,
    };

    match state.aggregator.extract(&request, &cancel).await {
        Ok(snapshot) => {
            info!("Extraction {} completed", id);
            (
                [(HeaderName::from_static(EXTRACTION_ID_HEADER), header_id)],
                Json(snapshot),
            )
                .into_response()
        }
        Err(failure) => failure.into_response(),
    }
}

pub async fn list_extractions(State(state): State<SharedState>) -> Json<InFlightResponse> {
    Json(InFlightResponse {
        extractions: state.in_flight().await,
    })
}

pub async fn cancel_extraction(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ExtractError> {
    if !state.cancel(&id).await {
        return Err(ExtractError::NotFound(format!("extraction {}", id)));
    }

    info!("Extraction {} cancellation requested", id);
    Ok(Json(MessageResponse {
        ok: true,
        message: format!("Extraction {} cancelled", id),
    }))
}

pub async fn list_projects(
    State(state): State<SharedState>,
) -> Result<Json<Vec<Project>>, ExtractError> {
    Ok(Json(state.aggregator.list_projects().await?))
}

pub async fn list_plans(
    State(state): State<SharedState>,
    Path(project): Path<String>,
) -> Result<Json<Vec<TestPlan>>, ExtractError> {
    Ok(Json(state.aggregator.list_plans(&project).await?))
}
