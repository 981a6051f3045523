use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::aggregator::{AggregatorOptions, PlanAggregator};
use crate::config::ExtractorConfig;
use crate::error::ExtractError;
use crate::transport::Transport;

pub type SharedState = Arc<AppState>;
pub type SharedTransport = Arc<dyn Transport>;

/// Server state. Holds bookkeeping for extractions that are still running;
/// finished snapshots are returned to the caller and never kept.
pub struct AppState {
    pub config: ExtractorConfig,
    pub aggregator: PlanAggregator<SharedTransport>,
    in_flight: RwLock<HashMap<String, InFlightExtraction>>,
    shutdown: CancellationToken,
}

pub struct InFlightExtraction {
    pub project: String,
    pub plan_id: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, Serialize)]
pub struct InFlightSummary {
    pub id: String,
    pub project: String,
    pub plan_id: Option<u64>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: ExtractorConfig, transport: SharedTransport) -> Self {
        let options = AggregatorOptions::from_config(&config);
        Self {
            config,
            aggregator: PlanAggregator::new(transport, options),
            in_flight: RwLock::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Track a new extraction. The returned token is a child of the
    /// server's shutdown token.
    pub async fn register(
        &self,
        id: &str,
        project: &str,
        plan_id: Option<u64>,
    ) -> Result<CancellationToken, ExtractError> {
        let mut in_flight = self.in_flight.write().await;
        if in_flight.contains_key(id) {
            return Err(ExtractError::Validation(format!(
                "extraction {} is already running",
                id
            )));
        }

        let cancel = self.shutdown.child_token();
        in_flight.insert(
            id.to_string(),
            InFlightExtraction {
                project: project.to_string(),
                plan_id,
                started_at: Utc::now(),
                cancel: cancel.clone(),
            },
        );
        Ok(cancel)
    }

    pub async fn finish(&self, id: &str) {
        self.in_flight.write().await.remove(id);
    }

    /// Cancel one in-flight extraction. Returns false if the id is unknown.
    pub async fn cancel(&self, id: &str) -> bool {
        match self.in_flight.read().await.get(id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel everything, used on shutdown.
    pub fn cancel_all(&self) {
        self.shutdown.cancel();
    }

    pub async fn in_flight(&self) -> Vec<InFlightSummary> {
        let mut list: Vec<InFlightSummary> = self
            .in_flight
            .read()
            .await
            .iter()
            .map(|(id, entry)| InFlightSummary {
                id: id.clone(),
                project: entry.project.clone(),
                plan_id: entry.plan_id,
                started_at: entry.started_at,
            })
            .collect();
        list.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        list
    }

    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.read().await.len()
    }
}

/// Removes an extraction from the in-flight table when dropped, including
/// when the request future is dropped because the client went away.
///
/// Removal is synchronous unless the table is locked at that moment, in
/// which case it is finished on the runtime.
pub struct InFlightGuard {
    state: SharedState,
    id: String,
}

impl InFlightGuard {
    pub fn new(state: SharedState, id: String) -> Self {
        Self { state, id }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let id = std::mem::take(&mut self.id);
        if let Ok(mut in_flight) = self.state.in_flight.try_write() {
            in_flight.remove(&id);
            return;
        }

        let state = self.state.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                state.finish(&id).await;
            });
        }
    }
}
