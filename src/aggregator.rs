use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use std::cmp::Ordering;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ExtractorConfig, DEFAULT_SUITE_CONCURRENCY, HISTORY_RUN_LIMIT, RUN_LIST_TOP};
use crate::dto::{
    decode_items, Project, SuiteTestCaseEntry, TestCaseRef, TestPlan, TestResult, TestRun,
    TestSuite, WorkItem,
};
use crate::error::{ExtractError, ExtractionFailure, Stage};
use crate::metrics;
use crate::pagination::{fetch_all, PageLimits};
use crate::snapshot::{HistoryPoint, Snapshot};
use crate::transport::{list_items, Transport};

/// How the "latest run" is chosen from the run listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunOrdering {
    /// Trust the service's listing order (most recent first).
    #[default]
    AsReturned,
    /// Stable sort by start date, newest first; undated runs go last.
    StartedDateDescending,
}

#[derive(Debug, Clone)]
pub struct AggregatorOptions {
    /// Upper bound on in-flight per-suite test-case fetches.
    pub suite_concurrency: usize,
    pub history_limit: usize,
    pub run_list_top: usize,
    pub run_ordering: RunOrdering,
    pub page_limits: PageLimits,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            suite_concurrency: DEFAULT_SUITE_CONCURRENCY,
            history_limit: HISTORY_RUN_LIMIT,
            run_list_top: RUN_LIST_TOP,
            run_ordering: RunOrdering::AsReturned,
            page_limits: PageLimits::default(),
        }
    }
}

impl AggregatorOptions {
    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self {
            suite_concurrency: config.suite_concurrency.max(1),
            history_limit: config.history_limit,
            run_ordering: if config.sort_runs_by_date {
                RunOrdering::StartedDateDescending
            } else {
                RunOrdering::AsReturned
            },
            ..Self::default()
        }
    }
}

/// What to extract.
#[derive(Debug, Clone, Default)]
pub struct ExtractionRequest {
    pub project: String,
    pub plan_id: Option<u64>,
}

impl ExtractionRequest {
    pub fn new(project: impl Into<String>, plan_id: u64) -> Self {
        Self {
            project: project.into(),
            plan_id: Some(plan_id),
        }
    }

    fn validate(&self) -> Result<(&str, u64), ExtractError> {
        let project = self.project.trim();
        if project.is_empty() {
            return Err(ExtractError::Validation("project is required".to_string()));
        }
        match self.plan_id {
            Some(id) if id > 0 => Ok((project, id)),
            Some(_) => Err(ExtractError::Validation("plan id must be positive".to_string())),
            None => Err(ExtractError::Validation("plan id is required".to_string())),
        }
    }
}

/// Orchestrates the fetches behind one snapshot.
///
/// Holds no per-extraction state, so one aggregator can serve any number of
/// concurrent `extract` calls.
pub struct PlanAggregator<T: Transport> {
    transport: T,
    options: AggregatorOptions,
}

impl<T: Transport> PlanAggregator<T> {
    pub fn new(transport: T, options: AggregatorOptions) -> Self {
        Self { transport, options }
    }

    pub fn options(&self) -> &AggregatorOptions {
        &self.options
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, ExtractError> {
        let body = self.transport.get("_apis/projects", &[]).await?;
        decode_items(list_items(body)?)
    }

    pub async fn list_plans(&self, project: &str) -> Result<Vec<TestPlan>, ExtractError> {
        let path = format!("{}/_apis/testplan/plans", encode_segment(project));
        let body = self.transport.get(&path, &[]).await?;
        decode_items(list_items(body)?)
    }

    pub async fn work_item(&self, id: u64) -> Result<WorkItem, ExtractError> {
        let path = format!("_apis/wit/workitems/{}", id);
        let body = self.transport.get(&path, &[]).await?;
        Ok(serde_json::from_value(body)?)
    }

    /// Run a full extraction. Returns a complete snapshot or the stage that
    /// failed; no partial snapshot is ever produced.
    pub async fn extract(
        &self,
        request: &ExtractionRequest,
        cancel: &CancellationToken,
    ) -> Result<Snapshot, ExtractionFailure> {
        let mut stage = Stage::Validate;
        let outcome = self.run_stages(request, cancel, &mut stage).await;
        match outcome {
            Ok(snapshot) => Ok(snapshot),
            Err(error) => {
                error!("Extraction failed at stage {}: {}", stage, error);
                Err(ExtractionFailure { stage, error })
            }
        }
    }

    async fn run_stages(
        &self,
        request: &ExtractionRequest,
        cancel: &CancellationToken,
        stage: &mut Stage,
    ) -> Result<Snapshot, ExtractError> {
        let (project, plan_id) = request.validate()?;
        info!("Extracting plan {} from project {}", plan_id, project);

        enter(stage, Stage::PlanResolved, cancel)?;
        let plan = self
            .list_plans(project)
            .await?
            .into_iter()
            .find(|p| p.id == plan_id)
            .ok_or_else(|| {
                ExtractError::NotFound(format!(
                    "test plan {} in project {}",
                    plan_id, project
                ))
            })?;
        info!("Resolved plan {} ({})", plan.id, plan.name);

        enter(stage, Stage::SuitesFetched, cancel)?;
        let suites = self.fetch_suites(project, plan_id).await?;
        info!("Plan {} has {} suites", plan_id, suites.len());

        enter(stage, Stage::CasesExpanded, cancel)?;
        let suites = self.expand_suites(project, plan_id, suites, cancel).await?;

        enter(stage, Stage::RunsFetched, cancel)?;
        let runs = self.fetch_runs(project, plan_id).await?;
        let latest_run = runs.first().cloned();
        info!(
            "Fetched {} runs, latest: {}",
            runs.len(),
            latest_run
                .as_ref()
                .map(|r| r.id.to_string())
                .unwrap_or_else(|| "none".to_string())
        );

        enter(stage, Stage::LatestResultsFetched, cancel)?;
        let results = match &latest_run {
            Some(run) => self.fetch_results(project, run.id, cancel).await?,
            None => Vec::new(),
        };
        info!("Latest run has {} results", results.len());

        enter(stage, Stage::HistoryBuilt, cancel)?;
        let history = self.build_history(project, &runs, cancel).await?;

        enter(stage, Stage::MetricsComputed, cancel)?;
        let suite_metrics = metrics::all_suite_metrics(&suites, &results);
        let global = metrics::global_metrics(&results, suites.len());
        info!(
            "Plan {}: {} results, pass rate {}%, alert={}, bugs={}",
            plan_id, global.total, global.pass_rate, global.alert_triggered, global.bugs_count
        );

        enter(stage, Stage::SnapshotReady, cancel)?;
        Ok(Snapshot {
            plan,
            suites,
            suite_metrics,
            runs,
            latest_run,
            results,
            history,
            metrics: global,
            extracted_at: Utc::now(),
        })
    }

    async fn fetch_suites(&self, project: &str, plan_id: u64) -> Result<Vec<TestSuite>, ExtractError> {
        let path = format!(
            "{}/_apis/testplan/Plans/{}/suites",
            encode_segment(project),
            plan_id
        );
        let body = self.transport.get(&path, &[]).await?;
        decode_items(list_items(body)?)
    }

    async fn fetch_test_cases(
        &self,
        project: &str,
        plan_id: u64,
        suite_id: u64,
    ) -> Result<Vec<TestCaseRef>, ExtractError> {
        let path = format!(
            "{}/_apis/testplan/Plans/{}/Suites/{}/TestCase",
            encode_segment(project),
            plan_id,
            suite_id
        );
        let body = self.transport.get(&path, &[]).await?;
        let entries: Vec<SuiteTestCaseEntry> = decode_items(list_items(body)?)?;
        Ok(entries.into_iter().map(TestCaseRef::from).collect())
    }

    /// Fetch every suite's test cases with at most `suite_concurrency` requests
    /// in flight. Output keeps the input suite order.
    async fn expand_suites(
        &self,
        project: &str,
        plan_id: u64,
        suites: Vec<TestSuite>,
        cancel: &CancellationToken,
    ) -> Result<Vec<TestSuite>, ExtractError> {
        let concurrency = self.options.suite_concurrency.max(1);

        stream::iter(suites.into_iter().map(|suite| async move {
            if cancel.is_cancelled() {
                return Err(ExtractError::Cancelled);
            }
            let test_cases = self.fetch_test_cases(project, plan_id, suite.id).await?;
            debug!("Suite {} has {} test cases", suite.id, test_cases.len());
            Ok::<_, ExtractError>(TestSuite { test_cases, ..suite })
        }))
        .buffered(concurrency)
        .try_collect()
        .await
    }

    async fn fetch_runs(&self, project: &str, plan_id: u64) -> Result<Vec<TestRun>, ExtractError> {
        let path = format!("{}/_apis/test/runs", encode_segment(project));
        let query = vec![
            ("planId".to_string(), plan_id.to_string()),
            ("$top".to_string(), self.options.run_list_top.to_string()),
        ];
        let body = self.transport.get(&path, &query).await?;
        let mut runs: Vec<TestRun> = decode_items(list_items(body)?)?;

        if self.options.run_ordering == RunOrdering::StartedDateDescending {
            sort_runs_newest_first(&mut runs);
        }
        Ok(runs)
    }

    async fn fetch_results(
        &self,
        project: &str,
        run_id: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<TestResult>, ExtractError> {
        let path = format!("{}/_apis/test/Runs/{}/results", encode_segment(project), run_id);
        let items: Vec<Value> =
            fetch_all(&self.transport, &path, &[], self.options.page_limits, cancel).await?;
        decode_items(items)
    }

    /// Summarize up to `history_limit` recent runs, oldest first. A run whose
    /// results cannot be fetched is left out; cancellation still aborts.
    async fn build_history(
        &self,
        project: &str,
        runs: &[TestRun],
        cancel: &CancellationToken,
    ) -> Result<Vec<HistoryPoint>, ExtractError> {
        let mut points = Vec::new();

        for run in runs.iter().take(self.options.history_limit) {
            if cancel.is_cancelled() {
                return Err(ExtractError::Cancelled);
            }

            match self.fetch_results(project, run.id, cancel).await {
                Ok(results) => points.push(metrics::history_point(run, &results)),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!("Skipping run {} in history: {}", run.id, e);
                }
            }
        }

        points.reverse();
        metrics::assign_trends(&mut points);
        info!("History built with {} points", points.len());
        Ok(points)
    }
}

fn enter(current: &mut Stage, next: Stage, cancel: &CancellationToken) -> Result<(), ExtractError> {
    *current = next;
    if cancel.is_cancelled() {
        return Err(ExtractError::Cancelled);
    }
    debug!("Entering stage {}", next);
    Ok(())
}

/// Newest first by start date. Stable, so ties and undated runs keep the
/// listing order; undated runs sort after dated ones.
pub fn sort_runs_newest_first(runs: &mut [TestRun]) {
    runs.sort_by(|a, b| match (a.started_at(), b.started_at()) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// Percent-encode a project name for use as a single path segment.
pub fn encode_segment(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(id: u64, started: Option<&str>) -> TestRun {
        TestRun {
            id,
            started_date: started.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_encode_segment() {
        assert_eq!(encode_segment("Fabrikam"), "Fabrikam");
        assert_eq!(encode_segment("My Project"), "My%20Project");
        assert_eq!(encode_segment("a/b#c"), "a%2Fb%23c");
        assert_eq!(encode_segment("Q&A-2.0_x~"), "Q%26A-2.0_x~");
        assert_eq!(encode_segment("Équipe"), "%C3%89quipe");
    }

    #[test]
    fn test_sort_runs_newest_first() {
        let mut runs = vec![
            run(1, Some("2024-01-01T00:00:00Z")),
            run(2, None),
            run(3, Some("2024-03-01T00:00:00Z")),
            run(4, Some("2024-02-01T00:00:00Z")),
            run(5, None),
        ];
        sort_runs_newest_first(&mut runs);
        let ids: Vec<u64> = runs.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 4, 1, 2, 5]);
    }

    #[test]
    fn test_request_validation() {
        assert!(matches!(
            ExtractionRequest::default().validate(),
            Err(ExtractError::Validation(_))
        ));
        let missing_plan = ExtractionRequest {
            project: "P".to_string(),
            plan_id: None,
        };
        assert!(matches!(
            missing_plan.validate(),
            Err(ExtractError::Validation(_))
        ));
        assert_eq!(
            ExtractionRequest::new(" P ", 4).validate().unwrap(),
            ("P", 4)
        );
    }
}
