use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dto::{TestPlan, TestResult, TestRun, TestSuite};

// ============================================================================
// Metrics
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalMetrics {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub blocked: usize,
    pub not_executed: usize,
    /// Integer percentage, 0 when there are no results.
    pub pass_rate: u8,
    pub alert_triggered: bool,
    pub suites_count: usize,
    pub bugs_count: usize,
    pub bug_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteMetrics {
    pub suite_id: u64,
    pub suite_name: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub blocked: usize,
    pub not_executed: usize,
    pub pass_rate: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improvement,
    Regression,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    pub run_id: u64,
    pub run_name: String,
    /// Start date of the run, falling back to its completion date.
    pub date: Option<String>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: u8,
    /// Relative to the previous (older) point; `None` for the oldest.
    pub trend: Option<Trend>,
}

// ============================================================================
// Snapshot
// ============================================================================

/// Point-in-time view of one test plan. Built fresh by every extraction
/// and handed to the caller; nothing here is retained afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub plan: TestPlan,
    /// Suites with their test cases populated.
    pub suites: Vec<TestSuite>,
    pub suite_metrics: Vec<SuiteMetrics>,
    pub runs: Vec<TestRun>,
    pub latest_run: Option<TestRun>,
    /// Results of `latest_run`.
    pub results: Vec<TestResult>,
    /// Oldest first.
    pub history: Vec<HistoryPoint>,
    pub metrics: GlobalMetrics,
    pub extracted_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the snapshot as pretty-printed JSON.
    pub fn write_json(&self, path: &std::path::Path) -> std::io::Result<()> {
        let json = self.to_pretty_json().map_err(std::io::Error::from)?;
        std::fs::write(path, json)
    }
}
