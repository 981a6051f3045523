//! Quality metrics over a fetched result set.
//!
//! Everything here is a pure function of its inputs so every renderer that
//! consumes a snapshot sees the same numbers.

use std::collections::{BTreeSet, HashSet};

use crate::config::ALERT_PASS_RATE_THRESHOLD;
use crate::dto::{Outcome, TestResult, TestRun, TestSuite};
use crate::snapshot::{GlobalMetrics, HistoryPoint, SuiteMetrics, Trend};

/// `round(passed / total * 100)` with halves rounded up, or 0 when `total`
/// is 0. Integer arithmetic keeps the result exact.
pub fn pass_rate(passed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let passed = passed.min(total) as u128;
    let total = total as u128;
    ((passed * 200 + total) / (total * 2)) as u8
}

pub fn is_alert(pass_rate: u8) -> bool {
    pass_rate < ALERT_PASS_RATE_THRESHOLD
}

#[derive(Debug, Default, Clone, Copy)]
struct OutcomeCounts {
    total: usize,
    passed: usize,
    failed: usize,
    blocked: usize,
    not_executed: usize,
    not_applicable: usize,
    inconclusive: usize,
}

impl OutcomeCounts {
    fn tally<'a>(results: impl IntoIterator<Item = &'a TestResult>) -> Self {
        let mut counts = OutcomeCounts::default();
        for result in results {
            counts.total += 1;
            match result.outcome {
                Outcome::Passed => counts.passed += 1,
                Outcome::Failed => counts.failed += 1,
                Outcome::Blocked => counts.blocked += 1,
                Outcome::NotExecuted => counts.not_executed += 1,
                Outcome::NotApplicable => counts.not_applicable += 1,
                Outcome::Inconclusive => counts.inconclusive += 1,
            }
        }
        counts
    }
}

/// Plan-wide metrics for the latest run's results.
///
/// Not-executed here covers NotExecuted, NotApplicable and Inconclusive.
pub fn global_metrics(results: &[TestResult], suites_count: usize) -> GlobalMetrics {
    let counts = OutcomeCounts::tally(results);
    let rate = pass_rate(counts.passed, counts.total);

    // First-seen order keeps bug_ids stable across identical inputs.
    let mut seen = HashSet::new();
    let bug_ids: Vec<String> = results
        .iter()
        .flat_map(|r| r.associated_bugs.iter())
        .filter(|bug| !bug.id.is_empty())
        .filter(|bug| seen.insert(bug.id.clone()))
        .map(|bug| bug.id.clone())
        .collect();

    GlobalMetrics {
        total: counts.total,
        passed: counts.passed,
        failed: counts.failed,
        blocked: counts.blocked,
        not_executed: counts.not_executed + counts.not_applicable + counts.inconclusive,
        pass_rate: rate,
        alert_triggered: is_alert(rate),
        suites_count,
        bugs_count: bug_ids.len(),
        bug_ids,
    }
}

/// Metrics for the results whose test case belongs to `suite`.
///
/// Not-executed here covers NotExecuted and NotApplicable only; Inconclusive
/// results count toward the total but toward no outcome bucket.
pub fn suite_metrics(suite: &TestSuite, results: &[TestResult]) -> SuiteMetrics {
    let case_ids: BTreeSet<&str> = suite
        .test_cases
        .iter()
        .map(|c| c.id.as_str())
        .filter(|id| !id.is_empty())
        .collect();

    let counts = OutcomeCounts::tally(
        results
            .iter()
            .filter(|r| case_ids.contains(r.test_case_id())),
    );

    SuiteMetrics {
        suite_id: suite.id,
        suite_name: suite.name.clone(),
        total: counts.total,
        passed: counts.passed,
        failed: counts.failed,
        blocked: counts.blocked,
        not_executed: counts.not_executed + counts.not_applicable,
        pass_rate: pass_rate(counts.passed, counts.total),
    }
}

pub fn all_suite_metrics(suites: &[TestSuite], results: &[TestResult]) -> Vec<SuiteMetrics> {
    suites.iter().map(|s| suite_metrics(s, results)).collect()
}

/// Summary of one historical run. `trend` is left unset; see [`assign_trends`].
pub fn history_point(run: &TestRun, results: &[TestResult]) -> HistoryPoint {
    let counts = OutcomeCounts::tally(results);
    HistoryPoint {
        run_id: run.id,
        run_name: run.name.clone(),
        date: run
            .started_date
            .clone()
            .or_else(|| run.completed_date.clone()),
        total: counts.total,
        passed: counts.passed,
        failed: counts.failed,
        pass_rate: pass_rate(counts.passed, counts.total),
        trend: None,
    }
}

pub fn trend_between(previous: u8, current: u8) -> Trend {
    match current.cmp(&previous) {
        std::cmp::Ordering::Greater => Trend::Improvement,
        std::cmp::Ordering::Less => Trend::Regression,
        std::cmp::Ordering::Equal => Trend::Stable,
    }
}

/// Label each point against the one before it. Expects oldest-first order.
pub fn assign_trends(points: &mut [HistoryPoint]) {
    let mut previous: Option<u8> = None;
    for point in points.iter_mut() {
        point.trend = previous.map(|prev| trend_between(prev, point.pass_rate));
        previous = Some(point.pass_rate);
    }
}
