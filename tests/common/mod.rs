#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use plan_snapshot::error::ExtractError;
use plan_snapshot::transport::Transport;

pub const PROJECT: &str = "Fabrikam";

/// Canned reply for one path.
#[derive(Clone)]
pub enum Reply {
    /// Returned verbatim.
    Body(Value),
    /// Non-2xx with this status.
    Status(u16),
    /// Served as `$top`/`$skip` pages.
    Paged(Vec<Value>),
    /// Always a full page, whatever the offset.
    Endless,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl Call {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// In-memory transport keyed by path. Records every call.
#[derive(Default)]
pub struct FakeTransport {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<Call>>,
    delays: Mutex<HashMap<String, Duration>>,
    cancel_on: Mutex<Option<(String, CancellationToken)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, path: impl Into<String>, reply: Reply) {
        self.replies.lock().unwrap().insert(path.into(), reply);
    }

    pub fn body(&self, path: impl Into<String>, body: Value) {
        self.reply(path, Reply::Body(body));
    }

    pub fn delay(&self, path: impl Into<String>, delay: Duration) {
        self.delays.lock().unwrap().insert(path.into(), delay);
    }

    /// Cancel `token` the moment `path` is requested.
    pub fn cancel_when(&self, path: impl Into<String>, token: CancellationToken) {
        *self.cancel_on.lock().unwrap() = Some((path.into(), token));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.path == path)
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value, ExtractError> {
        self.calls.lock().unwrap().push(Call {
            path: path.to_string(),
            query: query.to_vec(),
        });

        if let Some((trigger, token)) = self.cancel_on.lock().unwrap().as_ref() {
            if trigger == path {
                token.cancel();
            }
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let delay = self.delays.lock().unwrap().get(path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let reply = self.replies.lock().unwrap().get(path).cloned();
        let param = |key: &str| -> usize {
            query
                .iter()
                .find(|(k, _)| k == key)
                .and_then(|(_, v)| v.parse().ok())
                .unwrap_or(0)
        };

        match reply {
            Some(Reply::Body(body)) => Ok(body),
            Some(Reply::Status(status)) => Err(ExtractError::from_status(
                status,
                format!("GET {} returned {}", path, status),
            )),
            Some(Reply::Paged(items)) => {
                let top = param("$top");
                let skip = param("$skip").min(items.len());
                let end = (skip + top).min(items.len());
                let page = items[skip..end].to_vec();
                Ok(json!({"count": page.len(), "value": page}))
            }
            Some(Reply::Endless) => {
                let top = param("$top");
                let page: Vec<Value> = (0..top).map(|i| json!({"id": i})).collect();
                Ok(json!({"count": page.len(), "value": page}))
            }
            None => Err(ExtractError::from_status(
                404,
                format!("no route for {}", path),
            )),
        }
    }
}

// ============================================================================
// Remote payload builders
// ============================================================================

pub fn plans_path() -> String {
    format!("{}/_apis/testplan/plans", PROJECT)
}

pub fn suites_path(plan_id: u64) -> String {
    format!("{}/_apis/testplan/Plans/{}/suites", PROJECT, plan_id)
}

pub fn cases_path(plan_id: u64, suite_id: u64) -> String {
    format!(
        "{}/_apis/testplan/Plans/{}/Suites/{}/TestCase",
        PROJECT, plan_id, suite_id
    )
}

pub fn runs_path() -> String {
    format!("{}/_apis/test/runs", PROJECT)
}

pub fn results_path(run_id: u64) -> String {
    format!("{}/_apis/test/Runs/{}/results", PROJECT, run_id)
}

pub fn envelope(items: Vec<Value>) -> Value {
    json!({"count": items.len(), "value": items})
}

pub fn plan(id: u64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "state": "Active",
        "owner": {"displayName": "QA Lead"},
        "rootSuite": {"id": id + 1000, "name": name}
    })
}

pub fn suite(id: u64, name: &str) -> Value {
    json!({"id": id, "name": name, "suiteType": "staticTestSuite"})
}

pub fn case(id: u64, name: &str) -> Value {
    json!({
        "workItem": {"id": id, "name": name},
        "order": 1,
        "pointAssignments": [{"configurationName": "Windows 11", "tester": {"displayName": "Sam Lee"}}]
    })
}

pub fn run(id: u64, name: &str) -> Value {
    json!({"id": id, "name": name, "state": "Completed"})
}

pub fn result(id: u64, case_id: u64, outcome: &str) -> Value {
    json!({
        "id": id,
        "testCase": {"id": case_id.to_string(), "name": format!("Case {}", case_id)},
        "outcome": outcome
    })
}

pub fn result_with_bug(id: u64, case_id: u64, outcome: &str, bug_id: u64) -> Value {
    let mut value = result(id, case_id, outcome);
    value["associatedBugs"] = json!([{"id": bug_id.to_string(), "url": format!("https://example.invalid/_apis/wit/workItems/{}", bug_id)}]);
    value
}

/// Plan 1 with suites A (cases 11, 12), B (case 21) and C (case 31), and a
/// single run 500 whose results are given.
pub fn seed_plan(fake: &FakeTransport, latest_results: Vec<Value>) {
    fake.body(
        plans_path(),
        envelope(vec![plan(1, "Release 1"), plan(2, "Release 2")]),
    );
    fake.body(
        suites_path(1),
        envelope(vec![
            suite(10, "Suite A"),
            suite(20, "Suite B"),
            suite(30, "Suite C"),
        ]),
    );
    fake.body(
        cases_path(1, 10),
        envelope(vec![case(11, "Login"), case(12, "Logout")]),
    );
    fake.body(cases_path(1, 20), envelope(vec![case(21, "Checkout")]));
    fake.body(cases_path(1, 30), envelope(vec![case(31, "Refund")]));
    fake.body(runs_path(), envelope(vec![run(500, "Nightly 500")]));
    fake.reply(results_path(500), Reply::Paged(latest_results));
}
