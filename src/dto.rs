//! Typed view of the remote service's payloads.
//!
//! The service omits nested fields freely (a result with no `runBy`, a run
//! with no `build`). Every optional field is declared here with a default,
//! including explicit `null`, so aggregation code never sees a missing value.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ExtractError;

// ============================================================================
// Deserialization helpers
// ============================================================================

/// Treat an explicit `null` the same as an absent field.
fn null_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// Ids show up as numbers in some endpoints and as strings in others
/// (`testCase.id` on results, `associatedBugs[].id`). Normalize to a string.
fn id_string<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Null) | None => Ok(String::new()),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// Numeric id that may arrive as a numeric string.
fn id_u64<'de, D>(d: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom(format!("invalid id {}", n))),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid id {:?}", s))),
        Some(Value::Null) | None => Ok(0),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected numeric id, got {}",
            other
        ))),
    }
}

/// Decode a list of raw items into typed records.
pub fn decode_items<T: serde::de::DeserializeOwned>(items: Vec<Value>) -> Result<Vec<T>, ExtractError> {
    items
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(ExtractError::from))
        .collect()
}

// ============================================================================
// Shared references
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRef {
    #[serde(default, deserialize_with = "null_default")]
    pub display_name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub unique_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShallowReference {
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub url: String,
}

// ============================================================================
// Project / plan / suite
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_default")]
    pub state: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestPlan {
    #[serde(deserialize_with = "id_u64")]
    pub id: u64,
    #[serde(default, deserialize_with = "null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_default")]
    pub state: String,
    #[serde(default, deserialize_with = "null_default")]
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub end_date: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub iteration: String,
    #[serde(default, deserialize_with = "null_default")]
    pub owner: IdentityRef,
    #[serde(default, deserialize_with = "null_default")]
    pub root_suite: ShallowReference,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSuite {
    #[serde(deserialize_with = "id_u64")]
    pub id: u64,
    #[serde(default, deserialize_with = "null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub suite_type: String,
    /// Count declared by the service; may disagree with `test_cases.len()`.
    #[serde(default, deserialize_with = "null_default")]
    pub test_case_count: u64,
    #[serde(default, deserialize_with = "null_default")]
    pub parent_suite: Option<ShallowReference>,
    #[serde(default, deserialize_with = "null_default")]
    pub query_string: Option<String>,
    /// Filled in by the aggregator after the per-suite fetch.
    #[serde(default, deserialize_with = "null_default")]
    pub test_cases: Vec<TestCaseRef>,
}

impl TestSuite {
    pub fn parent_suite_id(&self) -> Option<&str> {
        self.parent_suite
            .as_ref()
            .map(|p| p.id.as_str())
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseRef {
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub order: i64,
    #[serde(default, deserialize_with = "null_default")]
    pub configuration: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub tester: Option<String>,
}

/// Wire shape of one entry in a suite's test-case listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteTestCaseEntry {
    #[serde(default, deserialize_with = "null_default")]
    pub work_item: ShallowReference,
    #[serde(default, deserialize_with = "null_default")]
    pub order: i64,
    #[serde(default, deserialize_with = "null_default")]
    pub point_assignments: Vec<PointAssignment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointAssignment {
    #[serde(default, deserialize_with = "null_default")]
    pub configuration_name: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub tester: Option<IdentityRef>,
}

impl From<SuiteTestCaseEntry> for TestCaseRef {
    fn from(entry: SuiteTestCaseEntry) -> Self {
        let assignment = entry.point_assignments.into_iter().next().unwrap_or_default();
        TestCaseRef {
            id: entry.work_item.id,
            name: entry.work_item.name,
            order: entry.order,
            configuration: assignment.configuration_name,
            tester: assignment
                .tester
                .map(|t| t.display_name)
                .filter(|name| !name.is_empty()),
        }
    }
}

// ============================================================================
// Runs and results
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRun {
    #[serde(deserialize_with = "id_u64")]
    pub id: u64,
    #[serde(default, deserialize_with = "null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub state: String,
    #[serde(default, deserialize_with = "null_default")]
    pub total_tests: u64,
    #[serde(default, deserialize_with = "null_default")]
    pub passed_tests: u64,
    /// Failed tests not yet analyzed; the service's failure counter.
    #[serde(default, deserialize_with = "null_default")]
    pub unanalyzed_tests: u64,
    #[serde(default, deserialize_with = "null_default")]
    pub not_applicable_tests: u64,
    #[serde(default, deserialize_with = "null_default")]
    pub incomplete_tests: u64,
    #[serde(default, deserialize_with = "null_default")]
    pub started_date: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub completed_date: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub build: Option<ShallowReference>,
    #[serde(default, deserialize_with = "null_default")]
    pub build_configuration: Option<BuildConfiguration>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfiguration {
    #[serde(default, deserialize_with = "null_default")]
    pub number: String,
}

impl TestRun {
    pub fn build_number(&self) -> Option<&str> {
        self.build_configuration
            .as_ref()
            .map(|b| b.number.as_str())
            .filter(|n| !n.is_empty())
            .or_else(|| {
                self.build
                    .as_ref()
                    .map(|b| b.name.as_str())
                    .filter(|n| !n.is_empty())
            })
    }

    pub fn started_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.started_date.as_deref().and_then(parse_timestamp)
    }
}

/// Parse an RFC 3339 timestamp; the service sometimes omits the offset,
/// in which case UTC is assumed.
pub fn parse_timestamp(raw: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&chrono::Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Outcome of a single test-case execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Outcome {
    Passed,
    Failed,
    Blocked,
    #[default]
    NotExecuted,
    NotApplicable,
    Inconclusive,
}

impl Outcome {
    /// Map the service's outcome string. Anything outside the six known
    /// outcomes, including `Unspecified` and `None`, counts as not executed.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "passed" => Outcome::Passed,
            "failed" => Outcome::Failed,
            "blocked" => Outcome::Blocked,
            "notapplicable" => Outcome::NotApplicable,
            "inconclusive" => Outcome::Inconclusive,
            _ => Outcome::NotExecuted,
        }
    }
}

impl<'de> Deserialize<'de> for Outcome {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Ok(Option::<String>::deserialize(d)?
            .map(|s| Outcome::parse(&s))
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BugRef {
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    #[serde(default, deserialize_with = "id_u64")]
    pub id: u64,
    #[serde(default, deserialize_with = "null_default")]
    pub test_case: ShallowReference,
    #[serde(default, deserialize_with = "null_default")]
    pub test_case_title: String,
    #[serde(default)]
    pub outcome: Outcome,
    #[serde(default, deserialize_with = "null_default")]
    pub error_message: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub duration_in_ms: f64,
    #[serde(default, deserialize_with = "null_default")]
    pub started_date: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub completed_date: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub run_by: Option<IdentityRef>,
    #[serde(default, deserialize_with = "null_default")]
    pub associated_bugs: Vec<BugRef>,
    #[serde(default, deserialize_with = "null_default")]
    pub comment: Option<String>,
}

impl TestResult {
    pub fn test_case_id(&self) -> &str {
        &self.test_case.id
    }

    /// Display name, falling back to the result's own title.
    pub fn test_case_name(&self) -> &str {
        if self.test_case.name.is_empty() {
            &self.test_case_title
        } else {
            &self.test_case.name
        }
    }

    pub fn executor(&self) -> Option<&str> {
        self.run_by
            .as_ref()
            .map(|r| r.display_name.as_str())
            .filter(|name| !name.is_empty())
    }
}

// ============================================================================
// Work items
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    #[serde(deserialize_with = "id_u64")]
    pub id: u64,
    #[serde(default, deserialize_with = "null_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_default")]
    pub fields: serde_json::Map<String, Value>,
}

impl WorkItem {
    pub fn title(&self) -> Option<&str> {
        self.fields.get("System.Title").and_then(|v| v.as_str())
    }

    pub fn state(&self) -> Option<&str> {
        self.fields.get("System.State").and_then(|v| v.as_str())
    }
}
