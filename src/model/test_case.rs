use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStep {
    pub action: String,
    #[serde(default)]
    pub expected_result: String,
}

impl TestStep {
    pub fn new(action: impl Into<String>, expected_result: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            expected_result: expected_result.into(),
        }
    }
}

/// A test case as submitted by a caller. `id` stays `None` until the
/// backend mints one on creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<TestStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TestCase {
    #[cfg(test)]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Result of find-or-create. `created == false` means an existing match was reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub created: bool,
    pub id: i64,
    pub warnings: Vec<String>,
}

impl SyncOutcome {
    /// `PartialSuccess` when the primary result landed but a follow-up step did not.
    pub fn partial_kind(&self) -> Option<ErrorKind> {
        (!self.warnings.is_empty()).then_some(ErrorKind::PartialSuccess)
    }
}
