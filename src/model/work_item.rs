use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const FIELD_TITLE: &str = "System.Title";
pub const FIELD_STATE: &str = "System.State";
pub const FIELD_TYPE: &str = "System.WorkItemType";
pub const FIELD_ASSIGNED_TO: &str = "System.AssignedTo";
pub const FIELD_DESCRIPTION: &str = "System.Description";

/// Link from a user story to the test cases that cover it.
pub const TESTED_BY: &str = "Microsoft.VSTS.Common.TestedBy-Forward";

/// Raw relation as returned by the API: a type tag plus a URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationLink {
    pub rel: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Value>,
}

/// Relation with its target id parsed out of the URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemRelation<'a> {
    pub relation_type: &'a str,
    pub target_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: i64,
    #[serde(default)]
    pub rev: Option<i64>,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<RelationLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl WorkItem {
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn title(&self) -> &str {
        self.field_str(FIELD_TITLE).unwrap_or_default()
    }

    /// Identity fields come back as objects; prefer the display name.
    pub fn assigned_to(&self) -> Option<String> {
        match self.fields.get(FIELD_ASSIGNED_TO)? {
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => obj
                .get("displayName")
                .or_else(|| obj.get("uniqueName"))
                .and_then(Value::as_str)
                .map(String::from),
            _ => None,
        }
    }

    pub fn summary(&self) -> WorkItemSummary {
        WorkItemSummary {
            id: self.id,
            title: self.title().to_string(),
            work_item_type: self.field_str(FIELD_TYPE).map(String::from),
            state: self.field_str(FIELD_STATE).map(String::from),
            assigned_to: self.assigned_to(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemSummary {
    pub id: i64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_item_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorySummary {
    #[serde(flatten)]
    pub story: WorkItemSummary,
    pub test_case_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryWithTestCases {
    #[serde(flatten)]
    pub story: WorkItemSummary,
    pub test_cases: Vec<WorkItemSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_api_payload_with_relations() {
        let raw = json!({
            "id": 42,
            "rev": 3,
            "fields": {
                "System.Title": "Checkout flow",
                "System.State": "Active",
                "System.WorkItemType": "User Story",
                "System.AssignedTo": {"displayName": "Jane Roe", "uniqueName": "jane@example.com"}
            },
            "relations": [
                {"rel": TESTED_BY, "url": "https://dev.azure.com/o/_apis/wit/workItems/456", "attributes": {"isLocked": false}}
            ],
            "url": "https://dev.azure.com/o/_apis/wit/workItems/42"
        });
        let item: WorkItem = serde_json::from_value(raw).unwrap();
        assert_eq!(item.title(), "Checkout flow");
        assert_eq!(item.assigned_to().as_deref(), Some("Jane Roe"));
        assert_eq!(item.relations.len(), 1);

        let summary = item.summary();
        assert_eq!(summary.state.as_deref(), Some("Active"));
        assert_eq!(summary.work_item_type.as_deref(), Some("User Story"));
    }

    #[test]
    fn missing_relations_default_to_empty() {
        let item: WorkItem = serde_json::from_value(json!({"id": 1, "fields": {}})).unwrap();
        assert!(item.relations.is_empty());
        assert_eq!(item.title(), "");
        assert_eq!(item.assigned_to(), None);
    }
}
