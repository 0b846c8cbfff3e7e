//! JSON Patch documents for work-item and classification-node mutations.

use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::model::node::NodeUpdate;
use crate::model::patch::PatchDocument;
use crate::model::test_case::TestCase;
use crate::model::work_item::{FIELD_ASSIGNED_TO, FIELD_DESCRIPTION, FIELD_TITLE};
use crate::util::steps::format_steps;

/// Identity macro resolved server-side to the owner of the calling token.
pub const ME_MACRO: &str = "@me";

pub const FIELD_STEPS: &str = "Microsoft.VSTS.TCM.Steps";
pub const FIELD_AREA_PATH: &str = "System.AreaPath";
pub const FIELD_ITERATION_PATH: &str = "System.IterationPath";
pub const FIELD_PRIORITY: &str = "Microsoft.VSTS.Common.Priority";
pub const FIELD_TAGS: &str = "System.Tags";

fn field_path(name: &str) -> String {
    format!("/fields/{name}")
}

/// Build the creation document for a test case.
///
/// Title, description and steps always come first; the assignment is last and
/// falls back to `@me` when the caller gave none.
pub fn build_create_test_case(fields: &TestCase, assigned_to: Option<&str>) -> PatchDocument {
    let mut doc = PatchDocument::new();
    doc.add(field_path(FIELD_TITLE), fields.title.as_str())
        .add(field_path(FIELD_DESCRIPTION), fields.description.as_str())
        .add(field_path(FIELD_STEPS), format_steps(&fields.steps));

    if let Some(area) = &fields.area_path {
        doc.add(field_path(FIELD_AREA_PATH), area.as_str());
    }
    if let Some(iteration) = &fields.iteration_path {
        doc.add(field_path(FIELD_ITERATION_PATH), iteration.as_str());
    }
    if let Some(priority) = fields.priority {
        doc.add(field_path(FIELD_PRIORITY), priority);
    }
    if !fields.tags.is_empty() {
        doc.add(field_path(FIELD_TAGS), fields.tags.join("; "));
    }

    let assignee = assigned_to
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or(ME_MACRO);
    doc.add(field_path(FIELD_ASSIGNED_TO), assignee);
    doc
}

/// Build a field update document: `add` sets a value, an explicit null removes it.
pub fn build_update_fields(fields: &[(String, Value)]) -> Result<PatchDocument> {
    if fields.is_empty() {
        return Err(SyncError::validation("no fields to update"));
    }
    let mut doc = PatchDocument::new();
    for (name, value) in fields {
        if name.trim().is_empty() {
            return Err(SyncError::validation("field reference name cannot be empty"));
        }
        match value {
            Value::Null => doc.remove(field_path(name)),
            v => doc.add(field_path(name), v.clone()),
        };
    }
    Ok(doc)
}

/// Build a classification node update: renames replace `/name`, dates are added
/// under `/attributes`.
pub fn build_update_node(update: &NodeUpdate) -> Result<PatchDocument> {
    if update.is_empty() {
        return Err(SyncError::validation("node update has no changes"));
    }
    if let (Some(start), Some(finish)) = (update.start_date, update.finish_date) {
        if finish < start {
            return Err(SyncError::validation("finish date precedes start date"));
        }
    }

    let mut doc = PatchDocument::new();
    if let Some(name) = &update.name {
        if name.trim().is_empty() {
            return Err(SyncError::validation("node name cannot be empty"));
        }
        doc.replace("/name", name.as_str());
    }
    if let Some(start) = update.start_date {
        doc.add("/attributes/startDate", start.to_rfc3339());
    }
    if let Some(finish) = update.finish_date {
        doc.add("/attributes/finishDate", finish.to_rfc3339());
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::patch::PatchOp;
    use crate::model::test_case::TestStep;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn login_case() -> TestCase {
        TestCase {
            title: "Login Smoke Test".into(),
            description: "Basic sign-in".into(),
            steps: vec![TestStep::new("Open /login", "Form shown")],
            ..Default::default()
        }
    }

    #[test]
    fn assignment_defaults_to_me_macro() {
        let doc = build_create_test_case(&login_case(), None);
        let op = doc.find("/fields/System.AssignedTo").unwrap();
        assert_eq!(op.op, PatchOp::Add);
        assert_eq!(op.value, json!("@me"));
    }

    #[test]
    fn explicit_assignment_is_kept_verbatim() {
        let doc = build_create_test_case(&login_case(), Some("john.doe@example.com"));
        let op = doc.find("/fields/System.AssignedTo").unwrap();
        assert_eq!(op.value, json!("john.doe@example.com"));
    }

    #[test]
    fn core_fields_precede_assignment() {
        let mut case = login_case();
        case.area_path = Some("Fabrikam\\Web".into());
        case.priority = Some(2);
        case.tags = vec!["smoke".into(), "auth".into()];
        let doc = build_create_test_case(&case, None);
        let paths: Vec<&str> = doc.operations().iter().map(|o| o.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/fields/System.Title",
                "/fields/System.Description",
                "/fields/Microsoft.VSTS.TCM.Steps",
                "/fields/System.AreaPath",
                "/fields/Microsoft.VSTS.Common.Priority",
                "/fields/System.Tags",
                "/fields/System.AssignedTo",
            ]
        );
        assert!(doc.operations().iter().all(|o| o.op == PatchOp::Add));
        assert_eq!(doc.find("/fields/System.Tags").unwrap().value, json!("smoke; auth"));
    }

    #[test]
    fn update_fields_removes_on_null() {
        let doc = build_update_fields(&[
            ("System.State".into(), json!("Closed")),
            ("System.Tags".into(), Value::Null),
        ])
        .unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.operations()[0].op, PatchOp::Add);
        assert_eq!(doc.operations()[1].op, PatchOp::Remove);
    }

    #[test]
    fn empty_updates_fail_fast() {
        assert_eq!(
            build_update_fields(&[]).unwrap_err().kind(),
            ErrorKind::ValidationError
        );
        assert_eq!(
            build_update_node(&NodeUpdate::default()).unwrap_err().kind(),
            ErrorKind::ValidationError
        );
    }

    #[test]
    fn node_update_replaces_name_and_adds_dates() {
        let update = NodeUpdate {
            name: Some("Sprint 7".into()),
            start_date: Some(Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap()),
            finish_date: Some(Utc.with_ymd_and_hms(2026, 3, 13, 0, 0, 0).unwrap()),
        };
        let doc = build_update_node(&update).unwrap();
        assert_eq!(doc.operations()[0].op, PatchOp::Replace);
        assert_eq!(doc.operations()[0].path, "/name");
        assert_eq!(
            doc.materialize()["attributes"]["startDate"],
            json!("2026-03-02T00:00:00+00:00")
        );
    }

    #[test]
    fn node_dates_must_be_ordered() {
        let update = NodeUpdate {
            name: None,
            start_date: Some(Utc.with_ymd_and_hms(2026, 3, 13, 0, 0, 0).unwrap()),
            finish_date: Some(Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap()),
        };
        assert!(build_update_node(&update).is_err());
    }
}
