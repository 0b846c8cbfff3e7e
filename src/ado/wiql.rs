use serde::Deserialize;
use serde_json::json;

use super::client::{segment, AdoClient, ApiRequest};
use super::transport::HttpTransport;
use crate::credentials::Credentials;
use crate::error::{Result, SyncError};

pub const TEST_CASE_TYPE: &str = "Test Case";

/// Hard ceiling the service applies to `$top`.
pub const MAX_TOP: usize = 20_000;

#[derive(Debug, Deserialize)]
struct WorkItemReference {
    id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WiqlResponse {
    #[serde(default)]
    work_items: Vec<WorkItemReference>,
}

/// Work-item ids in the order the query returned them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub ids: Vec<i64>,
}

impl QueryResult {
    pub fn capped(mut self, limit: usize) -> Self {
        self.ids.truncate(limit);
        self
    }

    pub fn first(&self) -> Option<i64> {
        self.ids.first().copied()
    }
}

/// Render a WIQL string literal. Single quotes are doubled.
pub fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Exact-title lookup within the current project, oldest id first.
pub fn find_existing_query(title: &str, type_filter: &str) -> String {
    format!(
        "SELECT [System.Id] FROM WorkItems \
         WHERE [System.TeamProject] = @project \
         AND [System.WorkItemType] = {} \
         AND [System.Title] = {} \
         ORDER BY [System.Id] ASC",
        literal(type_filter),
        literal(title)
    )
}

pub fn items_of_type_query(type_filter: &str) -> String {
    format!(
        "SELECT [System.Id] FROM WorkItems \
         WHERE [System.TeamProject] = @project \
         AND [System.WorkItemType] = {} \
         ORDER BY [System.Id] ASC",
        literal(type_filter)
    )
}

/// Execute a WIQL query scoped to `project`.
pub async fn execute<T: HttpTransport>(
    client: &AdoClient<T>,
    creds: &Credentials,
    project: &str,
    query: &str,
    top: Option<usize>,
    api_version: &str,
) -> Result<QueryResult> {
    if query.trim().is_empty() {
        return Err(SyncError::validation("query cannot be empty"));
    }
    let mut req = ApiRequest::post(format!("{}/_apis/wit/wiql", segment(project)), api_version)
        .json(json!({ "query": query }));
    if let Some(top) = top {
        req = req.query("$top", top.clamp(1, MAX_TOP));
    }

    let resp: WiqlResponse = client.send_json(&req, creds).await?;
    Ok(QueryResult {
        ids: resp.work_items.into_iter().map(|w| w.id).collect(),
    })
}

/// Ids of work items of `type_filter` whose title matches exactly.
///
/// An empty result means "no duplicate", not an error.
pub async fn find_existing<T: HttpTransport>(
    client: &AdoClient<T>,
    creds: &Credentials,
    project: &str,
    title: &str,
    type_filter: &str,
    api_version: &str,
) -> Result<Vec<i64>> {
    let query = find_existing_query(title, type_filter);
    let result = execute(client, creds, project, &query, None, api_version).await?;
    tracing::debug!(title, matches = result.ids.len(), "duplicate check");
    Ok(result.ids)
}
