use std::collections::{HashMap, HashSet};

use futures::future::try_join_all;
use serde::Deserialize;

use super::client::{AdoClient, ApiRequest};
use super::transport::HttpTransport;
use crate::credentials::Credentials;
use crate::error::Result;
use crate::model::work_item::{RelationLink, WorkItem, WorkItemRelation};

/// Upstream limit on ids per batch detail request.
pub const MAX_BATCH: usize = 200;

/// Parse the trailing integer of a relation URL such as
/// `https://dev.azure.com/o/_apis/wit/workItems/456`.
///
/// Only `.../workItems/<id>` counts; artifact links, hyperlinks and garbage
/// yield `None` even when they end in digits.
pub fn parse_target_id(url: &str) -> Option<i64> {
    let path = url.split(['?', '#']).next()?;
    let mut segments = path.trim_end_matches('/').rsplit('/');
    let last = segments.next()?;
    if !segments.next()?.eq_ignore_ascii_case("workItems") {
        return None;
    }
    if last.is_empty() || !last.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    last.parse::<i64>().ok().filter(|id| *id > 0)
}

pub fn parse_relation(link: &RelationLink) -> Option<WorkItemRelation<'_>> {
    parse_target_id(&link.url).map(|target_id| WorkItemRelation {
        relation_type: &link.rel,
        target_id,
    })
}

fn dedup_ids<'a>(relations: impl Iterator<Item = WorkItemRelation<'a>>) -> Vec<i64> {
    let mut seen = HashSet::new();
    relations
        .map(|r| r.target_id)
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Linked ids in first-seen order; malformed relations are skipped.
pub fn extract_linked_ids(relations: &[RelationLink]) -> Vec<i64> {
    dedup_ids(relations.iter().filter_map(parse_relation))
}

/// Like [`extract_linked_ids`], restricted to one relation type.
pub fn extract_linked_ids_of(relations: &[RelationLink], rel: &str) -> Vec<i64> {
    dedup_ids(
        relations
            .iter()
            .filter_map(parse_relation)
            .filter(|r| r.relation_type == rel),
    )
}

#[derive(Debug, Deserialize)]
struct WorkItemBatch {
    #[serde(default)]
    value: Vec<Option<WorkItem>>,
}

pub fn batch_request(ids: &[i64], api_version: &str) -> ApiRequest {
    let joined = ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    ApiRequest::get("_apis/wit/workitems", api_version)
        .query("ids", joined)
        .query("$expand", "relations")
        .query("errorPolicy", "omit")
}

async fn fetch_chunk<T: HttpTransport>(
    client: &AdoClient<T>,
    creds: &Credentials,
    ids: &[i64],
    api_version: &str,
) -> Result<Vec<WorkItem>> {
    let batch: WorkItemBatch = client
        .send_json(&batch_request(ids, api_version), creds)
        .await?;

    // Omitted (deleted or inaccessible) items come back as nulls.
    let by_id: HashMap<i64, WorkItem> = batch
        .value
        .into_iter()
        .flatten()
        .map(|item| (item.id, item))
        .collect();
    Ok(ids.iter().filter_map(|id| by_id.get(id).cloned()).collect())
}

/// Fetch full work items, relations expanded, in chunks of at most
/// `batch_size` ids. Output follows input order.
pub async fn hydrate<T: HttpTransport>(
    client: &AdoClient<T>,
    creds: &Credentials,
    ids: &[i64],
    batch_size: usize,
    api_version: &str,
) -> Result<Vec<WorkItem>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let size = batch_size.clamp(1, MAX_BATCH);
    tracing::debug!(ids = ids.len(), batches = ids.len().div_ceil(size), "hydrating work items");

    let chunks = try_join_all(
        ids.chunks(size)
            .map(|chunk| fetch_chunk(client, creds, chunk, api_version)),
    )
    .await?;
    Ok(chunks.into_iter().flatten().collect())
}
