//! Classification nodes and personal access token lifecycle.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::json;

use super::SyncService;
use crate::ado::builder::build_update_node;
use crate::ado::client::{segment, ApiRequest};
use crate::ado::transport::{HttpMethod, HttpTransport};
use crate::credentials::Credentials;
use crate::error::{Result, SyncError};
use crate::model::node::{ClassificationNode, NodeUpdate, StructureGroup};
use crate::model::token::{PagedPatTokens, PatToken, PatTokenResult, TokenUpdate};

const TOKENS_PATH: &str = "_apis/tokens/pats";

#[derive(Debug, Deserialize)]
struct NodeList {
    #[serde(default)]
    value: Vec<ClassificationNode>,
}

/// Encode a node path like `Web\Sprint 1` into URL segments.
fn node_path(path: &str) -> String {
    path.split(['/', '\\'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(segment)
        .collect::<Vec<_>>()
        .join("/")
}

fn require_authorization_id(id: &str) -> Result<&str> {
    let id = id.trim();
    if id.is_empty() {
        return Err(SyncError::validation("authorization id is required"));
    }
    Ok(id)
}

impl<T: HttpTransport> SyncService<T> {
    /// Root area and iteration nodes, expanded to `depth` levels.
    pub async fn list_nodes(
        &self,
        creds: &Credentials,
        depth: u32,
    ) -> Result<Vec<ClassificationNode>> {
        let project = creds.require_project()?;
        let req = ApiRequest::get(
            format!("{}/_apis/wit/classificationnodes", segment(project)),
            self.wit_version(),
        )
        .query("$depth", depth);
        let list: NodeList = self.client.send_json(&req, creds).await?;
        Ok(list.value)
    }

    pub async fn get_node(
        &self,
        creds: &Credentials,
        group: StructureGroup,
        path: &str,
        depth: u32,
    ) -> Result<ClassificationNode> {
        let project = creds.require_project()?;
        let mut url = format!("{}/_apis/wit/classificationnodes/{group}", segment(project));
        let rest = node_path(path);
        if !rest.is_empty() {
            url.push('/');
            url.push_str(&rest);
        }
        let req = ApiRequest::get(url, self.wit_version()).query("$depth", depth);
        self.client.send_json(&req, creds).await
    }

    pub async fn update_node(
        &self,
        creds: &Credentials,
        group: StructureGroup,
        path: &str,
        update: &NodeUpdate,
    ) -> Result<ClassificationNode> {
        let doc = build_update_node(update)?;
        let project = creds.require_project()?;
        let rest = node_path(path);
        if rest.is_empty() {
            return Err(SyncError::validation("the root node cannot be updated"));
        }
        let req = ApiRequest::new(
            HttpMethod::Patch,
            format!(
                "{}/_apis/wit/classificationnodes/{group}/{rest}",
                segment(project)
            ),
            self.wit_version(),
        )
        .json(doc.materialize());
        self.client.send_json(&req, creds).await
    }

    /// All tokens of the calling identity, following continuation pages.
    pub async fn list_tokens(&self, creds: &Credentials) -> Result<Vec<PatToken>> {
        let mut tokens = Vec::new();
        let mut seen = HashSet::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut req = ApiRequest::get(TOKENS_PATH, &self.settings.api.tokens).on_token_service();
            if let Some(token) = &continuation {
                req = req.query("continuationToken", token);
            }
            let page: PagedPatTokens = self.client.send_json(&req, creds).await?;
            tokens.extend(page.pat_tokens);

            match page.continuation_token.filter(|t| !t.is_empty()) {
                Some(next) if seen.insert(next.clone()) => continuation = Some(next),
                _ => break,
            }
        }
        Ok(tokens)
    }

    pub async fn get_token(&self, creds: &Credentials, authorization_id: &str) -> Result<PatToken> {
        let id = require_authorization_id(authorization_id)?;
        let req = ApiRequest::get(TOKENS_PATH, &self.settings.api.tokens)
            .on_token_service()
            .query("authorizationId", id);
        let result: PatTokenResult = self.client.send_json(&req, creds).await?;
        result.pat_token.ok_or_else(|| {
            SyncError::NotFound(
                result
                    .pat_token_error
                    .unwrap_or_else(|| format!("token {id} not found")),
            )
        })
    }

    /// Apply `update` on top of the token's current settings.
    pub async fn update_token(
        &self,
        creds: &Credentials,
        authorization_id: &str,
        update: &TokenUpdate,
    ) -> Result<PatToken> {
        if update.display_name.is_none() && update.scope.is_none() && update.valid_to.is_none() {
            return Err(SyncError::validation("token update has no changes"));
        }
        if let Some(valid_to) = update.valid_to {
            if valid_to <= chrono::Utc::now() {
                return Err(SyncError::validation("validTo must be in the future"));
            }
        }

        let current = self.get_token(creds, authorization_id).await?;
        let body = json!({
            "authorizationId": current.authorization_id,
            "displayName": update.display_name.as_ref().unwrap_or(&current.display_name),
            "scope": update.scope.as_ref().unwrap_or(&current.scope),
            "validTo": update.valid_to.unwrap_or(current.valid_to).to_rfc3339(),
            "allOrgs": current.target_accounts.is_none(),
        });
        let req = ApiRequest::new(HttpMethod::Put, TOKENS_PATH, &self.settings.api.tokens)
            .on_token_service()
            .json(body);
        let result: PatTokenResult = self.client.send_json(&req, creds).await?;
        result.pat_token.ok_or_else(|| {
            SyncError::validation(
                result
                    .pat_token_error
                    .unwrap_or_else(|| "token update was rejected".to_string()),
            )
        })
    }

    pub async fn revoke_token(&self, creds: &Credentials, authorization_id: &str) -> Result<()> {
        let id = require_authorization_id(authorization_id)?;
        let req = ApiRequest::new(HttpMethod::Delete, TOKENS_PATH, &self.settings.api.tokens)
            .on_token_service()
            .query("authorizationId", id);
        self.client.send(&req, creds).await?;
        tracing::info!(authorization_id = id, "token revoked");
        Ok(())
    }
}
