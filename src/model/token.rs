use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for a personal access token. The secret itself is never modelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatToken {
    pub authorization_id: String,
    pub display_name: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_accounts: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PagedPatTokens {
    #[serde(default)]
    pub continuation_token: Option<String>,
    #[serde(default)]
    pub pat_tokens: Vec<PatToken>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PatTokenResult {
    pub pat_token: Option<PatToken>,
    #[serde(default)]
    pub pat_token_error: Option<String>,
}

/// Changes to apply to an existing token; unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUpdate {
    pub display_name: Option<String>,
    pub scope: Option<String>,
    pub valid_to: Option<DateTime<Utc>>,
}
