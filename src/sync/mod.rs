pub mod admin;
pub mod health;
pub mod orchestrator;

use std::time::Duration;

use crate::ado::cache::ReadCache;
use crate::ado::client::{AdoClient, ApiVersions};
use crate::ado::relations::MAX_BATCH;
use crate::ado::transport::HttpTransport;

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub api: ApiVersions,
    pub batch_size: usize,
    pub story_type: String,
    pub cache_ttl: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            api: ApiVersions::default(),
            batch_size: MAX_BATCH,
            story_type: "User Story".into(),
            cache_ttl: Duration::from_secs(60),
        }
    }
}

/// The integration layer's entry point. Holds no per-request identity:
/// every operation takes the resolved credentials explicitly.
pub struct SyncService<T> {
    client: AdoClient<T>,
    settings: SyncSettings,
    cache: ReadCache,
}

impl<T: HttpTransport> SyncService<T> {
    pub fn new(client: AdoClient<T>, settings: SyncSettings) -> Self {
        let cache = ReadCache::new(settings.cache_ttl);
        Self {
            client,
            settings,
            cache,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    fn wit_version(&self) -> &str {
        &self.settings.api.work_items
    }
}
