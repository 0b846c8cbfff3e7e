use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ado::client::ApiVersions;
use crate::ado::relations::MAX_BATCH;
use crate::ado::retry::RetryPolicy;
use crate::credentials::ProcessDefaults;
use crate::sync::SyncSettings;

pub const ENV_ORG_URL: &str = "ADO_ORG_URL";
pub const ENV_PAT: &str = "ADO_PAT";
pub const ENV_PROJECT: &str = "ADO_PROJECT";

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    pub defaults: Option<DefaultsConfig>,
    pub api: Option<ApiConfig>,
    pub transport: Option<TransportConfig>,
    pub query: Option<QueryConfig>,
    pub cache: Option<CacheConfig>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DefaultsConfig {
    pub org_url: Option<String>,
    pub pat: Option<String>,
    pub project: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ApiConfig {
    pub version: Option<String>,
    /// Empty string disables the test-plan endpoints (older on-premises servers).
    pub test_plan_version: Option<String>,
    pub token_version: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TransportConfig {
    pub timeout_secs: Option<u64>,
    pub retry_backoff_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct QueryConfig {
    pub batch_size: Option<usize>,
    pub story_type: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CacheConfig {
    pub ttl_secs: Option<u64>,
}

fn config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".adosync")
        .join("config.toml")
}

pub fn load_config() -> Result<AppConfig> {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}

impl AppConfig {
    /// Credential fallbacks: environment first, then the config file.
    pub fn process_defaults(&self, env: impl Fn(&str) -> Option<String>) -> ProcessDefaults {
        let file = self.defaults.as_ref();
        let pick = |key: &str, from_file: Option<&String>| {
            env(key)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| from_file.cloned())
        };
        ProcessDefaults {
            organization_url: pick(ENV_ORG_URL, file.and_then(|d| d.org_url.as_ref())),
            personal_access_token: pick(ENV_PAT, file.and_then(|d| d.pat.as_ref())),
            project: pick(ENV_PROJECT, file.and_then(|d| d.project.as_ref())),
        }
    }

    pub fn api_versions(&self) -> ApiVersions {
        let mut versions = ApiVersions::default();
        if let Some(api) = &self.api {
            if let Some(v) = &api.version {
                versions.work_items = v.clone();
            }
            if let Some(v) = &api.test_plan_version {
                versions.test_plans = (!v.trim().is_empty()).then(|| v.clone());
            }
            if let Some(v) = &api.token_version {
                versions.tokens = v.clone();
            }
        }
        versions
    }

    pub fn timeout(&self) -> Duration {
        let secs = self
            .transport
            .as_ref()
            .and_then(|t| t.timeout_secs)
            .unwrap_or(30);
        Duration::from_secs(secs.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let ms = self
            .transport
            .as_ref()
            .and_then(|t| t.retry_backoff_ms)
            .unwrap_or(1000);
        RetryPolicy::with_backoff(Duration::from_millis(ms))
    }

    pub fn sync_settings(&self) -> SyncSettings {
        let query = self.query.as_ref();
        let mut settings = SyncSettings {
            api: self.api_versions(),
            ..Default::default()
        };
        if let Some(size) = query.and_then(|q| q.batch_size) {
            settings.batch_size = size.clamp(1, MAX_BATCH);
        }
        if let Some(kind) = query.and_then(|q| q.story_type.clone()) {
            settings.story_type = kind;
        }
        if let Some(ttl) = self.cache.as_ref().and_then(|c| c.ttl_secs) {
            settings.cache_ttl = Duration::from_secs(ttl);
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        let settings = config.sync_settings();
        assert_eq!(settings.batch_size, 200);
        assert_eq!(settings.api.work_items, "7.1");
        assert_eq!(settings.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn parses_all_sections() {
        let file = write_config(
            r#"
            [defaults]
            org_url = "https://tfs.corp.local/tfs/DefaultCollection"
            pat = "file-pat"
            project = "Legacy"

            [api]
            version = "5.0"
            test_plan_version = ""

            [transport]
            timeout_secs = 10
            retry_backoff_ms = 250

            [query]
            batch_size = 500
            story_type = "Product Backlog Item"

            [cache]
            ttl_secs = 0
            "#,
        );
        let config = load_config_from(file.path()).unwrap();
        let settings = config.sync_settings();
        assert_eq!(settings.api.work_items, "5.0");
        assert_eq!(settings.api.test_plans, None);
        assert_eq!(settings.batch_size, 200);
        assert_eq!(settings.story_type, "Product Backlog Item");
        assert!(settings.cache_ttl.is_zero());
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.retry_policy().delay, Duration::from_millis(250));
    }

    #[test]
    fn environment_overrides_file_defaults() {
        let file = write_config("[defaults]\npat = \"file-pat\"\nproject = \"FromFile\"\n");
        let config = load_config_from(file.path()).unwrap();
        let defaults = config.process_defaults(|key| match key {
            ENV_PAT => Some("env-pat".to_string()),
            ENV_ORG_URL => Some("https://dev.azure.com/env".to_string()),
            _ => None,
        });
        assert_eq!(defaults.personal_access_token.as_deref(), Some("env-pat"));
        assert_eq!(defaults.organization_url.as_deref(), Some("https://dev.azure.com/env"));
        assert_eq!(defaults.project.as_deref(), Some("FromFile"));
    }

    #[test]
    fn invalid_toml_is_reported() {
        let file = write_config("[defaults\npat = ");
        let err = load_config_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }
}
