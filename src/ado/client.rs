use std::sync::atomic::{AtomicU32, Ordering};

use backon::Retryable;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::retry::RetryPolicy;
use super::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, TransportFailure};
use crate::credentials::Credentials;
use crate::error::{Result, SyncError};
use crate::model::patch::PatchDocument;

/// API versions per endpoint family. Cloud and on-premises servers disagree,
/// and older servers have no test-plan endpoints at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiVersions {
    pub work_items: String,
    pub test_plans: Option<String>,
    pub tokens: String,
}

impl Default for ApiVersions {
    fn default() -> Self {
        Self {
            work_items: "7.1".into(),
            test_plans: Some("7.1".into()),
            tokens: "7.1-preview.1".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Host {
    Organization,
    TokenService,
}

#[derive(Debug, Clone)]
pub enum Body {
    Json(Value),
    JsonPatch(PatchDocument),
}

/// One logical call against the work-item API, relative to the organization.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub host: Host,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Body>,
    pub api_version: String,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>, api_version: &str) -> Self {
        Self {
            method,
            host: Host::Organization,
            path: path.into(),
            query: Vec::new(),
            body: None,
            api_version: api_version.to_string(),
        }
    }

    pub fn get(path: impl Into<String>, api_version: &str) -> Self {
        Self::new(HttpMethod::Get, path, api_version)
    }

    pub fn post(path: impl Into<String>, api_version: &str) -> Self {
        Self::new(HttpMethod::Post, path, api_version)
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(Body::Json(body));
        self
    }

    pub fn json_patch(mut self, doc: PatchDocument) -> Self {
        self.body = Some(Body::JsonPatch(doc));
        self
    }

    pub fn on_token_service(mut self) -> Self {
        self.host = Host::TokenService;
        self
    }
}

/// Percent-encode a single path segment (project names contain spaces).
pub fn segment(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

/// Host serving the token lifecycle API for an organization.
pub fn token_service_url(org_url: &str) -> String {
    let Ok(url) = reqwest::Url::parse(org_url) else {
        return org_url.to_string();
    };
    let host = url.host_str().unwrap_or_default();
    let org = url
        .path_segments()
        .and_then(|mut s| s.next())
        .unwrap_or_default();

    if host.eq_ignore_ascii_case("dev.azure.com") && !org.is_empty() {
        format!("{}://vssps.dev.azure.com/{org}", url.scheme())
    } else if let Some(name) = host.strip_suffix(".visualstudio.com") {
        format!("{}://{name}.vssps.visualstudio.com", url.scheme())
    } else {
        org_url.trim_end_matches('/').to_string()
    }
}

pub fn basic_auth(pat: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!(":{pat}"));
    format!("Basic {encoded}")
}

/// Pull the human-readable message out of an error body.
fn upstream_message(status: u16, body: &[u8]) -> String {
    if let Ok(json) = serde_json::from_slice::<Value>(body) {
        if let Some(msg) = json.get("message").and_then(Value::as_str) {
            return msg.to_string();
        }
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        format!("HTTP {status}")
    } else {
        text.chars().take(500).collect()
    }
}

pub struct AdoClient<T> {
    transport: T,
    retry: RetryPolicy,
}

impl<T: HttpTransport> AdoClient<T> {
    pub fn new(transport: T, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    pub fn url_for(&self, req: &ApiRequest, creds: &Credentials) -> String {
        let base = match req.host {
            Host::Organization => creds.organization_url.trim_end_matches('/').to_string(),
            Host::TokenService => token_service_url(&creds.organization_url),
        };
        let mut url = format!("{base}/{}?", req.path.trim_start_matches('/'));
        for (k, v) in &req.query {
            url.push_str(&format!("{k}={}&", urlencoding::encode(v)));
        }
        url.push_str(&format!("api-version={}", urlencoding::encode(&req.api_version)));
        url
    }

    fn build(&self, req: &ApiRequest, creds: &Credentials) -> Result<HttpRequest> {
        let mut headers = vec![
            (
                "Authorization".to_string(),
                basic_auth(&creds.personal_access_token),
            ),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        let body = match &req.body {
            None => None,
            Some(Body::Json(v)) => {
                headers.push(("Content-Type".into(), "application/json".into()));
                Some(serde_json::to_vec(v).map_err(|e| SyncError::validation(e.to_string()))?)
            }
            Some(Body::JsonPatch(doc)) => {
                headers.push(("Content-Type".into(), "application/json-patch+json".into()));
                Some(serde_json::to_vec(doc).map_err(|e| SyncError::validation(e.to_string()))?)
            }
        };
        Ok(HttpRequest {
            method: req.method,
            url: self.url_for(req, creds),
            headers,
            body,
        })
    }

    /// Send without classification or retry. Used by connectivity probes.
    pub async fn probe(
        &self,
        req: &ApiRequest,
        creds: &Credentials,
    ) -> std::result::Result<HttpResponse, TransportFailure> {
        let http = self.build(req, creds).map_err(|e| TransportFailure::Other(e.to_string()))?;
        self.transport.send(http).await
    }

    async fn send_once(&self, http: &HttpRequest) -> Result<HttpResponse> {
        tracing::debug!(method = http.method.as_str(), url = %http.url, "sending request");
        let resp = self
            .transport
            .send(http.clone())
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        tracing::debug!(status = resp.status, url = %http.url, "received response");
        if resp.status == 203 || !resp.is_success() {
            return Err(SyncError::from_status(
                resp.status,
                upstream_message(resp.status, &resp.body),
            ));
        }
        Ok(resp)
    }

    /// Send with Basic auth, classify failures, and retry per the policy table.
    pub async fn send(&self, req: &ApiRequest, creds: &Credentials) -> Result<HttpResponse> {
        let http = self.build(req, creds)?;
        let attempt = AtomicU32::new(0);

        let op = || {
            attempt.fetch_add(1, Ordering::SeqCst);
            self.send_once(&http)
        };

        let mut budget = self.retry.budget();
        op.retry(self.retry.backoff())
            .when(move |e: &SyncError| budget.allow(e.kind()))
            .notify(|e: &SyncError, dur| {
                tracing::warn!(
                    "{} {} failed ({}), retrying in {:?} (attempt {})",
                    http.method.as_str(),
                    http.url,
                    e.kind(),
                    dur,
                    attempt.load(Ordering::SeqCst)
                );
            })
            .await
    }

    pub async fn send_json<R: DeserializeOwned>(
        &self,
        req: &ApiRequest,
        creds: &Credentials,
    ) -> Result<R> {
        let resp = self.send(req, creds).await?;
        serde_json::from_slice(&resp.body).map_err(|e| SyncError::Upstream {
            status: resp.status,
            message: format!("unexpected response body: {e}"),
        })
    }
}
