use serde::Serialize;

use super::SyncService;
use crate::ado::client::{segment, ApiRequest};
use crate::ado::relations::extract_linked_ids;
use crate::ado::transport::HttpTransport;
use crate::ado::wiql;
use crate::credentials::Credentials;
use crate::error::{ErrorKind, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub name: &'static str,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub optional: bool,
}

impl CheckResult {
    fn pass(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Pass,
            reason: None,
            detail: None,
            optional: false,
        }
    }

    fn fail(name: &'static str, err: &SyncError) -> Self {
        Self {
            name,
            status: CheckStatus::Fail,
            reason: Some(err.kind()),
            detail: Some(err.to_string()),
            optional: false,
        }
    }

    fn skipped(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            reason: None,
            detail: Some(detail.into()),
            optional: false,
        }
    }

    fn from_result<V>(name: &'static str, result: &Result<V, SyncError>) -> Self {
        match result {
            Ok(_) => Self::pass(name),
            Err(e) => Self::fail(name, e),
        }
    }

    fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub checks: Vec<CheckResult>,
}

impl HealthReport {
    fn new(checks: Vec<CheckResult>) -> Self {
        let healthy = !checks
            .iter()
            .any(|c| !c.optional && c.status == CheckStatus::Fail);
        Self { healthy, checks }
    }
}

const CHECKS: [&str; 6] = [
    "connectivity",
    "authentication",
    "project_access",
    "work_item_query",
    "relation_expansion",
    "test_plan_access",
];

fn skip_rest(checks: &mut Vec<CheckResult>, after: &str) {
    for name in CHECKS[checks.len()..].iter().copied() {
        let mut skipped = CheckResult::skipped(name, format!("skipped: {after} failed"));
        skipped.optional = name == "test_plan_access";
        checks.push(skipped);
    }
}

impl<T: HttpTransport> SyncService<T> {
    /// Read-only diagnostics: one minimal call per capability, in order.
    /// Later checks are skipped once an earlier prerequisite fails.
    pub async fn health_check(&self, creds: &Credentials) -> HealthReport {
        let mut checks = Vec::with_capacity(CHECKS.len());
        let projects = ApiRequest::get("_apis/projects", self.wit_version()).query("$top", 1);

        // Any HTTP response at all proves the host is reachable.
        let connectivity = self
            .client
            .probe(&projects, creds)
            .await
            .map_err(|e| SyncError::Network(e.to_string()));
        checks.push(CheckResult::from_result("connectivity", &connectivity));
        if connectivity.is_err() {
            skip_rest(&mut checks, "connectivity");
            return HealthReport::new(checks);
        }

        let auth = self.client.send(&projects, creds).await;
        checks.push(CheckResult::from_result("authentication", &auth));
        if auth.is_err() {
            skip_rest(&mut checks, "authentication");
            return HealthReport::new(checks);
        }

        let project = match creds.require_project() {
            Ok(p) => p,
            Err(e) => {
                checks.push(CheckResult::fail("project_access", &e));
                skip_rest(&mut checks, "project_access");
                return HealthReport::new(checks);
            }
        };
        let access = self
            .client
            .send(
                &ApiRequest::get(format!("_apis/projects/{}", segment(project)), self.wit_version()),
                creds,
            )
            .await;
        checks.push(CheckResult::from_result("project_access", &access));
        if access.is_err() {
            skip_rest(&mut checks, "project_access");
            return HealthReport::new(checks);
        }

        let query = wiql::execute(
            &self.client,
            creds,
            project,
            "SELECT [System.Id] FROM WorkItems WHERE [System.TeamProject] = @project ORDER BY [System.Id] DESC",
            Some(1),
            self.wit_version(),
        )
        .await;
        checks.push(CheckResult::from_result("work_item_query", &query));

        match query.as_ref().ok().and_then(|r| r.first()) {
            Some(id) => {
                let expanded = self.get_work_item(creds, id).await;
                let mut check = CheckResult::from_result("relation_expansion", &expanded);
                if let Ok(item) = &expanded {
                    let linked = extract_linked_ids(&item.relations).len();
                    check.detail = Some(format!("work item {id} has {linked} linked items"));
                }
                checks.push(check);
            }
            None if query.is_ok() => checks.push(CheckResult::skipped(
                "relation_expansion",
                "project has no work items to expand",
            )),
            None => checks.push(CheckResult::skipped(
                "relation_expansion",
                "skipped: work_item_query failed",
            )),
        }

        let test_plans = match self.settings.api.test_plans.as_deref() {
            None => CheckResult::skipped(
                "test_plan_access",
                "test plan endpoints disabled for this server",
            ),
            Some(version) => {
                let req = ApiRequest::get(
                    format!("{}/_apis/testplan/plans", segment(project)),
                    version,
                );
                CheckResult::from_result("test_plan_access", &self.client.send(&req, creds).await)
            }
        };
        checks.push(test_plans.optional());

        HealthReport::new(checks)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ado::transport::{HttpMethod, MockTransport};
    use crate::sync::testing::{creds, service, ORG, PROJECT};

    fn projects_url() -> String {
        format!("{ORG}/_apis/projects?$top=1&api-version=7.1")
    }

    fn wiql_top1() -> String {
        format!("{ORG}/{PROJECT}/_apis/wit/wiql?$top=1&api-version=7.1")
    }

    #[tokio::test]
    async fn all_checks_pass() {
        let transport = MockTransport::new();
        transport.respond_json(HttpMethod::Get, projects_url(), 200, json!({"value": []}));
        transport.respond_json(HttpMethod::Get, projects_url(), 200, json!({"value": []}));
        transport.respond_json(
            HttpMethod::Get,
            format!("{ORG}/_apis/projects/{PROJECT}?api-version=7.1"),
            200,
            json!({"id": "p"}),
        );
        transport.respond_json(HttpMethod::Post, wiql_top1(), 200, json!({"workItems": [{"id": 77}]}));
        transport.respond_json(
            HttpMethod::Get,
            format!("{ORG}/_apis/wit/workitems/77?$expand=relations&api-version=7.1"),
            200,
            json!({"id": 77, "fields": {}, "relations": []}),
        );
        transport.respond_json(
            HttpMethod::Get,
            format!("{ORG}/{PROJECT}/_apis/testplan/plans?api-version=7.1"),
            200,
            json!({"value": []}),
        );

        let report = service(&transport).health_check(&creds()).await;
        assert!(report.healthy);
        assert_eq!(report.checks.len(), 6);
        assert!(report.checks.iter().all(|c| c.status == CheckStatus::Pass));
        assert_eq!(
            report.checks[4].detail.as_deref(),
            Some("work item 77 has 0 linked items")
        );
    }

    #[tokio::test]
    async fn dns_failure_skips_everything_else() {
        let transport = MockTransport::new();
        transport.fail_connect(HttpMethod::Get, projects_url());

        let report = service(&transport).health_check(&creds()).await;
        assert!(!report.healthy);
        assert_eq!(report.checks[0].reason, Some(ErrorKind::NetworkUnreachable));
        assert!(report.checks[1..]
            .iter()
            .all(|c| c.status == CheckStatus::Skipped));
        assert_eq!(report.checks.len(), 6);
    }

    #[tokio::test]
    async fn bad_token_reports_auth_reason() {
        let transport = MockTransport::new();
        transport.respond(HttpMethod::Get, projects_url(), 401, "");
        transport.respond(HttpMethod::Get, projects_url(), 401, "");

        let report = service(&transport).health_check(&creds()).await;
        assert!(!report.healthy);
        assert_eq!(report.checks[0].status, CheckStatus::Pass);
        assert_eq!(report.checks[1].reason, Some(ErrorKind::AuthError));
        assert_eq!(report.checks[2].status, CheckStatus::Skipped);
    }

    #[tokio::test]
    async fn missing_test_plans_does_not_fail_report() {
        let transport = MockTransport::new();
        transport.respond_json(HttpMethod::Get, projects_url(), 200, json!({}));
        transport.respond_json(HttpMethod::Get, projects_url(), 200, json!({}));
        transport.respond_json(
            HttpMethod::Get,
            format!("{ORG}/_apis/projects/{PROJECT}?api-version=7.1"),
            200,
            json!({}),
        );
        transport.respond_json(HttpMethod::Post, wiql_top1(), 200, json!({"workItems": []}));
        transport.respond(
            HttpMethod::Get,
            format!("{ORG}/{PROJECT}/_apis/testplan/plans?api-version=7.1"),
            404,
            "",
        );

        let report = service(&transport).health_check(&creds()).await;
        assert!(report.healthy);
        let relation = &report.checks[4];
        assert_eq!(relation.status, CheckStatus::Skipped);
        let plans = &report.checks[5];
        assert_eq!(plans.status, CheckStatus::Fail);
        assert_eq!(plans.reason, Some(ErrorKind::NotFound));
        assert!(plans.optional);
    }
}
