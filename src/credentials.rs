use std::fmt;

use crate::error::{Result, SyncError};

pub const PAT_HEADER: &str = "X-Pat";
pub const ORG_URL_HEADER: &str = "X-OrgUrl";
pub const PROJECT_HEADER: &str = "X-Project";

/// Effective identity for one logical operation. Never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub organization_url: String,
    pub personal_access_token: String,
    pub project: Option<String>,
}

impl Credentials {
    pub fn new(organization_url: &str, pat: &str, project: Option<&str>) -> Self {
        Self {
            organization_url: organization_url.trim_end_matches('/').to_string(),
            personal_access_token: pat.to_string(),
            project: project.map(String::from),
        }
    }

    /// Project name for project-scoped endpoints; absent is a local validation failure.
    pub fn require_project(&self) -> Result<&str> {
        self.project
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| SyncError::validation("a project is required for this operation"))
    }
}

// The token must never reach logs or debug output.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("organization_url", &self.organization_url)
            .field("personal_access_token", &"<redacted>")
            .field("project", &self.project)
            .finish()
    }
}

/// Partial credential values from one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialHints {
    pub organization_url: Option<String>,
    pub personal_access_token: Option<String>,
    pub project: Option<String>,
}

/// Process-wide fallbacks, built once in `main` and injected.
pub type ProcessDefaults = CredentialHints;

/// Everything a single inbound request offers towards its identity.
#[derive(Debug, Clone, Default)]
pub struct RequestSources {
    pub headers: Vec<(String, String)>,
    pub body: CredentialHints,
    pub query: CredentialHints,
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Resolve the effective credentials.
///
/// Precedence, highest first: headers, request body, query parameters, process
/// defaults. Each field is resolved independently.
pub fn resolve(sources: &RequestSources, defaults: &ProcessDefaults) -> Result<Credentials> {
    let pick = |from_header: Option<&str>, select: fn(&CredentialHints) -> Option<&String>| {
        non_empty(from_header)
            .or_else(|| non_empty(select(&sources.body).map(String::as_str)))
            .or_else(|| non_empty(select(&sources.query).map(String::as_str)))
            .or_else(|| non_empty(select(defaults).map(String::as_str)))
            .map(String::from)
    };

    let pat = pick(header(&sources.headers, PAT_HEADER), |h| {
        h.personal_access_token.as_ref()
    })
    .ok_or(SyncError::MissingCredential("personal access token"))?;

    let org_url = pick(header(&sources.headers, ORG_URL_HEADER), |h| {
        h.organization_url.as_ref()
    })
    .ok_or(SyncError::MissingCredential("organization url"))?;

    let project = pick(header(&sources.headers, PROJECT_HEADER), |h| h.project.as_ref());

    Ok(Credentials::new(&org_url, &pat, project.as_deref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn hints(org: &str, pat: &str, project: &str) -> CredentialHints {
        CredentialHints {
            organization_url: Some(org.into()),
            personal_access_token: Some(pat.into()),
            project: Some(project.into()),
        }
    }

    fn headers(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn header_wins_over_body_and_defaults() {
        let sources = RequestSources {
            headers: headers(&[("x-pat", "header-pat"), ("x-orgurl", "https://dev.azure.com/h")]),
            body: hints("https://dev.azure.com/b", "body-pat", "BodyProject"),
            query: CredentialHints::default(),
        };
        let defaults = hints("https://dev.azure.com/d", "default-pat", "Default");

        let creds = resolve(&sources, &defaults).unwrap();
        assert_eq!(creds.personal_access_token, "header-pat");
        assert_eq!(creds.organization_url, "https://dev.azure.com/h");
        // No project header, so the body tier supplies it.
        assert_eq!(creds.project.as_deref(), Some("BodyProject"));
    }

    #[test]
    fn mixed_case_header_names_are_accepted() {
        let sources = RequestSources {
            headers: headers(&[("X-Pat", "p"), ("X-OrgUrl", "https://dev.azure.com/o/")]),
            ..Default::default()
        };
        let creds = resolve(&sources, &ProcessDefaults::default()).unwrap();
        assert_eq!(creds.personal_access_token, "p");
        assert_eq!(creds.organization_url, "https://dev.azure.com/o");
    }

    #[test]
    fn body_wins_over_query_and_defaults() {
        let sources = RequestSources {
            headers: Vec::new(),
            body: hints("https://dev.azure.com/b", "body-pat", "B"),
            query: hints("https://dev.azure.com/q", "query-pat", "Q"),
        };
        let creds = resolve(&sources, &hints("https://d", "d", "D")).unwrap();
        assert_eq!(creds.personal_access_token, "body-pat");
        assert_eq!(creds.project.as_deref(), Some("B"));
    }

    #[test]
    fn defaults_fill_in_when_request_is_silent() {
        let defaults = hints("https://dev.azure.com/d", "default-pat", "Default");
        let creds = resolve(&RequestSources::default(), &defaults).unwrap();
        assert_eq!(creds.personal_access_token, "default-pat");
        assert_eq!(creds.project.as_deref(), Some("Default"));
    }

    #[test]
    fn blank_values_fall_through_to_lower_tiers() {
        let sources = RequestSources {
            headers: headers(&[("x-pat", "  ")]),
            ..Default::default()
        };
        let defaults = hints("https://dev.azure.com/d", "default-pat", "D");
        let creds = resolve(&sources, &defaults).unwrap();
        assert_eq!(creds.personal_access_token, "default-pat");
    }

    #[test]
    fn no_pat_anywhere_is_missing_credential() {
        let defaults = CredentialHints {
            organization_url: Some("https://dev.azure.com/d".into()),
            ..Default::default()
        };
        let err = resolve(&RequestSources::default(), &defaults).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingCredential);
    }

    #[test]
    fn debug_output_redacts_token() {
        let creds = Credentials::new("https://dev.azure.com/o", "super-secret", None);
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn require_project_fails_locally() {
        let creds = Credentials::new("https://dev.azure.com/o", "p", None);
        assert_eq!(
            creds.require_project().unwrap_err().kind(),
            ErrorKind::ValidationError
        );
    }
}
