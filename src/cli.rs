use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::ado::transport::HttpTransport;
use crate::credentials::{
    self, Credentials, ProcessDefaults, RequestSources, ORG_URL_HEADER, PAT_HEADER,
    PROJECT_HEADER,
};
use crate::model::node::{NodeUpdate, StructureGroup};
use crate::model::test_case::{TestCase, TestStep};
use crate::model::token::TokenUpdate;
use crate::sync::SyncService;

const DEFAULT_TOP: usize = 50;
const DEFAULT_DEPTH: u32 = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    TestCase(TestCase),
    Stories { top: usize },
    Story { id: i64 },
    Query { wiql: String, top: usize },
    Update { id: i64, fields: Vec<(String, Value)> },
    Nodes { depth: u32 },
    Node { group: StructureGroup, path: String, depth: u32 },
    NodeUpdate { group: StructureGroup, path: String, update: NodeUpdate },
    Pats,
    Pat { id: String },
    PatUpdate { id: String, update: TokenUpdate },
    PatRevoke { id: String },
    Health,
    Help,
}

/// Positional words plus `--flag value` pairs, in order.
#[derive(Debug, Default)]
struct ParsedArgs {
    positional: Vec<String>,
    flags: Vec<(String, String)>,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Result<Self> {
        let mut parsed = ParsedArgs::default();
        let mut i = 0;
        while i < args.len() {
            let arg = &args[i];
            if arg.starts_with('-') && arg.len() > 1 {
                i += 1;
                let Some(value) = args.get(i) else {
                    bail!("Missing value for {arg} flag");
                };
                parsed.flags.push((arg.clone(), value.clone()));
            } else {
                parsed.positional.push(arg.clone());
            }
            i += 1;
        }
        Ok(parsed)
    }

    fn take(&mut self, names: &[&str]) -> Option<String> {
        let mut found = None;
        self.flags.retain(|(k, v)| {
            if names.contains(&k.as_str()) {
                found = Some(v.clone());
                false
            } else {
                true
            }
        });
        found
    }

    fn take_all(&mut self, names: &[&str]) -> Vec<String> {
        let mut found = Vec::new();
        self.flags.retain(|(k, v)| {
            if names.contains(&k.as_str()) {
                found.push(v.clone());
                false
            } else {
                true
            }
        });
        found
    }

    fn take_parsed<T: std::str::FromStr>(&mut self, names: &[&str]) -> Result<Option<T>> {
        match self.take(names) {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| anyhow::anyhow!("Invalid value for {}: {raw}", names[0])),
        }
    }

    fn finish(self) -> Result<Vec<String>> {
        if let Some((flag, _)) = self.flags.first() {
            bail!("Unknown flag: {flag}");
        }
        Ok(self.positional)
    }
}

/// Identity supplied on the command line; it plays the role of request headers.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Identity {
    pub org_url: Option<String>,
    pub pat: Option<String>,
    pub project: Option<String>,
}

impl Identity {
    pub fn resolve(&self, defaults: &ProcessDefaults) -> Result<Credentials> {
        let mut headers = Vec::new();
        for (name, value) in [
            (PAT_HEADER, &self.pat),
            (ORG_URL_HEADER, &self.org_url),
            (PROJECT_HEADER, &self.project),
        ] {
            if let Some(v) = value {
                headers.push((name.to_string(), v.clone()));
            }
        }
        let sources = RequestSources {
            headers,
            ..Default::default()
        };
        credentials::resolve(&sources, defaults).context(
            "No credentials. Pass --pat/--org, set ADO_PAT/ADO_ORG_URL, or add them to ~/.adosync/config.toml",
        )
    }
}

fn parse_id(raw: Option<&String>, what: &str) -> Result<i64> {
    let raw = raw.with_context(|| format!("Missing {what}"))?;
    raw.parse()
        .with_context(|| format!("Invalid {what}: {raw}"))
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("Invalid date: {raw} (expected YYYY-MM-DD or RFC 3339)"))?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

/// `action | expected result`; the expected part is optional.
fn parse_step(raw: &str) -> TestStep {
    match raw.split_once('|') {
        Some((action, expected)) => TestStep::new(action.trim(), expected.trim()),
        None => TestStep::new(raw.trim(), ""),
    }
}

/// `Field=value`; an empty value removes the field, JSON literals are kept typed.
fn parse_field(raw: &str) -> Result<(String, Value)> {
    let (name, value) = raw
        .split_once('=')
        .with_context(|| format!("Expected Field=value, got: {raw}"))?;
    let value = if value.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()))
    };
    Ok((name.trim().to_string(), value))
}

fn parse_group(raw: Option<&String>) -> Result<StructureGroup> {
    let raw = raw.context("Missing structure group (areas or iterations)")?;
    raw.parse::<StructureGroup>().map_err(anyhow::Error::msg)
}

const IDENTITY_FLAGS: [&str; 4] = ["--org", "--pat", "--project", "-p"];

/// Pull identity flags out of the whole argument list, wherever they appear.
fn split_identity(args: &[String]) -> Result<(Identity, Vec<String>)> {
    let mut identity = Identity::default();
    let mut rest = Vec::with_capacity(args.len());
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if !IDENTITY_FLAGS.contains(&arg.as_str()) {
            rest.push(arg.clone());
            continue;
        }
        let Some(value) = iter.next() else {
            bail!("Missing value for {arg} flag");
        };
        let slot = match arg.as_str() {
            "--org" => &mut identity.org_url,
            "--pat" => &mut identity.pat,
            _ => &mut identity.project,
        };
        *slot = Some(value.clone());
    }
    Ok((identity, rest))
}

/// Split CLI args into identity flags and a command.
pub fn parse_args(args: &[String]) -> Result<(Identity, Command)> {
    let (identity, args) = split_identity(args)?;
    let Some((name, rest)) = args.split_first() else {
        return Ok((identity, Command::Help));
    };
    let mut parsed = ParsedArgs::parse(rest)?;

    let command = match name.as_str() {
        "testcase" | "tc" => {
            let description = parsed.take(&["-d", "--desc", "--description"]).unwrap_or_default();
            let steps = parsed
                .take_all(&["-s", "--step"])
                .iter()
                .map(|s| parse_step(s))
                .collect();
            let case = TestCase {
                id: None,
                title: String::new(),
                description,
                steps,
                assigned_to: parsed.take(&["--assign"]),
                plan_id: parsed.take_parsed(&["--plan"])?,
                suite_id: parsed.take_parsed(&["--suite"])?,
                area_path: parsed.take(&["--area"]),
                iteration_path: parsed.take(&["--iteration"]),
                priority: parsed.take_parsed(&["--priority"])?,
                tags: parsed.take_all(&["--tag"]),
            };
            let title = parsed.finish()?.join(" ");
            if title.trim().is_empty() {
                bail!("Test case title cannot be empty");
            }
            Command::TestCase(TestCase { title, ..case })
        }
        "stories" => {
            let top = parsed.take_parsed(&["--top"])?.unwrap_or(DEFAULT_TOP);
            parsed.finish()?;
            Command::Stories { top }
        }
        "story" => {
            let pos = parsed.finish()?;
            Command::Story {
                id: parse_id(pos.first(), "story id")?,
            }
        }
        "query" => {
            let top = parsed.take_parsed(&["--top"])?.unwrap_or(DEFAULT_TOP);
            let wiql = parsed.finish()?.join(" ");
            if wiql.trim().is_empty() {
                bail!("Missing WIQL query");
            }
            Command::Query { wiql, top }
        }
        "update" => {
            let pos = parsed.finish()?;
            let id = parse_id(pos.first(), "work item id")?;
            let fields = pos[1..]
                .iter()
                .map(|f| parse_field(f))
                .collect::<Result<Vec<_>>>()?;
            if fields.is_empty() {
                bail!("Nothing to update. Usage: adosync update <id> Field=value ...");
            }
            Command::Update { id, fields }
        }
        "nodes" => {
            let depth = parsed.take_parsed(&["--depth"])?.unwrap_or(DEFAULT_DEPTH);
            parsed.finish()?;
            Command::Nodes { depth }
        }
        "node" => {
            let depth = parsed.take_parsed(&["--depth"])?.unwrap_or(DEFAULT_DEPTH);
            let pos = parsed.finish()?;
            Command::Node {
                group: parse_group(pos.first())?,
                path: pos.get(1..).map(|p| p.join(" ")).unwrap_or_default(),
                depth,
            }
        }
        "node-update" => {
            let update = NodeUpdate {
                name: parsed.take(&["--name"]),
                start_date: parsed.take(&["--start"]).map(|d| parse_date(&d)).transpose()?,
                finish_date: parsed.take(&["--finish"]).map(|d| parse_date(&d)).transpose()?,
            };
            let pos = parsed.finish()?;
            Command::NodeUpdate {
                group: parse_group(pos.first())?,
                path: pos.get(1..).map(|p| p.join(" ")).unwrap_or_default(),
                update,
            }
        }
        "pats" => {
            parsed.finish()?;
            Command::Pats
        }
        "pat" | "pat-revoke" => {
            let pos = parsed.finish()?;
            let id = pos.first().context("Missing authorization id")?.clone();
            if name == "pat" {
                Command::Pat { id }
            } else {
                Command::PatRevoke { id }
            }
        }
        "pat-update" => {
            let update = TokenUpdate {
                display_name: parsed.take(&["--name"]),
                scope: parsed.take(&["--scope"]),
                valid_to: parsed.take(&["--valid-to"]).map(|d| parse_date(&d)).transpose()?,
            };
            let pos = parsed.finish()?;
            let id = pos.first().context("Missing authorization id")?.clone();
            Command::PatUpdate { id, update }
        }
        "health" => {
            parsed.finish()?;
            Command::Health
        }
        "help" | "-h" | "--help" => Command::Help,
        other => bail!("Unknown command: {other}. Run `adosync help` for usage."),
    };

    Ok((identity, command))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Execute a parsed command and print its JSON result to stdout.
pub async fn run<T: HttpTransport>(
    service: &SyncService<T>,
    creds: &Credentials,
    command: Command,
) -> Result<()> {
    match command {
        Command::TestCase(case) => {
            let outcome = service.find_or_create_test_case(creds, &case).await?;
            if let Some(kind) = outcome.partial_kind() {
                tracing::warn!(%kind, warnings = outcome.warnings.len(), "test case synced with warnings");
            }
            print_json(&outcome)
        }
        Command::Stories { top } => print_json(&service.list_stories_with_test_cases(creds, top).await?),
        Command::Story { id } => print_json(&service.get_story_with_test_cases(creds, id).await?),
        Command::Query { wiql, top } => print_json(&service.query_work_items(creds, &wiql, top).await?),
        Command::Update { id, fields } => print_json(&service.update_work_item(creds, id, &fields).await?),
        Command::Nodes { depth } => print_json(&service.list_nodes(creds, depth).await?),
        Command::Node { group, path, depth } => {
            print_json(&service.get_node(creds, group, &path, depth).await?)
        }
        Command::NodeUpdate { group, path, update } => {
            print_json(&service.update_node(creds, group, &path, &update).await?)
        }
        Command::Pats => print_json(&service.list_tokens(creds).await?),
        Command::Pat { id } => print_json(&service.get_token(creds, &id).await?),
        Command::PatUpdate { id, update } => {
            print_json(&service.update_token(creds, &id, &update).await?)
        }
        Command::PatRevoke { id } => {
            service.revoke_token(creds, &id).await?;
            print_json(&serde_json::json!({ "revoked": id }))
        }
        Command::Health => {
            let report = service.health_check(creds).await;
            print_json(&report)?;
            if !report.healthy {
                bail!("Health check failed");
            }
            Ok(())
        }
        Command::Help => {
            print_help();
            Ok(())
        }
    }
}

pub fn print_help() {
    println!("adosync: sync test cases and work items with Azure DevOps / TFS\n");
    println!("USAGE:");
    println!("  adosync <command> [args] [--org URL] [--pat TOKEN] [--project NAME]\n");
    println!("COMMANDS:");
    println!("  testcase <title>            Find or create a test case by exact title");
    println!("      -d, --desc <text>       Description");
    println!("      -s, --step <a | e>      Step: action, optionally '|' expected result (repeatable)");
    println!("      --assign <who>          Assignee (defaults to @me)");
    println!("      --plan <id> --suite <id>  Add the test case to a suite");
    println!("      --area, --iteration, --priority, --tag");
    println!("  stories [--top N]           User stories with linked test case ids");
    println!("  story <id>                  One story with its test cases");
    println!("  query <wiql> [--top N]      Run a WIQL query");
    println!("  update <id> Field=value...  Update work item fields (Field= removes)");
    println!("  nodes [--depth N]           Area and iteration roots");
    println!("  node <areas|iterations> [path] [--depth N]");
    println!("  node-update <areas|iterations> <path> [--name X] [--start D] [--finish D]");
    println!("  pats | pat <id> | pat-revoke <id>");
    println!("  pat-update <id> [--name X] [--scope S] [--valid-to D]");
    println!("  health                      Connectivity and permission diagnostics");
    println!();
    println!("Credentials fall back to ADO_ORG_URL / ADO_PAT / ADO_PROJECT, then ~/.adosync/config.toml.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(strs: &[&str]) -> Vec<String> {
        strs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_args_is_help() {
        let (_, cmd) = parse_args(&[]).unwrap();
        assert_eq!(cmd, Command::Help);
    }

    #[test]
    fn parse_testcase_with_steps_and_suite() {
        let (identity, cmd) = parse_args(&args(&[
            "testcase", "Login", "Smoke", "Test",
            "-d", "Happy path",
            "-s", "Open /login | Form shown",
            "-s", "Submit",
            "--plan", "10", "--suite", "20",
            "--project", "Fabrikam",
        ]))
        .unwrap();
        assert_eq!(identity.project.as_deref(), Some("Fabrikam"));
        let Command::TestCase(case) = cmd else {
            panic!("expected testcase command");
        };
        assert_eq!(case.title, "Login Smoke Test");
        assert_eq!(case.description, "Happy path");
        assert_eq!(case.steps, vec![TestStep::new("Open /login", "Form shown"), TestStep::new("Submit", "")]);
        assert_eq!(case.plan_id, Some(10));
        assert_eq!(case.suite_id, Some(20));
        assert_eq!(case.assigned_to, None);
    }

    #[test]
    fn parse_testcase_without_title_fails() {
        let err = parse_args(&args(&["testcase", "-d", "desc"])).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn parse_missing_flag_value_fails() {
        let err = parse_args(&args(&["stories", "--top"])).unwrap_err();
        assert!(err.to_string().contains("Missing value"));
    }

    #[test]
    fn parse_rejects_unknown_flags() {
        let err = parse_args(&args(&["stories", "--bogus", "1"])).unwrap_err();
        assert!(err.to_string().contains("Unknown flag"));
    }

    #[test]
    fn parse_invalid_number_fails() {
        let err = parse_args(&args(&["testcase", "T", "--plan", "ten"])).unwrap_err();
        assert!(err.to_string().contains("Invalid value"));
    }

    #[test]
    fn parse_update_fields() {
        let (_, cmd) = parse_args(&args(&[
            "update", "42", "System.State=Closed", "Microsoft.VSTS.Common.Priority=1", "System.Tags=",
        ]))
        .unwrap();
        assert_eq!(
            cmd,
            Command::Update {
                id: 42,
                fields: vec![
                    ("System.State".into(), json!("Closed")),
                    ("Microsoft.VSTS.Common.Priority".into(), json!(1)),
                    ("System.Tags".into(), Value::Null),
                ]
            }
        );
    }

    #[test]
    fn parse_node_update_dates() {
        let (_, cmd) = parse_args(&args(&[
            "node-update", "iterations", "Release 1\\Sprint 2",
            "--start", "2026-03-02", "--finish", "2026-03-13T00:00:00Z",
        ]))
        .unwrap();
        let Command::NodeUpdate { group, path, update } = cmd else {
            panic!("expected node-update");
        };
        assert_eq!(group, StructureGroup::Iterations);
        assert_eq!(path, "Release 1\\Sprint 2");
        assert_eq!(update.start_date.unwrap().to_rfc3339(), "2026-03-02T00:00:00+00:00");
        assert!(update.finish_date.is_some());
    }

    #[test]
    fn parse_bad_date_fails() {
        assert!(parse_args(&args(&["pat-update", "abc", "--valid-to", "next week"])).is_err());
    }

    #[test]
    fn identity_flags_may_precede_the_command() {
        let (identity, cmd) = parse_args(&args(&[
            "--org", "https://dev.azure.com/fabrikam", "-p", "Fabrikam", "stories", "--top", "5",
            "--pat", "secret",
        ]))
        .unwrap();
        assert_eq!(cmd, Command::Stories { top: 5 });
        assert_eq!(
            identity,
            Identity {
                org_url: Some("https://dev.azure.com/fabrikam".into()),
                pat: Some("secret".into()),
                project: Some("Fabrikam".into()),
            }
        );
    }

    #[test]
    fn identity_flag_without_value_fails() {
        let err = parse_args(&args(&["--org"])).unwrap_err();
        assert!(err.to_string().contains("Missing value for --org"));
    }

    #[test]
    fn parse_unknown_command_fails() {
        assert!(parse_args(&args(&["frobnicate"])).is_err());
    }

    #[test]
    fn identity_flags_outrank_defaults() {
        let identity = Identity {
            org_url: None,
            pat: Some("flag-pat".into()),
            project: None,
        };
        let defaults = ProcessDefaults {
            organization_url: Some("https://dev.azure.com/d".into()),
            personal_access_token: Some("env-pat".into()),
            project: Some("P".into()),
        };
        let creds = identity.resolve(&defaults).unwrap();
        assert_eq!(creds.personal_access_token, "flag-pat");
        assert_eq!(creds.organization_url, "https://dev.azure.com/d");
    }

    #[test]
    fn identity_without_any_pat_fails() {
        let err = Identity::default()
            .resolve(&ProcessDefaults::default())
            .unwrap_err();
        assert!(err.to_string().contains("No credentials"));
    }
}
