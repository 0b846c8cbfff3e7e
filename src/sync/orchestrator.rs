use serde_json::{json, Value};

use super::SyncService;
use crate::ado::builder::{build_create_test_case, build_update_fields};
use crate::ado::cache::ReadCache;
use crate::ado::client::{segment, ApiRequest};
use crate::ado::relations::{extract_linked_ids_of, hydrate};
use crate::ado::transport::{HttpMethod, HttpTransport};
use crate::ado::wiql::{self, items_of_type_query, TEST_CASE_TYPE};
use crate::credentials::Credentials;
use crate::error::{Result, SyncError};
use crate::model::test_case::{SyncOutcome, TestCase};
use crate::model::work_item::{StorySummary, StoryWithTestCases, WorkItem, TESTED_BY};

impl<T: HttpTransport> SyncService<T> {
    /// Find a test case by exact title in the project, creating it when absent,
    /// then optionally attach it to a suite.
    ///
    /// There is no cross-request exclusion: two concurrent calls with the same
    /// title can both miss in the search and both create.
    pub async fn find_or_create_test_case(
        &self,
        creds: &Credentials,
        case: &TestCase,
    ) -> Result<SyncOutcome> {
        let title = case.title.trim();
        if title.is_empty() {
            return Err(SyncError::validation("test case title is required"));
        }
        let project = creds.require_project()?;

        let matches = wiql::find_existing(
            &self.client,
            creds,
            project,
            title,
            TEST_CASE_TYPE,
            self.wit_version(),
        )
        .await?;

        let (id, created) = match matches.first() {
            Some(&id) => {
                if matches.len() > 1 {
                    tracing::warn!(id, count = matches.len(), "several test cases share this title, reusing the oldest");
                }
                tracing::info!(id, "reusing existing test case");
                (id, false)
            }
            None => {
                let mut fields = case.clone();
                fields.title = title.to_string();
                let id = self.create_test_case(creds, project, &fields).await?;
                tracing::info!(id, "created test case");
                (id, true)
            }
        };

        let mut warnings = Vec::new();
        match (case.plan_id, case.suite_id) {
            (Some(plan), Some(suite)) => {
                if let Err(e) = self.add_to_suite(creds, project, plan, suite, id).await {
                    tracing::warn!(id, plan, suite, kind = %e.kind(), "suite linking failed");
                    warnings.push(format!(
                        "test case {id} could not be added to plan {plan} suite {suite}: {e}"
                    ));
                }
            }
            (None, None) => {}
            _ => warnings.push(
                "both planId and suiteId are required to add a test case to a suite".to_string(),
            ),
        }

        Ok(SyncOutcome {
            created,
            id,
            warnings,
        })
    }

    async fn create_test_case(
        &self,
        creds: &Credentials,
        project: &str,
        case: &TestCase,
    ) -> Result<i64> {
        let doc = build_create_test_case(case, case.assigned_to.as_deref());
        let req = ApiRequest::post(
            format!(
                "{}/_apis/wit/workitems/${}",
                segment(project),
                segment(TEST_CASE_TYPE)
            ),
            self.wit_version(),
        )
        .json_patch(doc);
        let item: WorkItem = self.client.send_json(&req, creds).await?;
        Ok(item.id)
    }

    async fn add_to_suite(
        &self,
        creds: &Credentials,
        project: &str,
        plan_id: i64,
        suite_id: i64,
        test_case_id: i64,
    ) -> Result<()> {
        let version = self.settings.api.test_plans.as_deref().ok_or_else(|| {
            SyncError::validation("test plan endpoints are not available on this server")
        })?;
        let req = ApiRequest::post(
            format!(
                "{}/_apis/testplan/Plans/{plan_id}/Suites/{suite_id}/TestCase",
                segment(project)
            ),
            version,
        )
        .json(json!([{ "workItem": { "id": test_case_id } }]));
        self.client.send(&req, creds).await?;
        Ok(())
    }

    /// User stories of the project with the ids of their linked test cases.
    pub async fn list_stories_with_test_cases(
        &self,
        creds: &Credentials,
        top: usize,
    ) -> Result<Vec<StorySummary>> {
        let project = creds.require_project()?;
        let key = ReadCache::key(
            creds,
            "stories",
            &format!("type={}&top={top}", self.settings.story_type),
        );
        if let Some(hit) = self.cache.get::<Vec<StorySummary>>(&key) {
            tracing::debug!("stories served from cache");
            return Ok(hit);
        }

        let ids = wiql::execute(
            &self.client,
            creds,
            project,
            &items_of_type_query(&self.settings.story_type),
            Some(top),
            self.wit_version(),
        )
        .await?
        .capped(top);
        let items = hydrate(
            &self.client,
            creds,
            &ids.ids,
            self.settings.batch_size,
            self.wit_version(),
        )
        .await?;

        let stories: Vec<StorySummary> = items
            .iter()
            .map(|item| StorySummary {
                story: item.summary(),
                test_case_ids: extract_linked_ids_of(&item.relations, TESTED_BY),
            })
            .collect();
        self.cache.put(key, &stories);
        Ok(stories)
    }

    /// One story with its linked test cases resolved to summaries.
    pub async fn get_story_with_test_cases(
        &self,
        creds: &Credentials,
        story_id: i64,
    ) -> Result<StoryWithTestCases> {
        let key = ReadCache::key(creds, "story", &story_id.to_string());
        if let Some(hit) = self.cache.get::<StoryWithTestCases>(&key) {
            return Ok(hit);
        }

        let story = self.get_work_item(creds, story_id).await?;
        let linked = extract_linked_ids_of(&story.relations, TESTED_BY);
        let test_cases = hydrate(
            &self.client,
            creds,
            &linked,
            self.settings.batch_size,
            self.wit_version(),
        )
        .await?;

        let result = StoryWithTestCases {
            story: story.summary(),
            test_cases: test_cases.iter().map(WorkItem::summary).collect(),
        };
        self.cache.put(key, &result);
        Ok(result)
    }

    pub async fn get_work_item(&self, creds: &Credentials, id: i64) -> Result<WorkItem> {
        let req = ApiRequest::get(format!("_apis/wit/workitems/{id}"), self.wit_version())
            .query("$expand", "relations");
        self.client.send_json(&req, creds).await
    }

    /// Run a caller-supplied WIQL query and hydrate up to `top` results.
    pub async fn query_work_items(
        &self,
        creds: &Credentials,
        query: &str,
        top: usize,
    ) -> Result<Vec<WorkItem>> {
        let project = creds.require_project()?;
        let ids = wiql::execute(&self.client, creds, project, query, Some(top), self.wit_version())
            .await?
            .capped(top);
        hydrate(
            &self.client,
            creds,
            &ids.ids,
            self.settings.batch_size,
            self.wit_version(),
        )
        .await
    }

    pub async fn update_work_item(
        &self,
        creds: &Credentials,
        id: i64,
        fields: &[(String, Value)],
    ) -> Result<WorkItem> {
        let doc = build_update_fields(fields)?;
        tracing::info!(id, operations = doc.len(), "updating work item");
        let req = ApiRequest::new(
            HttpMethod::Patch,
            format!("_apis/wit/workitems/{id}"),
            self.wit_version(),
        )
        .json_patch(doc);
        self.client.send_json(&req, creds).await
    }
}
