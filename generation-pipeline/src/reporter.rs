use std::sync::Arc;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::generation_job::{GenerationJob, JobStatus, WorkState},
    },
};
use serde::Serialize;

/// Read-only views over a job record. The orchestrator owns every mutation;
/// this type only shapes what pollers and the results screen see.
#[derive(Clone)]
pub struct ProgressReporter {
    db: Arc<SurrealDbClient>,
}

/// Lightweight polling payload: statuses and counters only, no previews or
/// error messages.
#[derive(Debug, Clone, Serialize)]
pub struct JobProgressView {
    pub job_id: String,
    pub status: JobStatus,
    pub total: u32,
    pub completed: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub items: Vec<ItemProgressView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemProgressView {
    pub item_id: String,
    pub name: String,
    pub status: WorkState,
    pub fields: Vec<FieldProgressView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldProgressView {
    pub name: String,
    pub status: WorkState,
}

/// Full detail for the one-shot "view results" action.
#[derive(Debug, Clone, Serialize)]
pub struct JobResultsView {
    pub job_id: String,
    pub status: JobStatus,
    pub total: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub items: Vec<ItemResultsView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemResultsView {
    pub item_id: String,
    pub name: String,
    pub status: WorkState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit_ref: Option<String>,
    pub fields: Vec<FieldResultsView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldResultsView {
    pub name: String,
    pub status: WorkState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&GenerationJob> for JobProgressView {
    fn from(job: &GenerationJob) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status.clone(),
            total: job.total,
            completed: job.completed,
            succeeded: job.succeeded,
            failed: job.failed,
            items: job
                .items
                .iter()
                .map(|item| ItemProgressView {
                    item_id: item.item_id.clone(),
                    name: item.name.clone(),
                    status: item.state.clone(),
                    fields: item
                        .fields
                        .iter()
                        .map(|field| FieldProgressView {
                            name: field.name.clone(),
                            status: field.state.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

impl From<&GenerationJob> for JobResultsView {
    fn from(job: &GenerationJob) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status.clone(),
            total: job.total,
            succeeded: job.succeeded,
            failed: job.failed,
            items: job
                .items
                .iter()
                .map(|item| ItemResultsView {
                    item_id: item.item_id.clone(),
                    name: item.name.clone(),
                    status: item.state.clone(),
                    edit_ref: item.edit_ref.clone(),
                    fields: item
                        .fields
                        .iter()
                        .map(|field| FieldResultsView {
                            name: field.name.clone(),
                            status: field.state.clone(),
                            preview: field.preview.clone(),
                            error_message: field.error_message.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

impl ProgressReporter {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }

    pub async fn get_progress(&self, job_id: &str) -> Result<JobProgressView, AppError> {
        let job = self.load(job_id).await?;
        Ok(JobProgressView::from(&job))
    }

    pub async fn get_results(&self, job_id: &str) -> Result<JobResultsView, AppError> {
        let job = self.load(job_id).await?;
        Ok(JobResultsView::from(&job))
    }

    async fn load(&self, job_id: &str) -> Result<GenerationJob, AppError> {
        self.db
            .get_item::<GenerationJob>(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {job_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::generation_job::{ItemContext, ItemSubmission};
    use uuid::Uuid;

    async fn memory_db() -> Arc<SurrealDbClient> {
        Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("in-memory surrealdb"),
        )
    }

    fn mixed_outcome_job() -> GenerationJob {
        let mut job = GenerationJob::new(
            "owner-1".to_string(),
            "agent-1".to_string(),
            vec!["description".to_string(), "seo_title".to_string()],
            vec![],
            vec![ItemSubmission {
                item_id: "1".to_string(),
                name: "Widget".to_string(),
                edit_ref: Some("/admin/edit/1".to_string()),
                context: ItemContext::default(),
            }],
        );
        job.begin_item("1").expect("begin item");
        job.begin_field("1", "description").expect("begin field");
        job.complete_field("1", "description", "A fine widget for fine people.")
            .expect("complete field");
        job.begin_field("1", "seo_title").expect("begin field");
        job.fail_field("1", "seo_title", "generation timed out after 60s")
            .expect("fail field");
        job.finish_item("1").expect("finish item");
        job
    }

    #[tokio::test]
    async fn test_progress_excludes_previews_and_errors() {
        let db = memory_db().await;
        let job = mixed_outcome_job();
        db.store_item(job.clone()).await.expect("store");

        let reporter = ProgressReporter::new(Arc::clone(&db));
        let view = reporter.get_progress(&job.id).await.expect("progress");

        assert_eq!(view.job_id, job.id);
        assert_eq!(view.status, JobStatus::Completed);
        assert_eq!(view.total, 1);
        assert_eq!(view.completed, 1);
        assert_eq!(view.succeeded, 1);
        assert_eq!(view.failed, 0);

        let rendered = serde_json::to_value(&view).expect("serialize");
        assert!(rendered.get("items").is_some());
        let text = rendered.to_string();
        // polling payload must not carry content or error bodies
        assert!(!text.contains("fine widget"));
        assert!(!text.contains("timed out"));
        assert_eq!(view.items[0].fields.len(), 2);
    }

    #[tokio::test]
    async fn test_results_include_previews_errors_and_edit_ref() {
        let db = memory_db().await;
        let job = mixed_outcome_job();
        db.store_item(job.clone()).await.expect("store");

        let reporter = ProgressReporter::new(Arc::clone(&db));
        let view = reporter.get_results(&job.id).await.expect("results");

        assert_eq!(view.status, JobStatus::Completed);
        let item = &view.items[0];
        assert_eq!(item.edit_ref.as_deref(), Some("/admin/edit/1"));
        assert_eq!(item.status, WorkState::Completed);

        let description = item
            .fields
            .iter()
            .find(|f| f.name == "description")
            .expect("description");
        assert_eq!(description.status, WorkState::Completed);
        assert!(description
            .preview
            .as_deref()
            .is_some_and(|p| p.contains("fine widget")));
        assert!(description.error_message.is_none());

        let seo_title = item
            .fields
            .iter()
            .find(|f| f.name == "seo_title")
            .expect("seo_title");
        assert_eq!(seo_title.status, WorkState::Failed);
        assert!(seo_title
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("timed out")));
        assert!(seo_title.preview.is_none());
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let db = memory_db().await;
        let reporter = ProgressReporter::new(db);

        let progress = reporter.get_progress("missing").await;
        assert!(matches!(progress, Err(AppError::NotFound(_))));

        let results = reporter.get_results("missing").await;
        assert!(matches!(results, Err(AppError::NotFound(_))));
    }
}
