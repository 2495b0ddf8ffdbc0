use state_machines::state_machine;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Cap on the stored snippet of generated content. Full text never lives on
/// the job record; the preview is what progress UIs render.
pub const PREVIEW_MAX_CHARS: usize = 150;

#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    #[serde(rename = "processing")]
    #[default]
    Processing,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }
}

/// Shared lifecycle for items and their fields: pending until a worker picks
/// the unit up, then exactly one terminal outcome.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum WorkState {
    #[serde(rename = "pending")]
    #[default]
    Pending,
    #[serde(rename = "processing")]
    Processing,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

impl WorkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkState::Pending => "pending",
            WorkState::Processing => "processing",
            WorkState::Completed => "completed",
            WorkState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkState::Completed | WorkState::Failed)
    }
}

#[derive(Debug, Clone, Copy)]
enum JobTransition {
    Complete,
    Cancel,
}

impl JobTransition {
    fn as_str(&self) -> &'static str {
        match self {
            JobTransition::Complete => "complete",
            JobTransition::Cancel => "cancel",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum WorkTransition {
    Begin,
    Complete,
    Fail,
    Release,
}

impl WorkTransition {
    fn as_str(&self) -> &'static str {
        match self {
            WorkTransition::Begin => "begin",
            WorkTransition::Complete => "complete",
            WorkTransition::Fail => "fail",
            WorkTransition::Release => "release",
        }
    }
}

mod job_lifecycle {
    use super::state_machine;

    state_machine! {
        name: JobLifecycleMachine,
        initial: Processing,
        states: [Processing, Completed, Cancelled],
        events {
            complete {
                transition: { from: Processing, to: Completed }
            }
            cancel {
                transition: { from: Processing, to: Cancelled }
            }
        }
    }

    pub(super) fn processing() -> JobLifecycleMachine<(), Processing> {
        JobLifecycleMachine::new(())
    }
}

mod work_lifecycle {
    use super::state_machine;

    state_machine! {
        name: WorkLifecycleMachine,
        initial: Pending,
        states: [Pending, Processing, Completed, Failed],
        events {
            begin {
                transition: { from: Pending, to: Processing }
            }
            complete {
                transition: { from: Processing, to: Completed }
            }
            fail {
                transition: { from: Processing, to: Failed }
            }
            release {
                transition: { from: Processing, to: Pending }
            }
        }
    }

    pub(super) fn pending() -> WorkLifecycleMachine<(), Pending> {
        WorkLifecycleMachine::new(())
    }

    pub(super) fn processing() -> WorkLifecycleMachine<(), Processing> {
        pending()
            .begin()
            .expect("begin transition from Pending should exist")
    }
}

fn invalid_job_transition(state: &JobStatus, event: JobTransition) -> AppError {
    AppError::Validation(format!(
        "Invalid job transition: {} -> {}",
        state.as_str(),
        event.as_str()
    ))
}

fn invalid_work_transition(state: &WorkState, event: WorkTransition) -> AppError {
    AppError::Validation(format!(
        "Invalid work transition: {} -> {}",
        state.as_str(),
        event.as_str()
    ))
}

fn compute_next_job_status(state: &JobStatus, event: JobTransition) -> Result<JobStatus, AppError> {
    use job_lifecycle::processing;
    match (state, event) {
        (JobStatus::Processing, JobTransition::Complete) => processing()
            .complete()
            .map(|_| JobStatus::Completed)
            .map_err(|_| invalid_job_transition(state, event)),
        (JobStatus::Processing, JobTransition::Cancel) => processing()
            .cancel()
            .map(|_| JobStatus::Cancelled)
            .map_err(|_| invalid_job_transition(state, event)),
        _ => Err(invalid_job_transition(state, event)),
    }
}

fn compute_next_work_state(state: &WorkState, event: WorkTransition) -> Result<WorkState, AppError> {
    use work_lifecycle::{pending, processing};
    match (state, event) {
        (WorkState::Pending, WorkTransition::Begin) => pending()
            .begin()
            .map(|_| WorkState::Processing)
            .map_err(|_| invalid_work_transition(state, event)),
        (WorkState::Processing, WorkTransition::Complete) => processing()
            .complete()
            .map(|_| WorkState::Completed)
            .map_err(|_| invalid_work_transition(state, event)),
        (WorkState::Processing, WorkTransition::Fail) => processing()
            .fail()
            .map(|_| WorkState::Failed)
            .map_err(|_| invalid_work_transition(state, event)),
        (WorkState::Processing, WorkTransition::Release) => processing()
            .release()
            .map(|_| WorkState::Pending)
            .map_err(|_| invalid_work_transition(state, event)),
        _ => Err(invalid_work_transition(state, event)),
    }
}

/// Generation context captured at submission time. Never re-fetched from the
/// source catalog while the job runs.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct ItemContext {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// One item handed to `start`, before it becomes a tracked `JobItem`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSubmission {
    pub item_id: String,
    pub name: String,
    pub edit_ref: Option<String>,
    pub context: ItemContext,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct FieldOutcome {
    pub name: String,
    pub state: WorkState,
    pub preview: Option<String>,
    pub error_message: Option<String>,
}

impl FieldOutcome {
    pub fn pending(name: String) -> Self {
        Self {
            name,
            state: WorkState::Pending,
            preview: None,
            error_message: None,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct JobItem {
    pub item_id: String,
    /// Display label captured at submission so it survives the source item
    /// being renamed or deleted mid-run.
    pub name: String,
    pub edit_ref: Option<String>,
    pub context: ItemContext,
    pub state: WorkState,
    pub fields: Vec<FieldOutcome>,
}

stored_object!(GenerationJob, "generation_job", {
    owner_id: String,
    status: JobStatus,
    agent_id: String,
    requested_fields: Vec<String>,
    keywords: Vec<String>,
    total: u32,
    completed: u32,
    succeeded: u32,
    failed: u32,
    items: Vec<JobItem>
});

/// Char-boundary-safe truncation of generated text for display.
pub fn preview_of(text: &str) -> String {
    text.trim().chars().take(PREVIEW_MAX_CHARS).collect()
}

impl GenerationJob {
    pub fn new(
        owner_id: String,
        agent_id: String,
        requested_fields: Vec<String>,
        keywords: Vec<String>,
        submissions: Vec<ItemSubmission>,
    ) -> Self {
        let now = Utc::now();
        let items: Vec<JobItem> = submissions
            .into_iter()
            .map(|submission| JobItem {
                item_id: submission.item_id,
                name: submission.name,
                edit_ref: submission.edit_ref,
                context: submission.context,
                state: WorkState::Pending,
                fields: requested_fields
                    .iter()
                    .map(|field| FieldOutcome::pending(field.clone()))
                    .collect(),
            })
            .collect();

        Self {
            id: Uuid::new_v4().to_string(),
            owner_id,
            status: JobStatus::Processing,
            agent_id,
            requested_fields,
            keywords,
            total: items.len() as u32,
            completed: 0,
            succeeded: 0,
            failed: 0,
            items,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn item(&self, item_id: &str) -> Option<&JobItem> {
        self.items.iter().find(|item| item.item_id == item_id)
    }

    fn item_mut(&mut self, item_id: &str) -> Result<&mut JobItem, AppError> {
        self.items
            .iter_mut()
            .find(|item| item.item_id == item_id)
            .ok_or_else(|| AppError::NotFound(format!("item {item_id} in job")))
    }

    fn field_mut(&mut self, item_id: &str, field: &str) -> Result<&mut FieldOutcome, AppError> {
        let item = self.item_mut(item_id)?;
        item.fields
            .iter_mut()
            .find(|outcome| outcome.name == field)
            .ok_or_else(|| AppError::NotFound(format!("field {field} on item {item_id}")))
    }

    pub fn begin_item(&mut self, item_id: &str) -> Result<(), AppError> {
        let item = self.item_mut(item_id)?;
        item.state = compute_next_work_state(&item.state, WorkTransition::Begin)?;
        Ok(())
    }

    pub fn begin_field(&mut self, item_id: &str, field: &str) -> Result<(), AppError> {
        let outcome = self.field_mut(item_id, field)?;
        outcome.state = compute_next_work_state(&outcome.state, WorkTransition::Begin)?;
        Ok(())
    }

    pub fn complete_field(&mut self, item_id: &str, field: &str, text: &str) -> Result<(), AppError> {
        let outcome = self.field_mut(item_id, field)?;
        outcome.state = compute_next_work_state(&outcome.state, WorkTransition::Complete)?;
        outcome.preview = Some(preview_of(text));
        outcome.error_message = None;
        Ok(())
    }

    pub fn fail_field(&mut self, item_id: &str, field: &str, message: &str) -> Result<(), AppError> {
        let outcome = self.field_mut(item_id, field)?;
        outcome.state = compute_next_work_state(&outcome.state, WorkTransition::Fail)?;
        outcome.error_message = Some(message.to_string());
        outcome.preview = None;
        Ok(())
    }

    /// Classifies a fully-resolved item and folds it into the job counters.
    ///
    /// Best-effort semantics: one generated field is enough to count the item
    /// as succeeded; only an item whose every field failed counts as failed.
    /// When the last item lands and the job is still processing, the job
    /// flips to completed here, under whatever serialization discipline the
    /// caller holds.
    pub fn finish_item(&mut self, item_id: &str) -> Result<JobStatus, AppError> {
        let item = self.item_mut(item_id)?;
        if !item.fields.iter().all(|field| field.state.is_terminal()) {
            return Err(AppError::Validation(format!(
                "item {item_id} still has unresolved fields"
            )));
        }

        let any_completed = item
            .fields
            .iter()
            .any(|field| field.state == WorkState::Completed);
        let transition = if any_completed {
            WorkTransition::Complete
        } else {
            WorkTransition::Fail
        };
        item.state = compute_next_work_state(&item.state, transition)?;

        if any_completed {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.completed += 1;

        if self.completed == self.total && self.status == JobStatus::Processing {
            self.status = compute_next_job_status(&self.status, JobTransition::Complete)?;
        }

        Ok(self.status.clone())
    }

    pub fn cancel(&mut self) -> Result<(), AppError> {
        self.status = compute_next_job_status(&self.status, JobTransition::Cancel)?;
        Ok(())
    }

    /// Puts items stranded in `processing` by a crashed worker back to
    /// `pending`, clearing their field outcomes so the whole item re-runs.
    /// Items whose outcome was already counted are left alone.
    pub fn release_stalled_items(&mut self) -> Result<usize, AppError> {
        let mut released = 0;
        for item in &mut self.items {
            if item.state == WorkState::Processing {
                item.state = compute_next_work_state(&item.state, WorkTransition::Release)?;
                for field in &mut item.fields {
                    *field = FieldOutcome::pending(field.name.clone());
                }
                released += 1;
            }
        }
        Ok(released)
    }

    pub fn pending_item_ids(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|item| item.state == WorkState::Pending)
            .map(|item| item.item_id.clone())
            .collect()
    }

    /// The caller's most recently started job that is still running, used
    /// when boundary operations are invoked without an explicit job id.
    pub async fn find_active_for_owner(
        owner_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<GenerationJob>, AppError> {
        let mut result = db
            .client
            .query(
                "SELECT * FROM type::table($table)
                 WHERE owner_id = $owner_id AND status = $processing
                 ORDER BY created_at DESC
                 LIMIT 1",
            )
            .bind(("table", Self::table_name()))
            .bind(("owner_id", owner_id.to_string()))
            .bind(("processing", JobStatus::Processing.as_str()))
            .await?;

        let job: Option<GenerationJob> = result.take(0)?;
        Ok(job)
    }

    /// Jobs that were still running when the process last stopped.
    pub async fn find_unfinished(db: &SurrealDbClient) -> Result<Vec<GenerationJob>, AppError> {
        let jobs: Vec<GenerationJob> = db
            .query(
                "SELECT * FROM type::table($table)
                 WHERE status = $processing
                 ORDER BY created_at ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("processing", JobStatus::Processing.as_str()))
            .await?
            .take(0)?;

        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submissions(ids: &[&str]) -> Vec<ItemSubmission> {
        ids.iter()
            .map(|id| ItemSubmission {
                item_id: (*id).to_string(),
                name: format!("Item {id}"),
                edit_ref: None,
                context: ItemContext::default(),
            })
            .collect()
    }

    fn two_field_job() -> GenerationJob {
        GenerationJob::new(
            "owner-1".to_string(),
            "agent-1".to_string(),
            vec!["description".to_string(), "seo_title".to_string()],
            vec![],
            submissions(&["1"]),
        )
    }

    async fn memory_db() -> SurrealDbClient {
        SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory surrealdb")
    }

    #[test]
    fn test_new_job_defaults() {
        let job = GenerationJob::new(
            "owner-1".to_string(),
            "agent-1".to_string(),
            vec!["description".to_string()],
            vec!["eco".to_string()],
            submissions(&["1", "2", "3"]),
        );

        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.total, 3);
        assert_eq!(job.completed, 0);
        assert_eq!(job.succeeded, 0);
        assert_eq!(job.failed, 0);
        assert_eq!(job.items.len(), 3);
        // submission order is preserved for display
        let ids: Vec<&str> = job.items.iter().map(|i| i.item_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        for item in &job.items {
            assert_eq!(item.state, WorkState::Pending);
            assert_eq!(item.fields.len(), 1);
            assert_eq!(item.fields[0].state, WorkState::Pending);
        }
    }

    #[test]
    fn test_item_best_effort_classification() {
        let mut job = two_field_job();
        job.begin_item("1").expect("begin item");
        job.begin_field("1", "description").expect("begin field");
        job.complete_field("1", "description", "A fine widget.")
            .expect("complete field");
        job.begin_field("1", "seo_title").expect("begin field");
        job.fail_field("1", "seo_title", "timeout").expect("fail field");

        let status = job.finish_item("1").expect("finish item");

        // one field succeeded, so the item counts as succeeded
        assert_eq!(job.item("1").map(|i| i.state.clone()), Some(WorkState::Completed));
        assert_eq!(job.succeeded, 1);
        assert_eq!(job.failed, 0);
        assert_eq!(job.completed, 1);
        assert_eq!(status, JobStatus::Completed);
    }

    #[test]
    fn test_item_all_fields_failed_classification() {
        let mut job = two_field_job();
        job.begin_item("1").expect("begin item");
        for field in ["description", "seo_title"] {
            job.begin_field("1", field).expect("begin field");
            job.fail_field("1", field, "remote error").expect("fail field");
        }

        job.finish_item("1").expect("finish item");

        assert_eq!(job.item("1").map(|i| i.state.clone()), Some(WorkState::Failed));
        assert_eq!(job.succeeded, 0);
        assert_eq!(job.failed, 1);
        assert_eq!(job.completed, 1);
        assert_eq!(job.succeeded + job.failed, job.completed);
    }

    #[test]
    fn test_finish_item_requires_resolved_fields() {
        let mut job = two_field_job();
        job.begin_item("1").expect("begin item");
        job.begin_field("1", "description").expect("begin field");
        job.complete_field("1", "description", "text").expect("complete");
        // seo_title still pending
        assert!(job.finish_item("1").is_err());
    }

    #[test]
    fn test_completion_happens_exactly_once() {
        let mut job = two_field_job();
        job.begin_item("1").expect("begin item");
        for field in ["description", "seo_title"] {
            job.begin_field("1", field).expect("begin field");
            job.complete_field("1", field, "text").expect("complete field");
        }

        let status = job.finish_item("1").expect("finish item");
        assert_eq!(status, JobStatus::Completed);

        // a second terminal transition for the same item is rejected, so the
        // completed counter and job status cannot double-fire
        assert!(job.finish_item("1").is_err());
        assert_eq!(job.completed, 1);
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[test]
    fn test_no_transitions_out_of_terminal_status() {
        let mut job = two_field_job();
        job.cancel().expect("cancel");
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.cancel().is_err());

        let mut completed = two_field_job();
        completed.begin_item("1").expect("begin item");
        for field in ["description", "seo_title"] {
            completed.begin_field("1", field).expect("begin field");
            completed.complete_field("1", field, "text").expect("complete");
        }
        completed.finish_item("1").expect("finish");
        assert!(completed.cancel().is_err());
    }

    #[test]
    fn test_invalid_work_transitions() {
        let mut job = two_field_job();
        // cannot complete a field that never started
        assert!(job.complete_field("1", "description", "text").is_err());
        // cannot begin an unknown field or item
        assert!(job.begin_field("1", "nope").is_err());
        assert!(job.begin_item("404").is_err());
    }

    #[test]
    fn test_preview_truncation() {
        let long = "x".repeat(400);
        let preview = preview_of(&long);
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS);

        // multi-byte input must not split a char
        let emoji = "💡".repeat(200);
        let preview = preview_of(&emoji);
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS);
    }

    #[test]
    fn test_release_stalled_items() {
        let mut job = GenerationJob::new(
            "owner-1".to_string(),
            "agent-1".to_string(),
            vec!["description".to_string()],
            vec![],
            submissions(&["1", "2"]),
        );
        job.begin_item("1").expect("begin item");
        job.begin_field("1", "description").expect("begin field");

        let released = job.release_stalled_items().expect("release");
        assert_eq!(released, 1);
        assert_eq!(job.item("1").map(|i| i.state.clone()), Some(WorkState::Pending));
        assert!(job
            .item("1")
            .map(|i| i.fields.iter().all(|f| f.state == WorkState::Pending))
            .unwrap_or(false));
        assert_eq!(job.item("2").map(|i| i.state.clone()), Some(WorkState::Pending));
    }

    #[tokio::test]
    async fn test_store_and_fetch() {
        let db = memory_db().await;
        let job = two_field_job();

        db.store_item(job.clone()).await.expect("store");
        let fetched: Option<GenerationJob> =
            db.get_item::<GenerationJob>(&job.id).await.expect("fetch");

        let fetched = fetched.expect("job exists");
        assert_eq!(fetched.id, job.id);
        assert_eq!(fetched.status, JobStatus::Processing);
        assert_eq!(fetched.items, job.items);
    }

    #[tokio::test]
    async fn test_find_active_for_owner_prefers_most_recent() {
        let db = memory_db().await;

        let mut older = two_field_job();
        older.created_at = Utc::now() - chrono::Duration::minutes(5);
        let newer = two_field_job();
        let mut finished = two_field_job();
        finished.status = JobStatus::Completed;

        db.store_item(older.clone()).await.expect("store older");
        db.store_item(newer.clone()).await.expect("store newer");
        db.store_item(finished.clone()).await.expect("store finished");

        let active = GenerationJob::find_active_for_owner("owner-1", &db)
            .await
            .expect("query");
        assert_eq!(active.map(|j| j.id), Some(newer.id));

        let none = GenerationJob::find_active_for_owner("other-owner", &db)
            .await
            .expect("query");
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_find_unfinished() {
        let db = memory_db().await;

        let running = two_field_job();
        let mut done = two_field_job();
        done.status = JobStatus::Completed;
        db.store_item(running.clone()).await.expect("store");
        db.store_item(done).await.expect("store");

        let unfinished = GenerationJob::find_unfinished(&db).await.expect("query");
        assert_eq!(unfinished.len(), 1);
        assert_eq!(unfinished[0].id, running.id);
    }
}
