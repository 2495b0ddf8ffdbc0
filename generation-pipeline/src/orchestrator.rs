use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex as StdMutex},
};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            agent::Agent,
            generation_job::{GenerationJob, ItemSubmission, JobStatus},
        },
    },
};
use futures::StreamExt;
use tokio::time::{sleep, Duration};
use tracing::{error, info, info_span, warn, Instrument};

use crate::content_client::ContentClient;

/// Knobs for the per-job fan-out. Field generation within one item is always
/// sequential; only items run concurrently.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorTuning {
    pub max_item_concurrency: usize,
}

impl Default for OrchestratorTuning {
    fn default() -> Self {
        Self {
            max_item_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StartJobRequest {
    pub owner_id: String,
    pub agent_id: String,
    pub items: Vec<ItemSubmission>,
    pub fields: Vec<String>,
    pub keywords: Vec<String>,
}

/// Per-job async mutexes. Every load-mutate-save of a job record runs under
/// its job's mutex, so concurrent item completions cannot lose a counter
/// increment or double-fire the final status transition.
type JobLocks = StdMutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

pub struct BulkJobOrchestrator {
    db: Arc<SurrealDbClient>,
    content_client: Arc<dyn ContentClient>,
    tuning: OrchestratorTuning,
    locks: JobLocks,
}

impl BulkJobOrchestrator {
    pub fn new(
        db: Arc<SurrealDbClient>,
        content_client: Arc<dyn ContentClient>,
        tuning: OrchestratorTuning,
    ) -> Self {
        Self {
            db,
            content_client,
            tuning: OrchestratorTuning {
                max_item_concurrency: tuning.max_item_concurrency.max(1),
            },
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Validates the request, persists the initial job record with every item
    /// and field pending, kicks off asynchronous processing and returns the
    /// job id. The caller gets the id before any item has started.
    pub async fn start(self: &Arc<Self>, request: StartJobRequest) -> Result<String, AppError> {
        if request.items.is_empty() {
            return Err(AppError::Validation(
                "at least one item is required".to_string(),
            ));
        }
        if request.fields.is_empty() {
            return Err(AppError::Validation(
                "at least one field is required".to_string(),
            ));
        }
        if request.fields.iter().any(|field| field.trim().is_empty()) {
            return Err(AppError::Validation(
                "field names must not be blank".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for item in &request.items {
            if !seen.insert(item.item_id.as_str()) {
                return Err(AppError::Validation(format!(
                    "duplicate item id: {}",
                    item.item_id
                )));
            }
        }
        if request.agent_id.trim().is_empty() {
            return Err(AppError::Validation("agent id is required".to_string()));
        }
        let agent = Agent::get(&request.agent_id, &self.db)
            .await?
            .ok_or_else(|| {
                AppError::Validation(format!("unknown agent: {}", request.agent_id))
            })?;

        let job = GenerationJob::new(
            request.owner_id,
            request.agent_id,
            request.fields,
            request.keywords,
            request.items,
        );
        let job_id = job.id.clone();
        let total = job.total;
        self.db.store_item(job).await?;

        info!(
            %job_id,
            agent_id = %agent.id,
            total,
            "created bulk generation job"
        );

        let orchestrator = Arc::clone(self);
        let spawn_job_id = job_id.clone();
        tokio::spawn(async move {
            orchestrator.run_job(&spawn_job_id, &agent).await;
        });

        Ok(job_id)
    }

    /// Requests cancellation. Idempotent: a job already in a terminal state
    /// is returned as-is. In-flight items run to completion and are still
    /// recorded; pending items never start.
    pub async fn cancel(&self, job_id: &str) -> Result<GenerationJob, AppError> {
        // Terminal jobs answer without touching the lock map, so a redundant
        // cancel cannot re-create an evicted lock entry.
        let job = self
            .db
            .get_item::<GenerationJob>(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {job_id}")))?;
        if job.status.is_terminal() {
            return Ok(job);
        }

        let lock = self.job_lock(job_id);
        let _guard = lock.lock().await;

        let mut job = self
            .db
            .get_item::<GenerationJob>(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {job_id}")))?;

        if job.status.is_terminal() {
            return Ok(job);
        }

        job.cancel()?;
        job.updated_at = chrono::Utc::now();
        self.save_with_retry(job.clone()).await?;
        info!(%job_id, "bulk generation job cancelled");

        Ok(job)
    }

    /// Picks up jobs that were still running when the process last stopped:
    /// items stranded mid-processing are reset and the remaining pending
    /// items are scheduled again. Returns the number of jobs resumed.
    pub async fn resume_incomplete(self: &Arc<Self>) -> Result<usize, AppError> {
        let jobs = GenerationJob::find_unfinished(&self.db).await?;
        let mut resumed = 0;

        for job in jobs {
            let job_id = job.id.clone();
            let agent = match Agent::get(&job.agent_id, &self.db).await? {
                Some(agent) => agent,
                None => {
                    warn!(
                        %job_id,
                        agent_id = %job.agent_id,
                        "cannot resume job: agent no longer exists"
                    );
                    continue;
                }
            };

            let released = self
                .update_job(&job_id, |job| job.release_stalled_items())
                .await?;
            if released > 0 {
                info!(%job_id, released, "reset items stranded by an interrupted run");
            }

            let orchestrator = Arc::clone(self);
            let spawn_job_id = job_id.clone();
            tokio::spawn(async move {
                orchestrator.run_job(&spawn_job_id, &agent).await;
            });
            resumed += 1;
        }

        Ok(resumed)
    }

    async fn run_job(&self, job_id: &str, agent: &Agent) {
        let pending = match self.db.get_item::<GenerationJob>(job_id).await {
            Ok(Some(job)) => job.pending_item_ids(),
            Ok(None) => {
                warn!(%job_id, "job disappeared before processing started");
                self.release_job_lock(job_id);
                return;
            }
            Err(err) => {
                error!(%job_id, error = %err, "failed to load job for processing");
                self.release_job_lock(job_id);
                return;
            }
        };

        futures::stream::iter(pending)
            .for_each_concurrent(self.tuning.max_item_concurrency, |item_id| async move {
                let span = info_span!("generation_item", %job_id, item_id = %item_id);
                self.process_item(job_id, &item_id, agent)
                    .instrument(span)
                    .await;
            })
            .await;

        // The fan-out has drained, so no worker of this job can take the
        // lock again. Entries would otherwise accumulate one per job for
        // the life of the process.
        self.release_job_lock(job_id);
    }

    /// One unit of work: generate every requested field for one item, then
    /// classify the item and fold it into the job counters. Field failures
    /// are recorded as data and never abort sibling fields.
    async fn process_item(&self, job_id: &str, item_id: &str, agent: &Agent) {
        // Cooperative cancellation check: a cancelled job starts no new items.
        match self.db.get_item::<GenerationJob>(job_id).await {
            Ok(Some(job)) if job.status == JobStatus::Processing => {}
            Ok(Some(_)) => {
                info!("job no longer processing; skipping item");
                return;
            }
            Ok(None) => {
                warn!("job record missing; skipping item");
                return;
            }
            Err(err) => {
                error!(error = %err, "failed to check job status; skipping item");
                return;
            }
        }

        let snapshot = self
            .update_job(job_id, |job| {
                job.begin_item(item_id)?;
                let item = job
                    .item(item_id)
                    .ok_or_else(|| AppError::NotFound(format!("item {item_id} in job")))?;
                Ok((
                    item.name.clone(),
                    item.context.clone(),
                    job.requested_fields.clone(),
                    job.keywords.clone(),
                ))
            })
            .await;
        let (item_name, context, fields, keywords) = match snapshot {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(error = %err, "failed to mark item processing");
                return;
            }
        };

        for field in &fields {
            if let Err(err) = self
                .update_job(job_id, |job| job.begin_field(item_id, field))
                .await
            {
                error!(%field, error = %err, "failed to mark field processing");
                continue;
            }

            match self
                .content_client
                .generate(agent, &item_name, &context, field, &keywords)
                .await
            {
                Ok(text) => {
                    if let Err(err) = self
                        .update_job(job_id, |job| job.complete_field(item_id, field, &text))
                        .await
                    {
                        error!(%field, error = %err, "failed to record field result");
                    }
                }
                Err(failure) => {
                    warn!(%field, error = %failure, "field generation failed");
                    if let Err(err) = self
                        .update_job(job_id, |job| {
                            job.fail_field(item_id, field, &failure.to_string())
                        })
                        .await
                    {
                        error!(%field, error = %err, "failed to record field failure");
                    }
                }
            }
        }

        match self.update_job(job_id, |job| job.finish_item(item_id)).await {
            Ok(JobStatus::Completed) => {
                info!("item finished; bulk generation job completed");
            }
            Ok(_) => {}
            Err(err) => error!(error = %err, "failed to finalize item"),
        }
    }

    /// Load-mutate-save under the job's mutex. Progress is persisted after
    /// every transition so polling readers see mid-flight state.
    async fn update_job<T>(
        &self,
        job_id: &str,
        apply: impl FnOnce(&mut GenerationJob) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let lock = self.job_lock(job_id);
        let _guard = lock.lock().await;

        let mut job = self
            .db
            .get_item::<GenerationJob>(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {job_id}")))?;

        let value = apply(&mut job)?;
        job.updated_at = chrono::Utc::now();
        self.save_with_retry(job).await?;

        Ok(value)
    }

    async fn save_with_retry(&self, job: GenerationJob) -> Result<(), AppError> {
        const MAX_ATTEMPTS: usize = 3;
        const INITIAL_BACKOFF_MS: u64 = 50;
        const MAX_BACKOFF_MS: u64 = 800;

        let mut backoff_ms = INITIAL_BACKOFF_MS;
        let mut last_error = None;

        for attempt in 0..MAX_ATTEMPTS {
            match self.db.update_item(job.clone()).await {
                Ok(_) => return Ok(()),
                Err(err) => {
                    warn!(
                        job_id = %job.id,
                        attempt = attempt + 1,
                        error = %err,
                        "failed to persist job update; retrying"
                    );
                    last_error = Some(err);
                    sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
                }
            }
        }

        Err(last_error.map(AppError::from).unwrap_or_else(|| {
            AppError::InternalError("failed to persist job update after retries".to_string())
        }))
    }

    fn job_lock(&self, job_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(job_id.to_string()).or_default())
    }

    fn release_job_lock(&self, job_id: &str) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.remove(job_id);
    }
}
