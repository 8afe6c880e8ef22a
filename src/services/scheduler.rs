//! Durable delayed jobs.
//!
//! Jobs live in `scheduled_jobs` so a restart resumes whatever was pending.
//! A worker claims due rows with a conditional update on `status` and
//! `attempts`, so a job runs at most once per attempt even with several
//! workers polling the same table. A claim is a lease: a row still
//! `running` after `job_lease_secs` belonged to a worker that died, and is
//! claimed again.

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::notifications::{templates, NotificationService};
use super::workflow::WorkflowService;
use super::{fetch_page, Page, PageRequest};
use crate::config::WorkflowConfig;
use crate::entities::order::Entity as OrderEntity;
use crate::entities::scheduled_job::{self, Entity as JobEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::tracing::log_slow_operation;
use crate::models::{JobKind, JobStatus, OrderStatus};

/// Enqueues a job. Runs on any connection, so callers schedule inside the
/// same transaction as the change that needs the follow-up.
pub async fn schedule<C>(
    conn: &C,
    kind: JobKind,
    order_id: Uuid,
    run_at: DateTime<Utc>,
) -> Result<scheduled_job::Model, ServiceError>
where
    C: ConnectionTrait,
{
    schedule_with_payload(conn, kind, order_id, run_at, None).await
}

pub async fn schedule_with_payload<C>(
    conn: &C,
    kind: JobKind,
    order_id: Uuid,
    run_at: DateTime<Utc>,
    payload: Option<Value>,
) -> Result<scheduled_job::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let now = Utc::now();
    let job = scheduled_job::ActiveModel {
        id: Set(Uuid::new_v4()),
        kind: Set(kind),
        order_id: Set(order_id),
        payload: Set(payload),
        run_at: Set(run_at),
        status: Set(JobStatus::Pending),
        attempts: Set(0),
        last_error: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?;
    debug!(job_id = %job.id, %kind, %order_id, %run_at, "job scheduled");
    Ok(job)
}

/// Marks pending jobs of an order cancelled, optionally only one kind.
/// Returns how many were cancelled.
pub async fn cancel_for_order<C>(
    conn: &C,
    order_id: Uuid,
    kind: Option<JobKind>,
) -> Result<u64, ServiceError>
where
    C: ConnectionTrait,
{
    let mut update = JobEntity::update_many()
        .col_expr(scheduled_job::Column::Status, Expr::value(JobStatus::Cancelled))
        .col_expr(scheduled_job::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(scheduled_job::Column::OrderId.eq(order_id))
        .filter(scheduled_job::Column::Status.eq(JobStatus::Pending));
    if let Some(kind) = kind {
        update = update.filter(scheduled_job::Column::Kind.eq(kind));
    }
    Ok(update.exec(conn).await?.rows_affected)
}

/// Seconds to wait before retry number `attempts`.
pub fn backoff_secs(attempts: i32) -> i64 {
    2i64.saturating_pow(attempts.clamp(0, 30) as u32)
}

/// Outcome counts of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub claimed: usize,
    /// Claimed rows whose previous lease had expired.
    pub recovered: usize,
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
}

/// Executes due jobs against the workflow.
#[derive(Clone)]
pub struct JobRunner {
    db: Arc<DatabaseConnection>,
    workflow: WorkflowService,
    notifications: NotificationService,
    events: EventSender,
    config: WorkflowConfig,
    last_tick: Arc<AtomicI64>,
}

impl JobRunner {
    pub fn new(
        db: Arc<DatabaseConnection>,
        workflow: WorkflowService,
        notifications: NotificationService,
        events: EventSender,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            db,
            workflow,
            notifications,
            events,
            config,
            last_tick: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Time of the worker's last completed poll, if it has run at all.
    pub fn last_tick(&self) -> Option<DateTime<Utc>> {
        match self.last_tick.load(Ordering::Relaxed) {
            0 => None,
            ts => DateTime::from_timestamp(ts, 0),
        }
    }

    /// Whether a running worker has polled recently enough.
    pub fn is_alive(&self) -> bool {
        let stale_after = Duration::milliseconds(
            (self.config.scheduler_poll_interval_ms as i64 * 10).max(30_000),
        );
        self.last_tick()
            .map(|tick| Utc::now() - tick < stale_after)
            .unwrap_or(false)
    }

    /// Rows a worker may take at `now`: due pending jobs, and running jobs
    /// whose lease ran out.
    fn claimable(&self, now: DateTime<Utc>) -> Condition {
        Condition::any()
            .add(
                Condition::all()
                    .add(scheduled_job::Column::Status.eq(JobStatus::Pending))
                    .add(scheduled_job::Column::RunAt.lte(now)),
            )
            .add(
                Condition::all()
                    .add(scheduled_job::Column::Status.eq(JobStatus::Running))
                    .add(scheduled_job::Column::UpdatedAt.lt(now - self.config.job_lease())),
            )
    }

    /// Runs every job that is due now, one drain.
    #[instrument(skip(self))]
    pub async fn run_due_jobs(&self) -> Result<DrainReport, ServiceError> {
        let due = JobEntity::find()
            .filter(self.claimable(Utc::now()))
            .order_by_asc(scheduled_job::Column::RunAt)
            .limit(self.config.scheduler_batch_size)
            .all(&*self.db)
            .await?;

        let mut report = DrainReport::default();
        for job in due {
            if !self.claim(&job).await? {
                debug!(job_id = %job.id, "job claimed by another worker");
                continue;
            }
            report.claimed += 1;
            if job.status == JobStatus::Running {
                warn!(job_id = %job.id, kind = %job.kind, attempts = job.attempts, "job lease expired, running it again");
                counter!("krushidoot.workflow.jobs.recovered", 1, "kind" => job.kind.to_string());
                report.recovered += 1;
            }

            match self.execute(&job).await {
                Ok(()) => {
                    self.finish(&job, JobStatus::Completed, None, job.run_at)
                        .await?;
                    counter!("krushidoot.workflow.jobs.completed", 1, "kind" => job.kind.to_string());
                    report.completed += 1;
                }
                Err(e) => {
                    if self.record_failure(&job, &e).await? {
                        report.failed += 1;
                    } else {
                        report.retried += 1;
                    }
                }
            }
        }

        if report.claimed > 0 {
            info!(?report, "job drain finished");
        }
        Ok(report)
    }

    /// Takes the lease on a job unless another worker got there first.
    /// `attempts` doubles as the lease token.
    async fn claim(&self, job: &scheduled_job::Model) -> Result<bool, ServiceError> {
        let now = Utc::now();
        let result = JobEntity::update_many()
            .col_expr(scheduled_job::Column::Status, Expr::value(JobStatus::Running))
            .col_expr(
                scheduled_job::Column::Attempts,
                Expr::col(scheduled_job::Column::Attempts).add(1),
            )
            .col_expr(scheduled_job::Column::UpdatedAt, Expr::value(now))
            .filter(scheduled_job::Column::Id.eq(job.id))
            .filter(scheduled_job::Column::Attempts.eq(job.attempts))
            .filter(self.claimable(now))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn execute(&self, job: &scheduled_job::Model) -> Result<(), ServiceError> {
        match job.kind {
            JobKind::OrderExpiry => {
                let cancelled = self.workflow.handle_order_expiry(job.order_id).await?;
                debug!(job_id = %job.id, cancelled, "order expiry evaluated");
                Ok(())
            }
            JobKind::AssignDelivery => {
                let order = OrderEntity::find_by_id(job.order_id)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Order", job.order_id))?;
                if !matches!(
                    order.order_status,
                    OrderStatus::Confirmed | OrderStatus::Processing
                ) {
                    info!(order_id = %order.id, status = %order.order_status, "order no longer awaits a partner, skipping assignment");
                    return Ok(());
                }
                let vendor_id = job
                    .payload
                    .as_ref()
                    .and_then(|p| p.get("vendor_id"))
                    .and_then(Value::as_str)
                    .and_then(|s| Uuid::parse_str(s).ok());
                self.workflow
                    .assign_delivery_partner(job.order_id, vendor_id, None)
                    .await?;
                Ok(())
            }
        }
    }

    /// Reschedules or gives up. Returns true when the job is now failed.
    async fn record_failure(
        &self,
        job: &scheduled_job::Model,
        error: &ServiceError,
    ) -> Result<bool, ServiceError> {
        let attempts = job.attempts + 1;
        let message = error.to_string();

        if attempts < self.config.job_max_attempts {
            let run_at = Utc::now() + Duration::seconds(backoff_secs(attempts));
            warn!(job_id = %job.id, kind = %job.kind, attempts, %run_at, error = %message, "job failed, retrying");
            self.finish(job, JobStatus::Pending, Some(message), run_at)
                .await?;
            counter!("krushidoot.workflow.jobs.retried", 1, "kind" => job.kind.to_string());
            return Ok(false);
        }

        error!(job_id = %job.id, kind = %job.kind, attempts, error = %message, "job exhausted its attempts");
        self.finish(job, JobStatus::Failed, Some(message.clone()), job.run_at)
            .await?;
        counter!("krushidoot.workflow.jobs.failed", 1, "kind" => job.kind.to_string());

        self.notifications
            .send_all(vec![templates::system_alert(
                format!("Scheduled {} job failed", job.kind),
                format!(
                    "Job {} for order {} gave up after {} attempts: {}",
                    job.id, job.order_id, attempts, message
                ),
            )
            .order(job.order_id)
            .metadata(json!({ "job_id": job.id, "kind": job.kind }))])
            .await;
        self.events
            .emit(Event::JobFailed {
                job_id: job.id,
                kind: job.kind,
                error: message,
            })
            .await;
        Ok(true)
    }

    async fn finish(
        &self,
        job: &scheduled_job::Model,
        status: JobStatus,
        last_error: Option<String>,
        run_at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let result = JobEntity::update_many()
            .col_expr(scheduled_job::Column::Status, Expr::value(status))
            .col_expr(scheduled_job::Column::LastError, Expr::value(last_error))
            .col_expr(scheduled_job::Column::RunAt, Expr::value(run_at))
            .col_expr(scheduled_job::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(scheduled_job::Column::Id.eq(job.id))
            .filter(scheduled_job::Column::Status.eq(JobStatus::Running))
            .filter(scheduled_job::Column::Attempts.eq(job.attempts + 1))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            warn!(job_id = %job.id, %status, "job lease lost before the outcome was recorded");
        }
        Ok(())
    }

    pub async fn list(
        &self,
        status: Option<JobStatus>,
        page: PageRequest,
    ) -> Result<Page<scheduled_job::Model>, ServiceError> {
        let mut query = JobEntity::find().order_by_desc(scheduled_job::Column::RunAt);
        if let Some(status) = status {
            query = query.filter(scheduled_job::Column::Status.eq(status));
        }
        fetch_page(&self.db, query, page).await
    }

    pub async fn pending_count(&self) -> Result<u64, ServiceError> {
        Ok(JobEntity::find()
            .filter(scheduled_job::Column::Status.eq(JobStatus::Pending))
            .count(&*self.db)
            .await?)
    }

    /// One poll of the background loop: jobs, notification retries and
    /// expired notification cleanup.
    async fn tick(&self) {
        let started = std::time::Instant::now();
        if let Err(e) = self.run_due_jobs().await {
            error!(error = %e, "job drain failed");
        }
        log_slow_operation("job_drain", started.elapsed(), self.config.poll_interval());
        if let Err(e) = self
            .notifications
            .retry_failed(self.config.scheduler_batch_size)
            .await
        {
            error!(error = %e, "notification retry failed");
        }
        if let Err(e) = self.notifications.purge_expired().await {
            error!(error = %e, "notification purge failed");
        }
        match self.pending_count().await {
            Ok(pending) => gauge!("krushidoot.workflow.jobs.pending", pending as f64),
            Err(e) => debug!(error = %e, "could not count pending jobs"),
        }
        self.last_tick.store(Utc::now().timestamp(), Ordering::Relaxed);
    }
}

/// Spawns the polling loop. It stops when `shutdown` flips to true or its
/// sender is dropped.
pub fn start_worker(runner: JobRunner, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    let interval = runner.config.poll_interval();
    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "job worker started");
        loop {
            runner.tick().await;
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("job worker stopped");
    })
}
