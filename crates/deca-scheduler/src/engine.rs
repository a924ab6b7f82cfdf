//! The scheduler engine: one timer on the earliest `nextRunAtMs` across all
//! enabled jobs, crash-safe JSON persistence, fire-and-forget dispatch.
//!
//! Missed triggers are not caught up: `initialize` recomputes next runs from
//! the current instant, and an `At` job whose time passed while the process
//! was down keeps `nextRunAtMs = None` (manual `run_job` only).

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tracing::{error, info, warn};
use uuid::Uuid;

use deca_core::types::now_ms;

use crate::error::{Result, SchedulerError};
use crate::schedule::{compute_next_run, validate};
use crate::store::{load_jobs, save_jobs};
use crate::types::{CronJob, JobSpec, Schedule, SchedulerStatus};

pub type TriggerFut = Pin<Box<dyn Future<Output = std::result::Result<(), String>> + Send>>;
/// Late-bound dispatch callback. Receives the fired job snapshot.
pub type TriggerFn = Arc<dyn Fn(CronJob) -> TriggerFut + Send + Sync>;

/// Idle sleep when no job has a future run; `notify` cuts it short.
const IDLE_POLL: Duration = Duration::from_secs(3600);

pub struct CronScheduler {
    storage_path: PathBuf,
    jobs: Mutex<HashMap<String, CronJob>>,
    on_trigger: RwLock<Option<TriggerFn>>,
    /// Woken whenever the job set (and thus the earliest next run) changes.
    notify: Notify,
    shutdown: watch::Sender<bool>,
}

impl CronScheduler {
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            storage_path: storage_path.into(),
            jobs: Mutex::new(HashMap::new()),
            on_trigger: RwLock::new(None),
            notify: Notify::new(),
            shutdown,
        }
    }

    /// Load persisted jobs, recompute next runs for enabled jobs, persist the
    /// refreshed set, and start the timer task.
    pub fn initialize(self: &Arc<Self>) -> Result<()> {
        let loaded = load_jobs(&self.storage_path);
        let now = now_ms();
        {
            let mut jobs = self.jobs.lock().unwrap();
            for mut job in loaded {
                if job.enabled {
                    job.next_run_at_ms = match compute_next_run(&job.schedule, now) {
                        Ok(next) => next,
                        Err(e) => {
                            warn!(job_id = %job.id, error = %e, "stored schedule unparseable");
                            None
                        }
                    };
                }
                jobs.insert(job.id.clone(), job);
            }
            self.persist_locked(&jobs);
            info!(count = jobs.len(), path = %self.storage_path.display(), "cron jobs loaded");
        }

        let engine = Arc::clone(self);
        tokio::spawn(engine.run_loop());
        Ok(())
    }

    /// Register the dispatch callback. Triggers firing before this is set are
    /// logged and skipped.
    pub fn set_on_trigger(&self, cb: TriggerFn) {
        *self.on_trigger.write().unwrap() = Some(cb);
    }

    /// Create, persist, and schedule a new job.
    pub fn add_job(&self, spec: JobSpec) -> Result<CronJob> {
        validate(&spec.schedule)?;
        let now = now_ms();
        let job = CronJob {
            id: Uuid::new_v4().to_string(),
            name: spec.name,
            instruction: spec.instruction,
            schedule: spec.schedule.clone(),
            enabled: true,
            created_at_ms: now,
            last_run_at_ms: None,
            next_run_at_ms: compute_next_run(&spec.schedule, now)?,
        };

        let mut jobs = self.jobs.lock().unwrap();
        jobs.insert(job.id.clone(), job.clone());
        self.persist_locked(&jobs);
        drop(jobs);

        info!(job_id = %job.id, name = %job.name, "cron job added");
        self.notify.notify_one();
        Ok(job)
    }

    /// Remove a job. Returns whether it existed.
    pub fn remove_job(&self, id: &str) -> bool {
        let mut jobs = self.jobs.lock().unwrap();
        let removed = jobs.remove(id).is_some();
        if removed {
            self.persist_locked(&jobs);
        }
        drop(jobs);
        if removed {
            info!(job_id = %id, "cron job removed");
            self.notify.notify_one();
        }
        removed
    }

    /// All jobs ordered by creation time.
    pub fn list_jobs(&self) -> Vec<CronJob> {
        let jobs = self.jobs.lock().unwrap();
        let mut all: Vec<CronJob> = jobs.values().cloned().collect();
        all.sort_by_key(|j| (j.created_at_ms, j.id.clone()));
        all
    }

    pub fn get_job(&self, id: &str) -> Option<CronJob> {
        self.jobs.lock().unwrap().get(id).cloned()
    }

    pub fn status(&self) -> SchedulerStatus {
        let jobs = self.jobs.lock().unwrap();
        SchedulerStatus {
            job_count: jobs.len(),
            next_trigger_ms: earliest_next(&jobs),
        }
    }

    /// Fire a job now, regardless of its schedule. Fire-and-forget; errors in
    /// the callback are logged, not returned.
    pub fn run_job(&self, id: &str) -> Result<()> {
        let fired = {
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs
                .get_mut(id)
                .ok_or_else(|| SchedulerError::JobNotFound { id: id.to_string() })?;
            advance_after_fire(job);
            let snapshot = job.clone();
            self.persist_locked(&jobs);
            snapshot
        };
        self.notify.notify_one();
        self.dispatch(fired);
        Ok(())
    }

    /// Stop the timer task. Idempotent; jobs stay persisted.
    pub fn shutdown(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }
        self.notify.notify_one();
        info!("cron scheduler shutting down");
    }

    // --- internals ---------------------------------------------------------

    async fn run_loop(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown.subscribe();
        info!("cron scheduler started");
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            let next = {
                let jobs = self.jobs.lock().unwrap();
                earliest_next(&jobs)
            };
            let wait = match next {
                None => IDLE_POLL,
                Some(at) => Duration::from_millis((at - now_ms()).max(0) as u64),
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if next.is_some() {
                        self.fire_due();
                    }
                }
                _ = self.notify.notified() => {}
                _ = shutdown_rx.changed() => {}
            }
        }
        info!("cron scheduler stopped");
    }

    /// Fire every enabled job whose next run has arrived.
    fn fire_due(&self) {
        let due: Vec<CronJob> = {
            let mut jobs = self.jobs.lock().unwrap();
            let now = now_ms();
            let due_ids: Vec<String> = jobs
                .values()
                .filter(|j| j.enabled && j.next_run_at_ms.is_some_and(|at| at <= now))
                .map(|j| j.id.clone())
                .collect();

            let mut fired = Vec::with_capacity(due_ids.len());
            for id in due_ids {
                let job = jobs.get_mut(&id).unwrap();
                advance_after_fire(job);
                fired.push(job.clone());
            }
            if !fired.is_empty() {
                self.persist_locked(&jobs);
            }
            fired
        };

        for job in due {
            info!(job_id = %job.id, name = %job.name, "cron job firing");
            self.dispatch(job);
        }
    }

    fn dispatch(&self, job: CronJob) {
        let cb = self.on_trigger.read().unwrap().clone();
        let Some(cb) = cb else {
            warn!(job_id = %job.id, "cron trigger fired with no callback registered; skipping");
            return;
        };
        let job_id = job.id.clone();
        tokio::spawn(async move {
            if let Err(e) = cb(job).await {
                error!(job_id = %job_id, error = %e, "cron dispatch failed");
            }
        });
    }

    /// Persist while holding the jobs lock so writers never interleave.
    fn persist_locked(&self, jobs: &HashMap<String, CronJob>) {
        let mut all: Vec<CronJob> = jobs.values().cloned().collect();
        all.sort_by_key(|j| (j.created_at_ms, j.id.clone()));
        if let Err(e) = save_jobs(&self.storage_path, &all) {
            error!(path = %self.storage_path.display(), error = %e, "cron persist failed");
        }
    }
}

/// Update a job after a fire: stamp `lastRunAtMs`, disable one-shots, and
/// reschedule repeating jobs from now.
fn advance_after_fire(job: &mut CronJob) {
    let now = now_ms();
    job.last_run_at_ms = Some(now);
    match job.schedule {
        Schedule::At { .. } => {
            job.enabled = false;
            job.next_run_at_ms = None;
        }
        _ => {
            job.next_run_at_ms = match compute_next_run(&job.schedule, now) {
                Ok(next) => next,
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "reschedule failed");
                    None
                }
            };
        }
    }
}

fn earliest_next(jobs: &HashMap<String, CronJob>) -> Option<i64> {
    jobs.values()
        .filter(|j| j.enabled)
        .filter_map(|j| j.next_run_at_ms)
        .min()
}
