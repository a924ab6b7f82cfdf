//! The heartbeat pull loop.
//!
//! On each trigger the manager re-reads the task file and, when pending
//! tasks exist, invokes the registered callbacks (typically: kick the agent
//! with a tasks prompt, deliver the reply to the configured channel).
//! Triggers arrive from the interval timer, from cron, and from explicit
//! `request_now` calls; requests inside the coalescing window merge into one
//! dispatch carrying the highest-priority reason.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use deca_core::types::now_ms;

use crate::hours::ActiveWindow;
use crate::tasks::{HeartbeatTask, TaskFile};

pub type CallbackFut = Pin<Box<dyn Future<Output = std::result::Result<String, String>> + Send>>;
/// A heartbeat consumer. Receives the pending tasks and the merged trigger
/// request; returns the delivered response text.
pub type HeartbeatCallback =
    Arc<dyn Fn(Vec<HeartbeatTask>, TriggerRequest) -> CallbackFut + Send + Sync>;

/// Why a trigger fired. Declared in ascending priority so coalescing can
/// take the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerReason {
    Requested,
    Interval,
    Cron,
    Exec,
}

impl std::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TriggerReason::Requested => "requested",
            TriggerReason::Interval => "interval",
            TriggerReason::Cron => "cron",
            TriggerReason::Exec => "exec",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerRequest {
    pub reason: TriggerReason,
    pub source: String,
    pub requested_at_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerStatus {
    Completed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerOutcome {
    pub status: TriggerStatus,
    /// Why a skip happened (`out-of-hours`, `no-pending-tasks`, `duplicate`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// The last non-error callback's response text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Task list observed at dispatch time.
    pub tasks: Vec<HeartbeatTask>,
}

impl TriggerOutcome {
    fn skipped(reason: &str, tasks: Vec<HeartbeatTask>) -> Self {
        Self {
            status: TriggerStatus::Skipped,
            reason: Some(reason.to_string()),
            response: None,
            tasks,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeartbeatSettings {
    pub interval_ms: u64,
    pub active_hours: Option<ActiveWindow>,
    pub coalesce_ms: u64,
    pub duplicate_window_ms: u64,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval_ms: 30 * 60 * 1000,
            active_hours: None,
            coalesce_ms: 250,
            duplicate_window_ms: 10 * 60 * 1000,
        }
    }
}

pub struct HeartbeatManager {
    settings: HeartbeatSettings,
    tasks: TaskFile,
    callbacks: RwLock<Vec<HeartbeatCallback>>,
    /// Coalescing slot: the merged request waiting for its window to close.
    pending: Mutex<Option<TriggerRequest>>,
    /// Last delivered response text and when, for duplicate suppression.
    last_delivery: Mutex<Option<(String, i64)>>,
    shutdown: watch::Sender<bool>,
}

impl HeartbeatManager {
    pub fn new(settings: HeartbeatSettings, tasks: TaskFile) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            settings,
            tasks,
            callbacks: RwLock::new(Vec::new()),
            pending: Mutex::new(None),
            last_delivery: Mutex::new(None),
            shutdown,
        }
    }

    /// Register a callback. Callbacks run in registration order on every
    /// dispatch; one failing never blocks the rest.
    pub fn on_trigger(&self, cb: HeartbeatCallback) {
        self.callbacks.write().unwrap().push(cb);
    }

    /// The task file, for callbacks that mark tasks completed or add new ones.
    pub fn task_file(&self) -> &TaskFile {
        &self.tasks
    }

    /// Start the interval pull loop.
    pub fn start(self: &Arc<Self>) {
        let mgr = Arc::clone(self);
        tokio::spawn(async move {
            let mut shutdown_rx = mgr.shutdown.subscribe();
            let interval = Duration::from_millis(mgr.settings.interval_ms.max(1));
            info!(interval_ms = mgr.settings.interval_ms, "heartbeat started");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        mgr.request_now(TriggerReason::Interval, "interval");
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("heartbeat stopped");
        });
    }

    /// Ask for a dispatch. Requests within the coalescing window merge,
    /// keeping the highest-priority reason.
    pub fn request_now(self: &Arc<Self>, reason: TriggerReason, source: &str) {
        let mut pending = self.pending.lock().unwrap();
        match pending.as_mut() {
            Some(req) => {
                if reason > req.reason {
                    req.reason = reason;
                    req.source = source.to_string();
                }
                debug!(%reason, source, "heartbeat request coalesced");
            }
            None => {
                *pending = Some(TriggerRequest {
                    reason,
                    source: source.to_string(),
                    requested_at_ms: now_ms(),
                });
                let mgr = Arc::clone(self);
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(mgr.settings.coalesce_ms)).await;
                    let req = mgr.pending.lock().unwrap().take();
                    if let Some(req) = req {
                        mgr.trigger(req).await;
                    }
                });
            }
        }
    }

    /// Run one dispatch now, bypassing coalescing.
    pub async fn trigger(&self, request: TriggerRequest) -> TriggerOutcome {
        if let Some(window) = &self.settings.active_hours {
            if !window.contains_now() {
                debug!(reason = %request.reason, "heartbeat outside active hours");
                return TriggerOutcome::skipped("out-of-hours", Vec::new());
            }
        }

        let all_tasks = self.tasks.load();
        let pending_tasks: Vec<HeartbeatTask> = all_tasks
            .iter()
            .filter(|t| !t.completed)
            .cloned()
            .collect();
        if pending_tasks.is_empty() {
            return TriggerOutcome::skipped("no-pending-tasks", all_tasks);
        }

        info!(
            reason = %request.reason,
            source = %request.source,
            pending = pending_tasks.len(),
            "heartbeat dispatch"
        );

        let callbacks: Vec<HeartbeatCallback> = self.callbacks.read().unwrap().clone();
        let mut last_ok: Option<String> = None;
        for cb in callbacks {
            match cb(pending_tasks.clone(), request.clone()).await {
                Ok(text) => last_ok = Some(text),
                Err(e) => warn!(error = %e, "heartbeat callback failed"),
            }
        }

        let Some(response) = last_ok else {
            return TriggerOutcome {
                status: TriggerStatus::Completed,
                reason: None,
                response: None,
                tasks: all_tasks,
            };
        };

        // Duplicate-text suppression.
        let now = now_ms();
        let mut last = self.last_delivery.lock().unwrap();
        if let Some((prev, at)) = last.as_ref() {
            if *prev == response && now - at <= self.settings.duplicate_window_ms as i64 {
                debug!("heartbeat response duplicates prior delivery, skipping");
                return TriggerOutcome::skipped("duplicate", all_tasks);
            }
        }
        *last = Some((response.clone(), now));

        TriggerOutcome {
            status: TriggerStatus::Completed,
            reason: None,
            response: Some(response),
            tasks: all_tasks,
        }
    }

    /// Stop the interval loop. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn write_tasks(dir: &tempfile::TempDir, content: &str) -> TaskFile {
        let path = dir.path().join("HEARTBEAT.md");
        std::fs::write(&path, content).unwrap();
        TaskFile::new(path)
    }

    fn settings(coalesce_ms: u64) -> HeartbeatSettings {
        HeartbeatSettings {
            interval_ms: 60_000,
            active_hours: None,
            coalesce_ms,
            duplicate_window_ms: 60_000,
        }
    }

    fn request(reason: TriggerReason) -> TriggerRequest {
        TriggerRequest {
            reason,
            source: "test".into(),
            requested_at_ms: now_ms(),
        }
    }

    /// A one-hour window guaranteed not to contain the current local time.
    fn closed_window() -> ActiveWindow {
        let now = chrono::Local::now();
        let now_min = now.hour() * 60 + now.minute();
        let start = (now_min + 120) % 1440;
        let end = (now_min + 180) % 1440;
        let fmt = |m: u32| format!("{:02}:{:02}", m / 60, m % 60);
        ActiveWindow::parse(&fmt(start), &fmt(end)).unwrap()
    }

    #[tokio::test]
    async fn out_of_hours_skips_without_callbacks() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = write_tasks(&dir, "- [ ] something\n");
        let mut s = settings(10);
        s.active_hours = Some(closed_window());
        let mgr = HeartbeatManager::new(s, tasks);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        mgr.on_trigger(Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok("hi".to_string()) })
        }));

        let outcome = mgr.trigger(request(TriggerReason::Requested)).await;
        assert_eq!(outcome.status, TriggerStatus::Skipped);
        assert_eq!(outcome.reason.as_deref(), Some("out-of-hours"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_pending_tasks_skips() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = write_tasks(&dir, "- [x] all done\n");
        let mgr = HeartbeatManager::new(settings(10), tasks);
        let outcome = mgr.trigger(request(TriggerReason::Interval)).await;
        assert_eq!(outcome.status, TriggerStatus::Skipped);
        assert_eq!(outcome.reason.as_deref(), Some("no-pending-tasks"));
    }

    #[tokio::test]
    async fn callback_errors_do_not_block_later_callbacks() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = write_tasks(&dir, "- [ ] chore\n");
        let mgr = HeartbeatManager::new(settings(10), tasks);

        mgr.on_trigger(Arc::new(|_, _| {
            Box::pin(async { Err("boom".to_string()) })
        }));
        mgr.on_trigger(Arc::new(|tasks, _| {
            Box::pin(async move { Ok(format!("saw {} tasks", tasks.len())) })
        }));

        let outcome = mgr.trigger(request(TriggerReason::Exec)).await;
        assert_eq!(outcome.status, TriggerStatus::Completed);
        assert_eq!(outcome.response.as_deref(), Some("saw 1 tasks"));
    }

    #[tokio::test]
    async fn duplicate_response_is_suppressed() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = write_tasks(&dir, "- [ ] chore\n");
        let mgr = HeartbeatManager::new(settings(10), tasks);
        mgr.on_trigger(Arc::new(|_, _| {
            Box::pin(async { Ok("same answer".to_string()) })
        }));

        let first = mgr.trigger(request(TriggerReason::Interval)).await;
        assert_eq!(first.status, TriggerStatus::Completed);

        let second = mgr.trigger(request(TriggerReason::Interval)).await;
        assert_eq!(second.status, TriggerStatus::Skipped);
        assert_eq!(second.reason.as_deref(), Some("duplicate"));
    }

    #[tokio::test]
    async fn requests_coalesce_to_highest_priority() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = write_tasks(&dir, "- [ ] chore\n");
        let mgr = Arc::new(HeartbeatManager::new(settings(50), tasks));

        let seen: Arc<Mutex<Vec<TriggerReason>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        mgr.on_trigger(Arc::new(move |_, req| {
            sink.lock().unwrap().push(req.reason);
            Box::pin(async { Ok("done".to_string()) })
        }));

        mgr.request_now(TriggerReason::Requested, "manual");
        mgr.request_now(TriggerReason::Cron, "job-1");
        mgr.request_now(TriggerReason::Interval, "interval");

        tokio::time::sleep(Duration::from_millis(250)).await;
        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![TriggerReason::Cron]);
    }

    #[test]
    fn reason_priority_ordering() {
        assert!(TriggerReason::Exec > TriggerReason::Cron);
        assert!(TriggerReason::Cron > TriggerReason::Interval);
        assert!(TriggerReason::Interval > TriggerReason::Requested);
    }
}
