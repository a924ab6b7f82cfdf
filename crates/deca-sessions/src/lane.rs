//! Per-session FIFO lanes.
//!
//! Each session key owns an independent lane: a bounded mailbox plus a single
//! worker task, so at most one work item per key runs at a time and items run
//! in arrival order. Text items arriving within the debounce window coalesce
//! into one dispatch, bounded by a merged-size cap with early flush.
//!
//! Lanes never cancel in-flight work; [`LaneRouter::shutdown`] waits up to a
//! grace period for drain and then aborts the workers.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Result, SessionError};

/// Cross-session critical sections (memory index writes, compaction) run here.
pub const GLOBAL_LANE: &str = "lane:global";

type BoxFut = Pin<Box<dyn Future<Output = ()> + Send>>;

enum LaneJob {
    /// User-style text destined for the agent; subject to coalescing.
    Text(String),
    /// Opaque work item; runs exactly as submitted.
    Task(BoxFut),
}

/// Receives coalesced text items for a lane. Implemented by the gateway
/// dispatcher, which routes the text through the agent and back out to the
/// channel the key belongs to.
#[async_trait]
pub trait LaneConsumer: Send + Sync + 'static {
    async fn process(&self, key: &str, text: String);
}

#[derive(Debug, Clone)]
pub struct LaneSettings {
    pub debounce_ms: u64,
    pub max_merged_chars: usize,
    pub mailbox_cap: usize,
}

impl Default for LaneSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 3000,
            max_merged_chars: 12_000,
            mailbox_cap: 64,
        }
    }
}

struct Lane {
    tx: mpsc::Sender<LaneJob>,
    worker: JoinHandle<()>,
}

pub struct LaneRouter {
    settings: LaneSettings,
    consumer: Arc<dyn LaneConsumer>,
    lanes: DashMap<String, Lane>,
    closed: AtomicBool,
}

impl LaneRouter {
    pub fn new(settings: LaneSettings, consumer: Arc<dyn LaneConsumer>) -> Self {
        Self {
            settings,
            consumer,
            lanes: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Queue text for the key's lane. Rejects when the mailbox is at its cap;
    /// the caller decides whether to re-queue or drop.
    pub fn submit_text(&self, key: &str, text: impl Into<String>) -> Result<()> {
        self.submit(key, LaneJob::Text(text.into()))
    }

    /// Queue an opaque work item (cron dispatch, critical section) on a lane.
    pub fn submit_task<F>(&self, key: &str, fut: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.submit(key, LaneJob::Task(Box::pin(fut)))
    }

    fn submit(&self, key: &str, job: LaneJob) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::ShutDown);
        }
        let lane = self.lanes.entry(key.to_string()).or_insert_with(|| {
            let (tx, rx) = mpsc::channel(self.settings.mailbox_cap);
            let worker = tokio::spawn(worker_loop(
                key.to_string(),
                rx,
                Arc::clone(&self.consumer),
                self.settings.clone(),
            ));
            debug!(key, "lane created");
            Lane { tx, worker }
        });
        lane.tx.try_send(job).map_err(|_| SessionError::LaneRejected {
            key: key.to_string(),
        })
    }

    /// Number of live lanes (diagnostics).
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Stop accepting work, let lanes drain for `grace`, then abort whatever
    /// is still running. Idempotent.
    pub async fn shutdown(&self, grace: Duration) {
        self.closed.store(true, Ordering::SeqCst);
        let keys: Vec<String> = self.lanes.iter().map(|e| e.key().clone()).collect();
        let mut workers = Vec::new();
        for key in keys {
            if let Some((_, lane)) = self.lanes.remove(&key) {
                // Dropping the sender lets the worker finish its queue and exit.
                drop(lane.tx);
                workers.push((key, lane.worker));
            }
        }
        let deadline = tokio::time::Instant::now() + grace;
        for (key, mut worker) in workers {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if tokio::time::timeout(remaining, &mut worker).await.is_err() {
                warn!(key = %key, "lane did not drain within grace, aborting");
                worker.abort();
            }
        }
    }
}

async fn worker_loop(
    key: String,
    mut rx: mpsc::Receiver<LaneJob>,
    consumer: Arc<dyn LaneConsumer>,
    settings: LaneSettings,
) {
    let debounce = Duration::from_millis(settings.debounce_ms);
    // A job that interrupted coalescing and must run next.
    let mut pending: Option<LaneJob> = None;

    loop {
        let job = match pending.take() {
            Some(j) => j,
            None => match rx.recv().await {
                Some(j) => j,
                None => break,
            },
        };

        match job {
            LaneJob::Task(fut) => fut.await,
            LaneJob::Text(first) => {
                let mut merged = first;
                loop {
                    match tokio::time::timeout(debounce, rx.recv()).await {
                        Ok(Some(LaneJob::Text(next))) => {
                            if merged.len() + next.len() + 1 > settings.max_merged_chars {
                                // Over the merge cap: flush what we have now.
                                pending = Some(LaneJob::Text(next));
                                break;
                            }
                            merged.push('\n');
                            merged.push_str(&next);
                        }
                        Ok(Some(task)) => {
                            pending = Some(task);
                            break;
                        }
                        // Window elapsed or channel closed.
                        Ok(None) | Err(_) => break,
                    }
                }
                consumer.process(&key, merged).await;
            }
        }
    }
    debug!(key = %key, "lane worker exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    struct Recorder {
        dispatches: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl LaneConsumer for Recorder {
        async fn process(&self, key: &str, text: String) {
            self.dispatches
                .lock()
                .unwrap()
                .push((key.to_string(), text));
        }
    }

    fn router(debounce_ms: u64, cap: usize) -> (Arc<Recorder>, LaneRouter) {
        let recorder = Arc::new(Recorder {
            dispatches: Mutex::new(Vec::new()),
        });
        let settings = LaneSettings {
            debounce_ms,
            max_merged_chars: 100,
            mailbox_cap: cap,
        };
        let r = LaneRouter::new(settings, recorder.clone());
        (recorder, r)
    }

    #[tokio::test]
    async fn messages_within_window_coalesce() {
        let (recorder, router) = router(50, 64);
        router.submit_text("agent:a:main", "one").unwrap();
        router.submit_text("agent:a:main", "two").unwrap();
        router.submit_text("agent:a:main", "three").unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        let dispatches = recorder.dispatches.lock().unwrap();
        assert_eq!(dispatches.len(), 1);
        assert_eq!(dispatches[0].1, "one\ntwo\nthree");
    }

    #[tokio::test]
    async fn merge_cap_flushes_early() {
        let (recorder, router) = router(50, 64);
        let big = "x".repeat(80);
        router.submit_text("agent:a:main", big.clone()).unwrap();
        router.submit_text("agent:a:main", "tail").unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        let dispatches = recorder.dispatches.lock().unwrap();
        assert_eq!(dispatches.len(), 2);
        assert_eq!(dispatches[0].1, big);
        assert_eq!(dispatches[1].1, "tail");
    }

    #[tokio::test]
    async fn lanes_are_independent() {
        let (recorder, router) = router(10, 64);
        router.submit_text("agent:a:main", "a").unwrap();
        router.submit_text("agent:b:main", "b").unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        let mut keys: Vec<String> = recorder
            .dispatches
            .lock()
            .unwrap()
            .iter()
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["agent:a:main", "agent:b:main"]);
    }

    #[tokio::test]
    async fn tasks_run_fifo_without_overlap() {
        let recorder = Arc::new(Recorder {
            dispatches: Mutex::new(Vec::new()),
        });
        let router = LaneRouter::new(
            LaneSettings {
                debounce_ms: 5,
                max_merged_chars: 100,
                mailbox_cap: 64,
            },
            recorder,
        );

        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let log = log.clone();
            router
                .submit_task("lane:global", async move {
                    log.lock().unwrap().push(format!("start {i}"));
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    log.lock().unwrap().push(format!("end {i}"));
                })
                .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        let log = log.lock().unwrap();
        // submit order == start order, and every end precedes the next start
        let expected: Vec<String> = (0..5)
            .flat_map(|i| vec![format!("start {i}"), format!("end {i}")])
            .collect();
        assert_eq!(*log, expected);
    }

    #[tokio::test]
    async fn full_mailbox_rejects() {
        // Consumer blocks forever so nothing drains.
        struct Stuck;
        #[async_trait]
        impl LaneConsumer for Stuck {
            async fn process(&self, _key: &str, _text: String) {
                futures_unordered_pending().await;
            }
        }
        async fn futures_unordered_pending() {
            let (_tx, rx) = oneshot::channel::<()>();
            let _ = rx.await;
        }

        let router = LaneRouter::new(
            LaneSettings {
                debounce_ms: 1,
                max_merged_chars: 10,
                mailbox_cap: 2,
            },
            Arc::new(Stuck),
        );
        router.submit_text("agent:a:main", "1").unwrap();
        // Allow the worker to pull the first item off the queue.
        tokio::time::sleep(Duration::from_millis(50)).await;
        router.submit_text("agent:a:main", "2").unwrap();
        router.submit_text("agent:a:main", "3").unwrap();
        let err = router.submit_text("agent:a:main", "4").unwrap_err();
        assert!(matches!(err, SessionError::LaneRejected { .. }));
    }

    #[tokio::test]
    async fn shutdown_rejects_new_work() {
        let (_recorder, router) = router(1, 64);
        router.submit_text("agent:a:main", "x").unwrap();
        router.shutdown(Duration::from_millis(500)).await;
        assert!(matches!(
            router.submit_text("agent:a:main", "y"),
            Err(SessionError::ShutDown)
        ));
    }

    #[tokio::test]
    async fn shutdown_drains_queued_work() {
        let (recorder, router) = router(1, 64);
        router.submit_text("agent:a:main", "x").unwrap();
        router.shutdown(Duration::from_millis(500)).await;
        let dispatches = recorder.dispatches.lock().unwrap();
        assert_eq!(dispatches.len(), 1);
    }
}
