//! Per-message reply batching.
//!
//! A [`ReplyQueue`] collects progress updates between an initial ack and the
//! final reply, flushing the pending buffer on a fixed interval so chatty
//! tool loops do not flood the channel with one message per step.
//!
//! Rules: `ack` emits immediately and starts the flush timer; `progress`
//! appends to the pending buffer; `final` flushes the buffer, emits the
//! final text, and stops the timer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

struct QueueInner {
    pending: Mutex<String>,
    timer_running: AtomicBool,
    stopped: AtomicBool,
}

pub struct ReplyQueue {
    tx: mpsc::Sender<String>,
    flush_ms: u64,
    inner: Arc<QueueInner>,
}

impl ReplyQueue {
    /// Emitted strings go to `tx`; the adapter chunkifies and delivers them.
    pub fn new(tx: mpsc::Sender<String>, flush_ms: u64) -> Self {
        Self {
            tx,
            flush_ms,
            inner: Arc::new(QueueInner {
                pending: Mutex::new(String::new()),
                timer_running: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Immediate acknowledgement; starts the periodic flush.
    pub async fn ack(&self, text: impl Into<String>) {
        let _ = self.tx.send(text.into()).await;
        self.start_timer();
    }

    /// Buffer a progress line for the next flush.
    pub fn progress(&self, text: impl Into<String>) {
        let mut pending = self.inner.pending.lock().unwrap();
        if !pending.is_empty() {
            pending.push('\n');
        }
        pending.push_str(&text.into());
    }

    /// Flush any pending buffer, emit the final text, stop the timer.
    pub async fn finalize(&self, text: impl Into<String>) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        let pending = std::mem::take(&mut *self.inner.pending.lock().unwrap());
        if !pending.is_empty() {
            let _ = self.tx.send(pending).await;
        }
        let _ = self.tx.send(text.into()).await;
    }

    fn start_timer(&self) {
        if self.inner.timer_running.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let tx = self.tx.clone();
        let interval = Duration::from_millis(self.flush_ms.max(1));
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if inner.stopped.load(Ordering::SeqCst) {
                    break;
                }
                let pending = std::mem::take(&mut *inner.pending.lock().unwrap());
                if !pending.is_empty() {
                    debug!(chars = pending.len(), "flushing batched progress");
                    let _ = tx.send(pending).await;
                }
            }
        });
    }
}
