//! Rate-limited outbound message queue.
//!
//! The queue holds outbound lines in FIFO order and drains them through a
//! pluggable async send function. Two [`RollingTimer`] windows gate the drain:
//! a per-second window for bursts and a per-minute window for sustained load.
//! A pump iteration sends at most `min(second.available, minute.available)`
//! lines, one at a time, so occurrence counts always match real send order.
//!
//! ```rust,ignore
//! let queue = Arc::new(MessageQueue::new(QueueConfig::default()));
//! queue.set_check_function(|| true);
//! queue.set_send_function(|text| Box::pin(async move { transport.send(&text).await }));
//! queue.start();
//!
//! queue.send("!inventory", false);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::rolling::RollingTimer;
use crate::foundation::TransportResult;
use crate::integration::CommandSink;

/// Async function used to deliver one queued line.
pub type SendFn = Arc<dyn Fn(String) -> BoxFuture<'static, TransportResult<()>> + Send + Sync>;

/// Gate evaluated before every pump iteration.
pub type CheckFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Pacing and cap settings for a [`MessageQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Delay between pump iterations.
    pub rate: Duration,
    /// Maximum sends within any one-second window.
    pub per_second: usize,
    /// Maximum sends within any one-minute window.
    pub per_minute: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            rate: Duration::from_millis(250),
            per_second: 3,
            per_minute: 100,
        }
    }
}

struct RateWindows {
    second: RollingTimer,
    minute: RollingTimer,
}

impl RateWindows {
    fn available(&mut self) -> usize {
        self.second
            .available_occurrences()
            .min(self.minute.available_occurrences())
    }

    fn record(&mut self) {
        self.second.add_occurrence();
        self.minute.add_occurrence();
    }
}

/// FIFO outbound queue gated by per-second and per-minute windows.
pub struct MessageQueue {
    config: QueueConfig,
    pending: Mutex<VecDeque<String>>,
    // popped from `pending`, send not yet resolved
    in_flight: Mutex<Option<String>>,
    windows: Mutex<RateWindows>,
    send_fn: RwLock<Option<SendFn>>,
    check_fn: RwLock<Option<CheckFn>>,
    pump: Mutex<Option<CancellationToken>>,
    // serializes pump iterations so a manual drain never interleaves with the timer
    draining: tokio::sync::Mutex<()>,
}

impl MessageQueue {
    /// Creates a stopped queue with no send or check function.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            in_flight: Mutex::new(None),
            windows: Mutex::new(RateWindows {
                second: RollingTimer::per_second(config.per_second),
                minute: RollingTimer::per_minute(config.per_minute),
            }),
            send_fn: RwLock::new(None),
            check_fn: RwLock::new(None),
            pump: Mutex::new(None),
            draining: tokio::sync::Mutex::new(()),
            config,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Enqueues a line.
    ///
    /// Returns `false` without enqueuing when `allow_duplicates` is `false` and an
    /// identical line is already pending.
    pub fn send(&self, message: impl Into<String>, allow_duplicates: bool) -> bool {
        let message = message.into();
        let mut pending = self.pending.lock();
        if !allow_duplicates && pending.iter().any(|m| *m == message) {
            trace!(message = %message, "Duplicate pending message, not enqueued");
            return false;
        }
        debug!(message = %message, queued = pending.len() + 1, "Message enqueued");
        pending.push_back(message);
        true
    }

    /// Sets the function used to deliver lines.
    pub fn set_send_function<F>(&self, f: F)
    where
        F: Fn(String) -> BoxFuture<'static, TransportResult<()>> + Send + Sync + 'static,
    {
        *self.send_fn.write() = Some(Arc::new(f));
    }

    /// Sets the readiness predicate. An unset predicate counts as not ready.
    pub fn set_check_function<F>(&self, f: F)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        *self.check_fn.write() = Some(Arc::new(f));
    }

    /// Snapshot of pending lines in send order.
    pub fn queued_messages(&self) -> Vec<String> {
        self.pending.lock().iter().cloned().collect()
    }

    /// Line currently handed to the send function, if a send is awaiting.
    pub fn in_flight(&self) -> Option<String> {
        self.in_flight.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Drops every pending line.
    pub fn clear(&self) {
        self.pending.lock().clear();
    }

    /// Sends still allowed right now by both windows.
    pub fn available_slots(&self) -> usize {
        self.windows.lock().available()
    }

    /// Clears both rate windows.
    pub fn reset_windows(&self) {
        let mut windows = self.windows.lock();
        windows.second.reset();
        windows.minute.reset();
    }

    /// Whether the periodic pump is running.
    pub fn is_running(&self) -> bool {
        self.pump.lock().is_some()
    }

    fn is_ready(&self) -> bool {
        self.check_fn.read().as_ref().is_some_and(|check| check())
    }

    /// Starts the periodic pump on the current tokio runtime.
    ///
    /// Calling `start` on a running queue does nothing. The pump holds only a
    /// weak reference, so dropping the last `Arc` also ends it.
    pub fn start(self: &Arc<Self>) {
        let mut pump = self.pump.lock();
        if pump.is_some() {
            return;
        }

        let token = CancellationToken::new();
        *pump = Some(token.clone());

        let queue = Arc::downgrade(self);
        let rate = self.config.rate;
        debug!(rate = ?rate, "Message queue pump started");
        tokio::spawn(run_pump(queue, rate, token));
    }

    /// Cancels the periodic pump. An in-flight send is allowed to finish, but no
    /// further line is dequeued.
    pub fn stop(&self) {
        if let Some(token) = self.pump.lock().take() {
            token.cancel();
            debug!("Message queue pump stopped");
        }
    }

    /// Runs one pump iteration and returns the number of lines sent.
    pub async fn process_queue(&self) -> usize {
        self.drain(None).await
    }

    async fn drain(&self, cancel: Option<&CancellationToken>) -> usize {
        let _draining = self.draining.lock().await;

        if !self.is_ready() {
            return 0;
        }
        let Some(send) = self.send_fn.read().clone() else {
            trace!("No send function configured, skipping pump");
            return 0;
        };

        let queued = self.pending.lock().len();
        if queued == 0 {
            return 0;
        }
        let limit = queued.min(self.windows.lock().available());
        if limit < queued {
            trace!(queued, limit, "Rate window limits this pump");
        }

        let mut sent = 0;
        for _ in 0..limit {
            if cancel.is_some_and(CancellationToken::is_cancelled) || !self.is_ready() {
                break;
            }
            let Some(message) = self.pending.lock().pop_front() else {
                break;
            };

            *self.in_flight.lock() = Some(message.clone());
            let result = send(message.clone()).await;
            self.in_flight.lock().take();

            match result {
                Ok(()) => {
                    self.windows.lock().record();
                    sent += 1;
                    trace!(message = %message, "Message sent");
                }
                Err(e) => {
                    warn!(message = %message, error = %e, "Failed to send queued message");
                }
            }
        }
        sent
    }
}

impl Drop for MessageQueue {
    fn drop(&mut self) {
        if let Some(token) = self.pump.get_mut().take() {
            token.cancel();
        }
    }
}

async fn run_pump(queue: Weak<MessageQueue>, rate: Duration, token: CancellationToken) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(rate) => {}
        }
        let Some(queue) = queue.upgrade() else {
            break;
        };
        queue.drain(Some(&token)).await;
    }
}

impl CommandSink for MessageQueue {
    fn enqueue(&self, text: String, allow_duplicates: bool) -> bool {
        self.send(text, allow_duplicates)
    }

    fn pending(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.in_flight().into_iter().collect();
        lines.extend(self.queued_messages());
        lines
    }
}
