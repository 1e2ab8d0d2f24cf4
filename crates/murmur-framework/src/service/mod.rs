//! Command/response correlator.
//!
//! The [`CommandService`] keeps every incoming line in an append-only log and
//! lets subscribers (widgets) attach callbacks to response keys. Each
//! subscription has its own [`ResponseHistory`]; when a new line arrives the
//! service first brings the history up to date with any lines it has not yet
//! scanned (silently), then evaluates the new line and delivers its matches.
//!
//! ```text
//!  on_incoming(line) ──► log.push(line)
//!                           │
//!           for each (subscriber, key)
//!                           │
//!              catch up lines [last_scanned, new)   (recorded, not delivered)
//!                           │
//!              evaluate new line against key's set  (recorded and delivered)
//!                           │
//!              release lock ──► callback(subscriber, match) ...
//! ```
//!
//! Outgoing commands go through a [`CommandSink`], normally the rate-limited
//! message queue. Literal commands are sent at most once: a command whose
//! text (or one of its alternates) is already pending or already appears in
//! the log counts as sent.
//!
//! # Example
//!
//! ```rust,ignore
//! let service = CommandService::new(registry, queue.clone());
//!
//! service.subscribe_to_command("rpg", "stats", "ok", None, "hud", |subscriber, matched| {
//!     println!("{subscriber}: hp = {:?}", matched.group("hp"));
//! })?;
//! service.send_initial_command("rpg", "stats")?;
//! ```

mod history;

pub use history::{MatchedResponse, ResponseHistory};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use murmur_core::{CommandSink, Message};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{ServiceError, ServiceResult};
use crate::registry::CommandRegistry;
use crate::response::ResponseSet;
use crate::template::has_unresolved_params;

/// Callback invoked with the subscriber id and the match.
pub type ResponseCallback = Arc<dyn Fn(&str, &MatchedResponse) + Send + Sync>;

struct Subscription {
    callback: ResponseCallback,
    result_filter: Option<String>,
    history: ResponseHistory,
}

impl Subscription {
    fn accepts(&self, response_id: &str) -> bool {
        self.result_filter
            .as_deref()
            .is_none_or(|filter| filter == response_id)
    }
}

#[derive(Default)]
struct CorrelatorState {
    log: Vec<Message>,
    /// subscriber → key → subscription
    subscribers: BTreeMap<String, BTreeMap<String, Subscription>>,
    /// key → subscribers
    by_key: HashMap<String, BTreeSet<String>>,
}

type Delivery = (ResponseCallback, String, MatchedResponse);

/// Correlates outgoing commands with incoming lines.
pub struct CommandService {
    registry: Arc<CommandRegistry>,
    sink: Arc<dyn CommandSink>,
    state: Mutex<CorrelatorState>,
}

impl CommandService {
    pub fn new(registry: Arc<CommandRegistry>, sink: Arc<dyn CommandSink>) -> Self {
        Self {
            registry,
            sink,
            state: Mutex::new(CorrelatorState::default()),
        }
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Subscribes to the replies of `group.command` in `category`.
    ///
    /// With `result_key`, only that response is delivered. Returns the
    /// response key.
    pub fn subscribe_to_command<F>(
        &self,
        group: &str,
        command: &str,
        category: &str,
        result_key: Option<&str>,
        subscriber: &str,
        callback: F,
    ) -> ServiceResult<String>
    where
        F: Fn(&str, &MatchedResponse) + Send + Sync + 'static,
    {
        let key = CommandRegistry::command_key(group, command, category);
        let set = self.response_set(&key)?;
        if let Some(result) = result_key {
            if set.get(result).is_none() {
                return Err(ServiceError::UnknownResultKey {
                    key,
                    result: result.to_string(),
                });
            }
        }
        self.insert_subscription(
            subscriber,
            &key,
            Arc::new(callback),
            result_key.map(str::to_string),
        );
        Ok(key)
    }

    /// Subscribes to the unsolicited message `group.name`. Returns the
    /// response key.
    pub fn subscribe_to_message<F>(
        &self,
        group: &str,
        name: &str,
        subscriber: &str,
        callback: F,
    ) -> ServiceResult<String>
    where
        F: Fn(&str, &MatchedResponse) + Send + Sync + 'static,
    {
        let key = CommandRegistry::message_key(group, name);
        self.response_set(&key)?;
        self.insert_subscription(subscriber, &key, Arc::new(callback), None);
        Ok(key)
    }

    fn response_set(&self, key: &str) -> ServiceResult<&ResponseSet> {
        self.registry
            .responses(key)
            .ok_or_else(|| ServiceError::UnknownResponseKey(key.to_string()))
    }

    fn insert_subscription(
        &self,
        subscriber: &str,
        key: &str,
        callback: ResponseCallback,
        result_filter: Option<String>,
    ) {
        let mut state = self.state.lock();
        let subscriptions = state.subscribers.entry(subscriber.to_string()).or_default();

        match subscriptions.get_mut(key) {
            Some(existing) => {
                existing.callback = callback;
                if existing.result_filter != result_filter {
                    // Recorded matches were filtered differently; rescan.
                    existing.result_filter = result_filter;
                    existing.history = ResponseHistory::default();
                }
                debug!(subscriber = %subscriber, key = %key, "Replaced subscription callback");
            }
            None => {
                subscriptions.insert(
                    key.to_string(),
                    Subscription {
                        callback,
                        result_filter,
                        history: ResponseHistory::default(),
                    },
                );
                debug!(subscriber = %subscriber, key = %key, "Subscribed");
            }
        }

        state
            .by_key
            .entry(key.to_string())
            .or_default()
            .insert(subscriber.to_string());
    }

    /// Removes one subscription. Returns `true` if it existed.
    pub fn unsubscribe(&self, subscriber: &str, key: &str) -> bool {
        let mut state = self.state.lock();
        let removed = state
            .subscribers
            .get_mut(subscriber)
            .and_then(|subs| subs.remove(key))
            .is_some();
        if !removed {
            return false;
        }

        if state.subscribers.get(subscriber).is_some_and(BTreeMap::is_empty) {
            state.subscribers.remove(subscriber);
        }
        if let Some(set) = state.by_key.get_mut(key) {
            set.remove(subscriber);
            if set.is_empty() {
                state.by_key.remove(key);
            }
        }
        debug!(subscriber = %subscriber, key = %key, "Unsubscribed");
        true
    }

    /// Removes every subscription of `subscriber`. Returns how many there were.
    pub fn unsubscribe_all(&self, subscriber: &str) -> usize {
        let mut state = self.state.lock();
        let Some(subscriptions) = state.subscribers.remove(subscriber) else {
            return 0;
        };
        for key in subscriptions.keys() {
            if let Some(set) = state.by_key.get_mut(key) {
                set.remove(subscriber);
                if set.is_empty() {
                    state.by_key.remove(key);
                }
            }
        }
        debug!(subscriber = %subscriber, count = subscriptions.len(), "Unsubscribed all");
        subscriptions.len()
    }

    /// Subscribers currently attached to `key`, sorted.
    pub fn subscribers_for(&self, key: &str) -> Vec<String> {
        self.state
            .lock()
            .by_key
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of the matches recorded for `(subscriber, key)`.
    ///
    /// Lines that arrived since the last delivery are not scanned here; use
    /// [`replay_history`](Self::replay_history) for an up-to-date view.
    pub fn history(&self, subscriber: &str, key: &str) -> Option<Vec<MatchedResponse>> {
        self.state
            .lock()
            .subscribers
            .get(subscriber)?
            .get(key)
            .map(|sub| sub.history.matches().to_vec())
    }

    // ========================================================================
    // Incoming lines
    // ========================================================================

    /// Logs `message` and delivers its matches to every subscription.
    ///
    /// Self-sent lines are logged but never evaluated. Returns the number of
    /// callbacks invoked.
    pub fn on_incoming(&self, message: Message) -> usize {
        let deliveries = {
            let mut state = self.state.lock();
            let index = state.log.len();
            state.log.push(message);

            let CorrelatorState {
                log, subscribers, ..
            } = &mut *state;
            let log: &[Message] = log;

            let mut deliveries: Vec<Delivery> = Vec::new();
            for (subscriber, subscriptions) in subscribers.iter_mut() {
                for (key, subscription) in subscriptions.iter_mut() {
                    let Some(set) = self.registry.responses(key) else {
                        continue;
                    };
                    scan(key, set, log, subscription, index);
                    for matched in scan(key, set, log, subscription, index + 1) {
                        deliveries.push((subscription.callback.clone(), subscriber.clone(), matched));
                    }
                }
            }
            deliveries
        };

        trace!(deliveries = deliveries.len(), "Dispatching incoming line");
        deliver(deliveries)
    }

    /// Catches up every key of `subscriber` and re-delivers all recorded
    /// matches in ascending line order.
    ///
    /// Used when a widget (re)attaches and needs to rebuild its view.
    /// Returns the number of callbacks invoked.
    pub fn replay_history(&self, subscriber: &str) -> usize {
        let deliveries = {
            let mut state = self.state.lock();
            let CorrelatorState {
                log, subscribers, ..
            } = &mut *state;
            let log: &[Message] = log;
            let Some(subscriptions) = subscribers.get_mut(subscriber) else {
                return 0;
            };

            let mut deliveries: Vec<Delivery> = Vec::new();
            for (key, subscription) in subscriptions.iter_mut() {
                if let Some(set) = self.registry.responses(key) {
                    scan(key, set, log, subscription, log.len());
                }
                for matched in subscription.history.matches() {
                    deliveries.push((
                        subscription.callback.clone(),
                        subscriber.to_string(),
                        matched.clone(),
                    ));
                }
            }
            // Stable: ties keep key order, then match order.
            deliveries.sort_by_key(|(_, _, matched)| matched.line_index);
            deliveries
        };

        debug!(subscriber = %subscriber, count = deliveries.len(), "Replaying history");
        deliver(deliveries)
    }

    /// Snapshot of the incoming log.
    pub fn lines(&self) -> Vec<Message> {
        self.state.lock().log.clone()
    }

    pub fn line_count(&self) -> usize {
        self.state.lock().log.len()
    }

    // ========================================================================
    // Outgoing commands
    // ========================================================================

    /// Whether the literal command `group.command` is pending or already in
    /// the log, by its primary text or any alternate.
    ///
    /// Templated commands with unresolved parameters are never considered
    /// sent; unknown commands neither.
    pub fn has_command_been_sent(&self, group: &str, command: &str) -> bool {
        let Some(entry) = self.registry.command(group, command) else {
            return false;
        };
        if has_unresolved_params(entry.template().as_str()) {
            return false;
        }

        let spellings: Vec<&str> = entry
            .spellings()
            .map(|t| t.as_str())
            .filter(|text| !has_unresolved_params(text))
            .collect();

        let pending = self.sink.pending();
        if pending.iter().any(|p| spellings.contains(&p.as_str())) {
            return true;
        }
        self.state
            .lock()
            .log
            .iter()
            .any(|line| spellings.contains(&line.text()))
    }

    /// Renders `group.command` with `params` and enqueues it.
    ///
    /// Returns `Ok(false)` if the same text is already pending.
    pub fn send_command(
        &self,
        group: &str,
        command: &str,
        params: &HashMap<String, String>,
    ) -> ServiceResult<bool> {
        let entry = self
            .registry
            .command(group, command)
            .ok_or_else(|| ServiceError::UnknownCommand {
                group: group.to_string(),
                command: command.to_string(),
            })?;

        let text = entry.template().render(params);
        if has_unresolved_params(&text) {
            let params = entry
                .template()
                .params()
                .into_iter()
                .filter(|p| !params.contains_key(p))
                .collect();
            return Err(ServiceError::UnresolvedParams {
                command: format!("{group}.{command}"),
                params,
            });
        }

        let enqueued = self.sink.enqueue(text, false);
        debug!(group = %group, command = %command, enqueued, "Sent command");
        Ok(enqueued)
    }

    /// Sends `group.command` unless it has already been sent.
    ///
    /// Returns `Ok(true)` only if this call enqueued it.
    pub fn send_initial_command(&self, group: &str, command: &str) -> ServiceResult<bool> {
        if self.has_command_been_sent(group, command) {
            trace!(group = %group, command = %command, "Initial command already sent");
            return Ok(false);
        }
        self.send_command(group, command, &HashMap::new())
    }

    /// Enqueues free-form text, bypassing the registry.
    pub fn send_text(&self, text: impl Into<String>, allow_duplicates: bool) -> bool {
        self.sink.enqueue(text.into(), allow_duplicates)
    }
}

/// Evaluates log lines `[last_scanned, upto)` for one subscription, records
/// the matches and returns them.
fn scan(
    key: &str,
    set: &ResponseSet,
    log: &[Message],
    subscription: &mut Subscription,
    upto: usize,
) -> Vec<MatchedResponse> {
    let start = subscription.history.last_scanned();
    let upto = upto.min(log.len());
    if start >= upto {
        return Vec::new();
    }

    let mut found = Vec::new();
    for (index, line) in log.iter().enumerate().take(upto).skip(start) {
        if line.is_self() {
            continue;
        }
        for matched in set.evaluate(line.text()) {
            if !subscription.accepts(&matched.response_id) {
                continue;
            }
            trace!(key = %key, response = %matched.response_id, line = index, "Matched");
            let matched = MatchedResponse::new(key, matched, index, line.timestamp());
            subscription.history.record(matched.clone());
            found.push(matched);
        }
    }
    subscription.history.advance_to(upto);
    found
}

fn deliver(deliveries: Vec<Delivery>) -> usize {
    let count = deliveries.len();
    for (callback, subscriber, matched) in deliveries {
        callback(&subscriber, &matched);
    }
    count
}
