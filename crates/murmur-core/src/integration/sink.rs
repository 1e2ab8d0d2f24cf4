//! Outbound command sink.

/// Where the correlator enqueues outbound command text.
///
/// [`MessageQueue`](crate::ratelimit::MessageQueue) is the production
/// implementation; the pending snapshot lets callers avoid re-sending a command
/// that is still waiting for a rate-limit slot.
pub trait CommandSink: Send + Sync {
    /// Enqueues `text`. Returns `false` if it was suppressed as a duplicate.
    fn enqueue(&self, text: String, allow_duplicates: bool) -> bool;

    /// Lines not yet delivered, in send order, including one whose send is
    /// still awaiting the transport.
    fn pending(&self) -> Vec<String>;
}
