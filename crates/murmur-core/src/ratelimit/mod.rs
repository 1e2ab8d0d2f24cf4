//! Outbound pacing: sliding-window counters and the rate-limited queue.

pub mod queue;
pub mod rolling;

pub use queue::{CheckFn, MessageQueue, QueueConfig, SendFn};
pub use rolling::RollingTimer;
