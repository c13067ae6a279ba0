//! Transport-polymorphism seam (spec.md §5): the three ways a connector can
//! be driven — a long-lived broker consumer, a one-shot batch/logfile run,
//! or a single local invocation — share the same [`crate::processor::MessageProcessor`]
//! but differ in how they receive work and where outcomes go.

pub mod batch;
pub mod broker;
pub mod local;

use async_trait::async_trait;

/// Common lifecycle every transport exposes to whatever embeds it.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Starts the transport's receive loop. Returns once the transport has
    /// permanently stopped (normal exhaustion, `stop()`, or a fatal error).
    async fn start(&self) -> Result<(), crate::error::ConnectorError>;

    /// Requests the transport wind down after its current in-flight message.
    fn stop(&self);

    /// Whether the transport is still expected to make progress.
    fn alive(&self) -> bool;
}
