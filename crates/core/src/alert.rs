//! Operator alerting seam.
//!
//! The core hands a free-text message to whatever notifier the deployment
//! wires in (SMS gateway, pager, log). Delivery failure must never fail
//! the operation that raised the alert, so implementations report success
//! as a boolean and callers ignore it beyond logging.

use async_trait::async_trait;

#[async_trait]
pub trait Alerter: Send + Sync {
    /// Deliver `body` to the operators. Returns whether delivery was
    /// accepted by the downstream channel.
    async fn alert(&self, body: &str) -> bool;
}

/// Default alerter: writes the message to the log at warn level.
#[derive(Default)]
pub struct LogAlerter;

#[async_trait]
impl Alerter for LogAlerter {
    async fn alert(&self, body: &str) -> bool {
        tracing::warn!(target: "creel::alert", "operator alert: {body}");
        true
    }
}

/// Alerter that drops everything, for deployments with alerting disabled.
#[derive(Default)]
pub struct NullAlerter;

#[async_trait]
impl Alerter for NullAlerter {
    async fn alert(&self, _body: &str) -> bool {
        true
    }
}
