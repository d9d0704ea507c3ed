//! # Test-registration collaborator.
//!
//! The scheduler notifies an external registration endpoint before each
//! heartbeat broadcast and before each custom event broadcast. Failures are
//! logged and never affect the broadcast that follows.

use async_trait::async_trait;

use crate::error::BoxError;

/// External endpoint tracking the run (heartbeats, custom events).
#[async_trait]
pub trait Registrar: Send + Sync + 'static {
    /// Reports that the run identified by `run_id` is alive.
    async fn notify_heartbeat(&self, run_id: &str) -> Result<(), BoxError>;

    /// Reports that a timeline entry fired.
    async fn notify_custom_event(&self, run_id: &str, description: &str) -> Result<(), BoxError>;
}

/// Registrar that does nothing; used when no endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRegistrar;

#[async_trait]
impl Registrar for NoopRegistrar {
    async fn notify_heartbeat(&self, _run_id: &str) -> Result<(), BoxError> {
        Ok(())
    }

    async fn notify_custom_event(&self, _run_id: &str, _description: &str) -> Result<(), BoxError> {
        Ok(())
    }
}
