//! # LogObserver — simple lifecycle logger
//!
//! A minimal observer that logs every hook through `tracing`.
//! Use it for tests or demos.
//!
//! ## Example output
//! ```text
//! INFO [before-run] observer="log"
//! DEBUG [heartbeat] observer="log"
//! INFO [custom-event] observer="log" event="spike" offset=13s settings=Some("rps=200")
//! INFO [after-run] observer="log"
//! WARN [abort] observer="log"
//! ```

use std::borrow::Cow;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::ObserverError;
use crate::observers::Observer;
use crate::timeline::TimelineEntry;

/// Lifecycle logging observer.
#[derive(Debug, Clone)]
pub struct LogObserver {
    name: Cow<'static, str>,
}

impl LogObserver {
    /// Construct a new [`LogObserver`] named `log`.
    #[must_use]
    pub fn new() -> Self {
        Self { name: "log".into() }
    }

    /// Construct a logger with a custom name (names must be unique per session).
    #[must_use]
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for LogObserver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Observer for LogObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "LogObserver"
    }

    async fn before_run(&self) -> Result<(), ObserverError> {
        info!(observer = %self.name, "[before-run]");
        Ok(())
    }

    async fn after_run(&self) -> Result<(), ObserverError> {
        info!(observer = %self.name, "[after-run]");
        Ok(())
    }

    async fn heartbeat(&self) -> Result<(), ObserverError> {
        debug!(observer = %self.name, "[heartbeat]");
        Ok(())
    }

    async fn abort(&self) -> Result<(), ObserverError> {
        warn!(observer = %self.name, "[abort]");
        Ok(())
    }

    async fn custom_event(&self, entry: &TimelineEntry) -> Result<(), ObserverError> {
        info!(
            observer = %self.name,
            event = entry.name(),
            offset = ?entry.offset(),
            settings = ?entry.settings(),
            "[custom-event]"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CheckStatus;
    use std::time::Duration;

    #[tokio::test]
    async fn hooks_succeed() {
        let obs = LogObserver::named("logger");
        assert_eq!(obs.name(), "logger");
        assert!(obs.before_run().await.is_ok());
        assert!(obs.heartbeat().await.is_ok());
        let entry = TimelineEntry::new(Duration::from_secs(1), "spike", None, None);
        assert!(obs.custom_event(&entry).await.is_ok());
        assert_eq!(obs.check().await.unwrap().status, CheckStatus::Unknown);
    }
}
