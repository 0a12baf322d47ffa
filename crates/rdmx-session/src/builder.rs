//! SessionBuilder -- fluent builder for constructing [`Session`] instances.
//!
//! Separates configuration from construction so callers can choose output
//! rates, fixture footprint and buffer sizes before the session task and
//! the DMX emitter are spawned.
//!
//! # Example
//!
//! ```no_run
//! use rdmx_session::builder::SessionBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> rdmx_core::Result<()> {
//! let session = SessionBuilder::new()
//!     .refresh_rate(30)
//!     .footprint(24)
//!     .catalog_path("rdm_map.csv")
//!     .jitter_threshold(Duration::from_millis(8))
//!     .build_with_transport(todo!())
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use rdmx_core::error::{Error, Result};
use rdmx_core::transport::Transport;
use rdmx_core::types::{DMX_SLOTS, ParameterDescriptor};

use crate::emitter::{DEFAULT_MAX_REFRESH_HZ, DEFAULT_REFRESH_HZ};
use crate::session::Session;

/// Default fixture footprint before DEVICE_INFO says otherwise.
pub const DEFAULT_FOOTPRINT: u16 = 16;

/// Default raw log ring capacity.
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// Default event broadcast capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Default flicker finder degradation threshold.
pub const DEFAULT_JITTER_THRESHOLD: Duration = Duration::from_millis(10);

/// Resolved session configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub refresh_hz: u32,
    pub max_refresh_hz: u32,
    pub footprint: u16,
    pub log_capacity: usize,
    pub event_capacity: usize,
    pub jitter_threshold: Duration,
    /// Catalog loaded through the transport at build time.
    pub catalog_path: Option<PathBuf>,
    /// Start the DMX emitter as soon as the session is built.
    pub auto_start: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            refresh_hz: DEFAULT_REFRESH_HZ,
            max_refresh_hz: DEFAULT_MAX_REFRESH_HZ,
            footprint: DEFAULT_FOOTPRINT,
            log_capacity: DEFAULT_LOG_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            jitter_threshold: DEFAULT_JITTER_THRESHOLD,
            catalog_path: None,
            auto_start: true,
        }
    }
}

/// Fluent builder for [`Session`].
///
/// Every setting has a default, so the simplest usage is:
///
/// ```ignore
/// let session = SessionBuilder::new()
///     .build_with_transport(Box::new(transport))
///     .await?;
/// ```
#[derive(Debug, Default)]
pub struct SessionBuilder {
    config: SessionConfig,
    catalog: Option<Vec<ParameterDescriptor>>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// DMX output refresh rate in Hz (default 25).
    pub fn refresh_rate(mut self, hz: u32) -> Self {
        self.config.refresh_hz = hz;
        self
    }

    /// Upper bound accepted by [`Session::set_refresh_rate`] (default 44).
    pub fn max_refresh_rate(mut self, hz: u32) -> Self {
        self.config.max_refresh_hz = hz;
        self
    }

    /// Initial channel count (default 16).
    pub fn footprint(mut self, footprint: u16) -> Self {
        self.config.footprint = footprint;
        self
    }

    pub fn log_capacity(mut self, entries: usize) -> Self {
        self.config.log_capacity = entries;
        self
    }

    pub fn event_capacity(mut self, events: usize) -> Self {
        self.config.event_capacity = events;
        self
    }

    /// Flicker finder jitter above which a run is reported degraded.
    pub fn jitter_threshold(mut self, threshold: Duration) -> Self {
        self.config.jitter_threshold = threshold;
        self
    }

    /// Load the parameter catalog from `path` through the transport.
    ///
    /// Takes precedence over [`catalog`](Self::catalog).
    pub fn catalog_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.catalog_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Use an already-parsed catalog.
    pub fn catalog(mut self, catalog: Vec<ParameterDescriptor>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Whether DMX output starts immediately (default `true`).
    pub fn auto_start(mut self, enabled: bool) -> Self {
        self.config.auto_start = enabled;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn validate(&self) -> Result<()> {
        let c = &self.config;
        if c.max_refresh_hz == 0 {
            return Err(Error::InvalidParameter(
                "max_refresh_rate must be at least 1 Hz".into(),
            ));
        }
        if !(1..=c.max_refresh_hz).contains(&c.refresh_hz) {
            return Err(Error::InvalidParameter(format!(
                "refresh_rate {} outside 1..={}",
                c.refresh_hz, c.max_refresh_hz
            )));
        }
        if !(1..=DMX_SLOTS as u16).contains(&c.footprint) {
            return Err(Error::InvalidParameter(format!(
                "footprint {} outside 1..={DMX_SLOTS}",
                c.footprint
            )));
        }
        if c.log_capacity == 0 || c.event_capacity == 0 {
            return Err(Error::InvalidParameter(
                "log and event capacities must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Build a [`Session`] around a caller-supplied transport.
    ///
    /// The transport may be closed; [`Session::connect`] opens it. Pass a
    /// `MockTransport` from `rdmx-test-harness` for testing.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<Session> {
        self.validate()?;
        Session::start(self.config, self.catalog.unwrap_or_default(), transport).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdmx_test_harness::{MockTransport, SimulatedFixture};

    #[test]
    fn config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.refresh_hz, 25);
        assert_eq!(config.max_refresh_hz, 44);
        assert_eq!(config.footprint, 16);
        assert_eq!(config.log_capacity, 500);
        assert_eq!(config.event_capacity, 256);
        assert_eq!(config.jitter_threshold, Duration::from_millis(10));
        assert!(config.catalog_path.is_none());
        assert!(config.auto_start);
    }

    #[tokio::test]
    async fn builder_defaults() {
        let session = SessionBuilder::new()
            .build_with_transport(Box::new(MockTransport::new()))
            .await
            .unwrap();
        assert_eq!(session.refresh_rate(), 25);
        assert!(session.is_output_running());
        let snap = session.snapshot().await.unwrap();
        assert_eq!(snap.footprint(), 16);
        assert!(snap.pids.is_empty());
    }

    #[tokio::test]
    async fn builder_fluent_chain() {
        let session = SessionBuilder::new()
            .refresh_rate(40)
            .max_refresh_rate(50)
            .footprint(8)
            .log_capacity(10)
            .event_capacity(16)
            .jitter_threshold(Duration::from_millis(5))
            .catalog(SimulatedFixture::catalog())
            .auto_start(false)
            .build_with_transport(Box::new(MockTransport::new()))
            .await
            .unwrap();
        assert_eq!(session.refresh_rate(), 40);
        assert!(!session.is_output_running());
        assert!(session.set_refresh_rate(50));
        let snap = session.snapshot().await.unwrap();
        assert_eq!(snap.footprint(), 8);
        assert_eq!(snap.pids.len(), 16);
    }

    #[tokio::test]
    async fn builder_loads_catalog_path() {
        let (mock, _handle) = SimulatedFixture::default().into_transport();
        let session = SessionBuilder::new()
            .catalog_path("fixture.csv")
            .auto_start(false)
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();
        assert_eq!(session.catalog().await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn builder_missing_catalog_fails() {
        let result = SessionBuilder::new()
            .catalog_path("missing.csv")
            .build_with_transport(Box::new(MockTransport::new()))
            .await;
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn builder_rejects_bad_rates() {
        let result = SessionBuilder::new()
            .refresh_rate(45)
            .build_with_transport(Box::new(MockTransport::new()))
            .await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));

        let result = SessionBuilder::new()
            .refresh_rate(0)
            .build_with_transport(Box::new(MockTransport::new()))
            .await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn builder_rejects_bad_footprint() {
        let result = SessionBuilder::new()
            .footprint(513)
            .build_with_transport(Box::new(MockTransport::new()))
            .await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }
}
