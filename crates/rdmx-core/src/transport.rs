//! Transport trait for the DMX/RDM adapter.
//!
//! The [`Transport`] trait abstracts over the driver that owns the physical
//! serial line. It already knows how to put a DMX frame or an RDM request on
//! the wire, run electrical discovery and compute checksums; the session
//! layer only decides *when* each of those happens.
//!
//! Session components operate on a `Transport` rather than a concrete driver,
//! enabling both real hardware control and deterministic unit testing with
//! `MockTransport` from the `rdmx-test-harness` crate.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{DmxFrame, LogEntry, ParameterDescriptor, RdmRequest, TransactionResult, Uid};

/// Callback receiving every raw frame the transport sends or receives.
///
/// The transport owns the closure for as long as the subscription lasts.
pub type RawLogSink = Box<dyn Fn(LogEntry) + Send + Sync>;

/// Asynchronous access to one DMX/RDM adapter.
///
/// Calls are serialized by the session's channel arbiter; implementations
/// never see two concurrent calls.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Enumerate attached adapters and return how many were found.
    async fn list_devices(&mut self) -> Result<usize>;

    /// Open the adapter at `index` (as counted by [`list_devices`](Self::list_devices)).
    async fn open(&mut self, index: usize) -> Result<()>;

    /// Close the open adapter. Closing an already-closed transport is a no-op.
    async fn close(&mut self) -> Result<()>;

    /// Whether an adapter is currently open.
    fn is_open(&self) -> bool;

    /// Firmware version string of the open adapter.
    fn firmware_version(&self) -> String;

    /// Serial number of the open adapter.
    fn serial_number(&self) -> u32;

    /// Put one 513-byte DMX frame on the wire.
    async fn send_frame(&mut self, frame: &DmxFrame) -> Result<()>;

    /// Run RDM discovery and return every UID that answered.
    async fn discover(&mut self) -> Result<Vec<Uid>>;

    /// Perform one RDM GET or SET transaction.
    ///
    /// Device-level failures (NACK, timeout, bad checksum) come back as a
    /// [`TransactionResult`] status. `Err` means the adapter itself failed.
    async fn transact(&mut self, request: &RdmRequest) -> Result<TransactionResult>;

    /// Parse a parameter catalog file.
    async fn load_parameter_catalog(&mut self, path: &Path) -> Result<Vec<ParameterDescriptor>>;

    /// Install the raw frame log callback, replacing any previous one.
    fn subscribe_raw_log(&mut self, sink: RawLogSink);
}
