//! Mock transport for deterministic testing of the session layer.
//!
//! [`MockTransport`] implements the [`Transport`] trait with programmable
//! RDM responses and a record of everything that was sent. Because the
//! session takes ownership of its transport, all inspection and
//! programming happens through a cloneable [`MockHandle`] that shares state
//! with the transport.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use rdmx_core::{CommandKind, TransactionResult};
//! use rdmx_test_harness::MockTransport;
//!
//! let mock = MockTransport::new();
//! let handle = mock.handle();
//! // GET DMX_START_ADDRESS answers with address 1, once.
//! handle.respond(
//!     CommandKind::Get,
//!     0x00F0,
//!     TransactionResult::ack(&[0x00, 0x01], Duration::from_micros(800)),
//! );
//! ```

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use rdmx_core::error::{Error, Result};
use rdmx_core::helpers::format_hex;
use rdmx_core::transport::{RawLogSink, Transport};
use rdmx_core::types::{
    CommandKind, Direction, DmxFrame, LogEntry, ParameterDescriptor, RdmRequest,
    ResponseStatus, TransactionResult, Uid,
};

type ResponseKey = (CommandKind, u16);

struct MockState {
    device_count: usize,
    open: bool,
    firmware: String,
    serial: u32,
    /// One-shot responses, consumed in order.
    queued: HashMap<ResponseKey, VecDeque<TransactionResult>>,
    /// Responses returned every time once the queue for the key is empty.
    sticky: HashMap<ResponseKey, TransactionResult>,
    /// When set, an ACKed SET replaces the sticky GET response for that PID.
    echo_sets: bool,
    transact_error: Option<String>,
    transact_delay: Duration,
    discovered: Vec<Uid>,
    catalog: Vec<ParameterDescriptor>,
    frames: Vec<DmxFrame>,
    fail_frames: bool,
    frame_delay: Duration,
    requests: Vec<RdmRequest>,
    raw_log: Option<RawLogSink>,
    epoch: Instant,
}

impl MockState {
    fn log(&self, direction: Direction, bytes: &[u8]) {
        if let Some(sink) = &self.raw_log {
            let timestamp_us = i64::try_from(self.epoch.elapsed().as_micros()).unwrap_or(i64::MAX);
            sink(LogEntry {
                direction,
                hex: format_hex(bytes),
                timestamp_us,
            });
        }
    }

    fn next_response(&mut self, key: ResponseKey) -> TransactionResult {
        if let Some(result) = self.queued.get_mut(&key).and_then(VecDeque::pop_front) {
            return result;
        }
        self.sticky
            .get(&key)
            .cloned()
            .unwrap_or_else(|| TransactionResult::timeout(Duration::from_micros(2800)))
    }
}

/// Cloneable control and inspection handle for a [`MockTransport`].
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a one-shot response for `kind` on `pid`.
    pub fn respond(&self, kind: CommandKind, pid: u16, result: TransactionResult) {
        self.lock()
            .queued
            .entry((kind, pid))
            .or_default()
            .push_back(result);
    }

    /// Return `result` for every `kind` request on `pid` that finds no
    /// queued response.
    pub fn respond_always(&self, kind: CommandKind, pid: u16, result: TransactionResult) {
        self.lock().sticky.insert((kind, pid), result);
    }

    /// [`respond_always`](Self::respond_always) from a raw adapter status
    /// code (0 = ACK ... 5 = invalid). Returns `false` and programs nothing
    /// for an unknown code.
    pub fn respond_code(
        &self,
        kind: CommandKind,
        pid: u16,
        code: i32,
        payload: &[u8],
        latency: Duration,
    ) -> bool {
        let Some(status) = ResponseStatus::from_code(code) else {
            return false;
        };
        self.respond_always(
            kind,
            pid,
            TransactionResult {
                status,
                ..TransactionResult::ack(payload, latency)
            },
        );
        true
    }

    /// Make ACKed SETs update the GET response of the same PID.
    pub fn set_echo_sets(&self, on: bool) {
        self.lock().echo_sets = on;
    }

    /// Make every transaction fail at the transport level.
    pub fn set_transact_error(&self, message: Option<&str>) {
        self.lock().transact_error = message.map(str::to_string);
    }

    /// Simulated time each transaction takes.
    pub fn set_transact_delay(&self, delay: Duration) {
        self.lock().transact_delay = delay;
    }

    /// UIDs returned by discovery.
    pub fn set_discovered(&self, uids: &[Uid]) {
        self.lock().discovered = uids.to_vec();
    }

    /// Descriptors returned by the catalog loader.
    pub fn set_catalog(&self, catalog: Vec<ParameterDescriptor>) {
        self.lock().catalog = catalog;
    }

    /// Number of adapters reported by `list_devices`.
    pub fn set_device_count(&self, count: usize) {
        self.lock().device_count = count;
    }

    /// Force the open state without going through `open`/`close`.
    pub fn set_open(&self, open: bool) {
        self.lock().open = open;
    }

    /// Make every frame send fail.
    pub fn set_frame_failure(&self, fail: bool) {
        self.lock().fail_frames = fail;
    }

    /// Simulated time each frame send takes.
    pub fn set_frame_delay(&self, delay: Duration) {
        self.lock().frame_delay = delay;
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Number of frames successfully sent.
    pub fn frame_count(&self) -> usize {
        self.lock().frames.len()
    }

    /// The most recently sent frame.
    pub fn last_frame(&self) -> Option<DmxFrame> {
        self.lock().frames.last().copied()
    }

    /// Every frame successfully sent, oldest first.
    pub fn frames(&self) -> Vec<DmxFrame> {
        self.lock().frames.clone()
    }

    /// Every RDM request received, oldest first.
    pub fn requests(&self) -> Vec<RdmRequest> {
        self.lock().requests.clone()
    }

    /// Whether a raw log sink is installed.
    pub fn has_log_sink(&self) -> bool {
        self.lock().raw_log.is_some()
    }
}

/// A mock [`Transport`] for testing the session without an adapter.
///
/// Starts closed with one enumerable adapter. Unprogrammed transactions
/// answer with [`ResponseStatus::Timeout`].
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a closed mock transport.
    pub fn new() -> Self {
        MockTransport {
            state: Arc::new(Mutex::new(MockState {
                device_count: 1,
                open: false,
                firmware: "1.0".to_string(),
                serial: 0x0000_0001,
                queued: HashMap::new(),
                sticky: HashMap::new(),
                echo_sets: false,
                transact_error: None,
                transact_delay: Duration::ZERO,
                discovered: Vec::new(),
                catalog: Vec::new(),
                frames: Vec::new(),
                fail_frames: false,
                frame_delay: Duration::ZERO,
                requests: Vec::new(),
                raw_log: None,
                epoch: Instant::now(),
            })),
        }
    }

    /// Create a mock reporting the given adapter identity.
    pub fn with_identity(firmware: &str, serial: u32) -> Self {
        let mock = Self::new();
        {
            let mut state = mock.lock();
            state.firmware = firmware.to_string();
            state.serial = serial;
        }
        mock
    }

    /// A handle sharing this transport's state.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn list_devices(&mut self) -> Result<usize> {
        Ok(self.lock().device_count)
    }

    async fn open(&mut self, index: usize) -> Result<()> {
        let mut state = self.lock();
        if index >= state.device_count {
            return Err(Error::Transport(format!("no adapter at index {index}")));
        }
        state.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.lock().open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.lock().open
    }

    fn firmware_version(&self) -> String {
        self.lock().firmware.clone()
    }

    fn serial_number(&self) -> u32 {
        self.lock().serial
    }

    async fn send_frame(&mut self, frame: &DmxFrame) -> Result<()> {
        let delay = self.lock().frame_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.lock();
        if !state.open {
            return Err(Error::NotConnected);
        }
        if state.fail_frames {
            return Err(Error::Transport("frame write failed".into()));
        }
        state.frames.push(*frame);
        Ok(())
    }

    async fn discover(&mut self) -> Result<Vec<Uid>> {
        let state = self.lock();
        if !state.open {
            return Err(Error::NotConnected);
        }
        Ok(state.discovered.clone())
    }

    async fn transact(&mut self, request: &RdmRequest) -> Result<TransactionResult> {
        let delay = {
            let mut state = self.lock();
            if !state.open {
                return Err(Error::NotConnected);
            }
            state.requests.push(request.clone());
            let mut tx = vec![0xCC, 0x01];
            tx.extend_from_slice(&request.pid.to_be_bytes());
            tx.extend_from_slice(&request.payload);
            state.log(Direction::Tx, &tx);
            state.transact_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if let Some(message) = &state.transact_error {
            return Err(Error::Transport(message.clone()));
        }
        let result = state.next_response((request.kind, request.pid));
        if result.status != ResponseStatus::Timeout {
            let mut rx = vec![0xCC, 0x01];
            rx.extend_from_slice(&request.pid.to_be_bytes());
            rx.extend_from_slice(&result.payload);
            state.log(Direction::Rx, &rx);
        }
        if state.echo_sets
            && request.kind == CommandKind::Set
            && result.status == ResponseStatus::Ack
        {
            let echoed = TransactionResult::ack(&request.payload, result.latency);
            state.sticky.insert((CommandKind::Get, request.pid), echoed);
        }
        Ok(result)
    }

    async fn load_parameter_catalog(&mut self, path: &Path) -> Result<Vec<ParameterDescriptor>> {
        let state = self.lock();
        if state.catalog.is_empty() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("catalog {} not found", path.display()),
            )));
        }
        Ok(state.catalog.clone())
    }

    fn subscribe_raw_log(&mut self, sink: RawLogSink) {
        self.lock().raw_log = Some(sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(pid: u16) -> RdmRequest {
        RdmRequest::new(CommandKind::Get, Uid::from_parts(0x4845, 1), pid, &[]).unwrap()
    }

    #[tokio::test]
    async fn starts_closed() {
        let mut mock = MockTransport::new();
        assert!(!mock.is_open());
        let result = mock.send_frame(&[0u8; 513]).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn open_out_of_range_fails() {
        let mut mock = MockTransport::new();
        assert_eq!(mock.list_devices().await.unwrap(), 1);
        assert!(matches!(mock.open(1).await, Err(Error::Transport(_))));
        mock.open(0).await.unwrap();
        assert!(mock.is_open());
    }

    #[tokio::test]
    async fn records_frames() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();
        mock.open(0).await.unwrap();

        let mut frame = [0u8; 513];
        frame[1] = 42;
        mock.send_frame(&frame).await.unwrap();

        assert_eq!(handle.frame_count(), 1);
        assert_eq!(handle.last_frame().unwrap()[1], 42);
    }

    #[tokio::test]
    async fn frame_failure_is_not_recorded() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();
        mock.open(0).await.unwrap();
        handle.set_frame_failure(true);

        assert!(mock.send_frame(&[0u8; 513]).await.is_err());
        assert_eq!(handle.frame_count(), 0);
    }

    #[tokio::test]
    async fn unprogrammed_transaction_times_out() {
        let mut mock = MockTransport::new();
        mock.open(0).await.unwrap();
        let result = mock.transact(&get(0x0082)).await.unwrap();
        assert_eq!(result.status, ResponseStatus::Timeout);
    }

    #[tokio::test]
    async fn queued_before_sticky() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();
        mock.open(0).await.unwrap();
        handle.respond(
            CommandKind::Get,
            0x00F0,
            TransactionResult::nack(0x0006, Duration::ZERO),
        );
        handle.respond_always(
            CommandKind::Get,
            0x00F0,
            TransactionResult::ack(&[0x00, 0x01], Duration::ZERO),
        );

        let first = mock.transact(&get(0x00F0)).await.unwrap();
        let second = mock.transact(&get(0x00F0)).await.unwrap();
        let third = mock.transact(&get(0x00F0)).await.unwrap();

        assert_eq!(first.status, ResponseStatus::Nack);
        assert_eq!(second.payload, vec![0x00, 0x01]);
        assert_eq!(third.payload, vec![0x00, 0x01]);
        assert_eq!(handle.requests().len(), 3);
    }

    #[tokio::test]
    async fn echo_sets_updates_get() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();
        mock.open(0).await.unwrap();
        handle.set_echo_sets(true);
        handle.respond_always(
            CommandKind::Set,
            0x00F0,
            TransactionResult::ack(&[], Duration::ZERO),
        );

        let set = RdmRequest::new(CommandKind::Set, Uid::BROADCAST, 0x00F0, &[0x00, 0x20]).unwrap();
        mock.transact(&set).await.unwrap();
        let result = mock.transact(&get(0x00F0)).await.unwrap();
        assert_eq!(result.payload, vec![0x00, 0x20]);
    }

    #[tokio::test]
    async fn raw_status_codes_map_to_results() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();
        mock.open(0).await.unwrap();
        assert!(handle.respond_code(CommandKind::Get, 0x0080, 1, &[0x00, 0x0A], Duration::ZERO));
        assert!(!handle.respond_code(CommandKind::Get, 0x0081, 9, &[], Duration::ZERO));

        let result = mock.transact(&get(0x0080)).await.unwrap();
        assert_eq!(result.status, ResponseStatus::AckTimer);
        assert_eq!(result.payload, vec![0x00, 0x0A]);
        let result = mock.transact(&get(0x0081)).await.unwrap();
        assert_eq!(result.status, ResponseStatus::Timeout);
    }

    #[tokio::test]
    async fn transact_error_is_err() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();
        mock.open(0).await.unwrap();
        handle.set_transact_error(Some("cable pulled"));
        assert!(matches!(
            mock.transact(&get(0x0060)).await,
            Err(Error::Transport(_))
        ));
    }

    #[tokio::test]
    async fn raw_log_sees_tx_and_rx() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();
        mock.open(0).await.unwrap();
        handle.respond_always(
            CommandKind::Get,
            0x1000,
            TransactionResult::ack(&[0x01], Duration::ZERO),
        );

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        mock.subscribe_raw_log(Box::new(move |entry| {
            sink_seen.lock().unwrap().push(entry);
        }));
        assert!(handle.has_log_sink());

        mock.transact(&get(0x1000)).await.unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].direction, Direction::Tx);
        assert_eq!(seen[0].hex, "CC 01 10 00");
        assert_eq!(seen[1].direction, Direction::Rx);
        assert_eq!(seen[1].hex, "CC 01 10 00 01");
    }

    #[tokio::test]
    async fn empty_catalog_is_not_found() {
        let mut mock = MockTransport::new();
        let result = mock.load_parameter_catalog(Path::new("pids.xml")).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
