//! The caller-facing session.
//!
//! A [`Session`] ties the pieces together: the [`ChannelArbiter`] owning the
//! transport, the always-on [`PeriodicEmitter`], the state task holding the
//! parameter table and fader levels, and the single background activity
//! slot shared by effects, diagnostics and batch queries.
//!
//! Caller-initiated RDM operations set a session-wide busy flag for their
//! whole duration. A second operation started while the flag is up fails
//! with [`Error::Busy`] without touching the line.
//!
//! Constructed via [`SessionBuilder`](crate::builder::SessionBuilder).

use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rdmx_core::error::{Error, Result};
use rdmx_core::events::SessionEvent;
use rdmx_core::helpers::parse_hex_payload;
use rdmx_core::transport::Transport;
use rdmx_core::types::{
    AdapterInfo, CommandKind, PID_DEVICE_INFO, PID_DMX_START_ADDRESS, PID_IDENTIFY_DEVICE,
    PID_SUPPORTED_PARAMETERS, ParameterDescriptor, ResponseStatus, TransactionResult, Uid,
    DMX_SLOTS,
};

use crate::activity::{ActivityKind, ActivitySlot};
use crate::arbiter::ChannelArbiter;
use crate::builder::SessionConfig;
use crate::decoder::{self, Decoded, DeviceInfo};
use crate::diagnostics::{
    self, FlickerParams, FlickerReport, RdmStressParams, RdmStressReport, ThroughputReport,
};
use crate::effects::{self, ChannelSink, ChaseParams, FadeParams};
use crate::emitter::PeriodicEmitter;
use crate::executor::TransactionExecutor;
use crate::export;
use crate::scorecard::{IMPLICITLY_SUPPORTED, Scorecard};
use crate::state::{SessionSnapshot, SessionState};
use crate::task::{Request, SessionTask, StateHandle, spawn_session_task};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Outcome of a single GET or SET.
#[derive(Debug, Clone, PartialEq)]
pub struct PidReply {
    pub result: TransactionResult,
    pub decoded: Decoded,
}

/// Outcome of a SUPPORTED_PARAMETERS cross-check.
#[derive(Debug, Clone, PartialEq)]
pub struct SupportedCheck {
    /// Listed parameters plus the implicitly supported ones, ascending.
    pub supported: Vec<u16>,
    pub scorecard: Scorecard,
}

// ---------------------------------------------------------------------------
// Busy flag
// ---------------------------------------------------------------------------

struct BusyFlag {
    busy: AtomicBool,
    status: Mutex<String>,
    idle: Notify,
    events: broadcast::Sender<SessionEvent>,
}

impl BusyFlag {
    fn new(events: broadcast::Sender<SessionEvent>) -> Self {
        BusyFlag {
            busy: AtomicBool::new(false),
            status: Mutex::new(String::new()),
            idle: Notify::new(),
            events,
        }
    }

    fn status(&self) -> std::sync::MutexGuard<'_, String> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Raise the flag, or fail with what the session is already doing.
    fn begin(self: &Arc<Self>, status: impl Into<String>) -> Result<BusyGuard> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::Busy(self.status().clone()));
        }
        let status = status.into();
        *self.status() = status.clone();
        let _ = self.events.send(SessionEvent::BusyChanged { busy: true, status });
        Ok(BusyGuard {
            flag: Arc::clone(self),
        })
    }

    /// Raise the flag once whatever holds it now has finished.
    async fn begin_when_idle(self: &Arc<Self>, status: &str) -> BusyGuard {
        loop {
            let idle = self.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if let Ok(guard) = self.begin(status) {
                return guard;
            }
            idle.await;
        }
    }
}

/// Lowers the busy flag when dropped.
struct BusyGuard {
    flag: Arc<BusyFlag>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.status().clear();
        self.flag.busy.store(false, Ordering::Release);
        let _ = self.flag.events.send(SessionEvent::BusyChanged {
            busy: false,
            status: String::new(),
        });
        self.flag.idle.notify_waiters();
    }
}

// ---------------------------------------------------------------------------
// Effects sink
// ---------------------------------------------------------------------------

#[async_trait]
impl ChannelSink for StateHandle {
    async fn channel_indices(&self) -> Vec<u16> {
        self.call(|reply| Request::ChannelIndices { reply })
            .await
            .unwrap_or_default()
    }

    async fn fill(&self, level: u8) {
        let _ = self.notify(Request::FillChannels { level }).await;
    }

    async fn solo(&self, index: u16, level: u8) {
        let _ = self.notify(Request::SoloChannel { index, level }).await;
    }

    async fn status(&self, text: String) {
        self.activity_status(text).await;
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A DMX/RDM session over one adapter.
pub struct Session {
    config: SessionConfig,
    arbiter: Arc<ChannelArbiter>,
    executor: TransactionExecutor,
    emitter: PeriodicEmitter,
    task: SessionTask,
    state: StateHandle,
    event_tx: broadcast::Sender<SessionEvent>,
    busy: Arc<BusyFlag>,
    activity: ActivitySlot,
    connected: AtomicBool,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.activity.shutdown();
        self.task.cancel.cancel();
        self.task.task.abort();
    }
}

impl Session {
    /// Wire up and spawn everything. Called by the builder.
    pub(crate) async fn start(
        config: SessionConfig,
        catalog: Vec<ParameterDescriptor>,
        mut transport: Box<dyn Transport>,
    ) -> Result<Self> {
        let catalog = match &config.catalog_path {
            Some(path) => transport.load_parameter_catalog(path).await?,
            None => catalog,
        };

        let (log_tx, log_rx) = mpsc::unbounded_channel();
        transport.subscribe_raw_log(Box::new(move |entry| {
            let _ = log_tx.send(entry);
        }));

        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let mut state = SessionState::new(config.footprint, config.log_capacity);
        state.set_catalog(catalog);
        let (inputs_tx, inputs_rx) = watch::channel(state.frame_inputs());
        let task = spawn_session_task(state, event_tx.clone(), inputs_tx, log_rx);

        let arbiter = Arc::new(ChannelArbiter::new(transport));
        let emitter = PeriodicEmitter::new(
            Arc::clone(&arbiter),
            inputs_rx,
            config.refresh_hz,
            config.max_refresh_hz,
        );
        if config.auto_start {
            emitter.start();
        }

        info!(
            refresh_hz = config.refresh_hz,
            footprint = config.footprint,
            "session started"
        );
        Ok(Session {
            executor: TransactionExecutor::new(Arc::clone(&arbiter)),
            arbiter,
            emitter,
            state: task.handle.clone(),
            task,
            busy: Arc::new(BusyFlag::new(event_tx.clone())),
            event_tx,
            activity: ActivitySlot::new(),
            connected: AtomicBool::new(false),
            config,
        })
    }

    // -- Observation --------------------------------------------------------

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// An immutable copy of the whole session state.
    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let mut snap = self.state.snapshot().await?;
        snap.busy = self.busy.is_busy();
        snap.refresh_hz = self.emitter.refresh_hz();
        snap.output_running = self.emitter.is_running();
        snap.frame_count = self.emitter.frame_count();
        Ok(snap)
    }

    pub async fn scorecard(&self) -> Result<Scorecard> {
        self.state.scorecard().await
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    // -- Connection ---------------------------------------------------------

    /// Number of adapters the transport can see.
    pub async fn list_devices(&self) -> Result<usize> {
        self.arbiter
            .run_exclusive(|t| Box::pin(async move { t.list_devices().await }))
            .await
    }

    /// Open adapter `index` and record its identity.
    pub async fn connect(&self, index: usize) -> Result<AdapterInfo> {
        if self.is_connected() {
            return Err(Error::InvalidParameter("adapter already open".into()));
        }
        let info = self
            .arbiter
            .run_exclusive(move |t| {
                Box::pin(async move {
                    t.open(index).await?;
                    Ok::<_, Error>(AdapterInfo {
                        index,
                        firmware: t.firmware_version(),
                        serial: t.serial_number(),
                    })
                })
            })
            .await?;
        self.connected.store(true, Ordering::Release);
        self.state
            .notify(Request::SetConnection {
                info: Some(info.clone()),
            })
            .await?;
        info!(
            index,
            firmware = %info.firmware,
            serial = %info.serial_hex(),
            "adapter connected"
        );
        Ok(info)
    }

    /// Stop any activity, close the adapter and forget discovered devices.
    ///
    /// An RDM operation already in flight is allowed to finish first. No-op
    /// if not connected.
    pub async fn disconnect(&self) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }
        self.activity.cancel().await;
        let _busy = self.busy.begin_when_idle("Disconnecting...").await;
        if !self.is_connected() {
            return Ok(());
        }
        self.connected.store(false, Ordering::Release);
        let closed = self
            .arbiter
            .run_exclusive(|t| Box::pin(async move { t.close().await }))
            .await;
        self.state
            .notify(Request::SetConnection { info: None })
            .await?;
        info!("adapter disconnected");
        closed
    }

    // -- Catalog ------------------------------------------------------------

    /// Replace the catalog with one loaded through the transport.
    ///
    /// Returns the number of parameters loaded. All previous results are
    /// discarded.
    pub async fn load_catalog(&self, path: &Path) -> Result<usize> {
        let path = path.to_path_buf();
        let catalog = self
            .arbiter
            .run_exclusive(move |t| Box::pin(async move { t.load_parameter_catalog(&path).await }))
            .await?;
        let count = catalog.len();
        self.set_catalog(catalog).await?;
        Ok(count)
    }

    /// Replace the catalog. All previous results are discarded.
    pub async fn set_catalog(&self, catalog: Vec<ParameterDescriptor>) -> Result<()> {
        self.state.notify(Request::SetCatalog { catalog }).await
    }

    pub async fn catalog(&self) -> Result<Vec<ParameterDescriptor>> {
        self.state.catalog().await
    }

    // -- RDM ----------------------------------------------------------------

    /// Run RDM discovery. Returns every known UID in first-seen order.
    pub async fn discover(&self) -> Result<Vec<Uid>> {
        self.ensure_connected()?;
        let _busy = self.busy.begin("Discovering RDM devices...")?;
        let found = self
            .arbiter
            .run_exclusive(|t| Box::pin(async move { t.discover().await }))
            .await?;
        let uids = self
            .state
            .call(|reply| Request::SetDiscovered { uids: found, reply })
            .await?;
        info!(count = uids.len(), "discovery complete");
        Ok(uids)
    }

    async fn transact_and_apply(
        &self,
        kind: CommandKind,
        target: Uid,
        pid: u16,
        payload: &[u8],
    ) -> Result<PidReply> {
        let result = self.executor.execute(kind, target, pid, payload).await?;
        let decoded = self.state.apply_result(pid, result.clone()).await?;
        Ok(PidReply { result, decoded })
    }

    /// GET one parameter and record the result in its catalog row.
    pub async fn query_pid(&self, target: Uid, pid: u16, payload: &[u8]) -> Result<PidReply> {
        self.ensure_connected()?;
        let _busy = self.busy.begin(format!("Querying PID 0x{pid:04X}..."))?;
        self.transact_and_apply(CommandKind::Get, target, pid, payload)
            .await
    }

    /// [`query_pid`](Self::query_pid) with a hex payload such as `"01 02"`.
    ///
    /// Returns `Ok(None)` without sending anything if `hex` does not parse.
    pub async fn query_pid_hex(&self, target: Uid, pid: u16, hex: &str) -> Result<Option<PidReply>> {
        let Some(payload) = parse_hex_payload(hex) else {
            debug!(hex, "ignoring unparseable payload");
            return Ok(None);
        };
        self.query_pid(target, pid, &payload).await.map(Some)
    }

    /// SET one parameter and record the result in its catalog row.
    pub async fn set_pid(&self, target: Uid, pid: u16, payload: &[u8]) -> Result<PidReply> {
        self.ensure_connected()?;
        let _busy = self.busy.begin(format!("SET PID 0x{pid:04X}..."))?;
        self.transact_and_apply(CommandKind::Set, target, pid, payload)
            .await
    }

    /// [`set_pid`](Self::set_pid) with a hex payload.
    ///
    /// Returns `Ok(None)` without sending anything if `hex` does not parse.
    pub async fn set_pid_hex(&self, target: Uid, pid: u16, hex: &str) -> Result<Option<PidReply>> {
        let Some(payload) = parse_hex_payload(hex) else {
            debug!(hex, "ignoring unparseable payload");
            return Ok(None);
        };
        self.set_pid(target, pid, &payload).await.map(Some)
    }

    /// Switch identify mode on the fixture.
    ///
    /// The tracked identify state only changes on ACK.
    pub async fn identify(&self, target: Uid, on: bool) -> Result<TransactionResult> {
        self.ensure_connected()?;
        let _busy = self
            .busy
            .begin(if on { "Identify ON..." } else { "Identify OFF..." })?;
        let result = self
            .executor
            .execute(CommandKind::Set, target, PID_IDENTIFY_DEVICE, &[u8::from(on)])
            .await?;
        if result.status == ResponseStatus::Ack {
            self.state.notify(Request::SetIdentify { on }).await?;
        }
        Ok(result)
    }

    /// Read the fixture's DMX start address.
    ///
    /// On ACK the local start address follows it. Returns `None` for any
    /// other status or a short payload.
    pub async fn get_start_address(&self, target: Uid) -> Result<Option<u16>> {
        self.ensure_connected()?;
        let _busy = self.busy.begin("Getting DMX address...")?;
        let result = self
            .executor
            .execute(CommandKind::Get, target, PID_DMX_START_ADDRESS, &[])
            .await?;
        if result.status != ResponseStatus::Ack || result.payload.len() < 2 {
            return Ok(None);
        }
        let address = u16::from_be_bytes([result.payload[0], result.payload[1]]);
        self.set_local_start_address(address).await?;
        Ok(Some(address))
    }

    /// Write the fixture's DMX start address.
    ///
    /// Returns `Ok(None)` without sending anything if `address` is outside
    /// 1..=512. On ACK the local start address follows it.
    pub async fn set_start_address(
        &self,
        target: Uid,
        address: u16,
    ) -> Result<Option<TransactionResult>> {
        if !(1..=DMX_SLOTS as u16).contains(&address) {
            return Ok(None);
        }
        self.ensure_connected()?;
        let _busy = self
            .busy
            .begin(format!("Setting DMX address to {address}..."))?;
        let result = self
            .executor
            .execute(
                CommandKind::Set,
                target,
                PID_DMX_START_ADDRESS,
                &address.to_be_bytes(),
            )
            .await?;
        if result.status == ResponseStatus::Ack {
            self.set_local_start_address(address).await?;
        }
        Ok(Some(result))
    }

    /// GET DEVICE_INFO.
    ///
    /// A complete reply resizes the channel table to the reported footprint
    /// and moves the local start address.
    pub async fn device_info(&self, target: Uid) -> Result<Option<DeviceInfo>> {
        self.ensure_connected()?;
        let _busy = self.busy.begin("Getting Device Info...")?;
        let reply = self
            .transact_and_apply(CommandKind::Get, target, PID_DEVICE_INFO, &[])
            .await?;
        Ok(reply.decoded.device_info)
    }

    /// Cross-check the catalog against the device's SUPPORTED_PARAMETERS.
    pub async fn query_supported(&self, target: Uid) -> Result<SupportedCheck> {
        self.ensure_connected()?;
        let _busy = self.busy.begin("Querying SUPPORTED_PARAMETERS...")?;
        let result = self
            .executor
            .execute(CommandKind::Get, target, PID_SUPPORTED_PARAMETERS, &[])
            .await?;
        let listed = if result.status == ResponseStatus::Ack {
            decoder::supported_pids(&result.payload)
        } else {
            Vec::new()
        };

        let mut supported: Vec<u16> = listed.iter().copied().chain(IMPLICITLY_SUPPORTED).collect();
        supported.sort_unstable();
        supported.dedup();

        let scorecard = self
            .state
            .call(|reply| Request::ApplySupported {
                listed,
                result,
                reply,
            })
            .await?;
        info!(supported = supported.len(), "supported parameters cross-checked");
        Ok(SupportedCheck {
            supported,
            scorecard,
        })
    }

    /// GET every catalog parameter that supports GET, in catalog order.
    ///
    /// Runs as the background activity, so starting an effect or calling
    /// [`cancel_activity`](Self::cancel_activity) stops it between
    /// transactions with [`Error::Cancelled`].
    pub async fn query_all_pids(&self, target: Uid) -> Result<Scorecard> {
        self.ensure_connected()?;
        let busy = self.busy.begin("Querying all parameters...")?;
        let gets: Vec<ParameterDescriptor> = self
            .state
            .catalog()
            .await?
            .into_iter()
            .filter(|d| d.command_class.supports_get())
            .collect();

        let executor = self.executor.clone();
        let state = self.state.clone();
        let events = self.event_tx.clone();
        self.run_activity(ActivityKind::BatchQuery, move |cancel| async move {
            let _busy = busy;
            batch_query(&executor, &state, &events, target, &gets, &cancel).await
        })
        .await?
    }

    // -- Output -------------------------------------------------------------

    pub async fn set_global_level(&self, level: u8) -> Result<()> {
        self.state.notify(Request::SetGlobalLevel { level }).await
    }

    /// Whether the global level is written to every slot.
    pub async fn set_broadcast(&self, on: bool) -> Result<()> {
        self.state.notify(Request::SetBroadcast { on }).await
    }

    /// Set one fader. Returns `false` if `index` is not in the table.
    pub async fn set_channel_level(&self, index: u16, level: u8) -> Result<bool> {
        self.state
            .call(|reply| Request::SetChannelLevel {
                index,
                level,
                reply,
            })
            .await
    }

    /// Rebuild the channel table. Returns `false` outside 1..=512.
    pub async fn set_footprint(&self, footprint: u16) -> Result<bool> {
        self.state
            .call(|reply| Request::SetFootprint { footprint, reply })
            .await
    }

    /// Move where the channel table lands in the frame. Returns `false`
    /// outside 1..=512.
    pub async fn set_local_start_address(&self, address: u16) -> Result<bool> {
        self.state
            .call(|reply| Request::SetStartAddress { address, reply })
            .await
    }

    pub async fn blackout(&self) -> Result<()> {
        self.set_global_level(0).await
    }

    /// Global level and every channel to zero.
    pub async fn all_zero(&self) -> Result<()> {
        self.set_global_level(0).await?;
        self.state.notify(Request::FillChannels { level: 0 }).await
    }

    /// Global level to zero and every channel to full.
    pub async fn all_full(&self) -> Result<()> {
        self.set_global_level(0).await?;
        self.state.notify(Request::FillChannels { level: 255 }).await
    }

    /// Change the output rate. Returns `false` outside
    /// 1..=`max_refresh_hz`.
    pub fn set_refresh_rate(&self, hz: u32) -> bool {
        self.emitter.set_refresh_rate(hz)
    }

    pub fn refresh_rate(&self) -> u32 {
        self.emitter.refresh_hz()
    }

    pub fn start_output(&self) {
        self.emitter.start();
    }

    pub async fn stop_output(&self) {
        self.emitter.stop().await;
    }

    pub fn is_output_running(&self) -> bool {
        self.emitter.is_running()
    }

    /// Frames sent by the periodic emitter.
    pub fn frame_count(&self) -> u64 {
        self.emitter.frame_count()
    }

    // -- Activities ---------------------------------------------------------

    /// Start `make` in the activity slot and wait for its output.
    async fn run_activity<T, Fut>(
        &self,
        kind: ActivityKind,
        make: impl FnOnce(CancellationToken) -> Fut,
    ) -> Result<T>
    where
        T: Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.activity
            .start(kind, move |cancel| {
                let work = make(cancel);
                async move {
                    let _ = tx.send(work.await);
                }
            })
            .await;
        rx.await.map_err(|_| Error::Cancelled)
    }

    fn progress_sink(&self) -> impl Fn(u32, u32, String) + Send + Sync + 'static {
        let events = self.event_tx.clone();
        move |done, total, label| {
            let _ = events.send(SessionEvent::Progress { done, total, label });
        }
    }

    /// The running background activity, if any.
    pub async fn current_activity(&self) -> Option<ActivityKind> {
        self.activity.current().await
    }

    /// Cancel the background activity and wait for its teardown.
    pub async fn cancel_activity(&self) -> Option<ActivityKind> {
        self.activity.cancel().await
    }

    /// Start a triangle fade over every channel.
    ///
    /// `duration` is the time for one half of the triangle. Replaces any
    /// running activity.
    pub async fn start_fade(&self, from: u8, to: u8, duration: Duration) -> Result<()> {
        self.ensure_connected()?;
        let params = FadeParams {
            from,
            to,
            duration,
            refresh_hz: self.emitter.refresh_hz(),
        };
        let sink = self.state.clone();
        self.activity
            .start(ActivityKind::Fade, move |cancel| async move {
                effects::run_fade(&sink, params, cancel).await;
            })
            .await;
        Ok(())
    }

    /// Start a single-channel chase. Replaces any running activity.
    ///
    /// Does nothing if the channel table is empty.
    pub async fn start_chase(&self, dwell: Duration) -> Result<()> {
        self.ensure_connected()?;
        let sink = self.state.clone();
        self.activity
            .start(ActivityKind::Chase, move |cancel| async move {
                effects::run_chase(&sink, ChaseParams { dwell }, cancel).await;
            })
            .await;
        Ok(())
    }

    /// Stop whatever is running and zero the global level and every channel.
    pub async fn stop_effect(&self) -> Result<()> {
        self.activity.cancel().await;
        self.state.activity_status("Stopped".to_string()).await;
        self.all_zero().await
    }

    /// Measure output timing jitter for `duration` at the current refresh
    /// rate and global level.
    pub async fn flicker_finder(&self, duration: Duration) -> Result<FlickerReport> {
        self.ensure_connected()?;
        let params = FlickerParams {
            duration,
            refresh_hz: self.emitter.refresh_hz(),
            level: self.state.snapshot().await?.global_level,
            jitter_threshold: self.config.jitter_threshold,
        };
        let arbiter = Arc::clone(&self.arbiter);
        let progress = self.progress_sink();
        let report = self
            .run_activity(ActivityKind::FlickerFinder, move |cancel| async move {
                diagnostics::flicker_finder(&arbiter, params, &cancel, &progress).await
            })
            .await?;
        if report.degraded {
            warn!(%report, "output timing degraded");
        }
        Ok(report)
    }

    /// GET one parameter `iterations` times and tally the outcomes.
    pub async fn rdm_stress(&self, params: RdmStressParams) -> Result<RdmStressReport> {
        self.ensure_connected()?;
        let busy = self
            .busy
            .begin(format!("Stress testing PID 0x{:04X}...", params.pid))?;
        let executor = self.executor.clone();
        let progress = self.progress_sink();
        self.run_activity(ActivityKind::RdmStress, move |cancel| async move {
            let _busy = busy;
            diagnostics::rdm_stress(&executor, params, &cancel, &progress).await
        })
        .await?
    }

    /// Send alternating full/zero frames as fast as possible for `duration`.
    pub async fn dmx_stress(&self, duration: Duration) -> Result<ThroughputReport> {
        self.ensure_connected()?;
        let arbiter = Arc::clone(&self.arbiter);
        let progress = self.progress_sink();
        self.run_activity(ActivityKind::DmxStress, move |cancel| async move {
            diagnostics::throughput(&arbiter, duration, &cancel, &progress).await
        })
        .await
    }

    // -- Log and export -----------------------------------------------------

    pub async fn clear_log(&self) -> Result<()> {
        self.state.notify(Request::ClearLog).await
    }

    /// The raw log, one `"<ms>ms TX|RX <hex>"` line per entry.
    pub async fn log_text(&self) -> Result<String> {
        Ok(self.state.snapshot().await?.log_text())
    }

    /// Write the parameter table as CSV.
    pub async fn export_csv<W: Write>(&self, out: W) -> Result<()> {
        let snap = self.state.snapshot().await?;
        export::write_csv(&snap.pids, out)
    }

    /// Stop every task and close the adapter.
    pub async fn shutdown(self) -> Result<()> {
        self.activity.cancel().await;
        self.emitter.stop().await;
        let closed = if self.is_connected() {
            self.arbiter
                .run_exclusive(|t| Box::pin(async move { t.close().await }))
                .await
        } else {
            Ok(())
        };
        self.task.cancel.cancel();
        self.emit(SessionEvent::Disconnected);
        info!("session shut down");
        closed
    }
}

async fn batch_query(
    executor: &TransactionExecutor,
    state: &StateHandle,
    events: &broadcast::Sender<SessionEvent>,
    target: Uid,
    gets: &[ParameterDescriptor],
    cancel: &CancellationToken,
) -> Result<Scorecard> {
    let total = gets.len() as u32;
    for (i, descriptor) in gets.iter().enumerate() {
        if cancel.is_cancelled() {
            debug!(done = i, total, "batch query cancelled");
            return Err(Error::Cancelled);
        }
        let done = i as u32 + 1;
        let _ = events.send(SessionEvent::Progress {
            done,
            total,
            label: format!(
                "Querying {done}/{total}: 0x{:04X} {}",
                descriptor.pid, descriptor.name
            ),
        });
        let result = executor
            .execute(CommandKind::Get, target, descriptor.pid, &[])
            .await?;
        state.apply_result(descriptor.pid, result).await?;
    }
    let card = state.scorecard().await?;
    info!(
        pass = card.pass,
        warn = card.warn,
        fail = card.fail,
        timeout = card.timeout,
        "batch query complete"
    );
    Ok(card)
}
