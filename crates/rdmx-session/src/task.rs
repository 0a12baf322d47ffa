//! The session state task.
//!
//! One spawned task owns the [`SessionState`]. Everything that reads or
//! mutates it sends a [`Request`] over an mpsc channel, so no lock is ever
//! held across an await. After each change the task republishes the
//! output inputs on a `watch` channel for the emitter and announces the
//! change on the event broadcast.
//!
//! Raw log entries arrive on their own unbounded channel because the
//! transport pushes them from a synchronous callback.

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use rdmx_core::error::{Error, Result};
use rdmx_core::events::SessionEvent;
use rdmx_core::types::{
    AdapterInfo, LogEntry, PID_SUPPORTED_PARAMETERS, ParameterDescriptor, TransactionResult, Uid,
};

use crate::decoder::Decoded;
use crate::frame::FrameInputs;
use crate::scorecard::Scorecard;
use crate::state::{SessionSnapshot, SessionState};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A request sent from the session handle to the state task.
pub(crate) enum Request {
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Catalog {
        reply: oneshot::Sender<Vec<ParameterDescriptor>>,
    },
    ChannelIndices {
        reply: oneshot::Sender<Vec<u16>>,
    },
    SetGlobalLevel {
        level: u8,
    },
    SetBroadcast {
        on: bool,
    },
    SetChannelLevel {
        index: u16,
        level: u8,
        reply: oneshot::Sender<bool>,
    },
    FillChannels {
        level: u8,
    },
    SoloChannel {
        index: u16,
        level: u8,
    },
    SetFootprint {
        footprint: u16,
        reply: oneshot::Sender<bool>,
    },
    SetStartAddress {
        address: u16,
        reply: oneshot::Sender<bool>,
    },
    SetCatalog {
        catalog: Vec<ParameterDescriptor>,
    },
    SetDiscovered {
        uids: Vec<Uid>,
        reply: oneshot::Sender<Vec<Uid>>,
    },
    /// `None` records a disconnect and forgets discovered devices.
    SetConnection {
        info: Option<AdapterInfo>,
    },
    SetIdentify {
        on: bool,
    },
    ApplyResult {
        pid: u16,
        result: TransactionResult,
        reply: oneshot::Sender<Decoded>,
    },
    /// Cross-check rows against a SUPPORTED_PARAMETERS reply.
    ApplySupported {
        listed: Vec<u16>,
        result: TransactionResult,
        reply: oneshot::Sender<Scorecard>,
    },
    Scorecard {
        reply: oneshot::Sender<Scorecard>,
    },
    ActivityStatus {
        text: String,
    },
    ClearLog,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable sender side of the state task.
#[derive(Clone)]
pub(crate) struct StateHandle {
    cmd_tx: mpsc::Sender<Request>,
}

impl StateHandle {
    /// Send a request and wait for its reply.
    pub async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(make(reply_tx))
            .await
            .map_err(|_| Error::NotConnected)?;
        reply_rx.await.map_err(|_| Error::NotConnected)
    }

    /// Send a request that has no reply.
    pub async fn notify(&self, request: Request) -> Result<()> {
        self.cmd_tx
            .send(request)
            .await
            .map_err(|_| Error::NotConnected)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.call(|reply| Request::Snapshot { reply }).await
    }

    pub async fn catalog(&self) -> Result<Vec<ParameterDescriptor>> {
        self.call(|reply| Request::Catalog { reply }).await
    }

    pub async fn apply_result(&self, pid: u16, result: TransactionResult) -> Result<Decoded> {
        self.call(|reply| Request::ApplyResult { pid, result, reply })
            .await
    }

    pub async fn scorecard(&self) -> Result<Scorecard> {
        self.call(|reply| Request::Scorecard { reply }).await
    }

    pub async fn activity_status(&self, text: String) {
        let _ = self.notify(Request::ActivityStatus { text }).await;
    }
}

/// Handle to the running state task. Stored inside `Session`.
pub(crate) struct SessionTask {
    pub handle: StateHandle,
    pub cancel: CancellationToken,
    pub task: JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the state task.
///
/// `log_rx` receives raw frames from the transport callback.
pub(crate) fn spawn_session_task(
    state: SessionState,
    event_tx: broadcast::Sender<SessionEvent>,
    inputs_tx: watch::Sender<FrameInputs>,
    log_rx: mpsc::UnboundedReceiver<LogEntry>,
) -> SessionTask {
    let (cmd_tx, cmd_rx) = mpsc::channel::<Request>(32);
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    inputs_tx.send_replace(state.frame_inputs());
    let task = tokio::spawn(state_loop(
        state,
        event_tx,
        inputs_tx,
        cmd_rx,
        log_rx,
        cancel_clone,
    ));

    SessionTask {
        handle: StateHandle { cmd_tx },
        cancel,
        task,
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

struct Publisher {
    event_tx: broadcast::Sender<SessionEvent>,
    inputs_tx: watch::Sender<FrameInputs>,
}

impl Publisher {
    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    fn output_changed(&self, state: &SessionState) {
        self.inputs_tx.send_replace(state.frame_inputs());
        self.emit(SessionEvent::OutputChanged);
    }

    fn scorecard(&self, card: Scorecard) {
        self.emit(SessionEvent::ScorecardUpdated {
            pass: card.pass,
            warn: card.warn,
            fail: card.fail,
            timeout: card.timeout,
        });
    }

    fn pid_updated(&self, pid: u16, result: &TransactionResult, decoded: &Decoded) {
        self.emit(SessionEvent::PidUpdated {
            pid,
            status: result.status,
            value: decoded.value.clone(),
        });
    }
}

/// The state loop. Runs as a spawned Tokio task.
///
/// Priority: cancellation, then requests, then raw log entries.
async fn state_loop(
    mut state: SessionState,
    event_tx: broadcast::Sender<SessionEvent>,
    inputs_tx: watch::Sender<FrameInputs>,
    mut cmd_rx: mpsc::Receiver<Request>,
    mut log_rx: mpsc::UnboundedReceiver<LogEntry>,
    cancel: CancellationToken,
) {
    let out = Publisher {
        event_tx,
        inputs_tx,
    };

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("session task cancelled");
                break;
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(request) => handle_request(&mut state, &out, request),
                    None => {
                        debug!("all session handles dropped, exiting session task");
                        break;
                    }
                }
            }

            Some(entry) = log_rx.recv() => {
                state.log.push(entry.clone());
                out.emit(SessionEvent::Log(entry));
            }
        }
    }
}

fn handle_request(state: &mut SessionState, out: &Publisher, request: Request) {
    match request {
        Request::Snapshot { reply } => {
            let _ = reply.send(state.snapshot());
        }
        Request::Catalog { reply } => {
            let catalog = state.pids.iter().map(|row| row.descriptor.clone()).collect();
            let _ = reply.send(catalog);
        }
        Request::ChannelIndices { reply } => {
            let _ = reply.send(state.channels.iter().map(|c| c.index).collect());
        }
        Request::SetGlobalLevel { level } => {
            state.global_level = level;
            out.output_changed(state);
        }
        Request::SetBroadcast { on } => {
            state.broadcast = on;
            out.output_changed(state);
        }
        Request::SetChannelLevel {
            index,
            level,
            reply,
        } => {
            let changed = state.set_channel_level(index, level);
            if changed {
                out.output_changed(state);
            }
            let _ = reply.send(changed);
        }
        Request::FillChannels { level } => {
            state.fill_channels(level);
            out.output_changed(state);
        }
        Request::SoloChannel { index, level } => {
            state.solo_channel(index, level);
            out.output_changed(state);
        }
        Request::SetFootprint { footprint, reply } => {
            let changed = state.set_footprint(footprint);
            if changed {
                out.emit(SessionEvent::FootprintChanged { footprint });
                out.output_changed(state);
            }
            let _ = reply.send(changed);
        }
        Request::SetStartAddress { address, reply } => {
            let changed = state.set_start_address(address);
            if changed {
                out.emit(SessionEvent::StartAddressChanged { address });
                out.output_changed(state);
            }
            let _ = reply.send(changed);
        }
        Request::SetCatalog { catalog } => {
            debug!(parameters = catalog.len(), "catalog replaced");
            state.set_catalog(catalog);
            out.scorecard(state.scorecard());
        }
        Request::SetDiscovered { uids, reply } => {
            state.set_discovered(uids);
            out.emit(SessionEvent::Discovered {
                uids: state.discovered.clone(),
            });
            let _ = reply.send(state.discovered.clone());
        }
        Request::SetConnection { info } => match info {
            Some(info) => {
                out.emit(SessionEvent::Connected {
                    firmware: info.firmware.clone(),
                    serial: info.serial,
                });
                state.connection = Some(info);
            }
            None => {
                state.connection = None;
                state.discovered.clear();
                state.identify = false;
                out.emit(SessionEvent::Disconnected);
            }
        },
        Request::SetIdentify { on } => {
            state.identify = on;
            out.emit(SessionEvent::IdentifyChanged { on });
        }
        Request::ApplyResult { pid, result, reply } => {
            let footprint = state.footprint();
            let address = state.start_address;
            let decoded = state.apply_result(pid, result.clone());
            out.pid_updated(pid, &result, &decoded);
            out.scorecard(state.scorecard());
            if state.footprint() != footprint {
                out.emit(SessionEvent::FootprintChanged {
                    footprint: state.footprint(),
                });
            }
            if state.start_address != address {
                out.emit(SessionEvent::StartAddressChanged {
                    address: state.start_address,
                });
            }
            if decoded.device_info.is_some() {
                out.output_changed(state);
            }
            let _ = reply.send(decoded);
        }
        Request::ApplySupported {
            listed,
            result,
            reply,
        } => {
            state.apply_supported(&listed);
            let decoded = state.apply_result(PID_SUPPORTED_PARAMETERS, result.clone());
            out.pid_updated(PID_SUPPORTED_PARAMETERS, &result, &decoded);
            let card = state.scorecard();
            out.scorecard(card);
            let _ = reply.send(card);
        }
        Request::Scorecard { reply } => {
            let _ = reply.send(state.scorecard());
        }
        Request::ActivityStatus { text } => {
            state.activity_status = text.clone();
            out.emit(SessionEvent::ActivityStatus { text });
        }
        Request::ClearLog => state.log.clear(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
