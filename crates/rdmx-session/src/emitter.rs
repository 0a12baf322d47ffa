//! Periodic DMX output.
//!
//! The emitter task wakes once per refresh interval, composes a frame from
//! the latest published [`FrameInputs`] and sends it if the channel is free.
//! It never waits on the arbiter: a tick that finds a transaction in flight
//! is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::arbiter::ChannelArbiter;
use crate::frame::FrameInputs;

/// Default output refresh rate.
pub const DEFAULT_REFRESH_HZ: u32 = 25;

/// Default upper bound on the refresh rate.
pub const DEFAULT_MAX_REFRESH_HZ: u32 = 44;

/// Interval for `refresh_hz`: `1000 / refresh_hz` whole milliseconds.
pub fn refresh_interval(refresh_hz: u32) -> Duration {
    Duration::from_millis(u64::from(1000 / refresh_hz.max(1)))
}

fn ticker(refresh_hz: u32) -> Interval {
    let mut interval = tokio::time::interval(refresh_interval(refresh_hz));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Compose and send one frame if the channel can be claimed right now.
///
/// Returns `true` if a frame went out. Send failures are logged and
/// reported as `false`.
pub async fn emit_once(arbiter: &ChannelArbiter, inputs: &FrameInputs) -> bool {
    let frame = inputs.compose();
    let Some(slot) = arbiter.try_acquire() else {
        return false;
    };
    if !slot.is_open() {
        return false;
    }
    match slot.send(&frame).await {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "DMX frame send failed");
            false
        }
    }
}

/// Handle to the periodic emitter task.
pub struct PeriodicEmitter {
    arbiter: Arc<ChannelArbiter>,
    inputs: watch::Receiver<FrameInputs>,
    rate_tx: watch::Sender<u32>,
    max_refresh_hz: u32,
    frames: Arc<AtomicU64>,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl PeriodicEmitter {
    /// Create a stopped emitter.
    ///
    /// `refresh_hz` is clamped into `1..=max_refresh_hz`.
    pub fn new(
        arbiter: Arc<ChannelArbiter>,
        inputs: watch::Receiver<FrameInputs>,
        refresh_hz: u32,
        max_refresh_hz: u32,
    ) -> Self {
        let max_refresh_hz = max_refresh_hz.max(1);
        let (rate_tx, _) = watch::channel(refresh_hz.clamp(1, max_refresh_hz));
        PeriodicEmitter {
            arbiter,
            inputs,
            rate_tx,
            max_refresh_hz,
            frames: Arc::new(AtomicU64::new(0)),
            task: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<(CancellationToken, JoinHandle<()>)>> {
        self.task.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start the emitter. No-op if already running.
    pub fn start(&self) {
        let mut slot = self.slot();
        if slot.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let task = tokio::spawn(emit_loop(
            Arc::clone(&self.arbiter),
            self.inputs.clone(),
            self.rate_tx.subscribe(),
            Arc::clone(&self.frames),
            cancel.clone(),
        ));
        *slot = Some((cancel, task));
        info!(refresh_hz = self.refresh_hz(), "DMX output started");
    }

    /// Stop the emitter and wait for the task to exit. No-op if stopped.
    pub async fn stop(&self) {
        let running = self.slot().take();
        if let Some((cancel, task)) = running {
            cancel.cancel();
            let _ = task.await;
            info!(frames = self.frame_count(), "DMX output stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.slot().is_some()
    }

    /// Change the refresh rate. A running emitter picks it up immediately.
    ///
    /// Returns `false` and changes nothing if `hz` is outside
    /// `1..=max_refresh_hz`.
    pub fn set_refresh_rate(&self, hz: u32) -> bool {
        if !(1..=self.max_refresh_hz).contains(&hz) {
            return false;
        }
        self.rate_tx.send_replace(hz);
        true
    }

    pub fn refresh_hz(&self) -> u32 {
        *self.rate_tx.borrow()
    }

    pub fn max_refresh_hz(&self) -> u32 {
        self.max_refresh_hz
    }

    /// Frames successfully sent since creation.
    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl Drop for PeriodicEmitter {
    fn drop(&mut self) {
        if let Some((cancel, task)) = self.slot().take() {
            cancel.cancel();
            task.abort();
        }
    }
}

async fn emit_loop(
    arbiter: Arc<ChannelArbiter>,
    inputs: watch::Receiver<FrameInputs>,
    mut rate_rx: watch::Receiver<u32>,
    frames: Arc<AtomicU64>,
    cancel: CancellationToken,
) {
    let mut interval = ticker(*rate_rx.borrow_and_update());

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            changed = rate_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let hz = *rate_rx.borrow_and_update();
                debug!(hz, "refresh rate changed");
                interval = ticker(hz);
            }

            _ = interval.tick() => {
                let snapshot = inputs.borrow().clone();
                if emit_once(&arbiter, &snapshot).await {
                    frames.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}
