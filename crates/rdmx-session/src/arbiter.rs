//! Channel arbitration between the periodic emitter and transactions.
//!
//! One serial line carries both continuous DMX output and RDM
//! request/response exchanges. An RDM exchange must never have a DMX frame
//! interleaved into it, while the emitter must never block waiting for a
//! transaction to finish. The [`ChannelArbiter`] gives transactions
//! exclusive, queued access and gives the emitter a non-blocking probe that
//! simply fails while a transaction is in flight, so the tick is dropped.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, MutexGuard};

use rdmx_core::error::Result;
use rdmx_core::transport::Transport;
use rdmx_core::types::DmxFrame;

/// A boxed, sendable future borrowing from `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Owner of the session's transport.
pub struct ChannelArbiter {
    transport: Mutex<Box<dyn Transport>>,
    /// Queues exclusive holders in arrival order.
    exclusive: Mutex<()>,
    in_flight: AtomicBool,
}

impl ChannelArbiter {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        ChannelArbiter {
            transport: Mutex::new(transport),
            exclusive: Mutex::new(()),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Whether an exclusive holder currently owns the channel.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Try to claim the channel for one frame without waiting.
    ///
    /// Returns `None` while an exclusive holder is in flight or the
    /// transport is momentarily locked by someone else.
    pub fn try_acquire(&self) -> Option<FrameSlot<'_>> {
        if self.is_in_flight() {
            return None;
        }
        self.transport
            .try_lock()
            .ok()
            .map(|transport| FrameSlot { transport })
    }

    /// Wait for exclusive use of the channel.
    ///
    /// The in-flight flag is raised before the transport lock is taken, so
    /// no new frame slot can be granted once a holder is queued at the
    /// front. It is lowered when the returned guard drops, or when this
    /// future is dropped while still waiting for the transport.
    pub async fn acquire_exclusive(&self) -> ExclusiveChannel<'_> {
        let turn = self.exclusive.lock().await;
        let in_flight = InFlight::raise(&self.in_flight);
        let transport = self.transport.lock().await;
        ExclusiveChannel {
            _in_flight: in_flight,
            transport,
            _turn: turn,
        }
    }

    /// Run `f` with exclusive use of the transport.
    ///
    /// ```ignore
    /// let uids = arbiter
    ///     .run_exclusive(|t| Box::pin(async move { t.discover().await }))
    ///     .await?;
    /// ```
    pub async fn run_exclusive<T, F>(&self, f: F) -> T
    where
        F: for<'t> FnOnce(&'t mut dyn Transport) -> BoxFuture<'t, T>,
    {
        let mut channel = self.acquire_exclusive().await;
        f(channel.transport()).await
    }

    /// Unarbitrated access, for diagnostics that own the line outright.
    ///
    /// Still serialized against other transport users by the inner lock,
    /// but does not raise the in-flight flag.
    pub async fn direct(&self) -> MutexGuard<'_, Box<dyn Transport>> {
        self.transport.lock().await
    }
}

/// Permission to send exactly one frame.
pub struct FrameSlot<'a> {
    transport: MutexGuard<'a, Box<dyn Transport>>,
}

impl FrameSlot<'_> {
    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    pub async fn send(mut self, frame: &DmxFrame) -> Result<()> {
        self.transport.send_frame(frame).await
    }
}

/// Holds the in-flight flag up until dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        InFlight(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Exclusive use of the channel. Releases on drop.
///
/// Field order is drop order: the flag is lowered before the queue turn
/// passes to the next holder.
pub struct ExclusiveChannel<'a> {
    _in_flight: InFlight<'a>,
    transport: MutexGuard<'a, Box<dyn Transport>>,
    _turn: MutexGuard<'a, ()>,
}

impl ExclusiveChannel<'_> {
    pub fn transport(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }
}
