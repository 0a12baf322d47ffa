//! The current background activity.
//!
//! Effects, diagnostics and batch queries share one slot. Starting a new
//! activity cancels whatever is running and waits for it to finish its
//! teardown before the new one is spawned.

use std::fmt;
use std::future::Future;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// What is occupying the activity slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    Fade,
    Chase,
    BatchQuery,
    FlickerFinder,
    RdmStress,
    DmxStress,
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActivityKind::Fade => "fade",
            ActivityKind::Chase => "chase",
            ActivityKind::BatchQuery => "batch query",
            ActivityKind::FlickerFinder => "flicker finder",
            ActivityKind::RdmStress => "RDM stress",
            ActivityKind::DmxStress => "DMX stress",
        };
        f.write_str(s)
    }
}

struct Running {
    kind: ActivityKind,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Running {
    async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            if e.is_panic() {
                warn!(kind = %self.kind, "activity panicked");
            }
        }
        debug!(kind = %self.kind, "activity stopped");
    }
}

pub(crate) struct ActivitySlot {
    /// Parent of every activity token; cancelled when the session drops.
    root: CancellationToken,
    current: Mutex<Option<Running>>,
}

impl ActivitySlot {
    pub fn new() -> Self {
        ActivitySlot {
            root: CancellationToken::new(),
            current: Mutex::new(None),
        }
    }

    /// Cancel and await the current activity, then spawn `make(token)`.
    pub async fn start<Fut>(&self, kind: ActivityKind, make: impl FnOnce(CancellationToken) -> Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut current = self.current.lock().await;
        if let Some(old) = current.take() {
            old.stop().await;
        }
        let cancel = self.root.child_token();
        let task = tokio::spawn(make(cancel.clone()));
        debug!(%kind, "activity started");
        *current = Some(Running { kind, cancel, task });
    }

    /// Cancel and await the current activity.
    ///
    /// Returns its kind if it was still running.
    pub async fn cancel(&self) -> Option<ActivityKind> {
        let mut current = self.current.lock().await;
        let running = current.take()?;
        let kind = (!running.task.is_finished()).then_some(running.kind);
        running.stop().await;
        kind
    }

    /// The running activity, if any.
    pub async fn current(&self) -> Option<ActivityKind> {
        let current = self.current.lock().await;
        current
            .as_ref()
            .filter(|r| !r.task.is_finished())
            .map(|r| r.kind)
    }

    /// Cancel everything without waiting.
    pub fn shutdown(&self) {
        self.root.cancel();
    }
}
