//! Asynchronous session event types.
//!
//! Events are emitted by the session through a [`tokio::sync::broadcast`]
//! channel whenever observable state changes. A presentation layer
//! subscribes to these instead of polling, and fetches a full snapshot when
//! it needs more than the event carries.

use crate::types::{LogEntry, ResponseStatus, Uid};

/// An event emitted by the session when its state changes.
///
/// Delivered on a best-effort basis through a bounded broadcast channel;
/// slow consumers may miss events while an effect is animating the faders.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// An adapter was opened.
    Connected {
        /// Firmware version reported by the adapter.
        firmware: String,
        /// Serial number reported by the adapter.
        serial: u32,
    },

    /// The adapter was closed.
    Disconnected,

    /// Discovery finished.
    Discovered {
        /// Every known UID, deduplicated, in first-seen order.
        uids: Vec<Uid>,
    },

    /// Global level, broadcast flag or any channel level changed.
    OutputChanged,

    /// The fixture footprint changed and the channel table was rebuilt.
    FootprintChanged { footprint: u16 },

    /// The local DMX start address changed.
    StartAddressChanged { address: u16 },

    /// A parameter row received a new transaction result.
    PidUpdated {
        pid: u16,
        status: ResponseStatus,
        /// Decoded display value.
        value: String,
    },

    /// The compliance scorecard was recomputed.
    ScorecardUpdated {
        pass: u32,
        warn: u32,
        fail: u32,
        timeout: u32,
    },

    /// Identify mode was toggled on the fixture.
    IdentifyChanged { on: bool },

    /// The session busy flag changed.
    BusyChanged {
        busy: bool,
        /// What the session is doing (empty when idle).
        status: String,
    },

    /// Status line from the running effect or diagnostic.
    ActivityStatus { text: String },

    /// Progress of a batch query or diagnostic run.
    Progress {
        done: u32,
        total: u32,
        label: String,
    },

    /// A raw frame was appended to the log ring.
    Log(LogEntry),
}
