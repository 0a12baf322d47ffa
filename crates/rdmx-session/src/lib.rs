//! DMX output and RDM transaction orchestration for rdmx.
//!
//! One adapter carries two kinds of traffic: a continuous stream of
//! 513-byte DMX frames and discrete RDM request/response exchanges. This
//! crate shares the line between them and builds everything a test bench
//! needs on top:
//!
//! - **Arbitration** ([`arbiter`]) -- exclusive, queued access for RDM
//!   exchanges; a non-blocking probe for the emitter that drops the tick
//!   while an exchange is in flight.
//! - **Output** ([`frame`], [`emitter`]) -- frame composition from the
//!   global level and the fixture's channel table, sent at 1..=44 Hz.
//! - **Transactions** ([`executor`], [`decoder`], [`scorecard`]) -- GET/SET
//!   execution, payload decoding for the standard and manufacturer PIDs,
//!   and the compliance tally.
//! - **Effects and diagnostics** ([`effects`], [`diagnostics`]) -- fade and
//!   chase, flicker finder, transaction and throughput stress.
//! - **Session** ([`session`], [`builder`]) -- the caller-facing API, state
//!   snapshots and [`SessionEvent`](rdmx_core::SessionEvent)s.
//! - **Export** ([`export`]) -- CSV of the parameter table.
//!
//! # Example
//!
//! ```
//! use rdmx_session::frame::compose;
//! use rdmx_core::types::OutputChannel;
//!
//! // Channel 3 of a fixture at address 10 lands in slot 12.
//! let frame = compose(0, false, &[OutputChannel::new(3, 200)], 10);
//! assert_eq!(frame[12], 200);
//! assert_eq!(frame[0], 0);
//! ```

mod activity;
mod task;

pub mod arbiter;
pub mod builder;
pub mod decoder;
pub mod diagnostics;
pub mod effects;
pub mod emitter;
pub mod executor;
pub mod export;
pub mod frame;
pub mod scorecard;
pub mod session;
pub mod state;

pub use activity::ActivityKind;
pub use builder::{SessionBuilder, SessionConfig};
pub use scorecard::Scorecard;
pub use session::{PidReply, Session, SupportedCheck};
pub use state::{PidResult, SessionSnapshot, SupportState};
