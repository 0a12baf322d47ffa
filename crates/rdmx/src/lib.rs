//! # rdmx -- shared-channel DMX output and RDM device management
//!
//! `rdmx` drives a lighting fixture through a single USB-DMX adapter that
//! carries both a continuous DMX512 output stream and RDM request/response
//! transactions. It is built for fixture bring-up and compliance benches:
//! query every parameter a device exposes, cross-check what it claims to
//! support, animate its channels, and measure how the link holds up.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rdmx::{SessionBuilder, Transport};
//!
//! # async fn example(transport: Box<dyn Transport>) -> rdmx::Result<()> {
//! let session = SessionBuilder::new()
//!     .catalog_path("rdm_map.csv")
//!     .build_with_transport(transport)
//!     .await?;
//!
//! session.connect(0).await?;
//! for uid in session.discover().await? {
//!     let card = session.query_all_pids(uid).await?;
//!     println!("{uid}: {} pass, {} fail", card.pass, card.fail);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! | Crate                | Purpose                                          |
//! |----------------------|--------------------------------------------------|
//! | `rdmx-core`          | [`Transport`] trait, types, errors, events       |
//! | `rdmx-session`       | Arbitration, output, decoding, effects, session  |
//! | `rdmx-test-harness`  | Mock transport and a simulated fixture           |
//! | **`rdmx`**           | This facade crate -- re-exports everything       |
//!
//! ## Event Subscription
//!
//! The session emits [`SessionEvent`]s through a broadcast channel:
//!
//! ```no_run
//! use rdmx::{Session, SessionEvent};
//! # async fn example(session: &Session) {
//! let mut events = session.subscribe();
//! while let Ok(event) = events.recv().await {
//!     match event {
//!         SessionEvent::PidUpdated { pid, value, .. } => println!("0x{pid:04X}: {value}"),
//!         SessionEvent::Progress { done, total, label } => println!("{done}/{total} {label}"),
//!         _ => {}
//!     }
//! }
//! # }
//! ```

pub use rdmx_core::*;

pub use rdmx_session::{
    ActivityKind, PidReply, PidResult, Scorecard, Session, SessionBuilder, SessionConfig,
    SessionSnapshot, SupportState, SupportedCheck,
};

/// Session internals: arbiter, emitter, decoder, effects and diagnostics.
pub mod session {
    pub use rdmx_session::*;
}
