//! rdmx-core: Core traits, types, and error definitions for rdmx.
//!
//! This crate defines the driver-agnostic abstractions shared by the session
//! orchestrator, the test harness and applications. Applications depend on
//! these types without pulling in a specific adapter driver.
//!
//! # Key types
//!
//! - [`Transport`] -- access to one DMX/RDM adapter
//! - [`TransactionResult`] -- outcome of one RDM transaction
//! - [`SessionEvent`] -- asynchronous state change notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod helpers;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use rdmx_core::*`.
pub use error::{Error, Result};
pub use events::SessionEvent;
pub use helpers::{format_hex, format_seconds, parse_hex_payload};
pub use transport::{RawLogSink, Transport};
pub use types::*;
