//! rdmx-test-harness: Test utilities and mock transports for rdmx.
//!
//! This crate provides [`MockTransport`] for deterministic unit testing of
//! the session layer without a DMX/RDM adapter, and [`SimulatedFixture`]
//! for end-to-end runs against a believable remote device.

pub mod fixture;
pub mod mock_transport;

pub use fixture::SimulatedFixture;
pub use mock_transport::{MockHandle, MockTransport};
