//! Compliance scorecard and supported-parameter cross-check.

use std::collections::HashSet;

use rdmx_core::types::{
    PID_DEVICE_INFO, PID_IDENTIFY_DEVICE, PID_SUPPORTED_PARAMETERS, ResponseStatus,
};

use crate::state::{PidResult, SupportState};

/// Parameters every RDM responder implements whether or not it lists them.
pub const IMPLICITLY_SUPPORTED: [u16; 3] =
    [PID_SUPPORTED_PARAMETERS, PID_DEVICE_INFO, PID_IDENTIFY_DEVICE];

/// Tally of the latest result status across all parameter rows.
///
/// Always derived from the rows on demand, never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scorecard {
    /// ACK.
    pub pass: u32,
    /// ACK_TIMER.
    pub warn: u32,
    /// NACK, checksum error or invalid response.
    pub fail: u32,
    pub timeout: u32,
}

impl Scorecard {
    pub fn from_rows(rows: &[PidResult]) -> Self {
        let mut card = Scorecard::default();
        for status in rows.iter().filter_map(PidResult::status) {
            match status {
                ResponseStatus::Ack => card.pass += 1,
                ResponseStatus::AckTimer => card.warn += 1,
                ResponseStatus::Nack | ResponseStatus::ChecksumError | ResponseStatus::Invalid => {
                    card.fail += 1
                }
                ResponseStatus::Timeout => card.timeout += 1,
            }
        }
        card
    }

    /// Rows that have been queried at least once.
    pub fn total(&self) -> u32 {
        self.pass + self.warn + self.fail + self.timeout
    }
}

/// Mark every row against a device's SUPPORTED_PARAMETERS list.
///
/// The list is widened with [`IMPLICITLY_SUPPORTED`]. Rows that are listed
/// become `Supported`; unlisted mandatory rows become `Missing`, the rest
/// `Unsupported`.
pub fn mark_supported(rows: &mut [PidResult], listed: &[u16]) -> HashSet<u16> {
    let supported: HashSet<u16> = listed
        .iter()
        .copied()
        .chain(IMPLICITLY_SUPPORTED)
        .collect();
    for row in rows.iter_mut() {
        row.support = if supported.contains(&row.descriptor.pid) {
            SupportState::Supported
        } else if row.descriptor.mandatory {
            SupportState::Missing
        } else {
            SupportState::Unsupported
        };
    }
    supported
}
