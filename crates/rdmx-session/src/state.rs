//! Session state owned by the session task.
//!
//! Nothing here is shared: the session task holds the only
//! [`SessionState`] and applies every mutation in arrival order. Callers
//! see copies through [`SessionSnapshot`].

use std::collections::VecDeque;
use std::fmt;

use rdmx_core::types::{
    AdapterInfo, LogEntry, OutputChannel, ParameterDescriptor, PID_DEVICE_INFO,
    ResponseStatus, TransactionResult, Uid, DMX_SLOTS,
};

use crate::decoder::{self, Decoded, DeviceInfo};
use crate::frame::FrameInputs;
use crate::scorecard::{self, Scorecard};

/// Whether a catalog parameter appears in the device's supported list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SupportState {
    /// Not cross-checked yet.
    #[default]
    Unknown,
    Supported,
    /// Mandatory but not listed by the device.
    Missing,
    /// Optional and not listed by the device.
    Unsupported,
}

impl SupportState {
    pub fn label(&self) -> &'static str {
        match self {
            SupportState::Unknown => "unknown",
            SupportState::Supported => "supported",
            SupportState::Missing => "missing",
            SupportState::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for SupportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One catalog row with the latest result for that parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct PidResult {
    pub descriptor: ParameterDescriptor,
    pub result: Option<TransactionResult>,
    pub value: String,
    pub raw_hex: String,
    pub support: SupportState,
}

impl PidResult {
    pub fn new(descriptor: ParameterDescriptor) -> Self {
        PidResult {
            descriptor,
            result: None,
            value: String::new(),
            raw_hex: String::new(),
            support: SupportState::Unknown,
        }
    }

    pub fn status(&self) -> Option<ResponseStatus> {
        self.result.as_ref().map(|r| r.status)
    }

    /// Store `result` and its decoded display value.
    pub fn apply(&mut self, result: TransactionResult) -> Decoded {
        let decoded = decoder::decode(
            self.descriptor.pid,
            result.status,
            result.nack_reason,
            &result.payload,
        );
        self.value = decoded.value.clone();
        self.raw_hex = decoded.raw_hex.clone();
        self.result = Some(result);
        decoded
    }
}

/// Bounded ring of raw frame log entries. The oldest entry is evicted.
#[derive(Debug, Clone)]
pub struct LogRing {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        LogRing {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// Immutable copy of the session's observable state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub connection: Option<AdapterInfo>,
    pub discovered: Vec<Uid>,
    pub pids: Vec<PidResult>,
    pub scorecard: Scorecard,
    pub global_level: u8,
    pub broadcast: bool,
    pub channels: Vec<OutputChannel>,
    pub start_address: u16,
    pub device_info: Option<DeviceInfo>,
    pub identify: bool,
    pub activity_status: String,
    pub log: Vec<LogEntry>,
    /// Filled in by the session handle.
    pub busy: bool,
    /// Filled in by the session handle.
    pub refresh_hz: u32,
    /// Filled in by the session handle.
    pub output_running: bool,
    /// Filled in by the session handle.
    pub frame_count: u64,
}

impl SessionSnapshot {
    pub fn footprint(&self) -> u16 {
        self.channels.len() as u16
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// The row for `pid`, if it is in the catalog.
    pub fn pid(&self, pid: u16) -> Option<&PidResult> {
        self.pids.iter().find(|row| row.descriptor.pid == pid)
    }

    /// The raw log as text, one `"<ms>ms TX|RX <hex>"` line per entry.
    pub fn log_text(&self) -> String {
        self.log
            .iter()
            .map(LogEntry::display_line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Mutable session state. Owned by the session task.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub connection: Option<AdapterInfo>,
    pub discovered: Vec<Uid>,
    pub pids: Vec<PidResult>,
    pub global_level: u8,
    pub broadcast: bool,
    pub channels: Vec<OutputChannel>,
    pub start_address: u16,
    pub device_info: Option<DeviceInfo>,
    pub identify: bool,
    pub activity_status: String,
    pub log: LogRing,
}

impl SessionState {
    pub fn new(footprint: u16, log_capacity: usize) -> Self {
        let mut state = SessionState {
            connection: None,
            discovered: Vec::new(),
            pids: Vec::new(),
            global_level: 0,
            broadcast: false,
            channels: Vec::new(),
            start_address: 1,
            device_info: None,
            identify: false,
            activity_status: String::new(),
            log: LogRing::new(log_capacity),
        };
        state.rebuild_channels(footprint.clamp(1, DMX_SLOTS as u16));
        state
    }

    pub fn frame_inputs(&self) -> FrameInputs {
        FrameInputs {
            global_level: self.global_level,
            broadcast: self.broadcast,
            channels: self.channels.clone(),
            start_address: self.start_address,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            connection: self.connection.clone(),
            discovered: self.discovered.clone(),
            pids: self.pids.clone(),
            scorecard: self.scorecard(),
            global_level: self.global_level,
            broadcast: self.broadcast,
            channels: self.channels.clone(),
            start_address: self.start_address,
            device_info: self.device_info,
            identify: self.identify,
            activity_status: self.activity_status.clone(),
            log: self.log.to_vec(),
            busy: false,
            refresh_hz: 0,
            output_running: false,
            frame_count: 0,
        }
    }

    pub fn scorecard(&self) -> Scorecard {
        Scorecard::from_rows(&self.pids)
    }

    pub fn footprint(&self) -> u16 {
        self.channels.len() as u16
    }

    fn rebuild_channels(&mut self, footprint: u16) {
        self.channels = (1..=footprint).map(|i| OutputChannel::new(i, 0)).collect();
    }

    /// Rebuild the channel table. Out-of-range footprints are ignored.
    pub fn set_footprint(&mut self, footprint: u16) -> bool {
        if !(1..=DMX_SLOTS as u16).contains(&footprint) {
            return false;
        }
        self.rebuild_channels(footprint);
        true
    }

    /// Set the local start address used for frame composition.
    pub fn set_start_address(&mut self, address: u16) -> bool {
        if !(1..=DMX_SLOTS as u16).contains(&address) {
            return false;
        }
        self.start_address = address;
        true
    }

    /// Set one channel by its 1-based index.
    pub fn set_channel_level(&mut self, index: u16, level: u8) -> bool {
        match self.channels.iter_mut().find(|c| c.index == index) {
            Some(channel) => {
                channel.level = level;
                true
            }
            None => false,
        }
    }

    pub fn fill_channels(&mut self, level: u8) {
        for channel in &mut self.channels {
            channel.level = level;
        }
    }

    /// Zero every channel except `index`, which is set to `level`.
    pub fn solo_channel(&mut self, index: u16, level: u8) {
        for channel in &mut self.channels {
            channel.level = if channel.index == index { level } else { 0 };
        }
    }

    /// Replace the catalog. All previous results are discarded.
    pub fn set_catalog(&mut self, catalog: Vec<ParameterDescriptor>) {
        self.pids = catalog.into_iter().map(PidResult::new).collect();
    }

    /// Replace the discovered list, dropping duplicates.
    pub fn set_discovered(&mut self, uids: Vec<Uid>) {
        self.discovered.clear();
        for uid in uids {
            if !self.discovered.contains(&uid) {
                self.discovered.push(uid);
            }
        }
    }

    /// Record a transaction result for `pid`.
    ///
    /// Updates the catalog row if there is one. A complete DEVICE_INFO
    /// response also resizes the channel table and moves the start address
    /// to what the device reports.
    pub fn apply_result(&mut self, pid: u16, result: TransactionResult) -> Decoded {
        let decoded = match self.pids.iter_mut().find(|row| row.descriptor.pid == pid) {
            Some(row) => row.apply(result),
            None => decoder::decode(pid, result.status, result.nack_reason, &result.payload),
        };
        if pid == PID_DEVICE_INFO {
            if let Some(info) = decoded.device_info {
                self.device_info = Some(info);
                self.set_footprint(info.footprint);
                self.set_start_address(info.start_address);
            }
        }
        decoded
    }

    /// Mark rows against the device's SUPPORTED_PARAMETERS list.
    pub fn apply_supported(&mut self, listed: &[u16]) {
        scorecard::mark_supported(&mut self.pids, listed);
    }
}
