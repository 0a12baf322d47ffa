//! Core types used throughout rdmx.
//!
//! These types describe the two kinds of traffic that share one serial
//! line: periodic DMX output frames and RDM request/response transactions.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Number of payload slots in a DMX universe.
pub const DMX_SLOTS: usize = 512;

/// Length of a full DMX frame: start code plus 512 slots.
pub const DMX_FRAME_LEN: usize = DMX_SLOTS + 1;

/// The DMX null start code carried in byte 0 of every output frame.
pub const DMX_START_CODE: u8 = 0x00;

/// Largest RDM parameter data length (PDL) a single message can carry.
pub const MAX_PDL: usize = 231;

/// One complete DMX output frame, start code included.
pub type DmxFrame = [u8; DMX_FRAME_LEN];

/// SUPPORTED_PARAMETERS.
pub const PID_SUPPORTED_PARAMETERS: u16 = 0x0050;
/// PARAMETER_DESCRIPTION.
pub const PID_PARAMETER_DESCRIPTION: u16 = 0x0051;
/// DEVICE_INFO.
pub const PID_DEVICE_INFO: u16 = 0x0060;
/// DMX_START_ADDRESS.
pub const PID_DMX_START_ADDRESS: u16 = 0x00F0;
/// IDENTIFY_DEVICE.
pub const PID_IDENTIFY_DEVICE: u16 = 0x1000;

// ---------------------------------------------------------------------------
// UID
// ---------------------------------------------------------------------------

/// 48-bit RDM unique identifier of a remote device.
///
/// The manufacturer ID occupies the high 16 bits and the device ID the
/// low 32 bits. Displayed as `MMMM:DDDDDDDD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid(u64);

impl Uid {
    /// The all-devices broadcast UID.
    pub const BROADCAST: Uid = Uid(0xFFFF_FFFF_FFFF);

    const MASK: u64 = 0xFFFF_FFFF_FFFF;

    /// Create a UID from a raw value. Bits above 48 are discarded.
    pub fn new(raw: u64) -> Self {
        Uid(raw & Self::MASK)
    }

    /// Build a UID from its manufacturer and device parts.
    pub fn from_parts(manufacturer: u16, device: u32) -> Self {
        Uid((u64::from(manufacturer) << 32) | u64::from(device))
    }

    /// The manufacturer ID (high 16 bits).
    pub fn manufacturer(&self) -> u16 {
        (self.0 >> 32) as u16
    }

    /// The device ID (low 32 bits).
    pub fn device(&self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    /// The raw 48-bit value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}:{:08X}", self.manufacturer(), self.device())
    }
}

impl FromStr for Uid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (mfr, dev) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| Error::Protocol(format!("UID '{s}' is not MMMM:DDDDDDDD")))?;
        let mfr = u16::from_str_radix(mfr, 16)
            .map_err(|e| Error::Protocol(format!("bad manufacturer ID '{mfr}': {e}")))?;
        let dev = u32::from_str_radix(dev, 16)
            .map_err(|e| Error::Protocol(format!("bad device ID '{dev}': {e}")))?;
        Ok(Uid::from_parts(mfr, dev))
    }
}

// ---------------------------------------------------------------------------
// Parameter catalog
// ---------------------------------------------------------------------------

/// Which RDM command classes a parameter supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandClass {
    /// GET only.
    Get,
    /// SET only.
    Set,
    /// Both GET and SET.
    GetSet,
}

impl CommandClass {
    /// Whether a GET may be sent for this parameter.
    pub fn supports_get(&self) -> bool {
        matches!(self, CommandClass::Get | CommandClass::GetSet)
    }

    /// Whether a SET may be sent for this parameter.
    pub fn supports_set(&self) -> bool {
        matches!(self, CommandClass::Set | CommandClass::GetSet)
    }

    /// Interpret a free-form catalog label such as `"GET_COMMAND (0x20)"`
    /// or `"GET/SET"`. Matching is case-insensitive.
    pub fn from_label(label: &str) -> Option<Self> {
        let upper = label.to_uppercase();
        match (upper.contains("GET"), upper.contains("SET")) {
            (true, true) => Some(CommandClass::GetSet),
            (true, false) => Some(CommandClass::Get),
            (false, true) => Some(CommandClass::Set),
            (false, false) => None,
        }
    }
}

impl fmt::Display for CommandClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandClass::Get => "GET",
            CommandClass::Set => "SET",
            CommandClass::GetSet => "GET/SET",
        };
        write!(f, "{s}")
    }
}

/// One entry of the parameter catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescriptor {
    /// Parameter identifier.
    pub pid: u16,
    /// Human-readable name.
    pub name: String,
    /// Supported command classes.
    pub command_class: CommandClass,
    /// Whether the device under test must implement this parameter.
    pub mandatory: bool,
}

impl ParameterDescriptor {
    /// Convenience constructor.
    pub fn new(pid: u16, name: &str, command_class: CommandClass, mandatory: bool) -> Self {
        ParameterDescriptor {
            pid,
            name: name.to_string(),
            command_class,
            mandatory,
        }
    }
}

// ---------------------------------------------------------------------------
// Requests and results
// ---------------------------------------------------------------------------

/// RDM request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Get,
    Set,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Get => write!(f, "GET"),
            CommandKind::Set => write!(f, "SET"),
        }
    }
}

/// A single RDM request handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdmRequest {
    pub kind: CommandKind,
    pub target: Uid,
    pub pid: u16,
    pub payload: Vec<u8>,
}

impl RdmRequest {
    /// Build a request, rejecting payloads longer than [`MAX_PDL`].
    pub fn new(kind: CommandKind, target: Uid, pid: u16, payload: &[u8]) -> Result<Self> {
        if payload.len() > MAX_PDL {
            return Err(Error::InvalidParameter(format!(
                "payload of {} bytes exceeds the {MAX_PDL}-byte limit",
                payload.len()
            )));
        }
        Ok(RdmRequest {
            kind,
            target,
            pid,
            payload: payload.to_vec(),
        })
    }
}

/// Outcome of one RDM transaction as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseStatus {
    Ack,
    /// Positive acknowledgement, but the device asks to retry later.
    AckTimer,
    Nack,
    /// No response observed.
    Timeout,
    ChecksumError,
    Invalid,
}

impl ResponseStatus {
    /// Map a numeric transport status code (0..=5) to a status.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ResponseStatus::Ack),
            1 => Some(ResponseStatus::AckTimer),
            2 => Some(ResponseStatus::Nack),
            3 => Some(ResponseStatus::Timeout),
            4 => Some(ResponseStatus::ChecksumError),
            5 => Some(ResponseStatus::Invalid),
            _ => None,
        }
    }

    /// Short uppercase label used in exports and CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            ResponseStatus::Ack => "ACK",
            ResponseStatus::AckTimer => "ACK_TIMER",
            ResponseStatus::Nack => "NACK",
            ResponseStatus::Timeout => "TIMEOUT",
            ResponseStatus::ChecksumError => "CHECKSUM_ERR",
            ResponseStatus::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// An RDM NACK reason code (E1.20 table A-17).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NackReason(pub u16);

impl NackReason {
    /// The symbolic name, if the code is one of the standard reasons.
    pub fn name(&self) -> Option<&'static str> {
        let name = match self.0 {
            0x0000 => "NR_UNKNOWN_PID",
            0x0001 => "NR_FORMAT_ERROR",
            0x0002 => "NR_HARDWARE_FAULT",
            0x0003 => "NR_PROXY_REJECT",
            0x0004 => "NR_WRITE_PROTECT",
            0x0005 => "NR_UNSUPPORTED_COMMAND_CLASS",
            0x0006 => "NR_DATA_OUT_OF_RANGE",
            0x0007 => "NR_BUFFER_FULL",
            0x0008 => "NR_PACKET_SIZE_UNSUPPORTED",
            0x0009 => "NR_SUB_DEVICE_OUT_OF_RANGE",
            0x000A => "NR_PROXY_BUFFER_FULL",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for NackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "Unknown (0x{:04X})", self.0),
        }
    }
}

/// Result of one RDM transaction. Produced once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResult {
    pub status: ResponseStatus,
    /// Raw NACK reason. Only meaningful when `status` is [`ResponseStatus::Nack`].
    pub nack_reason: u16,
    /// Parameter data returned by the device (0..=231 bytes).
    pub payload: Vec<u8>,
    /// Time from request transmission to response reception.
    pub latency: Duration,
    pub checksum_valid: bool,
}

impl TransactionResult {
    /// A successful response carrying `payload`.
    pub fn ack(payload: &[u8], latency: Duration) -> Self {
        TransactionResult {
            status: ResponseStatus::Ack,
            nack_reason: 0,
            payload: payload.to_vec(),
            latency,
            checksum_valid: true,
        }
    }

    /// A negative acknowledgement with the given reason code.
    pub fn nack(reason: u16, latency: Duration) -> Self {
        TransactionResult {
            status: ResponseStatus::Nack,
            nack_reason: reason,
            payload: Vec::new(),
            latency,
            checksum_valid: true,
        }
    }

    /// No response from the device.
    pub fn timeout(latency: Duration) -> Self {
        TransactionResult {
            status: ResponseStatus::Timeout,
            nack_reason: 0,
            payload: Vec::new(),
            latency,
            checksum_valid: false,
        }
    }

    /// The NACK reason, if and only if the status is NACK.
    pub fn nack_reason(&self) -> Option<NackReason> {
        (self.status == ResponseStatus::Nack).then_some(NackReason(self.nack_reason))
    }

    /// Latency in whole microseconds.
    pub fn latency_us(&self) -> u64 {
        u64::try_from(self.latency.as_micros()).unwrap_or(u64::MAX)
    }

    /// Grade the response latency.
    pub fn latency_grade(&self) -> LatencyGrade {
        LatencyGrade::from_micros(self.latency_us())
    }
}

/// Coarse classification of a transaction round-trip time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LatencyGrade {
    /// Up to 1 ms.
    Good,
    /// Up to 2.8 ms, the E1.20 controller response window.
    Marginal,
    Slow,
}

impl LatencyGrade {
    pub fn from_micros(us: u64) -> Self {
        match us {
            0..=1000 => LatencyGrade::Good,
            1001..=2800 => LatencyGrade::Marginal,
            _ => LatencyGrade::Slow,
        }
    }
}

// ---------------------------------------------------------------------------
// Output channels
// ---------------------------------------------------------------------------

/// One fixture channel fader.
///
/// `index` is 1-based and relative to the fixture's DMX start address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputChannel {
    pub index: u16,
    pub level: u8,
}

impl OutputChannel {
    pub fn new(index: u16, level: u8) -> Self {
        OutputChannel { index, level }
    }
}

// ---------------------------------------------------------------------------
// Adapter and log
// ---------------------------------------------------------------------------

/// Identity of the open local adapter, captured on connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    /// Enumeration index passed to `Transport::open`.
    pub index: usize,
    pub firmware: String,
    pub serial: u32,
}

impl AdapterInfo {
    /// Serial number rendered as eight hex digits.
    pub fn serial_hex(&self) -> String {
        format!("{:08X}", self.serial)
    }
}

/// Direction of a raw frame on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Tx,
    Rx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Tx => write!(f, "TX"),
            Direction::Rx => write!(f, "RX"),
        }
    }
}

/// One raw frame reported by the transport's log hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub direction: Direction,
    pub hex: String,
    /// Microseconds since the transport was loaded.
    pub timestamp_us: i64,
}

impl LogEntry {
    /// Render as `"12.3ms TX CC 01 18"`.
    pub fn display_line(&self) -> String {
        format!(
            "{:.1}ms {} {}",
            self.timestamp_us as f64 / 1000.0,
            self.direction,
            self.hex
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_parts() {
        let uid = Uid::from_parts(0x4845, 0x1234_5678);
        assert_eq!(uid.manufacturer(), 0x4845);
        assert_eq!(uid.device(), 0x1234_5678);
        assert_eq!(uid.raw(), 0x4845_1234_5678);
    }

    #[test]
    fn uid_new_masks_to_48_bits() {
        let uid = Uid::new(0xABCD_4845_1234_5678);
        assert_eq!(uid.raw(), 0x4845_1234_5678);
    }

    #[test]
    fn uid_display() {
        let uid = Uid::from_parts(0x02AB, 0x0000_0042);
        assert_eq!(uid.to_string(), "02AB:00000042");
    }

    #[test]
    fn uid_parse() {
        let uid: Uid = "02ab:00000042".parse().unwrap();
        assert_eq!(uid, Uid::from_parts(0x02AB, 0x42));
    }

    #[test]
    fn uid_parse_rejects_garbage() {
        assert!("02AB00000042".parse::<Uid>().is_err());
        assert!("zz:00000042".parse::<Uid>().is_err());
    }

    #[test]
    fn command_class_from_label() {
        assert_eq!(
            CommandClass::from_label("GET_COMMAND (0x20)"),
            Some(CommandClass::Get)
        );
        assert_eq!(CommandClass::from_label("get/set"), Some(CommandClass::GetSet));
        assert_eq!(CommandClass::from_label("SET_COMMAND"), Some(CommandClass::Set));
        assert_eq!(CommandClass::from_label("DISCOVERY"), None);
    }

    #[test]
    fn command_class_support() {
        assert!(CommandClass::Get.supports_get());
        assert!(!CommandClass::Get.supports_set());
        assert!(CommandClass::GetSet.supports_get());
        assert!(CommandClass::GetSet.supports_set());
        assert!(!CommandClass::Set.supports_get());
    }

    #[test]
    fn request_rejects_oversized_payload() {
        let payload = vec![0u8; MAX_PDL + 1];
        let result = RdmRequest::new(CommandKind::Set, Uid::BROADCAST, 0x0082, &payload);
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn request_accepts_max_payload() {
        let payload = vec![0u8; MAX_PDL];
        assert!(RdmRequest::new(CommandKind::Set, Uid::BROADCAST, 0x0082, &payload).is_ok());
    }

    #[test]
    fn response_status_codes() {
        assert_eq!(ResponseStatus::from_code(0), Some(ResponseStatus::Ack));
        assert_eq!(ResponseStatus::from_code(4), Some(ResponseStatus::ChecksumError));
        assert_eq!(ResponseStatus::from_code(6), None);
        assert_eq!(ResponseStatus::ChecksumError.to_string(), "CHECKSUM_ERR");
    }

    #[test]
    fn nack_reason_names() {
        assert_eq!(NackReason(0x0006).to_string(), "NR_DATA_OUT_OF_RANGE");
        assert_eq!(NackReason(0x000A).to_string(), "NR_PROXY_BUFFER_FULL");
        assert_eq!(NackReason(0x0010).to_string(), "Unknown (0x0010)");
    }

    #[test]
    fn nack_reason_only_on_nack() {
        let mut result = TransactionResult::nack(0x0006, Duration::from_micros(900));
        assert_eq!(result.nack_reason(), Some(NackReason(0x0006)));
        result.status = ResponseStatus::Ack;
        assert_eq!(result.nack_reason(), None);
    }

    #[test]
    fn latency_grades() {
        assert_eq!(LatencyGrade::from_micros(0), LatencyGrade::Good);
        assert_eq!(LatencyGrade::from_micros(1000), LatencyGrade::Good);
        assert_eq!(LatencyGrade::from_micros(1001), LatencyGrade::Marginal);
        assert_eq!(LatencyGrade::from_micros(2800), LatencyGrade::Marginal);
        assert_eq!(LatencyGrade::from_micros(2801), LatencyGrade::Slow);
    }

    #[test]
    fn log_entry_display_line() {
        let entry = LogEntry {
            direction: Direction::Rx,
            hex: "CC 01 18".into(),
            timestamp_us: 12_345,
        };
        assert_eq!(entry.display_line(), "12.3ms RX CC 01 18");
    }

    #[test]
    fn adapter_serial_hex() {
        let info = AdapterInfo {
            index: 0,
            firmware: "2.4".into(),
            serial: 0x00BC_614E,
        };
        assert_eq!(info.serial_hex(), "00BC614E");
    }
}
