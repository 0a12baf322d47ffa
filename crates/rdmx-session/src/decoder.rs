//! RDM response payload decoding.
//!
//! Turns a transaction result into the human-readable value shown next to
//! each parameter. Covers the standard E1.20 parameters plus the
//! manufacturer-specific ones seen on the fixtures this tool is used with.
//! Every decoder checks the payload length before reading; a payload that
//! is too short renders as `"Incomplete"`.

use rdmx_core::helpers::{format_hex, format_seconds};
use rdmx_core::types::{NackReason, ResponseStatus};

const INCOMPLETE: &str = "Incomplete";

/// Result of decoding one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// Display value.
    pub value: String,
    /// Payload as `"0A 1B FF"`, always rendered when a payload exists.
    pub raw_hex: String,
    /// Structured DEVICE_INFO, when the response was a complete one.
    pub device_info: Option<DeviceInfo>,
}

/// Parsed DEVICE_INFO (PID 0x0060) response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub protocol_major: u8,
    pub protocol_minor: u8,
    pub model_id: u16,
    pub category: u16,
    pub software_major: u8,
    pub software_minor: u8,
    pub software_build: u16,
    pub footprint: u16,
    pub current_personality: u8,
    pub personality_count: u8,
    pub start_address: u16,
    pub sub_device_count: u16,
    pub sensor_count: u8,
}

impl DeviceInfo {
    /// Length of a complete DEVICE_INFO payload.
    pub const LEN: usize = 19;

    /// Parse a DEVICE_INFO payload. Returns `None` if it is too short.
    pub fn parse(d: &[u8]) -> Option<Self> {
        if d.len() < Self::LEN {
            return None;
        }
        Some(DeviceInfo {
            protocol_major: d[0],
            protocol_minor: d[1],
            model_id: be16(d, 2),
            category: be16(d, 4),
            software_major: d[6],
            software_minor: d[7],
            software_build: be16(d, 8),
            footprint: be16(d, 10),
            current_personality: d[12],
            personality_count: d[13],
            start_address: be16(d, 14),
            sub_device_count: be16(d, 16),
            sensor_count: d[18],
        })
    }

    /// Four-line summary.
    pub fn summary(&self) -> String {
        format!(
            "Model: 0x{:04X} | {}\n\
             Protocol: {}.{} | SW: {}.{}.{}\n\
             Footprint: {}ch | Pers: {}/{}\n\
             DMX Addr: {} | Sub-devs: {} | Sensors: {}",
            self.model_id,
            category_name(self.category),
            self.protocol_major,
            self.protocol_minor,
            self.software_major,
            self.software_minor,
            self.software_build,
            self.footprint,
            self.current_personality,
            self.personality_count,
            self.start_address,
            self.sub_device_count,
            self.sensor_count,
        )
    }
}

/// Product category display name.
pub fn category_name(category: u16) -> String {
    let name = match category {
        0x0100 => "Fixture",
        0x0101 => "Fixture Fixed",
        0x0102 => "Fixture Moving Yoke",
        0x0103 => "Fixture Moving Mirror",
        0x0200 => "Fixture Accessory",
        0x0301 => "Projector Fixed",
        0x0400 => "Atmospheric",
        0x0401 => "Atmospheric Hazer",
        0x0500 => "Dimmer",
        0x0600 => "Power",
        0x0700 => "Scenic",
        0x7FFF => "Other",
        _ => return format!("0x{category:04X}"),
    };
    name.to_string()
}

/// Parse a SUPPORTED_PARAMETERS payload into PIDs. A trailing odd byte is
/// dropped.
pub fn supported_pids(d: &[u8]) -> Vec<u16> {
    d.chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

/// Decode a transaction result for display.
pub fn decode(pid: u16, status: ResponseStatus, nack_reason: u16, payload: &[u8]) -> Decoded {
    let raw_hex = format_hex(payload);
    let mut device_info = None;

    let value = match status {
        ResponseStatus::Ack if payload.is_empty() => "ACK (empty response)".to_string(),
        ResponseStatus::Ack => {
            if pid == 0x0060 {
                device_info = DeviceInfo::parse(payload);
            }
            decode_payload(pid, payload)
        }
        ResponseStatus::Nack => format!("NACK: {}", NackReason(nack_reason)),
        ResponseStatus::Timeout => "No response".to_string(),
        _ => String::new(),
    };

    Decoded {
        value,
        raw_hex,
        device_info,
    }
}

/// Minimum payload length each known PID needs.
fn min_len(pid: u16) -> usize {
    match pid {
        0x0051 => 20,
        0x0060 => DeviceInfo::LEN,
        0x00E0 | 0x00F0 => 2,
        0x00E1 => 3,
        0x0200 => 13,
        0x0201 => 7,
        0x0400 | 0x8070 | 0x80C0 | 0x8400 | 0x9001 => 4,
        0x1000 | 0x8600 | 0x9F02 | 0x9F0A | 0x9F0C => 1,
        0x8060 => 6,
        0x8090 => 7,
        0x8208 | 0x9F00 => 5,
        0x8610..=0x8613 => 2,
        _ => 0,
    }
}

fn decode_payload(pid: u16, d: &[u8]) -> String {
    if d.len() < min_len(pid) {
        return INCOMPLETE.to_string();
    }
    match pid {
        0x0050 => {
            let pids = supported_pids(d);
            let list = pids
                .iter()
                .map(|p| format!("0x{p:04X}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{} PIDs: {list}", pids.len())
        }
        0x0051 => format!(
            "PID 0x{:04X}: pdl={} type={} cc={} \"{}\"",
            be16(d, 0),
            d[2],
            d[3],
            d[4],
            ascii_field(d, 20, 32)
        ),
        0x0060 => match DeviceInfo::parse(d) {
            Some(info) => info.summary(),
            None => INCOMPLETE.to_string(),
        },
        0x0080 | 0x0081 | 0x0082 | 0x00C0 | 0x8072 => ascii_z(d),
        0x00E0 => format!("Personality {}/{}", d[0], d[1]),
        0x00E1 => format!(
            "Pers {}: {} slots \"{}\"",
            d[0],
            be16(d, 1),
            ascii_field(d, 3, 32)
        ),
        0x00F0 => format!("Address: {}", be16(d, 0)),
        0x0200 => format!(
            "Sensor {}: type={} unit={} \"{}\"",
            d[0],
            d[1],
            d[2],
            ascii_field(d, 13, 32)
        ),
        0x0201 => format!(
            "Sensor {}: current={} low={} high={}",
            d[0],
            be16(d, 1) as i16,
            be16(d, 3) as i16,
            be16(d, 5) as i16
        ),
        0x0400 => format!("{} hours", be32(d, 0)),
        0x1000 => {
            if d[0] != 0 {
                "Identify ON".to_string()
            } else {
                "Identify OFF".to_string()
            }
        }
        0x8060 => format!(
            "SN: {:02X}{:02X}:{:02X}{:02X}{:02X}{:02X}",
            d[0], d[1], d[2], d[3], d[4], d[5]
        ),
        0x8070 => format!("Model: 0x{:04X} | Cat: 0x{:04X}", be16(d, 0), be16(d, 2)),
        0x8090 => format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            be16(d, 0),
            d[2],
            d[3],
            d[4],
            d[5],
            d[6]
        ),
        0x80C0 => format!("SFT-{:06}-{:02} v{}", be16(d, 0), d[2], d[3]),
        0x8208 => format!("Max temp: {}°C @ {}s", d[0] as i8, be32(d, 1)),
        0x8400 => format_seconds(be32(d, 0)),
        0x8600 => {
            if d[0] == 0 {
                "16-bit (high-res)".to_string()
            } else {
                "8-bit (standard)".to_string()
            }
        }
        0x8610..=0x8613 => format!("Ch{} startup: {}", pid - 0x8610, be16(d, 0)),
        0x9001 => match ascii_z(d).as_str() {
            "OPEN" => "Unlocked (OPEN)".to_string(),
            "LOCK" => "Locked (LOCK)".to_string(),
            other => other.to_string(),
        },
        0x9F00 => channel_map(&d[..5]),
        0x9F02 => format!("Chemistry: 0x{:02X}", d[0]),
        0x9F0A => format!("Shutdown at: {}°C", d[0] as i8),
        0x9F0C => format!("Resume at: {}°C", d[0] as i8),
        _ => hex_ascii_dump(d),
    }
}

fn be16(d: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([d[at], d[at + 1]])
}

fn be32(d: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([d[at], d[at + 1], d[at + 2], d[at + 3]])
}

/// Bytes as ASCII, anything above 0x7F shown as `?`.
fn ascii_lossy(d: &[u8]) -> String {
    d.iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect()
}

/// ASCII up to the first NUL.
fn ascii_z(d: &[u8]) -> String {
    let end = d.iter().position(|&b| b == 0).unwrap_or(d.len());
    ascii_lossy(&d[..end])
}

/// Up to `max` bytes of ASCII starting at `start`, trailing NULs trimmed.
fn ascii_field(d: &[u8], start: usize, max: usize) -> String {
    if d.len() <= start {
        return String::new();
    }
    let end = d.len().min(start + max);
    ascii_lossy(&d[start..end])
        .trim_end_matches('\0')
        .to_string()
}

fn channel_map(d: &[u8]) -> String {
    let entries: Vec<String> = d
        .iter()
        .enumerate()
        .map(|(i, &target)| {
            if target == 0xFF {
                format!("Ch{i}=OFF")
            } else {
                format!("Ch{i}\u{2192}{target}")
            }
        })
        .collect();
    format!("Map: {}", entries.join(" "))
}

fn hex_ascii_dump(d: &[u8]) -> String {
    let ascii: String = d
        .iter()
        .map(|&b| {
            if (0x20..=0x7E).contains(&b) {
                b as char
            } else {
                '.'
            }
        })
        .collect();
    format!("{} | {ascii}", format_hex(d))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack(pid: u16, payload: &[u8]) -> String {
        decode(pid, ResponseStatus::Ack, 0, payload).value
    }

    fn device_info_bytes() -> Vec<u8> {
        vec![
            0x01, 0x00, 0x12, 0x34, 0x01, 0x02, 0x02, 0x04, 0x00, 0x11, 0x00, 0x10, 0x01, 0x03,
            0x00, 0x21, 0x00, 0x00, 0x02,
        ]
    }

    #[test]
    fn start_address() {
        let decoded = decode(0x00F0, ResponseStatus::Ack, 0, &[0x00, 0x01]);
        assert_eq!(decoded.value, "Address: 1");
        assert_eq!(decoded.raw_hex, "00 01");
    }

    #[test]
    fn nack_reason_rendered() {
        let decoded = decode(0x00F0, ResponseStatus::Nack, 0x0006, &[]);
        assert_eq!(decoded.value, "NACK: NR_DATA_OUT_OF_RANGE");
    }

    #[test]
    fn nack_unknown_reason() {
        let decoded = decode(0x00F0, ResponseStatus::Nack, 0x0042, &[]);
        assert_eq!(decoded.value, "NACK: Unknown (0x0042)");
    }

    #[test]
    fn status_overrides() {
        assert_eq!(ack(0x0060, &[]), "ACK (empty response)");
        assert_eq!(
            decode(0x0060, ResponseStatus::Timeout, 0, &[]).value,
            "No response"
        );
        assert_eq!(
            decode(0x0060, ResponseStatus::ChecksumError, 0, &[0x01]).value,
            ""
        );
        assert_eq!(
            decode(0x0060, ResponseStatus::ChecksumError, 0, &[0x01]).raw_hex,
            "01"
        );
    }

    #[test]
    fn device_info_full() {
        let decoded = decode(0x0060, ResponseStatus::Ack, 0, &device_info_bytes());
        let info = decoded.device_info.unwrap();
        assert_eq!(info.footprint, 16);
        assert_eq!(info.start_address, 33);
        assert_eq!(info.model_id, 0x1234);
        assert_eq!(
            decoded.value,
            "Model: 0x1234 | Fixture Moving Yoke\n\
             Protocol: 1.0 | SW: 2.4.17\n\
             Footprint: 16ch | Pers: 1/3\n\
             DMX Addr: 33 | Sub-devs: 0 | Sensors: 2"
        );
    }

    #[test]
    fn device_info_short_is_incomplete() {
        let bytes = device_info_bytes();
        let decoded = decode(0x0060, ResponseStatus::Ack, 0, &bytes[..18]);
        assert_eq!(decoded.value, "Incomplete");
        assert!(decoded.device_info.is_none());
    }

    #[test]
    fn device_info_not_parsed_on_nack() {
        let decoded = decode(0x0060, ResponseStatus::Nack, 0, &device_info_bytes());
        assert!(decoded.device_info.is_none());
    }

    #[test]
    fn category_names() {
        assert_eq!(category_name(0x0401), "Atmospheric Hazer");
        assert_eq!(category_name(0x7FFF), "Other");
        assert_eq!(category_name(0x0902), "0x0902");
    }

    #[test]
    fn supported_list() {
        assert_eq!(
            ack(0x0050, &[0x00, 0x50, 0x00, 0x60, 0x10]),
            "2 PIDs: 0x0050, 0x0060"
        );
        assert_eq!(supported_pids(&[0x00, 0x50, 0x00, 0x60, 0x10]), vec![0x0050, 0x0060]);
    }

    #[test]
    fn parameter_description() {
        let mut d = vec![0x80, 0x60, 0x06, 0x01, 0x01];
        d.resize(20, 0);
        d.extend_from_slice(b"Serial\0\0");
        assert_eq!(ack(0x0051, &d), "PID 0x8060: pdl=6 type=1 cc=1 \"Serial\"");
        assert_eq!(ack(0x0051, &d[..19]), "Incomplete");
    }

    #[test]
    fn ascii_labels_stop_at_nul() {
        assert_eq!(ack(0x0082, b"Stage Left\0junk"), "Stage Left");
        assert_eq!(ack(0x8072, b"SKU-1"), "SKU-1");
    }

    #[test]
    fn non_ascii_label_bytes_become_question_marks() {
        assert_eq!(ack(0x0082, b"Caf\xE9 \xFF\0"), "Caf? ?");
        assert_eq!(
            ack(0x00E1, b"\x01\x00\x0CMode\xC3\xA9"),
            "Pers 1: 12 slots \"Mode??\""
        );
    }

    #[test]
    fn one_byte_short_is_incomplete_for_every_known_pid() {
        let pids = [
            0x0051, 0x0060, 0x00E0, 0x00E1, 0x00F0, 0x0200, 0x0201, 0x0400, 0x1000, 0x8060,
            0x8070, 0x8090, 0x80C0, 0x8208, 0x8400, 0x8600, 0x8610, 0x8611, 0x8612, 0x8613,
            0x9001, 0x9F00, 0x9F02, 0x9F0A, 0x9F0C,
        ];
        for pid in pids {
            let need = min_len(pid);
            assert!(need > 0, "0x{pid:04X} has no minimum length");
            assert_eq!(
                decode_payload(pid, &vec![0x41; need - 1]),
                "Incomplete",
                "0x{pid:04X} with {} bytes",
                need - 1
            );
            assert_ne!(
                decode_payload(pid, &vec![0x41; need]),
                "Incomplete",
                "0x{pid:04X} with {need} bytes"
            );
        }
    }

    #[test]
    fn personality() {
        assert_eq!(ack(0x00E0, &[0x02, 0x05]), "Personality 2/5");
        assert_eq!(ack(0x00E0, &[0x02]), "Incomplete");
        assert_eq!(
            ack(0x00E1, b"\x01\x00\x0CStandard"),
            "Pers 1: 12 slots \"Standard\""
        );
    }

    #[test]
    fn sensors() {
        let mut def = vec![0x00, 0x00, 0x01];
        def.resize(13, 0);
        def.extend_from_slice(b"Head Temp");
        assert_eq!(ack(0x0200, &def), "Sensor 0: type=0 unit=1 \"Head Temp\"");
        assert_eq!(
            ack(0x0201, &[0x01, 0xFF, 0xF6, 0x00, 0x14, 0x00, 0x3C]),
            "Sensor 1: current=-10 low=20 high=60"
        );
    }

    #[test]
    fn hours_and_identify() {
        assert_eq!(ack(0x0400, &[0x00, 0x00, 0x04, 0xD2]), "1234 hours");
        assert_eq!(ack(0x1000, &[0x01]), "Identify ON");
        assert_eq!(ack(0x1000, &[0x00]), "Identify OFF");
    }

    #[test]
    fn manufacturer_serial_and_model() {
        assert_eq!(
            ack(0x8060, &[0x48, 0x45, 0x00, 0x00, 0x12, 0x34]),
            "SN: 4845:00001234"
        );
        assert_eq!(
            ack(0x8070, &[0x00, 0x2A, 0x01, 0x02]),
            "Model: 0x002A | Cat: 0x0102"
        );
    }

    #[test]
    fn manufacture_date_and_software() {
        assert_eq!(
            ack(0x8090, &[0x07, 0xE8, 3, 9, 7, 5, 0]),
            "2024-03-09 07:05:00"
        );
        assert_eq!(ack(0x80C0, &[0x00, 0x7B, 0x02, 0x05]), "SFT-000123-02 v5");
    }

    #[test]
    fn temperatures() {
        assert_eq!(
            ack(0x8208, &[0xFB, 0x00, 0x00, 0x00, 0x3C]),
            "Max temp: -5°C @ 60s"
        );
        assert_eq!(ack(0x9F0A, &[0x5A]), "Shutdown at: 90°C");
        assert_eq!(ack(0x9F0C, &[0xF6]), "Resume at: -10°C");
    }

    #[test]
    fn run_time() {
        assert_eq!(ack(0x8400, &[0x00, 0x01, 0x5F, 0x90]), "1d 1h 0m (90000s)");
        assert_eq!(ack(0x8400, &[0x00, 0x00, 0x0E, 0x8D]), "1h 2m 5s (3725s)");
    }

    #[test]
    fn resolution_and_startup_levels() {
        assert_eq!(ack(0x8600, &[0x00]), "16-bit (high-res)");
        assert_eq!(ack(0x8600, &[0x01]), "8-bit (standard)");
        assert_eq!(ack(0x8612, &[0x01, 0x00]), "Ch2 startup: 256");
    }

    #[test]
    fn lock_state() {
        assert_eq!(ack(0x9001, b"OPEN"), "Unlocked (OPEN)");
        assert_eq!(ack(0x9001, b"LOCK"), "Locked (LOCK)");
        assert_eq!(ack(0x9001, b"WAIT"), "WAIT");
        assert_eq!(ack(0x9001, b"OPE"), "Incomplete");
    }

    #[test]
    fn channel_map_and_chemistry() {
        assert_eq!(
            ack(0x9F00, &[0x00, 0xFF, 0x02, 0x03, 0xFF]),
            "Map: Ch0\u{2192}0 Ch1=OFF Ch2\u{2192}2 Ch3\u{2192}3 Ch4=OFF"
        );
        assert_eq!(ack(0x9F02, &[0x0B]), "Chemistry: 0x0B");
    }

    #[test]
    fn unknown_pid_hex_ascii_fallback() {
        assert_eq!(ack(0x7001, &[0x48, 0x69, 0x00, 0x7F]), "48 69 00 7F | Hi..");
    }
}
