//! Formatting and parsing helpers shared by the session and its callers.

/// Render bytes as space-separated uppercase hex pairs.
///
/// # Example
///
/// ```
/// use rdmx_core::format_hex;
///
/// assert_eq!(format_hex(&[0x0A, 0x1B, 0xFF]), "0A 1B FF");
/// assert_eq!(format_hex(&[]), "");
/// ```
pub fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a user-typed hex payload such as `"01 02"`, `"01,02"` or `"01-02"`.
///
/// Returns `None` if any token is not a valid hex byte. Blank input is an
/// empty payload.
///
/// # Example
///
/// ```
/// use rdmx_core::parse_hex_payload;
///
/// assert_eq!(parse_hex_payload("01 0a,FF-7f"), Some(vec![0x01, 0x0A, 0xFF, 0x7F]));
/// assert_eq!(parse_hex_payload("  "), Some(vec![]));
/// assert_eq!(parse_hex_payload("01 xyz"), None);
/// ```
pub fn parse_hex_payload(text: &str) -> Option<Vec<u8>> {
    text.split([' ', ',', '-'])
        .filter(|token| !token.is_empty())
        .map(|token| u8::from_str_radix(token, 16).ok())
        .collect()
}

/// Render a second count as `"1d 2h 3m (93780s)"` or, below one day,
/// `"2h 3m 4s (7384s)"`.
///
/// # Example
///
/// ```
/// use rdmx_core::format_seconds;
///
/// assert_eq!(format_seconds(3_725), "1h 2m 5s (3725s)");
/// assert_eq!(format_seconds(90_061), "1d 1h 1m (90061s)");
/// ```
pub fn format_seconds(total: u32) -> String {
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    if days >= 1 {
        format!("{days}d {hours}h {minutes}m ({total}s)")
    } else {
        format!("{hours}h {minutes}m {seconds}s ({total}s)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_hex_single() {
        assert_eq!(format_hex(&[0x00]), "00");
    }

    #[test]
    fn format_hex_uppercase() {
        assert_eq!(format_hex(&[0xab, 0xcd]), "AB CD");
    }

    #[test]
    fn parse_hex_mixed_separators() {
        assert_eq!(parse_hex_payload("de-ad,be ef"), Some(vec![0xDE, 0xAD, 0xBE, 0xEF]));
    }

    #[test]
    fn parse_hex_repeated_separators() {
        assert_eq!(parse_hex_payload("01  02,,03"), Some(vec![1, 2, 3]));
    }

    #[test]
    fn parse_hex_empty() {
        assert_eq!(parse_hex_payload(""), Some(vec![]));
    }

    #[test]
    fn parse_hex_rejects_wide_token() {
        assert_eq!(parse_hex_payload("0102"), None);
    }

    #[test]
    fn parse_hex_rejects_non_hex() {
        assert_eq!(parse_hex_payload("0g"), None);
    }

    #[test]
    fn format_seconds_zero() {
        assert_eq!(format_seconds(0), "0h 0m 0s (0s)");
    }

    #[test]
    fn format_seconds_exact_day() {
        assert_eq!(format_seconds(86_400), "1d 0h 0m (86400s)");
    }

    #[test]
    fn format_seconds_just_under_day() {
        assert_eq!(format_seconds(86_399), "23h 59m 59s (86399s)");
    }
}
