//! CSV export of the parameter table.

use std::io::Write;

use rdmx_core::error::Result;

use crate::state::PidResult;

/// Header row written by [`write_csv`].
pub const CSV_HEADER: &str = "PID,Name,Mandatory,Supported,Status,Latency_us,Value,RawHex";

fn quoted(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Render one row, without the line terminator.
pub fn csv_row(row: &PidResult) -> String {
    let status = row.status().map_or("NOT_QUERIED", |s| s.label());
    let latency = row.result.as_ref().map_or(0, |r| r.latency_us());
    format!(
        "0x{:04X},{},{},{},{},{},{},{}",
        row.descriptor.pid,
        quoted(&row.descriptor.name),
        row.descriptor.mandatory,
        row.support.label(),
        status,
        latency,
        quoted(&row.value),
        quoted(&row.raw_hex),
    )
}

/// Write the header and one line per row.
pub fn write_csv<W: Write>(rows: &[PidResult], mut out: W) -> Result<()> {
    writeln!(out, "{CSV_HEADER}")?;
    for row in rows {
        writeln!(out, "{}", csv_row(row))?;
    }
    out.flush()?;
    Ok(())
}
