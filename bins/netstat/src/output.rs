//! Output formatting for netstat command.

use procnet::netstat::{Endpoint, Scan, ScanIssue, ScanReport, SocketEntry};
use std::io::{self, Write};

// Long IPv6 addresses are cut to keep columns aligned
const ADDR_WIDTH: usize = 17;

/// Print entries as a table.
pub fn print_text(entries: &[SocketEntry]) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    writeln!(
        handle,
        "Proto {:<23} {:<23} {:<12} {:<16} {:<6}",
        "Local Addr", "Foreign Addr", "State", "PID/Program name", "nsNet"
    )?;

    for entry in entries {
        let program = entry
            .process
            .as_ref()
            .map(|p| p.to_string())
            .unwrap_or_default();
        writeln!(
            handle,
            "{:<5} {:<23.23} {:<23.23} {:<12} {:<16} {:<6}",
            entry.transport.to_string(),
            format_endpoint(&entry.local),
            format_endpoint(&entry.remote),
            entry.state.name(),
            program,
            entry.namespace.to_string()
        )?;
    }

    Ok(())
}

/// Print the whole scan as JSON.
pub fn print_json(scan: &Scan) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, scan)?;
    writeln!(handle)?;
    Ok(())
}

/// Print what the scan could not cover on stderr.
pub fn print_report(report: &ScanReport) -> io::Result<()> {
    let stderr = io::stderr();
    let mut handle = stderr.lock();
    for issue in &report.issues {
        // Already announced with the table header
        if matches!(issue, ScanIssue::ReducedAttribution) {
            continue;
        }
        writeln!(handle, "warning: {}", issue)?;
    }
    Ok(())
}

fn format_endpoint(ep: &Endpoint) -> String {
    let mut addr = ep.ip.to_string();
    addr.truncate(ADDR_WIDTH);
    format!("{}:{}", addr, ep.port)
}
