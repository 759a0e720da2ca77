//! Table formatting for exec and route events
//!
//! Both streams are fixed-width, left-justified columns behind a single header
//! line. Columns are padded, never truncated.

// Elapsed time is shown with millisecond precision
#![allow(clippy::cast_precision_loss)]

use std::borrow::Cow;
use std::net::Ipv4Addr;
use std::time::Duration;

use super::correlator::CompletedExec;
use super::decode::RouteRecord;

/// Header row of the exec table
#[must_use]
pub fn exec_header() -> String {
    format!("{:<8} {:<16} {:<7} {:<7} {}", "TIME(s)", "PCOMM", "PID", "PPID", "ARGS")
}

/// One exec row; `elapsed` is time since the monitor started
#[must_use]
pub fn format_exec(exec: &CompletedExec, elapsed: Duration) -> String {
    format!(
        "{:<8.3} {:<16} {:<7} {:<7} {}",
        elapsed.as_secs_f64(),
        exec.comm,
        exec.pid.0,
        exec.ppid.0,
        escape_newlines(&exec.args)
    )
}

/// Header row of the route table
#[must_use]
pub fn route_header() -> String {
    format!(
        "{:<15} {:<10} {:<10} {:<10} {:<10} {:<10} {:<10} {:<10}",
        "TS(ns)", "PPID", "PID", "PCMD", "CMD", "TYPE", "NID", "DST"
    )
}

/// One route row
#[must_use]
pub fn format_route(route: &RouteRecord) -> String {
    format!(
        "{:<15} {:<10} {:<10} {:<10} {:<10} {:<10} {:<10} {:<10}",
        route.timestamp_ns,
        route.ppid.0,
        route.pid.0,
        route.pcomm,
        route.comm,
        route.kind.label(),
        route.pidns_inum,
        destination(route.dst)
    )
}

/// Destination address of a route record
///
/// `fc_dst` is a `__be32`: its in-memory bytes are already in network order, so
/// they are printed as they lie regardless of host endianness.
#[must_use]
pub fn destination(raw: u32) -> Ipv4Addr {
    Ipv4Addr::from(raw.to_ne_bytes())
}

/// Show embedded newlines as a literal `\n` so one exec stays on one line
#[must_use]
pub fn escape_newlines(text: &str) -> Cow<'_, str> {
    if text.contains('\n') {
        Cow::Owned(text.replace('\n', "\\n"))
    } else {
        Cow::Borrowed(text)
    }
}
