//! Text rendering of a round's results.

use std::fmt::Write;

use chrono::{DateTime, Local};

use crate::scheduler::round::TestResult;

/// Timestamp format used in the report header.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render `results` sorted by peer name, headed by `at`.
pub fn render(results: &[TestResult], at: DateTime<Local>) -> String {
    let mut sorted: Vec<&TestResult> = results.iter().collect();
    sorted.sort_by(|a, b| a.peer_name.cmp(&b.peer_name));

    let mut out = String::new();
    let _ = writeln!(
        out,
        "=== Performance Test Results ({}) ===\n",
        at.format(TIMESTAMP_FORMAT)
    );

    for r in sorted {
        let _ = writeln!(out, "Peer: {} ({})", r.peer_name, r.peer_addr);
        match &r.outcome {
            Err(e) => {
                let _ = writeln!(out, "  Status: ERROR - {}\n", e);
            }
            Ok(m) => {
                let _ = writeln!(
                    out,
                    "  Connection: {} - {}",
                    m.connection.connection_type, m.connection.descriptor
                );
                let _ = writeln!(out, "  Latency: {:.2} ms", m.latency_ms);
                let _ = writeln!(out, "  Throughput: {:.2} Mbps\n", m.throughput_mbps);
            }
        }
    }

    out.push_str("---\n\n");
    out
}
