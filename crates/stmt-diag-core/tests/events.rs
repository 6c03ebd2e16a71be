// crates/stmt-diag-core/tests/events.rs
// ============================================================================
// Module: Diagnostics Event Sink Tests
// Description: JSON-lines encoding of registry events.
// ============================================================================
//! ## Overview
//! Validates event levels and the file sink's append-only JSON lines.

#![allow(clippy::unwrap_used, reason = "Tests use unwrap on deterministic fixtures.")]

use stmt_diag_core::DiagnosticsEvent;
use stmt_diag_core::DiagnosticsEventSink;
use stmt_diag_core::EventKind;
use stmt_diag_core::EventLevel;
use stmt_diag_core::FileEventSink;
use stmt_diag_core::Fingerprint;
use stmt_diag_core::RequestId;

#[test]
fn absorbed_failures_are_warnings() {
    for kind in [
        EventKind::BroadcastFailed,
        EventKind::CompletionFailed,
        EventKind::PollFailed,
        EventKind::TraceSerializationFailed,
    ] {
        assert_eq!(kind.level(), EventLevel::Warn);
    }
    assert_eq!(EventKind::RequestInserted.level(), EventLevel::Info);
}

#[test]
fn file_sink_appends_one_json_line_per_event() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let sink = FileEventSink::new(&path).unwrap();
    let id = RequestId::from_raw(4).unwrap();

    sink.record(
        &DiagnosticsEvent::new(EventKind::RequestClaimed, "claimed")
            .with_request(id)
            .with_fingerprint(&Fingerprint::new("SELECT _")),
    );
    sink.record(&DiagnosticsEvent::new(EventKind::PollFailed, "store unavailable"));

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> =
        contents.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["event"], "request_claimed");
    assert_eq!(lines[0]["level"], "info");
    assert_eq!(lines[0]["request_id"], 4);
    assert_eq!(lines[0]["fingerprint"], "SELECT _");
    assert_eq!(lines[1]["level"], "warn");
    assert!(lines[1].get("request_id").is_none());
}
