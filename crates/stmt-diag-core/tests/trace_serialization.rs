// crates/stmt-diag-core/tests/trace_serialization.rs
// ============================================================================
// Module: Trace Serialization Tests
// Description: Span recording to tree conversion and JSON output.
// ============================================================================
//! ## Overview
//! Validates tree shape, field carry-over, and failure cases for recordings.

#![allow(clippy::unwrap_used, reason = "Tests use unwrap on deterministic fixtures.")]

use std::collections::BTreeMap;

use stmt_diag_core::LogField;
use stmt_diag_core::MAX_TRACE_DEPTH;
use stmt_diag_core::NormalizedSpan;
use stmt_diag_core::RecordedSpan;
use stmt_diag_core::SpanId;
use stmt_diag_core::SpanLog;
use stmt_diag_core::Timestamp;
use stmt_diag_core::TraceError;
use stmt_diag_core::normalize_recording;
use stmt_diag_core::trace_to_json;

fn span(id: u64, parent: u64) -> RecordedSpan {
    RecordedSpan {
        span_id: SpanId::new(id),
        parent_span_id: SpanId::new(parent),
        operation: format!("op-{id}"),
        start_time: Timestamp::from_unix_millis(1_000 + i64::try_from(id).unwrap()),
        duration_micros: id * 10,
        tags: BTreeMap::new(),
        logs: Vec::new(),
    }
}

#[test]
fn root_with_two_children_builds_expected_tree() {
    let root = normalize_recording(&[span(1, 0), span(2, 1), span(3, 1)]).unwrap();
    assert_eq!(root.operation, "op-1");
    let mut children: Vec<&str> = root.children.iter().map(|child| child.operation.as_str()).collect();
    children.sort_unstable();
    assert_eq!(children, vec!["op-2", "op-3"]);
    assert!(root.children.iter().all(|child| child.children.is_empty()));
}

#[test]
fn nested_spans_follow_parent_links() {
    let root = normalize_recording(&[span(1, 0), span(3, 2), span(2, 1)]).unwrap();
    assert_eq!(root.children.len(), 1);
    assert_eq!(root.children[0].operation, "op-2");
    assert_eq!(root.children[0].children[0].operation, "op-3");
}

#[test]
fn spans_outside_the_root_are_dropped() {
    let root = normalize_recording(&[span(1, 0), span(2, 1), span(9, 8)]).unwrap();
    assert_eq!(root.children.len(), 1);
}

#[test]
fn tags_and_logs_are_carried_into_the_tree() {
    let mut root_span = span(1, 0);
    root_span.tags.insert("node".to_string(), "n1".to_string());
    root_span.logs.push(SpanLog {
        time: Timestamp::from_unix_millis(1_500),
        fields: vec![LogField {
            key: "event".to_string(),
            value: "rows read".to_string(),
        }],
    });
    let json = trace_to_json(&[root_span]).unwrap();
    let decoded: NormalizedSpan = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded.tags.get("node").map(String::as_str), Some("n1"));
    assert_eq!(decoded.logs[0].fields[0].value, "rows read");
    assert!(json.contains('\n'));
}

#[test]
fn empty_fields_are_omitted_from_json() {
    let json = trace_to_json(&[span(1, 0)]).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(value.get("children").is_none());
    assert!(value.get("tags").is_none());
    assert_eq!(value["operation"], "op-1");
    assert_eq!(value["duration_micros"], 10);
}

#[test]
fn empty_recording_is_rejected() {
    assert_eq!(trace_to_json(&[]).unwrap_err(), TraceError::EmptyRecording);
}

#[test]
fn cyclic_parent_links_are_rejected() {
    let err = normalize_recording(&[span(1, 2), span(2, 1)]).unwrap_err();
    assert_eq!(
        err,
        TraceError::TooDeep {
            max_depth: MAX_TRACE_DEPTH
        }
    );
}

#[test]
fn self_parented_span_is_not_its_own_child() {
    let root = normalize_recording(&[span(1, 1)]).unwrap();
    assert!(root.children.is_empty());
}

#[test]
fn chain_at_max_depth_is_accepted() {
    let depth = u64::try_from(MAX_TRACE_DEPTH).unwrap();
    let recording: Vec<RecordedSpan> = (1 ..= depth).map(|id| span(id, id - 1)).collect();
    assert!(normalize_recording(&recording).is_ok());

    let mut deeper = recording;
    deeper.push(span(depth + 1, depth));
    assert!(normalize_recording(&deeper).is_err());
}

/// Root followed by layers where each span id is recorded twice.
fn doubled_layers(layers: u64) -> Vec<RecordedSpan> {
    let mut recording = vec![span(1, 0)];
    for id in 2 ..= layers + 1 {
        recording.push(span(id, id - 1));
        recording.push(span(id, id - 1));
    }
    recording
}

#[test]
fn repeated_span_ids_are_rejected_before_building_the_tree() {
    let recording = doubled_layers(40);
    assert_eq!(recording.len(), 81);
    assert_eq!(
        trace_to_json(&recording).unwrap_err(),
        TraceError::DuplicateSpanId {
            span_id: SpanId::new(2)
        }
    );
}

#[test]
fn repeated_root_id_is_rejected() {
    let err = normalize_recording(&[span(1, 0), span(2, 1), span(1, 2)]).unwrap_err();
    assert_eq!(
        err,
        TraceError::DuplicateSpanId {
            span_id: SpanId::new(1)
        }
    );
}
