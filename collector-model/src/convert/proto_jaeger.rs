// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Jaeger proto to model conversion, the gRPC twin of
//! [`super::thrift_jaeger`].

use crate::span::{
    Batch, KeyValue, LogEntry, Process, Span, SpanRef, SpanRefKind, TagValue, TraceId,
};
use crate::wire::jaeger_proto as pb;

pub fn batch_to_model(batch: pb::Batch) -> Batch {
    Batch {
        process: batch.process.map(process_to_model),
        spans: batch.spans.into_iter().map(span_to_model).collect(),
    }
}

pub fn span_to_model(span: pb::Span) -> Span {
    let references: Vec<SpanRef> = span.references.iter().map(ref_to_model).collect();
    Span {
        trace_id: trace_id_from_bytes(&span.trace_id),
        span_id: id_from_bytes(&span.span_id),
        // The proto model carries the parent only as a reference.
        parent_span_id: 0,
        operation_name: span.operation_name,
        references,
        flags: span.flags,
        start_time: span.start_time.map(timestamp_micros).unwrap_or(0),
        duration: span.duration.map(duration_micros).unwrap_or(0),
        tags: span.tags.into_iter().map(tag_to_model).collect(),
        logs: span
            .logs
            .into_iter()
            .map(|log| LogEntry {
                timestamp: log.timestamp.map(timestamp_micros).unwrap_or(0),
                fields: log.fields.into_iter().map(tag_to_model).collect(),
            })
            .collect(),
        process: span.process.map(process_to_model),
    }
}

pub fn process_to_model(process: pb::Process) -> Process {
    Process {
        service_name: process.service_name,
        tags: process.tags.into_iter().map(tag_to_model).collect(),
    }
}

/// Big-endian 16-byte trace id; shorter inputs fill the low bits.
pub fn trace_id_from_bytes(bytes: &[u8]) -> TraceId {
    if bytes.len() > 8 {
        let split = bytes.len() - 8;
        TraceId::new(be_u64(&bytes[..split]), be_u64(&bytes[split..]))
    } else {
        TraceId::new(0, be_u64(bytes))
    }
}

/// Big-endian 8-byte span id; shorter inputs fill the low bits.
pub fn id_from_bytes(bytes: &[u8]) -> u64 {
    be_u64(bytes)
}

fn be_u64(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rev()
        .take(8)
        .enumerate()
        .fold(0u64, |acc, (i, b)| acc | (u64::from(*b) << (8 * i)))
}

fn timestamp_micros(ts: prost_types::Timestamp) -> i64 {
    ts.seconds.saturating_mul(1_000_000) + i64::from(ts.nanos) / 1000
}

fn duration_micros(d: prost_types::Duration) -> i64 {
    d.seconds.saturating_mul(1_000_000) + i64::from(d.nanos) / 1000
}

fn ref_to_model(r: &pb::SpanRef) -> SpanRef {
    SpanRef {
        kind: match r.ref_type() {
            pb::SpanRefType::ChildOf => SpanRefKind::ChildOf,
            pb::SpanRefType::FollowsFrom => SpanRefKind::FollowsFrom,
        },
        trace_id: trace_id_from_bytes(&r.trace_id),
        span_id: id_from_bytes(&r.span_id),
    }
}

fn tag_to_model(tag: pb::KeyValue) -> KeyValue {
    let value = match tag.v_type() {
        pb::ValueType::String => TagValue::String(tag.v_str),
        pb::ValueType::Bool => TagValue::Bool(tag.v_bool),
        pb::ValueType::Int64 => TagValue::I64(tag.v_int64),
        pb::ValueType::Float64 => TagValue::F64(tag.v_float64),
        pb::ValueType::Binary => TagValue::Binary(tag.v_binary),
    };
    KeyValue {
        key: tag.key,
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_from_bytes() {
        let bytes: Vec<u8> = vec![
            0, 0, 0, 0, 0, 0, 0, 1, //
            0, 0, 0, 0, 0, 0, 0, 42,
        ];
        assert_eq!(TraceId::new(1, 42), trace_id_from_bytes(&bytes));
        assert_eq!(42, id_from_bytes(&[0, 0, 0, 0, 0, 0, 0, 42]));
        // Lenient on short inputs
        assert_eq!(TraceId::new(0, 0x0102), trace_id_from_bytes(&[1, 2]));
        assert_eq!(0, id_from_bytes(&[]));
    }

    #[test]
    fn test_timestamps_convert_to_micros() {
        let span = span_to_model(pb::Span {
            start_time: Some(prost_types::Timestamp {
                seconds: 10,
                nanos: 2500,
            }),
            duration: Some(prost_types::Duration {
                seconds: 1,
                nanos: 0,
            }),
            ..Default::default()
        });
        assert_eq!(10_000_002, span.start_time);
        assert_eq!(1_000_000, span.duration);
    }

    #[test]
    fn test_span_keeps_own_process() {
        let span = span_to_model(pb::Span {
            process: Some(pb::Process {
                service_name: "bar".to_string(),
                tags: vec![],
            }),
            ..Default::default()
        });
        assert_eq!("bar", span.service_name());
    }

    #[test]
    fn test_parent_comes_from_reference() {
        let trace_id: Vec<u8> = vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 9];
        let span = span_to_model(pb::Span {
            trace_id: trace_id.clone(),
            references: vec![pb::SpanRef {
                trace_id,
                span_id: vec![0, 0, 0, 0, 0, 0, 0, 5],
                ref_type: pb::SpanRefType::ChildOf as i32,
            }],
            ..Default::default()
        });
        assert_eq!(5, span.parent_id());
        assert!(!span.is_root());
    }

    #[test]
    fn test_tag_values() {
        let tag = tag_to_model(pb::KeyValue {
            key: "k".to_string(),
            v_type: pb::ValueType::Int64 as i32,
            v_int64: 7,
            ..Default::default()
        });
        assert_eq!(TagValue::I64(7), tag.value);
    }
}
