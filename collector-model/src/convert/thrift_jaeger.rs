// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Thrift-Jaeger to model conversion: a structural copy.

use crate::span::{
    Batch, KeyValue, LogEntry, Process, Span, SpanRef, SpanRefKind, TagValue, TraceId,
};
use crate::wire::jaeger;

pub fn batch_to_model(batch: jaeger::Batch) -> Batch {
    let process = if batch.process.service_name.is_empty() && batch.process.tags.is_none() {
        None
    } else {
        Some(process_to_model(batch.process))
    };
    let spans = batch.spans.into_iter().map(span_to_model).collect();
    Batch { process, spans }
}

pub fn span_to_model(span: jaeger::Span) -> Span {
    Span {
        trace_id: TraceId::new(span.trace_id_high as u64, span.trace_id_low as u64),
        span_id: span.span_id as u64,
        parent_span_id: span.parent_span_id as u64,
        operation_name: span.operation_name,
        references: span
            .references
            .unwrap_or_default()
            .into_iter()
            .map(ref_to_model)
            .collect(),
        flags: span.flags as u32,
        start_time: span.start_time,
        duration: span.duration,
        tags: tags_to_model(span.tags.unwrap_or_default()),
        logs: span
            .logs
            .unwrap_or_default()
            .into_iter()
            .map(|log| LogEntry {
                timestamp: log.timestamp,
                fields: tags_to_model(log.fields),
            })
            .collect(),
        process: None,
    }
}

pub fn process_to_model(process: jaeger::Process) -> Process {
    Process {
        service_name: process.service_name,
        tags: tags_to_model(process.tags.unwrap_or_default()),
    }
}

fn ref_to_model(r: jaeger::SpanRef) -> SpanRef {
    SpanRef {
        kind: match r.ref_type {
            jaeger::SpanRefType::ChildOf => SpanRefKind::ChildOf,
            jaeger::SpanRefType::FollowsFrom => SpanRefKind::FollowsFrom,
        },
        trace_id: TraceId::new(r.trace_id_high as u64, r.trace_id_low as u64),
        span_id: r.span_id as u64,
    }
}

fn tags_to_model(tags: Vec<jaeger::Tag>) -> Vec<KeyValue> {
    tags.into_iter().map(tag_to_model).collect()
}

fn tag_to_model(tag: jaeger::Tag) -> KeyValue {
    // The declared type wins; a tag without one falls back to whichever
    // value field the client filled in.
    let value = match tag.v_type {
        Some(jaeger::TagType::String) => TagValue::String(tag.v_str.unwrap_or_default()),
        Some(jaeger::TagType::Double) => TagValue::F64(tag.v_double.unwrap_or_default()),
        Some(jaeger::TagType::Bool) => TagValue::Bool(tag.v_bool.unwrap_or_default()),
        Some(jaeger::TagType::Long) => TagValue::I64(tag.v_long.unwrap_or_default()),
        Some(jaeger::TagType::Binary) => TagValue::Binary(tag.v_binary.unwrap_or_default()),
        None => {
            if let Some(v) = tag.v_str {
                TagValue::String(v)
            } else if let Some(v) = tag.v_bool {
                TagValue::Bool(v)
            } else if let Some(v) = tag.v_long {
                TagValue::I64(v)
            } else if let Some(v) = tag.v_double {
                TagValue::F64(v)
            } else if let Some(v) = tag.v_binary {
                TagValue::Binary(v)
            } else {
                TagValue::String(String::new())
            }
        }
    };
    KeyValue {
        key: tag.key,
        value,
    }
}
