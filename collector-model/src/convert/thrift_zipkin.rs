// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Zipkin v1 to model conversion.
//!
//! One Zipkin span can yield zero, one, or two model spans: the v1 shared
//! span model records the client and server halves of an RPC under the same
//! span id, and those halves become separate spans here. Conversion never
//! fails; anything suspicious is reported as a warning alongside the spans,
//! and corrupted UTF-8 is repaired via [`crate::utf8`].

use tracing::warn;

use crate::span::{KeyValue, LogEntry, Process, Span, TagValue, TraceId, FLAG_DEBUG};
use crate::utf8::{
    string_from_bytes, tag_from_raw_key, INVALID_OPERATION_TAG, INVALID_SERVICE_TAG,
};
use crate::wire::zipkincore;
use crate::wire::zipkincore::AnnotationType;

const COMPONENT_KEY: &str = "component";
const SPAN_KIND_KEY: &str = "span.kind";
const PEER_SERVICE_KEY: &str = "peer.service";
const PEER_HOST_IPV4_KEY: &str = "peer.ipv4";
const PEER_PORT_KEY: &str = "peer.port";
const EVENT_KEY: &str = "event";

/// Convert one Zipkin span into model spans, collecting warnings for the
/// caller to count. Warnings never fail the batch.
pub fn span_to_model(zspan: &zipkincore::Span) -> (Vec<Span>, Vec<String>) {
    let mut warnings = Vec::new();

    if zspan.id == 0 && zspan.annotations.is_empty() && zspan.binary_annotations.is_empty() {
        let warning = "skipping span with zero id and no annotations".to_string();
        warn!(trace_id = zspan.trace_id, "{warning}");
        return (Vec::new(), vec![warning]);
    }

    let has_client = has_annotation(zspan, zipkincore::CLIENT_SEND)
        || has_annotation(zspan, zipkincore::CLIENT_RECV);
    let has_server = has_annotation(zspan, zipkincore::SERVER_RECV)
        || has_annotation(zspan, zipkincore::SERVER_SEND);

    let mut spans = Vec::new();
    if has_client && has_server {
        // Shared span: both halves keep the span id, per the v1 model.
        spans.push(build_span(zspan, Side::Client, &mut warnings));
        spans.push(build_span(zspan, Side::Server, &mut warnings));
    } else if has_server {
        spans.push(build_span(zspan, Side::Server, &mut warnings));
    } else if has_client {
        spans.push(build_span(zspan, Side::Client, &mut warnings));
    } else {
        spans.push(build_span(zspan, Side::Unknown, &mut warnings));
    }
    (spans, warnings)
}

#[derive(Clone, Copy, PartialEq)]
enum Side {
    Client,
    Server,
    Unknown,
}

fn build_span(zspan: &zipkincore::Span, side: Side, warnings: &mut Vec<String>) -> Span {
    let mut tags = Vec::new();
    if let Some(kind) = match side {
        Side::Client => Some("client"),
        Side::Server => Some("server"),
        Side::Unknown => None,
    } {
        tags.push(KeyValue::string(SPAN_KIND_KEY, kind));
    }

    for banno in &zspan.binary_annotations {
        match banno.key.as_slice() {
            b"lc" => {
                tags.push(KeyValue::string(
                    COMPONENT_KEY,
                    String::from_utf8_lossy(&banno.value).into_owned(),
                ));
            }
            b"ca" | b"sa" => {
                // The remote side of the RPC: the server address on client
                // spans, the client address on server spans.
                let wanted: &[u8] = match side {
                    Side::Client | Side::Unknown => b"sa",
                    Side::Server => b"ca",
                };
                if banno.key == wanted {
                    if let Some(host) = &banno.host {
                        append_peer_tags(&mut tags, host);
                    }
                }
            }
            _ => tags.push(binary_annotation_to_tag(banno, warnings)),
        }
    }

    let operation_name = string_from_bytes(&zspan.name, INVALID_OPERATION_TAG, &mut tags);

    let (start_time, duration) = side_timestamps(zspan, side);

    let mut logs = Vec::new();
    for anno in &zspan.annotations {
        if is_core_annotation(&anno.value) {
            continue;
        }
        logs.push(LogEntry {
            timestamp: anno.timestamp,
            fields: vec![KeyValue::string(EVENT_KEY, anno.value.clone())],
        });
    }

    Span {
        trace_id: TraceId::new(
            zspan.trace_id_high.unwrap_or(0) as u64,
            zspan.trace_id as u64,
        ),
        span_id: zspan.id as u64,
        parent_span_id: zspan.parent_id.unwrap_or(0) as u64,
        operation_name,
        references: Vec::new(),
        flags: if zspan.debug.unwrap_or(false) {
            FLAG_DEBUG
        } else {
            0
        },
        start_time,
        duration,
        tags,
        logs,
        process: find_process(zspan, side),
    }
}

/// The span timestamps for one side of a shared span: prefer the side's own
/// core annotations, fall back to the top-level fields.
fn side_timestamps(zspan: &zipkincore::Span, side: Side) -> (i64, i64) {
    let (open, close) = match side {
        Side::Client => (zipkincore::CLIENT_SEND, zipkincore::CLIENT_RECV),
        Side::Server => (zipkincore::SERVER_RECV, zipkincore::SERVER_SEND),
        Side::Unknown => {
            return (zspan.timestamp.unwrap_or(0), zspan.duration.unwrap_or(0));
        }
    };
    let open_ts = annotation_timestamp(zspan, open);
    let close_ts = annotation_timestamp(zspan, close);
    match (open_ts, close_ts) {
        (Some(open), Some(close)) if close >= open => (open, close - open),
        (Some(open), _) => (open, zspan.duration.unwrap_or(0)),
        _ => (zspan.timestamp.unwrap_or(0), zspan.duration.unwrap_or(0)),
    }
}

fn annotation_timestamp(zspan: &zipkincore::Span, value: &str) -> Option<i64> {
    zspan
        .annotations
        .iter()
        .find(|a| a.value == value)
        .map(|a| a.timestamp)
}

fn has_annotation(zspan: &zipkincore::Span, value: &str) -> bool {
    zspan.annotations.iter().any(|a| a.value == value)
}

fn is_core_annotation(value: &str) -> bool {
    matches!(
        value,
        zipkincore::CLIENT_SEND
            | zipkincore::CLIENT_RECV
            | zipkincore::SERVER_SEND
            | zipkincore::SERVER_RECV
            | zipkincore::MESSAGE_SEND
            | zipkincore::MESSAGE_RECV
    )
}

/// The process is the endpoint that recorded this side of the span: the host
/// of the side's core annotations first, then any annotation host, then any
/// binary annotation host (excluding the address annotations, which describe
/// the peer).
fn find_process(zspan: &zipkincore::Span, side: Side) -> Option<Process> {
    let side_values: &[&str] = match side {
        Side::Client => &[zipkincore::CLIENT_SEND, zipkincore::CLIENT_RECV],
        Side::Server => &[zipkincore::SERVER_RECV, zipkincore::SERVER_SEND],
        Side::Unknown => &[],
    };
    let from_side = zspan
        .annotations
        .iter()
        .find(|a| side_values.contains(&a.value.as_str()))
        .and_then(|a| a.host.as_ref());
    let from_any = || {
        zspan
            .annotations
            .iter()
            .find_map(|a| a.host.as_ref())
            .or_else(|| {
                zspan
                    .binary_annotations
                    .iter()
                    .filter(|b| b.key != b"ca" && b.key != b"sa")
                    .find_map(|b| b.host.as_ref())
            })
    };
    from_side.or_else(from_any).map(endpoint_to_process)
}

fn endpoint_to_process(endpoint: &zipkincore::Endpoint) -> Process {
    let mut tags = Vec::new();
    if endpoint.ipv4 != 0 {
        tags.push(KeyValue::string("ip", format_ipv4(endpoint.ipv4)));
    }
    let service_name = string_from_bytes(&endpoint.service_name, INVALID_SERVICE_TAG, &mut tags);
    Process { service_name, tags }
}

fn append_peer_tags(tags: &mut Vec<KeyValue>, host: &zipkincore::Endpoint) {
    if !host.service_name.is_empty() {
        tags.push(KeyValue::string(
            PEER_SERVICE_KEY,
            String::from_utf8_lossy(&host.service_name).into_owned(),
        ));
    }
    if host.ipv4 != 0 {
        tags.push(KeyValue::string(PEER_HOST_IPV4_KEY, format_ipv4(host.ipv4)));
    }
    if host.port != 0 {
        tags.push(KeyValue::i64(PEER_PORT_KEY, i64::from(host.port as u16)));
    }
}

fn format_ipv4(packed: i32) -> String {
    let b = (packed as u32).to_be_bytes();
    format!("{}.{}.{}.{}", b[0], b[1], b[2], b[3])
}

fn binary_annotation_to_tag(
    banno: &zipkincore::BinaryAnnotation,
    warnings: &mut Vec<String>,
) -> KeyValue {
    let value = &banno.value;
    let value = match banno.annotation_type {
        AnnotationType::Bool => TagValue::Bool(value.first().is_some_and(|b| *b != 0)),
        AnnotationType::Bytes => TagValue::Binary(value.clone()),
        AnnotationType::I16 => match <[u8; 2]>::try_from(value.as_slice()) {
            Ok(b) => TagValue::I64(i64::from(i16::from_be_bytes(b))),
            Err(_) => short_value_fallback(&banno.key, value, warnings),
        },
        AnnotationType::I32 => match <[u8; 4]>::try_from(value.as_slice()) {
            Ok(b) => TagValue::I64(i64::from(i32::from_be_bytes(b))),
            Err(_) => short_value_fallback(&banno.key, value, warnings),
        },
        AnnotationType::I64 => match <[u8; 8]>::try_from(value.as_slice()) {
            Ok(b) => TagValue::I64(i64::from_be_bytes(b)),
            Err(_) => short_value_fallback(&banno.key, value, warnings),
        },
        AnnotationType::Double => match <[u8; 8]>::try_from(value.as_slice()) {
            Ok(b) => TagValue::F64(f64::from_be_bytes(b)),
            Err(_) => short_value_fallback(&banno.key, value, warnings),
        },
        AnnotationType::String => match std::str::from_utf8(value) {
            Ok(s) => TagValue::String(s.to_string()),
            // Keep the raw bytes; tag_from_raw_key preserves them.
            Err(_) => TagValue::Binary(value.clone()),
        },
    };
    tag_from_raw_key(&banno.key, value)
}

fn short_value_fallback(key: &[u8], value: &[u8], warnings: &mut Vec<String>) -> TagValue {
    let warning = format!(
        "binary annotation {} has {} bytes, fewer than its declared type",
        String::from_utf8_lossy(key),
        value.len()
    );
    warn!("{warning}");
    warnings.push(warning);
    TagValue::Binary(value.to_vec())
}
