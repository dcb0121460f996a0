// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! OTLP to model conversion.

use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::any_value;
use opentelemetry_proto::tonic::common::v1::AnyValue;
use opentelemetry_proto::tonic::trace::v1::span::SpanKind;
use opentelemetry_proto::tonic::trace::v1::{span, status, ResourceSpans, Span as OtlpSpan};

use crate::convert::proto_jaeger::{id_from_bytes, trace_id_from_bytes};
use crate::span::{
    KeyValue, LogEntry, Process, Span, SpanRef, SpanRefKind, TagValue,
};

const SERVICE_NAME_ATTR: &str = "service.name";
const SPAN_KIND_KEY: &str = "span.kind";
const EVENT_KEY: &str = "event";
const OTEL_STATUS_CODE_KEY: &str = "otel.status_code";
const OTEL_STATUS_DESCRIPTION_KEY: &str = "otel.status_description";
const OTEL_SCOPE_NAME_KEY: &str = "otel.scope.name";
const OTEL_SCOPE_VERSION_KEY: &str = "otel.scope.version";
const ERROR_KEY: &str = "error";
const W3C_TRACE_STATE_KEY: &str = "w3c.tracestate";

/// Flatten an OTLP export request into model spans, one process per
/// resource. The `service.name` resource attribute names the process;
/// root detection later relies on the empty parent span id mapping to 0.
pub fn request_to_model(request: ExportTraceServiceRequest) -> Vec<Span> {
    request
        .resource_spans
        .into_iter()
        .flat_map(resource_spans_to_model)
        .collect()
}

fn resource_spans_to_model(resource_spans: ResourceSpans) -> Vec<Span> {
    let mut service_name = String::new();
    let mut process_tags = Vec::new();
    if let Some(resource) = resource_spans.resource {
        for attr in resource.attributes {
            let tag = attribute_to_tag(attr);
            if tag.key == SERVICE_NAME_ATTR {
                if let TagValue::String(name) = &tag.value {
                    service_name = name.clone();
                    continue;
                }
            }
            process_tags.push(tag);
        }
    }
    let process = Process {
        service_name,
        tags: process_tags,
    };

    let mut spans = Vec::new();
    for scope_spans in resource_spans.scope_spans {
        let scope_tags: Vec<KeyValue> = match &scope_spans.scope {
            Some(scope) => {
                let mut tags = Vec::new();
                if !scope.name.is_empty() {
                    tags.push(KeyValue::string(OTEL_SCOPE_NAME_KEY, scope.name.clone()));
                }
                if !scope.version.is_empty() {
                    tags.push(KeyValue::string(
                        OTEL_SCOPE_VERSION_KEY,
                        scope.version.clone(),
                    ));
                }
                tags
            }
            None => Vec::new(),
        };
        for otlp_span in scope_spans.spans {
            let mut span = span_to_model(otlp_span);
            span.tags.extend(scope_tags.iter().cloned());
            span.process = Some(process.clone());
            spans.push(span);
        }
    }
    spans
}

fn span_to_model(otlp_span: OtlpSpan) -> Span {
    let trace_id = trace_id_from_bytes(&otlp_span.trace_id);
    let mut tags: Vec<KeyValue> = Vec::new();

    if let Some(kind) = span_kind_tag_value(otlp_span.kind()) {
        tags.push(KeyValue::string(SPAN_KIND_KEY, kind));
    }
    if !otlp_span.trace_state.is_empty() {
        tags.push(KeyValue::string(
            W3C_TRACE_STATE_KEY,
            otlp_span.trace_state.clone(),
        ));
    }
    for attr in otlp_span.attributes {
        tags.push(attribute_to_tag(attr));
    }
    if let Some(otlp_status) = &otlp_span.status {
        match otlp_status.code() {
            status::StatusCode::Error => {
                tags.push(KeyValue::bool(ERROR_KEY, true));
                tags.push(KeyValue::string(OTEL_STATUS_CODE_KEY, "ERROR"));
                if !otlp_status.message.is_empty() {
                    tags.push(KeyValue::string(
                        OTEL_STATUS_DESCRIPTION_KEY,
                        otlp_status.message.clone(),
                    ));
                }
            }
            status::StatusCode::Ok => {
                tags.push(KeyValue::string(OTEL_STATUS_CODE_KEY, "OK"));
            }
            status::StatusCode::Unset => {}
        }
    }

    let references = otlp_span
        .links
        .into_iter()
        .map(|link| SpanRef {
            kind: SpanRefKind::FollowsFrom,
            trace_id: trace_id_from_bytes(&link.trace_id),
            span_id: id_from_bytes(&link.span_id),
        })
        .collect();

    let logs = otlp_span
        .events
        .into_iter()
        .map(event_to_log)
        .collect();

    let start_time = (otlp_span.start_time_unix_nano / 1000) as i64;
    let end_time = (otlp_span.end_time_unix_nano / 1000) as i64;

    Span {
        trace_id,
        span_id: id_from_bytes(&otlp_span.span_id),
        // An empty parent span id means a root span.
        parent_span_id: id_from_bytes(&otlp_span.parent_span_id),
        operation_name: otlp_span.name,
        references,
        flags: 0,
        start_time,
        duration: (end_time - start_time).max(0),
        tags,
        logs,
        process: None,
    }
}

fn event_to_log(event: span::Event) -> LogEntry {
    let mut fields = Vec::with_capacity(event.attributes.len() + 1);
    if !event.name.is_empty() {
        fields.push(KeyValue::string(EVENT_KEY, event.name));
    }
    for attr in event.attributes {
        fields.push(attribute_to_tag(attr));
    }
    LogEntry {
        timestamp: (event.time_unix_nano / 1000) as i64,
        fields,
    }
}

fn span_kind_tag_value(kind: SpanKind) -> Option<&'static str> {
    match kind {
        SpanKind::Unspecified | SpanKind::Internal => None,
        SpanKind::Server => Some("server"),
        SpanKind::Client => Some("client"),
        SpanKind::Producer => Some("producer"),
        SpanKind::Consumer => Some("consumer"),
    }
}

fn attribute_to_tag(attr: opentelemetry_proto::tonic::common::v1::KeyValue) -> KeyValue {
    KeyValue {
        key: attr.key,
        value: any_value_to_tag_value(attr.value),
    }
}

fn any_value_to_tag_value(value: Option<AnyValue>) -> TagValue {
    match value.and_then(|v| v.value) {
        Some(any_value::Value::StringValue(s)) => TagValue::String(s),
        Some(any_value::Value::BoolValue(b)) => TagValue::Bool(b),
        Some(any_value::Value::IntValue(i)) => TagValue::I64(i),
        Some(any_value::Value::DoubleValue(d)) => TagValue::F64(d),
        Some(any_value::Value::BytesValue(b)) => TagValue::Binary(b),
        // Nested values keep their JSON-ish debug shape; the collector does
        // not interpret them.
        Some(any_value::Value::ArrayValue(a)) => TagValue::String(format!("{a:?}")),
        Some(any_value::Value::KvlistValue(kv)) => TagValue::String(format!("{kv:?}")),
        None => TagValue::String(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
    use opentelemetry_proto::tonic::common::v1::{
        AnyValue as OtlpAnyValue, InstrumentationScope, KeyValue as OtlpKeyValue,
    };
    use opentelemetry_proto::tonic::resource::v1::Resource;
    use opentelemetry_proto::tonic::trace::v1::{ScopeSpans, Status};

    fn string_attr(key: &str, value: &str) -> OtlpKeyValue {
        OtlpKeyValue {
            key: key.to_string(),
            value: Some(OtlpAnyValue {
                value: Some(any_value::Value::StringValue(value.to_string())),
            }),
        }
    }

    fn request_with_span(otlp_span: OtlpSpan) -> ExportTraceServiceRequest {
        ExportTraceServiceRequest {
            resource_spans: vec![ResourceSpans {
                resource: Some(Resource {
                    attributes: vec![
                        string_attr("service.name", "widgets"),
                        string_attr("host.name", "h1"),
                    ],
                    ..Default::default()
                }),
                scope_spans: vec![ScopeSpans {
                    scope: Some(InstrumentationScope {
                        name: "lib".to_string(),
                        version: "1.2".to_string(),
                        ..Default::default()
                    }),
                    spans: vec![otlp_span],
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        }
    }

    #[test]
    fn test_resource_service_name_becomes_process() {
        let spans = request_to_model(request_with_span(OtlpSpan::default()));
        assert_eq!(1, spans.len());
        assert_eq!("widgets", spans[0].service_name());
        let process = spans[0].process.as_ref().unwrap();
        // service.name is lifted out of the process tags
        assert!(process.tags.iter().all(|t| t.key != "service.name"));
        assert!(process.tags.iter().any(|t| t.key == "host.name"));
    }

    #[test]
    fn test_empty_parent_span_id_is_root() {
        let spans = request_to_model(request_with_span(OtlpSpan {
            span_id: vec![0, 0, 0, 0, 0, 0, 0, 1],
            ..Default::default()
        }));
        assert!(spans[0].is_root());

        let spans = request_to_model(request_with_span(OtlpSpan {
            span_id: vec![0, 0, 0, 0, 0, 0, 0, 2],
            parent_span_id: vec![0, 0, 0, 0, 0, 0, 0, 1],
            ..Default::default()
        }));
        assert!(!spans[0].is_root());
    }

    #[test]
    fn test_nanos_become_micros() {
        let spans = request_to_model(request_with_span(OtlpSpan {
            start_time_unix_nano: 2_000,
            end_time_unix_nano: 5_000,
            ..Default::default()
        }));
        assert_eq!(2, spans[0].start_time);
        assert_eq!(3, spans[0].duration);
    }

    #[test]
    fn test_status_error_maps_to_error_tag() {
        let spans = request_to_model(request_with_span(OtlpSpan {
            status: Some(Status {
                code: status::StatusCode::Error as i32,
                message: "boom".to_string(),
            }),
            ..Default::default()
        }));
        assert_eq!(Some(&TagValue::Bool(true)), spans[0].tag(ERROR_KEY));
        assert_eq!(
            Some(&TagValue::String("boom".to_string())),
            spans[0].tag(OTEL_STATUS_DESCRIPTION_KEY)
        );
    }

    #[test]
    fn test_kind_scope_and_events() {
        let spans = request_to_model(request_with_span(OtlpSpan {
            kind: SpanKind::Server as i32,
            events: vec![span::Event {
                time_unix_nano: 9_000,
                name: "cache.miss".to_string(),
                attributes: vec![string_attr("key", "k1")],
                ..Default::default()
            }],
            ..Default::default()
        }));
        let span = &spans[0];
        assert_eq!(
            Some(&TagValue::String("server".to_string())),
            span.tag(SPAN_KIND_KEY)
        );
        assert_eq!(
            Some(&TagValue::String("lib".to_string())),
            span.tag(OTEL_SCOPE_NAME_KEY)
        );
        assert_eq!(1, span.logs.len());
        assert_eq!(9, span.logs[0].timestamp);
        assert_eq!("event", span.logs[0].fields[0].key);
    }
}
