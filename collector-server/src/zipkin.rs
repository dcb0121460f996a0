// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The Zipkin v1 receiver: Thrift span lists on `POST /api/v1/spans`.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use collector_model::convert::thrift_zipkin;
use collector_model::span::Span;
use collector_model::wire::zipkincore;
use collector_model::{InboundTransport, SpanFormat};
use collector_pipeline::processor::{SpanOptions, SpanProcessor};
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ORIGIN,
};
use http::{HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;

use crate::http::{read_body, text_response, validate_thrift_content_type, HttpHandler};

pub const SPANS_PATH: &str = "/api/v1/spans";

/// The Zipkin endpoint handler, with the CORS surface browser-based
/// clients need.
pub struct ZipkinHandler {
    processor: Arc<SpanProcessor>,
    allowed_origins: Vec<String>,
    allowed_headers: Vec<String>,
    max_body_bytes: usize,
}

impl ZipkinHandler {
    pub fn new(
        processor: Arc<SpanProcessor>,
        allowed_origins: Vec<String>,
        allowed_headers: Vec<String>,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            processor,
            allowed_origins,
            allowed_headers,
            max_body_bytes,
        }
    }

    fn allowed_origin(&self, req: &Request<Incoming>) -> Option<String> {
        let origin = req.headers().get(ORIGIN)?.to_str().ok()?;
        if self.allowed_origins.is_empty()
            || self.allowed_origins.iter().any(|o| o == "*" || o == origin)
        {
            return Some(origin.to_string());
        }
        None
    }

    fn apply_cors(&self, origin: Option<String>, response: &mut Response<Full<Bytes>>) {
        if let Some(origin) = origin {
            if let Ok(value) = HeaderValue::from_str(&origin) {
                response
                    .headers_mut()
                    .insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
            }
            if !self.allowed_headers.is_empty() {
                if let Ok(value) = HeaderValue::from_str(&self.allowed_headers.join(", ")) {
                    response
                        .headers_mut()
                        .insert(ACCESS_CONTROL_ALLOW_HEADERS, value);
                }
            }
            response.headers_mut().insert(
                ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("POST, OPTIONS"),
            );
        }
    }

    async fn handle_spans(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        if let Err(response) = validate_thrift_content_type(&req) {
            return response;
        }
        let body = match read_body(req, self.max_body_bytes).await {
            Ok(body) => body,
            Err(response) => return response,
        };
        let mut wire_spans = match zipkincore::decode_span_list(&body) {
            Ok(spans) => spans,
            Err(err) => {
                return text_response(
                    StatusCode::BAD_REQUEST,
                    format!("Unable to process request body: {err}"),
                )
            }
        };

        // Each list element is individually sanitized, then converted.
        let mut spans: Vec<Span> = Vec::with_capacity(wire_spans.len());
        let mut warnings = 0u64;
        for wire_span in &mut wire_spans {
            collector_sanitize::zipkin::sanitize(wire_span);
            let (converted, span_warnings) = thrift_zipkin::span_to_model(wire_span);
            warnings += span_warnings.len() as u64;
            spans.extend(converted);
        }
        if warnings > 0 {
            self.processor.metrics().zipkin_warnings().inc(warnings);
        }

        match self.processor.process_batch(
            spans,
            SpanOptions {
                format: SpanFormat::Zipkin,
                transport: InboundTransport::Http,
            },
        ) {
            Ok(_) => text_response(StatusCode::ACCEPTED, ""),
            Err(err) => text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Cannot submit Zipkin batch: {err}"),
            ),
        }
    }
}

#[async_trait]
impl HttpHandler for ZipkinHandler {
    async fn handle(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        let origin = self.allowed_origin(&req);
        let has_origin_header = req.headers().contains_key(ORIGIN);
        let mut response = match (req.method(), req.uri().path()) {
            (&Method::POST, SPANS_PATH) => {
                if has_origin_header && origin.is_none() {
                    text_response(StatusCode::FORBIDDEN, "origin not allowed")
                } else {
                    self.handle_spans(req).await
                }
            }
            (&Method::OPTIONS, SPANS_PATH) => text_response(StatusCode::NO_CONTENT, ""),
            _ => text_response(StatusCode::NOT_FOUND, ""),
        };
        self.apply_cors(origin, &mut response);
        response
    }
}
