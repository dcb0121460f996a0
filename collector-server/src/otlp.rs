// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The OTLP trace receivers, gRPC and HTTP, both optional and each on its
//! own endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use collector_model::convert::otlp;
use collector_model::{InboundTransport, SpanFormat};
use collector_pipeline::processor::{ProcessorError, SpanOptions, SpanProcessor};
use http::header::CONTENT_TYPE;
use http::{Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use opentelemetry_proto::tonic::collector::trace::v1::trace_service_server::TraceService;
use opentelemetry_proto::tonic::collector::trace::v1::{
    ExportTracePartialSuccess, ExportTraceServiceRequest, ExportTraceServiceResponse,
};
use prost::Message;
use tonic::{Request as TonicRequest, Response as TonicResponse, Status};
use tracing::warn;

use crate::http::{read_body, text_response, HttpHandler};

pub const OTLP_TRACES_PATH: &str = "/v1/traces";
const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";

/// Shared OTLP ingest logic: convert, admit, report partial success.
fn export_request(
    processor: &SpanProcessor,
    request: ExportTraceServiceRequest,
    transport: InboundTransport,
) -> Result<ExportTraceServiceResponse, ProcessorError> {
    let spans = otlp::request_to_model(request);
    let results = processor.process_batch(
        spans,
        SpanOptions {
            format: SpanFormat::Otlp,
            transport,
        },
    )?;
    let rejected = results.iter().filter(|accepted| !**accepted).count() as i64;
    let partial_success = if rejected > 0 {
        Some(ExportTracePartialSuccess {
            rejected_spans: rejected,
            error_message: "spans dropped by a full queue".to_string(),
        })
    } else {
        None
    };
    Ok(ExportTraceServiceResponse { partial_success })
}

/// The OTLP gRPC receiver.
pub struct OtlpGrpcHandler {
    processor: Arc<SpanProcessor>,
}

impl OtlpGrpcHandler {
    pub fn new(processor: Arc<SpanProcessor>) -> Self {
        Self { processor }
    }
}

#[tonic::async_trait]
impl TraceService for OtlpGrpcHandler {
    async fn export(
        &self,
        request: TonicRequest<ExportTraceServiceRequest>,
    ) -> Result<TonicResponse<ExportTraceServiceResponse>, Status> {
        match export_request(
            &self.processor,
            request.into_inner(),
            InboundTransport::Grpc,
        ) {
            Ok(response) => Ok(TonicResponse::new(response)),
            Err(ProcessorError::Busy) => Err(Status::resource_exhausted("server busy")),
            Err(err) => {
                warn!(error = %err, "OTLP export failed");
                Err(Status::internal(err.to_string()))
            }
        }
    }
}

/// The OTLP HTTP receiver: protobuf on `POST /v1/traces`.
pub struct OtlpHttpHandler {
    processor: Arc<SpanProcessor>,
    max_body_bytes: usize,
}

impl OtlpHttpHandler {
    pub fn new(processor: Arc<SpanProcessor>, max_body_bytes: usize) -> Self {
        Self {
            processor,
            max_body_bytes,
        }
    }

    async fn handle_traces(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if content_type != PROTOBUF_CONTENT_TYPE {
            return text_response(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                format!("unsupported media type: {content_type}"),
            );
        }

        let body = match read_body(req, self.max_body_bytes).await {
            Ok(body) => body,
            Err(response) => return response,
        };
        let request = match ExportTraceServiceRequest::decode(body) {
            Ok(request) => request,
            Err(err) => {
                return text_response(
                    StatusCode::BAD_REQUEST,
                    format!("Unable to process request body: {err}"),
                )
            }
        };

        match export_request(&self.processor, request, InboundTransport::Http) {
            Ok(response) => {
                let mut http_response =
                    Response::new(Full::new(Bytes::from(response.encode_to_vec())));
                http_response.headers_mut().insert(
                    CONTENT_TYPE,
                    http::HeaderValue::from_static(PROTOBUF_CONTENT_TYPE),
                );
                http_response
            }
            Err(ProcessorError::Busy) => {
                text_response(StatusCode::SERVICE_UNAVAILABLE, "server busy")
            }
            Err(err) => text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Cannot submit OTLP traces: {err}"),
            ),
        }
    }
}

#[async_trait]
impl HttpHandler for OtlpHttpHandler {
    async fn handle(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        match (req.method(), req.uri().path()) {
            (&Method::POST, OTLP_TRACES_PATH) => self.handle_traces(req).await,
            _ => text_response(StatusCode::NOT_FOUND, ""),
        }
    }
}
