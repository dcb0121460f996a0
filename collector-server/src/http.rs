// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The Jaeger HTTP receiver: Thrift batches on `POST /api/traces` plus the
//! client-configuration endpoint `GET /api/sampling`.

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use collector_model::convert::thrift_jaeger;
use collector_model::span::Span;
use collector_model::wire::jaeger;
use collector_model::{InboundTransport, SpanFormat};
use collector_pipeline::processor::{SpanOptions, SpanProcessor};
use collector_pipeline::sampling::SamplingProvider;
use http::header::CONTENT_TYPE;
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

pub const TRACES_PATH: &str = "/api/traces";
pub const SAMPLING_PATH: &str = "/api/sampling";

const THRIFT_CONTENT_TYPES: [&str; 2] =
    ["application/x-thrift", "application/vnd.apache.thrift.binary"];

/// One HTTP endpoint served by the shared accept loop.
#[async_trait]
pub(crate) trait HttpHandler: Send + Sync + 'static {
    async fn handle(&self, req: Request<Incoming>) -> Response<Full<Bytes>>;
}

/// Accept connections until cancelled; every connection task joins the
/// tracker so shutdown can wait for in-flight requests.
pub(crate) fn spawn_http_server(
    listener: TcpListener,
    handler: Arc<dyn HttpHandler>,
    cancellation_token: CancellationToken,
    tracker: TaskTracker,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                accepted = listener.accept() => {
                    let (stream, _peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            warn!(error = %err, "failed to accept connection");
                            continue;
                        }
                    };
                    let io = TokioIo::new(stream);
                    let handler = Arc::clone(&handler);
                    tracker.spawn(async move {
                        let service = service_fn(move |req| {
                            let handler = Arc::clone(&handler);
                            async move { Ok::<_, Infallible>(handler.handle(req).await) }
                        });
                        if let Err(err) =
                            http1::Builder::new().serve_connection(io, service).await
                        {
                            debug!(error = %err, "http connection closed with error");
                        }
                    });
                }
            }
        }
    })
}

pub(crate) fn text_response(status: StatusCode, body: impl Into<String>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.into())));
    *response.status_mut() = status;
    response
}

/// Read a request body with a hard size cap.
pub(crate) async fn read_body(
    req: Request<Incoming>,
    max_bytes: usize,
) -> Result<Bytes, Response<Full<Bytes>>> {
    Limited::new(req.into_body(), max_bytes)
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|err| {
            text_response(
                StatusCode::BAD_REQUEST,
                format!("Unable to process request body: {err}"),
            )
        })
}

/// Validate a Thrift submission content type, e.g.
/// `application/x-thrift; charset=utf-8`.
pub(crate) fn validate_thrift_content_type(
    req: &Request<Incoming>,
) -> Result<(), Response<Full<Bytes>>> {
    let header = match req.headers().get(CONTENT_TYPE) {
        Some(value) => value,
        None => {
            return Err(text_response(
                StatusCode::BAD_REQUEST,
                "Unsupported content type: ",
            ))
        }
    };
    let header = header.to_str().map_err(|_| {
        text_response(StatusCode::BAD_REQUEST, "Cannot parse content type")
    })?;

    let mut parts = header.split(';');
    let media_type = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
    if !THRIFT_CONTENT_TYPES.contains(&media_type.as_str()) {
        return Err(text_response(
            StatusCode::BAD_REQUEST,
            format!("Unsupported content type: {media_type}"),
        ));
    }
    for param in parts {
        let Some((key, value)) = param.split_once('=') else {
            return Err(text_response(
                StatusCode::BAD_REQUEST,
                "Cannot parse content type",
            ));
        };
        if key.trim().eq_ignore_ascii_case("charset")
            && !value.trim().trim_matches('"').eq_ignore_ascii_case("utf-8")
        {
            return Err(text_response(
                StatusCode::BAD_REQUEST,
                format!("Unsupported charset: {}", value.trim()),
            ));
        }
    }
    Ok(())
}

/// The `/api/*` handler.
pub struct ApiHandler {
    processor: Arc<SpanProcessor>,
    sampling_provider: Option<Arc<dyn SamplingProvider>>,
    max_body_bytes: usize,
}

impl ApiHandler {
    pub fn new(
        processor: Arc<SpanProcessor>,
        sampling_provider: Option<Arc<dyn SamplingProvider>>,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            processor,
            sampling_provider,
            max_body_bytes,
        }
    }

    async fn handle_traces(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        if let Err(response) = validate_thrift_content_type(&req) {
            return response;
        }
        let body = match read_body(req, self.max_body_bytes).await {
            Ok(body) => body,
            Err(response) => return response,
        };
        let batch = match jaeger::decode_batch(&body) {
            Ok(batch) => batch,
            Err(err) => {
                return text_response(
                    StatusCode::BAD_REQUEST,
                    format!("Unable to process request body: {err}"),
                )
            }
        };

        let batch = thrift_jaeger::batch_to_model(batch);
        let batch_process = batch.process;
        let spans: Vec<Span> = batch
            .spans
            .into_iter()
            .map(|mut span| {
                if span.process.is_none() {
                    span.process = batch_process.clone();
                }
                span
            })
            .collect();

        match self.processor.process_batch(
            spans,
            SpanOptions {
                format: SpanFormat::Jaeger,
                transport: InboundTransport::Http,
            },
        ) {
            Ok(_) => text_response(StatusCode::ACCEPTED, ""),
            Err(err) => text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Cannot submit Jaeger batch: {err}"),
            ),
        }
    }

    async fn handle_sampling(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        let Some(provider) = &self.sampling_provider else {
            return text_response(StatusCode::NOT_FOUND, "no sampling provider configured");
        };
        let service = req
            .uri()
            .query()
            .unwrap_or_default()
            .split('&')
            .find_map(|pair| pair.strip_prefix("service="))
            .unwrap_or_default()
            .to_string();

        match provider.get_sampling_strategy(&service).await {
            Ok(strategy) => match serde_json::to_vec(&strategy) {
                Ok(body) => {
                    let mut response = Response::new(Full::new(Bytes::from(body)));
                    response
                        .headers_mut()
                        .insert(CONTENT_TYPE, http::HeaderValue::from_static("application/json"));
                    response
                }
                Err(err) => text_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("cannot marshal sampling strategy: {err}"),
                ),
            },
            Err(err) => text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("collector error: {err}"),
            ),
        }
    }
}

#[async_trait]
impl HttpHandler for ApiHandler {
    async fn handle(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        match (req.method(), req.uri().path()) {
            (&Method::POST, TRACES_PATH) => self.handle_traces(req).await,
            (&Method::GET, SAMPLING_PATH) => self.handle_sampling(req).await,
            _ => text_response(StatusCode::NOT_FOUND, ""),
        }
    }
}
