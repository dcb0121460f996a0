// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The Jaeger `CollectorService/PostSpans` gRPC receiver.
//!
//! The tonic service plumbing is written out by hand: one unary method does
//! not justify a build-script code generator, and the shape below matches
//! what `tonic-build` would emit.

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use collector_model::convert::proto_jaeger;
use collector_model::span::Span;
use collector_model::wire::jaeger_proto::{
    PostSpansRequest, PostSpansResponse, COLLECTOR_SERVICE_NAME, POST_SPANS_PATH,
};
use collector_model::{InboundTransport, SpanFormat};
use collector_pipeline::processor::{ProcessorError, SpanOptions, SpanProcessor};
use futures::future::BoxFuture;
use http::{Request, Response};
use tonic::body::Body;
use tonic::server::{Grpc, NamedService, UnaryService};
use tonic::Status;
use tracing::warn;

/// Handles decoded PostSpans requests against the shared processor.
pub struct PostSpansHandler {
    processor: Arc<SpanProcessor>,
}

impl PostSpansHandler {
    pub fn new(processor: Arc<SpanProcessor>) -> Self {
        Self { processor }
    }

    async fn post_spans(&self, request: PostSpansRequest) -> Result<PostSpansResponse, Status> {
        let Some(batch) = request.batch else {
            return Err(Status::invalid_argument("batch is empty"));
        };
        let batch = proto_jaeger::batch_to_model(batch);
        let batch_process = batch.process;
        let spans: Vec<Span> = batch
            .spans
            .into_iter()
            .map(|mut span| {
                // Spans without their own process inherit the batch process.
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
                transport: InboundTransport::Grpc,
            },
        ) {
            Ok(_) => Ok(PostSpansResponse {}),
            Err(ProcessorError::Busy) => Err(Status::resource_exhausted("server busy")),
            Err(err) => {
                warn!(error = %err, "PostSpans failed");
                Err(Status::internal(err.to_string()))
            }
        }
    }
}

/// The tonic service wrapping [`PostSpansHandler`].
#[derive(Clone)]
pub struct CollectorServiceServer {
    handler: Arc<PostSpansHandler>,
    max_decoding_message_size: Option<usize>,
}

impl CollectorServiceServer {
    pub fn new(handler: PostSpansHandler) -> Self {
        Self {
            handler: Arc::new(handler),
            max_decoding_message_size: None,
        }
    }

    pub fn max_decoding_message_size(mut self, limit: usize) -> Self {
        self.max_decoding_message_size = Some(limit);
        self
    }
}

struct PostSpansSvc(Arc<PostSpansHandler>);

impl UnaryService<PostSpansRequest> for PostSpansSvc {
    type Response = PostSpansResponse;
    type Future = BoxFuture<'static, Result<tonic::Response<Self::Response>, Status>>;

    fn call(&mut self, request: tonic::Request<PostSpansRequest>) -> Self::Future {
        let handler = Arc::clone(&self.0);
        Box::pin(async move {
            handler
                .post_spans(request.into_inner())
                .await
                .map(tonic::Response::new)
        })
    }
}

impl tower_service::Service<Request<Body>> for CollectorServiceServer {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        match req.uri().path() {
            POST_SPANS_PATH => {
                let handler = Arc::clone(&self.handler);
                let codec = tonic::codec::ProstCodec::default();
                let mut grpc = Grpc::new(codec);
                if let Some(limit) = self.max_decoding_message_size {
                    grpc = grpc.max_decoding_message_size(limit);
                }
                Box::pin(async move { Ok(grpc.unary(PostSpansSvc(handler), req).await) })
            }
            _ => Box::pin(async move { Ok(unimplemented_resp()) }),
        }
    }
}

impl NamedService for CollectorServiceServer {
    const NAME: &'static str = COLLECTOR_SERVICE_NAME;
}

/// Response for a path the gRPC server does not know about.
fn unimplemented_resp() -> Response<Body> {
    let mut response = Response::new(Body::default());
    let headers = response.headers_mut();
    _ = headers.insert(
        Status::GRPC_STATUS,
        (tonic::Code::Unimplemented as i32).into(),
    );
    _ = headers.insert(
        http::header::CONTENT_TYPE,
        tonic::metadata::GRPC_CONTENT_TYPE,
    );
    response
}
