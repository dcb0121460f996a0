// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The lifecycle coordinator: builds the processor, starts the receivers in
//! a fixed order, and shuts everything down with bounded deadlines.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use collector_pipeline::metrics::CollectorMetrics;
use collector_pipeline::processor::{SpanProcessor, TraceWriter};
use collector_pipeline::sampling::{SamplingAggregator, SamplingProvider};
use collector_pipeline::statsd::Statsd;
use opentelemetry_proto::tonic::collector::trace::v1::trace_service_server::TraceServiceServer;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tonic::transport::Server;
use tracing::{error, info};

use crate::config::CollectorOptions;
use crate::grpc::{CollectorServiceServer, PostSpansHandler};
use crate::http::{spawn_http_server, ApiHandler, HttpHandler};
use crate::otlp::{OtlpGrpcHandler, OtlpHttpHandler};
use crate::zipkin::ZipkinHandler;

/// Deadline applied to each shutdown step.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

struct ServerHandle {
    name: &'static str,
    addr: SocketAddr,
    cancellation_token: CancellationToken,
    handle: JoinHandle<()>,
    tracker: Option<TaskTracker>,
}

impl ServerHandle {
    async fn shutdown(mut self, deadline: Duration) {
        self.cancellation_token.cancel();
        if let Some(tracker) = &self.tracker {
            tracker.close();
        }
        let tracker = self.tracker.take();
        let wait = async {
            let _ = (&mut self.handle).await;
            if let Some(tracker) = tracker {
                tracker.wait().await;
            }
        };
        if tokio::time::timeout(deadline, wait).await.is_err() {
            error!(server = self.name, "failed to shut down within deadline");
        } else {
            info!(server = self.name, "server stopped");
        }
    }
}

/// The running collector: receivers wired to one processor.
pub struct Collector {
    processor: Arc<SpanProcessor>,
    metrics: CollectorMetrics,
    aggregator: Option<Arc<dyn SamplingAggregator>>,
    /// Extra budget granted to the gRPC graceful stop when a connection-age
    /// grace period is configured.
    grpc_shutdown_deadline: Duration,
    grpc: Option<ServerHandle>,
    http: Option<ServerHandle>,
    zipkin: Option<ServerHandle>,
    otlp_grpc: Option<ServerHandle>,
    otlp_http: Option<ServerHandle>,
}

impl Collector {
    /// Start the collector: processor first, then handlers, then the
    /// servers in order: gRPC, HTTP, Zipkin (if configured), OTLP (if
    /// enabled). Any failure aborts the startup.
    pub async fn start(
        options: CollectorOptions,
        writer: Arc<dyn TraceWriter>,
        sampling_provider: Option<Arc<dyn SamplingProvider>>,
        aggregator: Option<Arc<dyn SamplingAggregator>>,
    ) -> anyhow::Result<Collector> {
        let statsd = if options.statsd_host_port.is_empty() {
            None
        } else {
            Some(Arc::new(
                Statsd::new(options.statsd_host_port.as_str())
                    .context("could not create statsd client")?,
            ))
        };
        let metrics = CollectorMetrics::new(options.max_service_names, statsd);

        let mut builder = SpanProcessor::builder(writer, metrics.clone())
            .num_workers(options.num_workers)
            .queue_size(options.queue_size)
            .dyn_queue_size_memory(options.dyn_queue_size_memory)
            .dyn_queue_size_warmup(options.dyn_queue_size_warmup)
            .collector_tags(options.collector_tags.clone())
            .report_busy(options.report_busy);
        if let Some(aggregator) = &aggregator {
            builder = builder.sampling_aggregator(Arc::clone(aggregator));
        }
        let processor = Arc::new(builder.build());

        let grpc = Some(
            start_grpc_server(&options, Arc::clone(&processor))
                .await
                .context("could not start gRPC server")?,
        );

        let api_handler: Arc<dyn HttpHandler> = Arc::new(ApiHandler::new(
            Arc::clone(&processor),
            sampling_provider,
            options.http_max_body_bytes,
        ));
        let http = Some(
            start_http_server("http", &options.http_host_port, api_handler)
                .await
                .context("could not start HTTP server")?,
        );

        let zipkin = if options.zipkin.enabled() {
            let handler: Arc<dyn HttpHandler> = Arc::new(ZipkinHandler::new(
                Arc::clone(&processor),
                options.zipkin.allowed_origins.clone(),
                options.zipkin.allowed_headers.clone(),
                options.http_max_body_bytes,
            ));
            Some(
                start_http_server("zipkin", &options.zipkin.http_host_port, handler)
                    .await
                    .context("could not start Zipkin server")?,
            )
        } else {
            None
        };

        let (otlp_grpc, otlp_http) = if options.otlp.enabled {
            let grpc_handle = start_otlp_grpc_server(&options, Arc::clone(&processor))
                .await
                .context("could not start OTLP gRPC server")?;
            let handler: Arc<dyn HttpHandler> = Arc::new(OtlpHttpHandler::new(
                Arc::clone(&processor),
                options.http_max_body_bytes,
            ));
            let http_handle =
                start_http_server("otlp-http", &options.otlp.http_host_port, handler)
                    .await
                    .context("could not start OTLP HTTP server")?;
            (Some(grpc_handle), Some(http_handle))
        } else {
            (None, None)
        };

        info!(
            grpc = %display_addr(&grpc),
            http = %display_addr(&http),
            zipkin = %display_addr(&zipkin),
            otlp_grpc = %display_addr(&otlp_grpc),
            otlp_http = %display_addr(&otlp_http),
            "collector started"
        );

        Ok(Collector {
            processor,
            metrics,
            aggregator,
            grpc_shutdown_deadline: options
                .grpc
                .max_connection_age_grace
                .unwrap_or(SHUTDOWN_DEADLINE)
                .max(SHUTDOWN_DEADLINE),
            grpc,
            http,
            zipkin,
            otlp_grpc,
            otlp_http,
        })
    }

    pub fn processor(&self) -> &Arc<SpanProcessor> {
        &self.processor
    }

    pub fn metrics(&self) -> &CollectorMetrics {
        &self.metrics
    }

    pub fn grpc_addr(&self) -> Option<SocketAddr> {
        self.grpc.as_ref().map(|s| s.addr)
    }

    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http.as_ref().map(|s| s.addr)
    }

    pub fn zipkin_addr(&self) -> Option<SocketAddr> {
        self.zipkin.as_ref().map(|s| s.addr)
    }

    pub fn otlp_grpc_addr(&self) -> Option<SocketAddr> {
        self.otlp_grpc.as_ref().map(|s| s.addr)
    }

    pub fn otlp_http_addr(&self) -> Option<SocketAddr> {
        self.otlp_http.as_ref().map(|s| s.addr)
    }

    /// Shut everything down in order: gRPC, HTTP, Zipkin, OTLP, processor,
    /// sampling aggregator. Each step is bounded by a deadline and failures
    /// are logged, never propagated. Idempotent.
    pub async fn close(&mut self) {
        if let Some(server) = self.grpc.take() {
            server.shutdown(self.grpc_shutdown_deadline).await;
        }
        for server in [
            self.http.take(),
            self.zipkin.take(),
            self.otlp_grpc.take(),
            self.otlp_http.take(),
        ]
        .into_iter()
        .flatten()
        {
            server.shutdown(SHUTDOWN_DEADLINE).await;
        }

        if tokio::time::timeout(SHUTDOWN_DEADLINE, self.processor.close())
            .await
            .is_err()
        {
            error!("span processor failed to drain within deadline");
        }

        if let Some(aggregator) = self.aggregator.take() {
            aggregator.close();
        }
        info!("collector stopped");
    }
}

fn display_addr(server: &Option<ServerHandle>) -> String {
    match server {
        Some(server) => server.addr.to_string(),
        None => "disabled".to_string(),
    }
}

async fn start_grpc_server(
    options: &CollectorOptions,
    processor: Arc<SpanProcessor>,
) -> anyhow::Result<ServerHandle> {
    let addr = options.grpc.host_port.to_socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;

    let service = CollectorServiceServer::new(PostSpansHandler::new(processor))
        .max_decoding_message_size(options.grpc.max_receive_message_length);

    let mut builder = Server::builder();
    if let Some(age) = options.grpc.max_connection_age {
        builder = builder.max_connection_age(age);
    }

    let cancellation_token = CancellationToken::new();
    let shutdown = cancellation_token.clone().cancelled_owned();
    let handle = tokio::spawn(async move {
        if let Err(err) = builder
            .add_service(service)
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
            .await
        {
            error!(error = %err, "gRPC server failed");
        }
    });

    Ok(ServerHandle {
        name: "grpc",
        addr: local_addr,
        cancellation_token,
        handle,
        tracker: None,
    })
}

async fn start_otlp_grpc_server(
    options: &CollectorOptions,
    processor: Arc<SpanProcessor>,
) -> anyhow::Result<ServerHandle> {
    let addr = options.otlp.grpc_host_port.to_socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;

    let service = TraceServiceServer::new(OtlpGrpcHandler::new(processor))
        .max_decoding_message_size(options.grpc.max_receive_message_length);

    let cancellation_token = CancellationToken::new();
    let shutdown = cancellation_token.clone().cancelled_owned();
    let handle = tokio::spawn(async move {
        if let Err(err) = Server::builder()
            .add_service(service)
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
            .await
        {
            error!(error = %err, "OTLP gRPC server failed");
        }
    });

    Ok(ServerHandle {
        name: "otlp-grpc",
        addr: local_addr,
        cancellation_token,
        handle,
        tracker: None,
    })
}

async fn start_http_server(
    name: &'static str,
    host_port: &collector_common::hostport::HostPort,
    handler: Arc<dyn HttpHandler>,
) -> anyhow::Result<ServerHandle> {
    let listener = TcpListener::bind(host_port.to_socket_addr()?).await?;
    let local_addr = listener.local_addr()?;
    let cancellation_token = CancellationToken::new();
    let tracker = TaskTracker::new();
    let handle = spawn_http_server(listener, handler, cancellation_token.clone(), tracker.clone());
    Ok(ServerHandle {
        name,
        addr: local_addr,
        cancellation_token,
        handle,
        tracker: Some(tracker),
    })
}
