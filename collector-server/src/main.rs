// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use collector_common::hostport::HostPort;
use collector_model::span::Span;
use collector_pipeline::processor::TraceWriter;
use collector_server::collector::Collector;
use collector_server::config::{
    parse_collector_tags, CollectorOptions, DEFAULT_GRPC_HOST_PORT, DEFAULT_HTTP_HOST_PORT,
    DEFAULT_OTLP_GRPC_HOST_PORT, DEFAULT_OTLP_HTTP_HOST_PORT,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "span-collector", about = "Receives spans and writes them to the trace store.")]
struct Cli {
    /// host:port (or just the port) for the Jaeger HTTP server.
    #[arg(long = "collector.http-server.host-port", default_value = DEFAULT_HTTP_HOST_PORT)]
    http_host_port: HostPort,

    /// host:port (or just the port) for the gRPC server.
    #[arg(long = "collector.grpc-server.host-port", default_value = DEFAULT_GRPC_HOST_PORT)]
    grpc_host_port: HostPort,

    /// host:port for the Zipkin server; empty disables it.
    #[arg(long = "collector.zipkin.host-port", default_value = "")]
    zipkin_host_port: HostPort,

    /// Comma-separated list of allowed CORS origins for the Zipkin server.
    #[arg(long = "collector.zipkin.allowed-origins", default_value = "")]
    zipkin_allowed_origins: String,

    /// Comma-separated list of allowed CORS headers for the Zipkin server.
    #[arg(long = "collector.zipkin.allowed-headers", default_value = "")]
    zipkin_allowed_headers: String,

    /// Enable the OTLP receivers.
    #[arg(long = "collector.otlp.enabled", default_value_t = false)]
    otlp_enabled: bool,

    #[arg(long = "collector.otlp.grpc.host-port", default_value = DEFAULT_OTLP_GRPC_HOST_PORT)]
    otlp_grpc_host_port: HostPort,

    #[arg(long = "collector.otlp.http.host-port", default_value = DEFAULT_OTLP_HTTP_HOST_PORT)]
    otlp_http_host_port: HostPort,

    /// Number of queue consumers.
    #[arg(long = "collector.num-workers", default_value_t = 50)]
    num_workers: usize,

    /// Bounded queue capacity.
    #[arg(long = "collector.queue-size", default_value_t = 2000)]
    queue_size: usize,

    /// Memory budget in bytes for dynamic queue resizing; unset disables it.
    #[arg(long = "collector.dyn-queue-size-memory")]
    dyn_queue_size_memory: Option<u64>,

    /// Spans observed before the first dynamic resize.
    #[arg(long = "collector.dyn-queue-size-warmup")]
    dyn_queue_size_warmup: Option<u64>,

    /// key=value pairs merged into every span's process tags.
    #[arg(long = "collector.tags", default_value = "")]
    collector_tags: String,

    /// Return a busy error instead of per-span results when the queue is
    /// full.
    #[arg(long = "collector.report-busy", default_value_t = false)]
    report_busy: bool,

    /// host:port of a statsd endpoint for operational metrics; empty
    /// disables emission.
    #[arg(long = "collector.metrics.statsd.host-port", default_value = "")]
    statsd_host_port: HostPort,
}

impl Cli {
    fn into_options(self) -> CollectorOptions {
        let mut options = CollectorOptions {
            num_workers: self.num_workers,
            queue_size: self.queue_size,
            dyn_queue_size_memory: self.dyn_queue_size_memory,
            dyn_queue_size_warmup: self.dyn_queue_size_warmup,
            collector_tags: parse_collector_tags(&self.collector_tags),
            report_busy: self.report_busy,
            http_host_port: self.http_host_port,
            statsd_host_port: self.statsd_host_port,
            ..CollectorOptions::default()
        };
        options.grpc.host_port = self.grpc_host_port;
        options.zipkin.http_host_port = self.zipkin_host_port;
        options.zipkin.allowed_origins = split_list(&self.zipkin_allowed_origins);
        options.zipkin.allowed_headers = split_list(&self.zipkin_allowed_headers);
        options.otlp.enabled = self.otlp_enabled;
        options.otlp.grpc_host_port = self.otlp_grpc_host_port;
        options.otlp.http_host_port = self.otlp_http_host_port;
        options
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Placeholder trace store: logs spans instead of persisting them. Real
/// deployments plug a storage-backed [`TraceWriter`] in through
/// [`Collector::start`].
struct LogWriter;

#[async_trait]
impl TraceWriter for LogWriter {
    async fn write_traces(&self, span: &Span) -> anyhow::Result<()> {
        debug!(
            trace_id = %span.trace_id,
            span_id = span.span_id,
            service = span.service_name(),
            operation = %span.operation_name,
            "span received"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let options = cli.into_options();

    let mut collector = Collector::start(options, Arc::new(LogWriter), None, None).await?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    collector.close().await;
    Ok(())
}
