// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The collector configuration surface.

use std::time::Duration;

use collector_common::hostport::HostPort;
use collector_pipeline::metrics::DEFAULT_MAX_SERVICE_NAMES;
use serde::Deserialize;

pub const DEFAULT_HTTP_HOST_PORT: &str = ":14268";
pub const DEFAULT_GRPC_HOST_PORT: &str = ":14250";
pub const DEFAULT_OTLP_GRPC_HOST_PORT: &str = ":4317";
pub const DEFAULT_OTLP_HTTP_HOST_PORT: &str = ":4318";

const DEFAULT_NUM_WORKERS: usize = 50;
const DEFAULT_QUEUE_SIZE: usize = 2000;
/// Largest request body the Jaeger and Zipkin HTTP endpoints accept.
const DEFAULT_HTTP_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;
const DEFAULT_GRPC_MAX_RECEIVE_MESSAGE_LENGTH: usize = 4 * 1024 * 1024;

#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GrpcOptions {
    pub host_port: HostPort,
    pub max_receive_message_length: usize,
    pub max_connection_age: Option<Duration>,
    pub max_connection_age_grace: Option<Duration>,
}

impl Default for GrpcOptions {
    fn default() -> Self {
        Self {
            host_port: parse_host_port(DEFAULT_GRPC_HOST_PORT),
            max_receive_message_length: DEFAULT_GRPC_MAX_RECEIVE_MESSAGE_LENGTH,
            max_connection_age: None,
            max_connection_age_grace: None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ZipkinOptions {
    /// Empty disables the Zipkin receiver.
    pub http_host_port: HostPort,
    pub allowed_origins: Vec<String>,
    pub allowed_headers: Vec<String>,
}

impl ZipkinOptions {
    pub fn enabled(&self) -> bool {
        !self.http_host_port.is_empty()
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OtlpOptions {
    pub enabled: bool,
    pub grpc_host_port: HostPort,
    pub http_host_port: HostPort,
}

impl Default for OtlpOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            grpc_host_port: parse_host_port(DEFAULT_OTLP_GRPC_HOST_PORT),
            http_host_port: parse_host_port(DEFAULT_OTLP_HTTP_HOST_PORT),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CollectorOptions {
    pub num_workers: usize,
    pub queue_size: usize,
    /// Memory budget in bytes enabling dynamic queue resizing.
    pub dyn_queue_size_memory: Option<u64>,
    /// Spans to observe before the first resize; defaults to `queue_size`.
    pub dyn_queue_size_warmup: Option<u64>,
    /// Operator tags merged into every span's process tags.
    pub collector_tags: Vec<(String, String)>,
    /// Surface a Busy error instead of per-span results when the queue is
    /// full.
    pub report_busy: bool,
    pub http_host_port: HostPort,
    pub http_max_body_bytes: usize,
    pub grpc: GrpcOptions,
    pub zipkin: ZipkinOptions,
    pub otlp: OtlpOptions,
    pub max_service_names: usize,
    /// Statsd endpoint for operational metrics; empty disables emission.
    pub statsd_host_port: HostPort,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            num_workers: DEFAULT_NUM_WORKERS,
            queue_size: DEFAULT_QUEUE_SIZE,
            dyn_queue_size_memory: None,
            dyn_queue_size_warmup: None,
            collector_tags: Vec::new(),
            report_busy: false,
            http_host_port: parse_host_port(DEFAULT_HTTP_HOST_PORT),
            http_max_body_bytes: DEFAULT_HTTP_MAX_BODY_BYTES,
            grpc: GrpcOptions::default(),
            zipkin: ZipkinOptions::default(),
            otlp: OtlpOptions::default(),
            max_service_names: DEFAULT_MAX_SERVICE_NAMES,
            statsd_host_port: HostPort::default(),
        }
    }
}

fn parse_host_port(value: &str) -> HostPort {
    // The defaults above are well-formed literals.
    value.parse().unwrap_or_default()
}

/// Parse an operator tag list of the form `key=value,key2=value2`.
pub fn parse_collector_tags(value: &str) -> Vec<(String, String)> {
    value
        .split(',')
        .filter_map(|pair| {
            let pair = pair.trim();
            let (key, value) = pair.split_once('=')?;
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CollectorOptions::default();
        assert_eq!(50, options.num_workers);
        assert_eq!(2000, options.queue_size);
        assert_eq!(":14268", options.http_host_port.as_str());
        assert_eq!(":14250", options.grpc.host_port.as_str());
        assert!(!options.zipkin.enabled());
        assert!(!options.otlp.enabled);
        assert!(!options.report_busy);
    }

    #[test]
    fn test_zipkin_enabled_by_host_port() {
        let mut options = CollectorOptions::default();
        options.zipkin.http_host_port = ":9411".parse().unwrap();
        assert!(options.zipkin.enabled());
    }

    #[test]
    fn test_parse_collector_tags() {
        assert_eq!(
            vec![
                ("extra".to_string(), "tag".to_string()),
                ("env".to_string(), "prod".to_string()),
            ],
            parse_collector_tags("extra=tag, env=prod")
        );
        assert!(parse_collector_tags("").is_empty());
        assert!(parse_collector_tags("novalue").is_empty());
    }
}
