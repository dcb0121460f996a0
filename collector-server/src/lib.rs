// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Network ingress for the span collector.
//!
//! Four receivers feed the shared [`collector_pipeline::processor::SpanProcessor`]:
//! Jaeger gRPC (`PostSpans`), Jaeger Thrift over HTTP, Zipkin v1 Thrift over
//! HTTP, and OTLP over gRPC and HTTP. [`collector::Collector`] owns their
//! lifecycle: ordered startup, bound addresses, and a deadline-bounded
//! shutdown.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod collector;
pub mod config;
pub mod grpc;
pub mod http;
pub mod otlp;
pub mod zipkin;
