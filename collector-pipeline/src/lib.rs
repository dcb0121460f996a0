// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The span admission pipeline.
//!
//! [`processor::SpanProcessor`] is the entry point: ingress handlers feed it
//! decoded batches, it pushes every admitted span through the bounded
//! [`queue`], and a worker pool sanitizes, hooks, and writes each span to
//! the configured [`processor::TraceWriter`]. [`metrics`] accounts for all
//! of it with bounded per-service cardinality, emitting to DogStatsD via
//! [`statsd`] when configured.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod metrics;
pub mod processor;
pub mod queue;
pub mod sampling;
pub mod statsd;
