// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory span model and the wire formats it is decoded from.
//!
//! The [`span`] module holds the domain types every other crate works with.
//! The [`wire`] module carries the checked-in codecs for the accepted wire
//! protocols, and [`convert`] turns each wire shape into the domain model.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod convert;
pub mod format;
pub mod span;
pub mod utf8;
pub mod wire;

pub use format::{InboundTransport, SpanFormat};
pub use span::{Batch, KeyValue, LogEntry, Process, SamplerType, Span, SpanRef, TagValue, TraceId};
