// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Total repair functions applied to spans before storage.
//!
//! Sanitizers never fail: they either fix a span in place or record what was
//! wrong as an observable tag. The [`zipkin`] chain runs on wire-level
//! Zipkin spans before conversion; the [`model`] chain runs on every span in
//! the processor regardless of source. [`normalize`] maps arbitrary service
//! names onto the restricted alphabet the metrics layer accepts.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod model;
pub mod normalize;
pub mod zipkin;
