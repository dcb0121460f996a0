// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pure wire-to-model conversions. Each converter is total with respect to
//! well-formed input; decoder failures are surfaced by the wire layer before
//! these functions run.

pub mod otlp;
pub mod proto_jaeger;
pub mod thrift_jaeger;
pub mod thrift_zipkin;
