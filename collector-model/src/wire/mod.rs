// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Checked-in wire codecs for the accepted ingest protocols.
//!
//! The Thrift modules follow the layout of thrift-compiler output so they
//! can be diffed against the IDL; only the struct readers/writers the
//! collector needs are kept.

pub mod jaeger;
pub mod jaeger_proto;
pub mod zipkincore;
