// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// The wire format a span arrived in. Purely a metric dimension; no
/// behavioral dispatch happens on it after ingress.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum SpanFormat {
    Jaeger,
    Zipkin,
    Proto,
    Otlp,
    #[default]
    Unknown,
}

impl SpanFormat {
    pub const ALL: [SpanFormat; 5] = [
        SpanFormat::Jaeger,
        SpanFormat::Zipkin,
        SpanFormat::Proto,
        SpanFormat::Otlp,
        SpanFormat::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpanFormat::Jaeger => "jaeger",
            SpanFormat::Zipkin => "zipkin",
            SpanFormat::Proto => "proto",
            SpanFormat::Otlp => "otlp",
            SpanFormat::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SpanFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The transport a span arrived over. A metric dimension like
/// [`SpanFormat`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum InboundTransport {
    Http,
    Grpc,
    #[default]
    Unknown,
}

impl InboundTransport {
    pub const ALL: [InboundTransport; 3] = [
        InboundTransport::Http,
        InboundTransport::Grpc,
        InboundTransport::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InboundTransport::Http => "http",
            InboundTransport::Grpc => "grpc",
            InboundTransport::Unknown => "unknown",
        }
    }
}

impl fmt::Display for InboundTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_values() {
        assert_eq!("jaeger", SpanFormat::Jaeger.to_string());
        assert_eq!("unknown", SpanFormat::Unknown.to_string());
        assert_eq!("grpc", InboundTransport::Grpc.to_string());
        assert_eq!("unknown", InboundTransport::default().to_string());
    }
}
