// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// Flag bit set by clients on sampled spans.
pub const FLAG_SAMPLED: u32 = 1;
/// Flag bit set by clients on debug spans.
pub const FLAG_DEBUG: u32 = 2;

/// Tag key under which clients report how the trace was sampled.
pub const SAMPLER_TYPE_KEY: &str = "sampler.type";

/// A 128-bit trace identifier.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TraceId {
    pub high: u64,
    pub low: u64,
}

impl TraceId {
    pub fn new(high: u64, low: u64) -> Self {
        Self { high, low }
    }

    pub fn is_zero(&self) -> bool {
        self.high == 0 && self.low == 0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.high == 0 {
            write!(f, "{:x}", self.low)
        } else {
            write!(f, "{:x}{:016x}", self.high, self.low)
        }
    }
}

/// The value half of a span or process tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TagValue {
    String(String),
    Bool(bool),
    I64(i64),
    F64(f64),
    Binary(Vec<u8>),
}

/// A single key/value tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: TagValue,
}

impl KeyValue {
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: TagValue::String(value.into()),
        }
    }

    pub fn bool(key: impl Into<String>, value: bool) -> Self {
        Self {
            key: key.into(),
            value: TagValue::Bool(value),
        }
    }

    pub fn i64(key: impl Into<String>, value: i64) -> Self {
        Self {
            key: key.into(),
            value: TagValue::I64(value),
        }
    }

    pub fn f64(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value: TagValue::F64(value),
        }
    }

    pub fn binary(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            value: TagValue::Binary(value),
        }
    }

    /// Byte size contribution of this tag to [`Span::wire_size_hint`].
    fn size_hint(&self) -> usize {
        let value = match &self.value {
            TagValue::String(s) => s.len(),
            TagValue::Binary(b) => b.len(),
            TagValue::Bool(_) => 1,
            TagValue::I64(_) | TagValue::F64(_) => 8,
        };
        self.key.len() + value + 8
    }
}

/// A timestamped log entry attached to a span. Timestamps are in
/// microseconds since the Unix epoch, like everything else in the model.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: i64,
    pub fields: Vec<KeyValue>,
}

/// The kind of a cross-span reference.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SpanRefKind {
    ChildOf,
    FollowsFrom,
}

/// A reference to another span.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpanRef {
    pub kind: SpanRefKind,
    pub trace_id: TraceId,
    pub span_id: u64,
}

/// The process that emitted a span: a service name plus descriptive tags.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub service_name: String,
    pub tags: Vec<KeyValue>,
}

impl Process {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            tags: Vec::new(),
        }
    }
}

/// How the client decided to sample the trace this span belongs to.
///
/// The set of buckets is derived from this enum wherever the metrics layer
/// needs one counter per sampler type; nothing hard-codes the count.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum SamplerType {
    #[default]
    Unrecognized,
    Const,
    Probabilistic,
    RateLimiting,
    LowerBound,
    Remote,
}

impl SamplerType {
    pub const ALL: [SamplerType; 6] = [
        SamplerType::Unrecognized,
        SamplerType::Const,
        SamplerType::Probabilistic,
        SamplerType::RateLimiting,
        SamplerType::LowerBound,
        SamplerType::Remote,
    ];

    /// The metric tag value for this sampler type.
    pub fn as_str(&self) -> &'static str {
        match self {
            SamplerType::Unrecognized => "unrecognized",
            SamplerType::Const => "const",
            SamplerType::Probabilistic => "probabilistic",
            SamplerType::RateLimiting => "rate-limiting",
            SamplerType::LowerBound => "lower-bound",
            SamplerType::Remote => "remote",
        }
    }

    fn from_tag_value(value: &str) -> Self {
        match value {
            "const" => SamplerType::Const,
            "probabilistic" => SamplerType::Probabilistic,
            "ratelimiting" | "rate-limiting" => SamplerType::RateLimiting,
            "lowerbound" | "lower-bound" => SamplerType::LowerBound,
            "remote" => SamplerType::Remote,
            _ => SamplerType::Unrecognized,
        }
    }
}

impl fmt::Display for SamplerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timed operation within a trace, the unit of ingestion.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub trace_id: TraceId,
    pub span_id: u64,
    pub parent_span_id: u64,
    pub operation_name: String,
    pub references: Vec<SpanRef>,
    pub flags: u32,
    /// Microseconds since the Unix epoch.
    pub start_time: i64,
    /// Microseconds.
    pub duration: i64,
    pub tags: Vec<KeyValue>,
    pub logs: Vec<LogEntry>,
    pub process: Option<Process>,
}

impl Span {
    /// The parent span id: the explicit field when set, otherwise the first
    /// child-of reference.
    pub fn parent_id(&self) -> u64 {
        if self.parent_span_id != 0 {
            return self.parent_span_id;
        }
        self.references
            .iter()
            .find(|r| r.kind == SpanRefKind::ChildOf && r.trace_id == self.trace_id)
            .map(|r| r.span_id)
            .unwrap_or(0)
    }

    /// A root span has no parent.
    pub fn is_root(&self) -> bool {
        self.parent_id() == 0
    }

    pub fn is_debug(&self) -> bool {
        self.flags & FLAG_DEBUG != 0
    }

    /// The service name of the owning process, or `""` when no process is
    /// attached.
    pub fn service_name(&self) -> &str {
        self.process
            .as_ref()
            .map(|p| p.service_name.as_str())
            .unwrap_or("")
    }

    /// Look up a tag by key.
    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.iter().find(|t| t.key == key).map(|t| &t.value)
    }

    /// How the trace owning this span was sampled, according to the
    /// `sampler.type` tag set by the client.
    pub fn sampler_type(&self) -> SamplerType {
        match self.tag(SAMPLER_TYPE_KEY) {
            Some(TagValue::String(v)) => SamplerType::from_tag_value(v),
            _ => SamplerType::Unrecognized,
        }
    }

    /// A deterministic estimate of the encoded size of this span in bytes.
    ///
    /// Feeds the `spans.bytes` metric and the dynamic queue resizer; it does
    /// not have to match any particular wire format, only be stable and
    /// roughly proportional.
    pub fn wire_size_hint(&self) -> usize {
        let mut size = 16 + 8 + 8 + 8 + 8 + 4 + self.operation_name.len();
        size += self.references.len() * 24;
        size += self.tags.iter().map(KeyValue::size_hint).sum::<usize>();
        for log in &self.logs {
            size += 8 + log.fields.iter().map(KeyValue::size_hint).sum::<usize>();
        }
        if let Some(process) = &self.process {
            size += process.service_name.len();
            size += process.tags.iter().map(KeyValue::size_hint).sum::<usize>();
        }
        size
    }
}

/// An ordered sequence of spans sharing an optional default process. Spans
/// without a process of their own inherit the batch process.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub process: Option<Process>,
    pub spans: Vec<Span>,
}
