// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Thrift shapes of the Jaeger `jaeger.thrift` IDL, binary protocol only.

#![allow(clippy::too_many_arguments)]

use thrift::protocol::{
    field_id, TBinaryInputProtocol, TBinaryOutputProtocol, TFieldIdentifier, TInputProtocol,
    TListIdentifier, TOutputProtocol, TStructIdentifier, TType,
};
use thrift::{ProtocolError, ProtocolErrorKind};

#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum TagType {
    String = 0,
    Double = 1,
    Bool = 2,
    Long = 3,
    Binary = 4,
}

impl TryFrom<i32> for TagType {
    type Error = thrift::Error;
    fn try_from(i: i32) -> Result<Self, Self::Error> {
        match i {
            0 => Ok(TagType::String),
            1 => Ok(TagType::Double),
            2 => Ok(TagType::Bool),
            3 => Ok(TagType::Long),
            4 => Ok(TagType::Binary),
            _ => Err(thrift::Error::Protocol(ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                format!("cannot convert enum constant {i} to TagType"),
            ))),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tag {
    pub key: String,
    pub v_type: Option<TagType>,
    pub v_str: Option<String>,
    pub v_double: Option<f64>,
    pub v_bool: Option<bool>,
    pub v_long: Option<i64>,
    pub v_binary: Option<Vec<u8>>,
}

impl Tag {
    pub fn read_from_in_protocol(i_prot: &mut dyn TInputProtocol) -> thrift::Result<Tag> {
        i_prot.read_struct_begin()?;
        let mut ret = Tag::default();
        loop {
            let field_ident = i_prot.read_field_begin()?;
            if field_ident.field_type == TType::Stop {
                break;
            }
            match field_id(&field_ident)? {
                1 => ret.key = i_prot.read_string()?,
                2 => ret.v_type = Some(TagType::try_from(i_prot.read_i32()?)?),
                3 => ret.v_str = Some(i_prot.read_string()?),
                4 => ret.v_double = Some(i_prot.read_double()?),
                5 => ret.v_bool = Some(i_prot.read_bool()?),
                6 => ret.v_long = Some(i_prot.read_i64()?),
                7 => ret.v_binary = Some(i_prot.read_bytes()?),
                _ => i_prot.skip(field_ident.field_type)?,
            }
            i_prot.read_field_end()?;
        }
        i_prot.read_struct_end()?;
        Ok(ret)
    }

    pub fn write_to_out_protocol(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o_prot.write_struct_begin(&TStructIdentifier::new("Tag"))?;
        o_prot.write_field_begin(&TFieldIdentifier::new("key", TType::String, 1))?;
        o_prot.write_string(&self.key)?;
        o_prot.write_field_end()?;
        if let Some(v_type) = self.v_type {
            o_prot.write_field_begin(&TFieldIdentifier::new("vType", TType::I32, 2))?;
            o_prot.write_i32(v_type as i32)?;
            o_prot.write_field_end()?;
        }
        if let Some(ref v_str) = self.v_str {
            o_prot.write_field_begin(&TFieldIdentifier::new("vStr", TType::String, 3))?;
            o_prot.write_string(v_str)?;
            o_prot.write_field_end()?;
        }
        if let Some(v_double) = self.v_double {
            o_prot.write_field_begin(&TFieldIdentifier::new("vDouble", TType::Double, 4))?;
            o_prot.write_double(v_double)?;
            o_prot.write_field_end()?;
        }
        if let Some(v_bool) = self.v_bool {
            o_prot.write_field_begin(&TFieldIdentifier::new("vBool", TType::Bool, 5))?;
            o_prot.write_bool(v_bool)?;
            o_prot.write_field_end()?;
        }
        if let Some(v_long) = self.v_long {
            o_prot.write_field_begin(&TFieldIdentifier::new("vLong", TType::I64, 6))?;
            o_prot.write_i64(v_long)?;
            o_prot.write_field_end()?;
        }
        if let Some(ref v_binary) = self.v_binary {
            o_prot.write_field_begin(&TFieldIdentifier::new("vBinary", TType::String, 7))?;
            o_prot.write_bytes(v_binary)?;
            o_prot.write_field_end()?;
        }
        o_prot.write_field_stop()?;
        o_prot.write_struct_end()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Log {
    pub timestamp: i64,
    pub fields: Vec<Tag>,
}

impl Log {
    pub fn read_from_in_protocol(i_prot: &mut dyn TInputProtocol) -> thrift::Result<Log> {
        i_prot.read_struct_begin()?;
        let mut ret = Log::default();
        loop {
            let field_ident = i_prot.read_field_begin()?;
            if field_ident.field_type == TType::Stop {
                break;
            }
            match field_id(&field_ident)? {
                1 => ret.timestamp = i_prot.read_i64()?,
                2 => ret.fields = read_tag_list(i_prot)?,
                _ => i_prot.skip(field_ident.field_type)?,
            }
            i_prot.read_field_end()?;
        }
        i_prot.read_struct_end()?;
        Ok(ret)
    }

    pub fn write_to_out_protocol(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o_prot.write_struct_begin(&TStructIdentifier::new("Log"))?;
        o_prot.write_field_begin(&TFieldIdentifier::new("timestamp", TType::I64, 1))?;
        o_prot.write_i64(self.timestamp)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&TFieldIdentifier::new("fields", TType::List, 2))?;
        write_tag_list(&self.fields, o_prot)?;
        o_prot.write_field_end()?;
        o_prot.write_field_stop()?;
        o_prot.write_struct_end()
    }
}

#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum SpanRefType {
    ChildOf = 0,
    FollowsFrom = 1,
}

impl TryFrom<i32> for SpanRefType {
    type Error = thrift::Error;
    fn try_from(i: i32) -> Result<Self, Self::Error> {
        match i {
            0 => Ok(SpanRefType::ChildOf),
            1 => Ok(SpanRefType::FollowsFrom),
            _ => Err(thrift::Error::Protocol(ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                format!("cannot convert enum constant {i} to SpanRefType"),
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpanRef {
    pub ref_type: SpanRefType,
    pub trace_id_low: i64,
    pub trace_id_high: i64,
    pub span_id: i64,
}

impl Default for SpanRef {
    fn default() -> Self {
        Self {
            ref_type: SpanRefType::ChildOf,
            trace_id_low: 0,
            trace_id_high: 0,
            span_id: 0,
        }
    }
}

impl SpanRef {
    pub fn read_from_in_protocol(i_prot: &mut dyn TInputProtocol) -> thrift::Result<SpanRef> {
        i_prot.read_struct_begin()?;
        let mut ret = SpanRef::default();
        loop {
            let field_ident = i_prot.read_field_begin()?;
            if field_ident.field_type == TType::Stop {
                break;
            }
            match field_id(&field_ident)? {
                1 => ret.ref_type = SpanRefType::try_from(i_prot.read_i32()?)?,
                2 => ret.trace_id_low = i_prot.read_i64()?,
                3 => ret.trace_id_high = i_prot.read_i64()?,
                4 => ret.span_id = i_prot.read_i64()?,
                _ => i_prot.skip(field_ident.field_type)?,
            }
            i_prot.read_field_end()?;
        }
        i_prot.read_struct_end()?;
        Ok(ret)
    }

    pub fn write_to_out_protocol(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o_prot.write_struct_begin(&TStructIdentifier::new("SpanRef"))?;
        o_prot.write_field_begin(&TFieldIdentifier::new("refType", TType::I32, 1))?;
        o_prot.write_i32(self.ref_type as i32)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&TFieldIdentifier::new("traceIdLow", TType::I64, 2))?;
        o_prot.write_i64(self.trace_id_low)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&TFieldIdentifier::new("traceIdHigh", TType::I64, 3))?;
        o_prot.write_i64(self.trace_id_high)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&TFieldIdentifier::new("spanId", TType::I64, 4))?;
        o_prot.write_i64(self.span_id)?;
        o_prot.write_field_end()?;
        o_prot.write_field_stop()?;
        o_prot.write_struct_end()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Span {
    pub trace_id_low: i64,
    pub trace_id_high: i64,
    pub span_id: i64,
    pub parent_span_id: i64,
    pub operation_name: String,
    pub references: Option<Vec<SpanRef>>,
    pub flags: i32,
    pub start_time: i64,
    pub duration: i64,
    pub tags: Option<Vec<Tag>>,
    pub logs: Option<Vec<Log>>,
}

impl Span {
    pub fn read_from_in_protocol(i_prot: &mut dyn TInputProtocol) -> thrift::Result<Span> {
        i_prot.read_struct_begin()?;
        let mut ret = Span::default();
        loop {
            let field_ident = i_prot.read_field_begin()?;
            if field_ident.field_type == TType::Stop {
                break;
            }
            match field_id(&field_ident)? {
                1 => ret.trace_id_low = i_prot.read_i64()?,
                2 => ret.trace_id_high = i_prot.read_i64()?,
                3 => ret.span_id = i_prot.read_i64()?,
                4 => ret.parent_span_id = i_prot.read_i64()?,
                5 => ret.operation_name = i_prot.read_string()?,
                6 => {
                    let list_ident = i_prot.read_list_begin()?;
                    let mut val = Vec::with_capacity(list_ident.size as usize);
                    for _ in 0..list_ident.size {
                        val.push(SpanRef::read_from_in_protocol(i_prot)?);
                    }
                    i_prot.read_list_end()?;
                    ret.references = Some(val);
                }
                7 => ret.flags = i_prot.read_i32()?,
                8 => ret.start_time = i_prot.read_i64()?,
                9 => ret.duration = i_prot.read_i64()?,
                10 => ret.tags = Some(read_tag_list(i_prot)?),
                11 => {
                    let list_ident = i_prot.read_list_begin()?;
                    let mut val = Vec::with_capacity(list_ident.size as usize);
                    for _ in 0..list_ident.size {
                        val.push(Log::read_from_in_protocol(i_prot)?);
                    }
                    i_prot.read_list_end()?;
                    ret.logs = Some(val);
                }
                _ => i_prot.skip(field_ident.field_type)?,
            }
            i_prot.read_field_end()?;
        }
        i_prot.read_struct_end()?;
        Ok(ret)
    }

    pub fn write_to_out_protocol(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o_prot.write_struct_begin(&TStructIdentifier::new("Span"))?;
        o_prot.write_field_begin(&TFieldIdentifier::new("traceIdLow", TType::I64, 1))?;
        o_prot.write_i64(self.trace_id_low)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&TFieldIdentifier::new("traceIdHigh", TType::I64, 2))?;
        o_prot.write_i64(self.trace_id_high)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&TFieldIdentifier::new("spanId", TType::I64, 3))?;
        o_prot.write_i64(self.span_id)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&TFieldIdentifier::new("parentSpanId", TType::I64, 4))?;
        o_prot.write_i64(self.parent_span_id)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&TFieldIdentifier::new("operationName", TType::String, 5))?;
        o_prot.write_string(&self.operation_name)?;
        o_prot.write_field_end()?;
        if let Some(ref references) = self.references {
            o_prot.write_field_begin(&TFieldIdentifier::new("references", TType::List, 6))?;
            o_prot.write_list_begin(&TListIdentifier::new(TType::Struct, references.len() as i32))?;
            for reference in references {
                reference.write_to_out_protocol(o_prot)?;
            }
            o_prot.write_list_end()?;
            o_prot.write_field_end()?;
        }
        o_prot.write_field_begin(&TFieldIdentifier::new("flags", TType::I32, 7))?;
        o_prot.write_i32(self.flags)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&TFieldIdentifier::new("startTime", TType::I64, 8))?;
        o_prot.write_i64(self.start_time)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&TFieldIdentifier::new("duration", TType::I64, 9))?;
        o_prot.write_i64(self.duration)?;
        o_prot.write_field_end()?;
        if let Some(ref tags) = self.tags {
            o_prot.write_field_begin(&TFieldIdentifier::new("tags", TType::List, 10))?;
            write_tag_list(tags, o_prot)?;
            o_prot.write_field_end()?;
        }
        if let Some(ref logs) = self.logs {
            o_prot.write_field_begin(&TFieldIdentifier::new("logs", TType::List, 11))?;
            o_prot.write_list_begin(&TListIdentifier::new(TType::Struct, logs.len() as i32))?;
            for log in logs {
                log.write_to_out_protocol(o_prot)?;
            }
            o_prot.write_list_end()?;
            o_prot.write_field_end()?;
        }
        o_prot.write_field_stop()?;
        o_prot.write_struct_end()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Process {
    pub service_name: String,
    pub tags: Option<Vec<Tag>>,
}

impl Process {
    pub fn read_from_in_protocol(i_prot: &mut dyn TInputProtocol) -> thrift::Result<Process> {
        i_prot.read_struct_begin()?;
        let mut ret = Process::default();
        loop {
            let field_ident = i_prot.read_field_begin()?;
            if field_ident.field_type == TType::Stop {
                break;
            }
            match field_id(&field_ident)? {
                1 => ret.service_name = i_prot.read_string()?,
                2 => ret.tags = Some(read_tag_list(i_prot)?),
                _ => i_prot.skip(field_ident.field_type)?,
            }
            i_prot.read_field_end()?;
        }
        i_prot.read_struct_end()?;
        Ok(ret)
    }

    pub fn write_to_out_protocol(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o_prot.write_struct_begin(&TStructIdentifier::new("Process"))?;
        o_prot.write_field_begin(&TFieldIdentifier::new("serviceName", TType::String, 1))?;
        o_prot.write_string(&self.service_name)?;
        o_prot.write_field_end()?;
        if let Some(ref tags) = self.tags {
            o_prot.write_field_begin(&TFieldIdentifier::new("tags", TType::List, 2))?;
            write_tag_list(tags, o_prot)?;
            o_prot.write_field_end()?;
        }
        o_prot.write_field_stop()?;
        o_prot.write_struct_end()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    pub process: Process,
    pub spans: Vec<Span>,
}

impl Batch {
    pub fn read_from_in_protocol(i_prot: &mut dyn TInputProtocol) -> thrift::Result<Batch> {
        i_prot.read_struct_begin()?;
        let mut ret = Batch::default();
        loop {
            let field_ident = i_prot.read_field_begin()?;
            if field_ident.field_type == TType::Stop {
                break;
            }
            match field_id(&field_ident)? {
                1 => ret.process = Process::read_from_in_protocol(i_prot)?,
                2 => {
                    let list_ident = i_prot.read_list_begin()?;
                    let mut val = Vec::with_capacity(list_ident.size as usize);
                    for _ in 0..list_ident.size {
                        val.push(Span::read_from_in_protocol(i_prot)?);
                    }
                    i_prot.read_list_end()?;
                    ret.spans = val;
                }
                _ => i_prot.skip(field_ident.field_type)?,
            }
            i_prot.read_field_end()?;
        }
        i_prot.read_struct_end()?;
        Ok(ret)
    }

    pub fn write_to_out_protocol(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o_prot.write_struct_begin(&TStructIdentifier::new("Batch"))?;
        o_prot.write_field_begin(&TFieldIdentifier::new("process", TType::Struct, 1))?;
        self.process.write_to_out_protocol(o_prot)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&TFieldIdentifier::new("spans", TType::List, 2))?;
        o_prot.write_list_begin(&TListIdentifier::new(TType::Struct, self.spans.len() as i32))?;
        for span in &self.spans {
            span.write_to_out_protocol(o_prot)?;
        }
        o_prot.write_list_end()?;
        o_prot.write_field_end()?;
        o_prot.write_field_stop()?;
        o_prot.write_struct_end()
    }
}

fn read_tag_list(i_prot: &mut dyn TInputProtocol) -> thrift::Result<Vec<Tag>> {
    let list_ident = i_prot.read_list_begin()?;
    let mut val = Vec::with_capacity(list_ident.size as usize);
    for _ in 0..list_ident.size {
        val.push(Tag::read_from_in_protocol(i_prot)?);
    }
    i_prot.read_list_end()?;
    Ok(val)
}

fn write_tag_list(tags: &[Tag], o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
    o_prot.write_list_begin(&TListIdentifier::new(TType::Struct, tags.len() as i32))?;
    for tag in tags {
        tag.write_to_out_protocol(o_prot)?;
    }
    o_prot.write_list_end()
}

/// Decode a binary-protocol `Batch` from a request body.
pub fn decode_batch(bytes: &[u8]) -> thrift::Result<Batch> {
    let mut i_prot = TBinaryInputProtocol::new(bytes, true);
    Batch::read_from_in_protocol(&mut i_prot)
}

/// Encode a `Batch` with the binary protocol, the shape clients submit.
pub fn encode_batch(batch: &Batch) -> thrift::Result<Vec<u8>> {
    let mut buf = Vec::new();
    {
        let mut o_prot = TBinaryOutputProtocol::new(&mut buf, true);
        batch.write_to_out_protocol(&mut o_prot)?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn sample_batch() -> Batch {
        let mut rng = rand::thread_rng();
        Batch {
            process: Process {
                service_name: "batch-process".to_string(),
                tags: Some(vec![Tag {
                    key: "hostname".to_string(),
                    v_type: Some(TagType::String),
                    v_str: Some("h1".to_string()),
                    ..Default::default()
                }]),
            },
            spans: vec![Span {
                trace_id_low: rng.gen(),
                trace_id_high: rng.gen(),
                span_id: rng.gen(),
                operation_name: "test-op".to_string(),
                start_time: 1_700_000_000_000_000,
                duration: 1000,
                references: Some(vec![SpanRef {
                    ref_type: SpanRefType::ChildOf,
                    trace_id_low: 42,
                    span_id: 1,
                    ..Default::default()
                }]),
                tags: Some(vec![Tag {
                    key: "error".to_string(),
                    v_type: Some(TagType::Bool),
                    v_bool: Some(true),
                    ..Default::default()
                }]),
                logs: Some(vec![Log {
                    timestamp: 1_700_000_000_000_001,
                    fields: vec![Tag {
                        key: "event".to_string(),
                        v_type: Some(TagType::String),
                        v_str: Some("boom".to_string()),
                        ..Default::default()
                    }],
                }]),
                ..Default::default()
            }],
        }
    }

    #[test]
    fn test_batch_round_trip() {
        let batch = sample_batch();
        let bytes = encode_batch(&batch).unwrap();
        let decoded = decode_batch(&bytes).unwrap();
        assert_eq!(batch, decoded);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_batch(&[0xff, 0x00, 0x13, 0x37]).is_err());
    }

    #[test]
    fn test_decode_truncated_fails() {
        let bytes = encode_batch(&sample_batch()).unwrap();
        assert!(decode_batch(&bytes[..bytes.len() / 2]).is_err());
    }
}
