// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Thrift shapes of the Zipkin v1 `zipkincore.thrift` IDL, binary protocol
//! only, as submitted to `POST /api/v1/spans`.

use thrift::protocol::{
    field_id, TBinaryInputProtocol, TBinaryOutputProtocol, TFieldIdentifier, TInputProtocol,
    TListIdentifier, TOutputProtocol, TStructIdentifier, TType,
};
use thrift::{ProtocolError, ProtocolErrorKind};

pub const CLIENT_SEND: &str = "cs";
pub const CLIENT_RECV: &str = "cr";
pub const SERVER_SEND: &str = "ss";
pub const SERVER_RECV: &str = "sr";
pub const MESSAGE_SEND: &str = "ms";
pub const MESSAGE_RECV: &str = "mr";
pub const LOCAL_COMPONENT: &str = "lc";
pub const CLIENT_ADDR: &str = "ca";
pub const SERVER_ADDR: &str = "sa";

/// Indicates the network context of a service recording an annotation.
///
/// `service_name` is kept as raw bytes: clients do ship corrupted names,
/// and the converter repairs them without failing the batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Endpoint {
    /// IPv4 host address packed into 4 bytes.
    pub ipv4: i32,
    /// IPv4 port, to be treated as unsigned.
    pub port: i16,
    /// Service name in lowercase, such as "memcache" or "zipkin-web".
    pub service_name: Vec<u8>,
    /// IPv6 host address packed into 16 bytes.
    pub ipv6: Option<Vec<u8>>,
}

impl Endpoint {
    pub fn read_from_in_protocol(i_prot: &mut dyn TInputProtocol) -> thrift::Result<Endpoint> {
        i_prot.read_struct_begin()?;
        let mut ret = Endpoint::default();
        loop {
            let field_ident = i_prot.read_field_begin()?;
            if field_ident.field_type == TType::Stop {
                break;
            }
            match field_id(&field_ident)? {
                1 => ret.ipv4 = i_prot.read_i32()?,
                2 => ret.port = i_prot.read_i16()?,
                3 => ret.service_name = i_prot.read_bytes()?,
                4 => ret.ipv6 = Some(i_prot.read_bytes()?),
                _ => i_prot.skip(field_ident.field_type)?,
            }
            i_prot.read_field_end()?;
        }
        i_prot.read_struct_end()?;
        Ok(ret)
    }

    pub fn write_to_out_protocol(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o_prot.write_struct_begin(&TStructIdentifier::new("Endpoint"))?;
        o_prot.write_field_begin(&TFieldIdentifier::new("ipv4", TType::I32, 1))?;
        o_prot.write_i32(self.ipv4)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&TFieldIdentifier::new("port", TType::I16, 2))?;
        o_prot.write_i16(self.port)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&TFieldIdentifier::new("service_name", TType::String, 3))?;
        o_prot.write_bytes(&self.service_name)?;
        o_prot.write_field_end()?;
        if let Some(ref ipv6) = self.ipv6 {
            o_prot.write_field_begin(&TFieldIdentifier::new("ipv6", TType::String, 4))?;
            o_prot.write_bytes(ipv6)?;
            o_prot.write_field_end()?;
        }
        o_prot.write_field_stop()?;
        o_prot.write_struct_end()
    }
}

/// An event annotation: a timestamp, a value such as `cs` or `sr`, and the
/// host that recorded it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Annotation {
    /// Microseconds from epoch.
    pub timestamp: i64,
    pub value: String,
    pub host: Option<Endpoint>,
}

impl Annotation {
    pub fn read_from_in_protocol(i_prot: &mut dyn TInputProtocol) -> thrift::Result<Annotation> {
        i_prot.read_struct_begin()?;
        let mut ret = Annotation::default();
        loop {
            let field_ident = i_prot.read_field_begin()?;
            if field_ident.field_type == TType::Stop {
                break;
            }
            match field_id(&field_ident)? {
                1 => ret.timestamp = i_prot.read_i64()?,
                2 => ret.value = i_prot.read_string()?,
                3 => ret.host = Some(Endpoint::read_from_in_protocol(i_prot)?),
                _ => i_prot.skip(field_ident.field_type)?,
            }
            i_prot.read_field_end()?;
        }
        i_prot.read_struct_end()?;
        Ok(ret)
    }

    pub fn write_to_out_protocol(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o_prot.write_struct_begin(&TStructIdentifier::new("Annotation"))?;
        o_prot.write_field_begin(&TFieldIdentifier::new("timestamp", TType::I64, 1))?;
        o_prot.write_i64(self.timestamp)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&TFieldIdentifier::new("value", TType::String, 2))?;
        o_prot.write_string(&self.value)?;
        o_prot.write_field_end()?;
        if let Some(ref host) = self.host {
            o_prot.write_field_begin(&TFieldIdentifier::new("host", TType::Struct, 3))?;
            host.write_to_out_protocol(o_prot)?;
            o_prot.write_field_end()?;
        }
        o_prot.write_field_stop()?;
        o_prot.write_struct_end()
    }
}

#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum AnnotationType {
    Bool = 0,
    Bytes = 1,
    I16 = 2,
    I32 = 3,
    I64 = 4,
    Double = 5,
    String = 6,
}

impl TryFrom<i32> for AnnotationType {
    type Error = thrift::Error;
    fn try_from(i: i32) -> Result<Self, Self::Error> {
        match i {
            0 => Ok(AnnotationType::Bool),
            1 => Ok(AnnotationType::Bytes),
            2 => Ok(AnnotationType::I16),
            3 => Ok(AnnotationType::I32),
            4 => Ok(AnnotationType::I64),
            5 => Ok(AnnotationType::Double),
            6 => Ok(AnnotationType::String),
            _ => Err(thrift::Error::Protocol(ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                format!("cannot convert enum constant {i} to AnnotationType"),
            ))),
        }
    }
}

/// A tag annotation: a key, a raw value, and the type the value should be
/// decoded as.
#[derive(Clone, Debug, PartialEq)]
pub struct BinaryAnnotation {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub annotation_type: AnnotationType,
    pub host: Option<Endpoint>,
}

impl Default for BinaryAnnotation {
    fn default() -> Self {
        Self {
            key: Vec::new(),
            value: Vec::new(),
            annotation_type: AnnotationType::Bool,
            host: None,
        }
    }
}

impl BinaryAnnotation {
    /// Convenience constructor for a string-typed annotation.
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into().into_bytes(),
            value: value.into().into_bytes(),
            annotation_type: AnnotationType::String,
            host: None,
        }
    }

    pub fn read_from_in_protocol(
        i_prot: &mut dyn TInputProtocol,
    ) -> thrift::Result<BinaryAnnotation> {
        i_prot.read_struct_begin()?;
        let mut ret = BinaryAnnotation::default();
        loop {
            let field_ident = i_prot.read_field_begin()?;
            if field_ident.field_type == TType::Stop {
                break;
            }
            match field_id(&field_ident)? {
                1 => ret.key = i_prot.read_bytes()?,
                2 => ret.value = i_prot.read_bytes()?,
                3 => ret.annotation_type = AnnotationType::try_from(i_prot.read_i32()?)?,
                4 => ret.host = Some(Endpoint::read_from_in_protocol(i_prot)?),
                _ => i_prot.skip(field_ident.field_type)?,
            }
            i_prot.read_field_end()?;
        }
        i_prot.read_struct_end()?;
        Ok(ret)
    }

    pub fn write_to_out_protocol(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o_prot.write_struct_begin(&TStructIdentifier::new("BinaryAnnotation"))?;
        o_prot.write_field_begin(&TFieldIdentifier::new("key", TType::String, 1))?;
        o_prot.write_bytes(&self.key)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&TFieldIdentifier::new("value", TType::String, 2))?;
        o_prot.write_bytes(&self.value)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&TFieldIdentifier::new("annotation_type", TType::I32, 3))?;
        o_prot.write_i32(self.annotation_type as i32)?;
        o_prot.write_field_end()?;
        if let Some(ref host) = self.host {
            o_prot.write_field_begin(&TFieldIdentifier::new("host", TType::Struct, 4))?;
            host.write_to_out_protocol(o_prot)?;
            o_prot.write_field_end()?;
        }
        o_prot.write_field_stop()?;
        o_prot.write_struct_end()
    }
}

/// A Zipkin v1 span. Note the IDL skips field ids 2 and 7. Like
/// [`Endpoint::service_name`], `name` stays raw bytes until conversion.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Span {
    pub trace_id: i64,
    pub name: Vec<u8>,
    pub id: i64,
    pub parent_id: Option<i64>,
    pub annotations: Vec<Annotation>,
    pub binary_annotations: Vec<BinaryAnnotation>,
    pub debug: Option<bool>,
    /// Microseconds from epoch of the creation of this span.
    pub timestamp: Option<i64>,
    /// Microseconds between the span start and finish.
    pub duration: Option<i64>,
    pub trace_id_high: Option<i64>,
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
                1 => ret.trace_id = i_prot.read_i64()?,
                3 => ret.name = i_prot.read_bytes()?,
                4 => ret.id = i_prot.read_i64()?,
                5 => ret.parent_id = Some(i_prot.read_i64()?),
                6 => {
                    let list_ident = i_prot.read_list_begin()?;
                    let mut val = Vec::with_capacity(list_ident.size as usize);
                    for _ in 0..list_ident.size {
                        val.push(Annotation::read_from_in_protocol(i_prot)?);
                    }
                    i_prot.read_list_end()?;
                    ret.annotations = val;
                }
                8 => {
                    let list_ident = i_prot.read_list_begin()?;
                    let mut val = Vec::with_capacity(list_ident.size as usize);
                    for _ in 0..list_ident.size {
                        val.push(BinaryAnnotation::read_from_in_protocol(i_prot)?);
                    }
                    i_prot.read_list_end()?;
                    ret.binary_annotations = val;
                }
                9 => ret.debug = Some(i_prot.read_bool()?),
                10 => ret.timestamp = Some(i_prot.read_i64()?),
                11 => ret.duration = Some(i_prot.read_i64()?),
                12 => ret.trace_id_high = Some(i_prot.read_i64()?),
                _ => i_prot.skip(field_ident.field_type)?,
            }
            i_prot.read_field_end()?;
        }
        i_prot.read_struct_end()?;
        Ok(ret)
    }

    pub fn write_to_out_protocol(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o_prot.write_struct_begin(&TStructIdentifier::new("Span"))?;
        o_prot.write_field_begin(&TFieldIdentifier::new("trace_id", TType::I64, 1))?;
        o_prot.write_i64(self.trace_id)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&TFieldIdentifier::new("name", TType::String, 3))?;
        o_prot.write_bytes(&self.name)?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&TFieldIdentifier::new("id", TType::I64, 4))?;
        o_prot.write_i64(self.id)?;
        o_prot.write_field_end()?;
        if let Some(parent_id) = self.parent_id {
            o_prot.write_field_begin(&TFieldIdentifier::new("parent_id", TType::I64, 5))?;
            o_prot.write_i64(parent_id)?;
            o_prot.write_field_end()?;
        }
        o_prot.write_field_begin(&TFieldIdentifier::new("annotations", TType::List, 6))?;
        o_prot.write_list_begin(&TListIdentifier::new(
            TType::Struct,
            self.annotations.len() as i32,
        ))?;
        for annotation in &self.annotations {
            annotation.write_to_out_protocol(o_prot)?;
        }
        o_prot.write_list_end()?;
        o_prot.write_field_end()?;
        o_prot.write_field_begin(&TFieldIdentifier::new("binary_annotations", TType::List, 8))?;
        o_prot.write_list_begin(&TListIdentifier::new(
            TType::Struct,
            self.binary_annotations.len() as i32,
        ))?;
        for annotation in &self.binary_annotations {
            annotation.write_to_out_protocol(o_prot)?;
        }
        o_prot.write_list_end()?;
        o_prot.write_field_end()?;
        if let Some(debug) = self.debug {
            o_prot.write_field_begin(&TFieldIdentifier::new("debug", TType::Bool, 9))?;
            o_prot.write_bool(debug)?;
            o_prot.write_field_end()?;
        }
        if let Some(timestamp) = self.timestamp {
            o_prot.write_field_begin(&TFieldIdentifier::new("timestamp", TType::I64, 10))?;
            o_prot.write_i64(timestamp)?;
            o_prot.write_field_end()?;
        }
        if let Some(duration) = self.duration {
            o_prot.write_field_begin(&TFieldIdentifier::new("duration", TType::I64, 11))?;
            o_prot.write_i64(duration)?;
            o_prot.write_field_end()?;
        }
        if let Some(trace_id_high) = self.trace_id_high {
            o_prot.write_field_begin(&TFieldIdentifier::new("trace_id_high", TType::I64, 12))?;
            o_prot.write_i64(trace_id_high)?;
            o_prot.write_field_end()?;
        }
        o_prot.write_field_stop()?;
        o_prot.write_struct_end()
    }
}

/// Decode the body of `POST /api/v1/spans`: a bare binary-protocol list of
/// `Span` structs.
pub fn decode_span_list(bytes: &[u8]) -> thrift::Result<Vec<Span>> {
    let mut i_prot = TBinaryInputProtocol::new(bytes, true);
    let list_ident = i_prot.read_list_begin()?;
    let mut spans = Vec::with_capacity(list_ident.size as usize);
    for _ in 0..list_ident.size {
        spans.push(Span::read_from_in_protocol(&mut i_prot)?);
    }
    i_prot.read_list_end()?;
    Ok(spans)
}

/// Encode a list of spans the way clients submit them.
pub fn encode_span_list(spans: &[Span]) -> thrift::Result<Vec<u8>> {
    let mut buf = Vec::new();
    {
        let mut o_prot = TBinaryOutputProtocol::new(&mut buf, true);
        o_prot.write_list_begin(&TListIdentifier::new(TType::Struct, spans.len() as i32))?;
        for span in spans {
            span.write_to_out_protocol(&mut o_prot)?;
        }
        o_prot.write_list_end()?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn sample_span() -> Span {
        let mut rng = rand::thread_rng();
        Span {
            trace_id: rng.gen(),
            name: b"get /widgets".to_vec(),
            id: rng.gen(),
            parent_id: Some(1),
            annotations: vec![Annotation {
                timestamp: 1_700_000_000_000_000,
                value: SERVER_RECV.to_string(),
                host: Some(Endpoint {
                    ipv4: (127 << 24) | 1,
                    port: 8080,
                    service_name: b"widgets".to_vec(),
                    ipv6: None,
                }),
            }],
            binary_annotations: vec![BinaryAnnotation::string("http.path", "/widgets")],
            debug: Some(false),
            timestamp: Some(1_700_000_000_000_000),
            duration: Some(1500),
            trace_id_high: None,
        }
    }

    #[test]
    fn test_span_list_round_trip() {
        let spans = vec![sample_span(), Span::default()];
        let bytes = encode_span_list(&spans).unwrap();
        let decoded = decode_span_list(&bytes).unwrap();
        assert_eq!(spans, decoded);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_span_list(&[0x00, 0x01, 0x02]).is_err());
    }
}
