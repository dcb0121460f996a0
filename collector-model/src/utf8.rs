// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! UTF-8 repair at the decode boundary.
//!
//! Rust strings cannot carry invalid UTF-8, so corrupted input has to be
//! repaired where raw bytes become model strings: the wire converters. A
//! corrupted field is replaced by its lossy decoding and the original bytes
//! are preserved under a reserved binary tag, so nothing is silently
//! dropped. Wire formats whose decoders already reject invalid UTF-8 as a
//! protocol error (strict Thrift strings, protobuf `string` fields) surface
//! that as a decode failure at ingress instead; only byte-typed wire fields
//! reach these helpers.

use crate::span::KeyValue;

/// Reserved tag key preserving a corrupted service name.
pub const INVALID_SERVICE_TAG: &str = "invalidService";
/// Reserved tag key preserving a corrupted operation name.
pub const INVALID_OPERATION_TAG: &str = "invalidOperation";
/// Reserved tag key preserving a corrupted tag, as the original
/// `key:value` concatenation.
pub const INVALID_TAG_KEY_TAG: &str = "invalidTagKey";

/// Turn raw bytes into a valid string. Corrupted input is preserved as a
/// binary tag under `invalid_key` in `sink` and repaired lossily. Total and
/// idempotent: valid input round-trips untouched.
pub fn string_from_bytes(bytes: &[u8], invalid_key: &'static str, sink: &mut Vec<KeyValue>) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            sink.push(KeyValue::binary(invalid_key, bytes.to_vec()));
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Build a tag from a raw key and an already-converted value. A corrupted
/// key voids the whole tag: the original `key:value` bytes are preserved
/// under [`INVALID_TAG_KEY_TAG`].
pub fn tag_from_raw_key(key_bytes: &[u8], value: crate::span::TagValue) -> KeyValue {
    match std::str::from_utf8(key_bytes) {
        Ok(key) => KeyValue {
            key: key.to_string(),
            value,
        },
        Err(_) => {
            let mut preserved = key_bytes.to_vec();
            preserved.push(b':');
            match &value {
                crate::span::TagValue::String(s) => preserved.extend_from_slice(s.as_bytes()),
                crate::span::TagValue::Binary(b) => preserved.extend_from_slice(b),
                other => preserved.extend_from_slice(format!("{other:?}").as_bytes()),
            }
            KeyValue::binary(INVALID_TAG_KEY_TAG, preserved)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::TagValue;

    #[test]
    fn test_valid_bytes_pass_through() {
        let mut sink = Vec::new();
        let s = string_from_bytes(b"all-good", INVALID_OPERATION_TAG, &mut sink);
        assert_eq!("all-good", s);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_invalid_bytes_are_preserved() {
        let mut sink = Vec::new();
        let s = string_from_bytes(&[b'o', b'p', 0xff], INVALID_OPERATION_TAG, &mut sink);
        assert_eq!("op\u{FFFD}", s);
        assert_eq!(1, sink.len());
        assert_eq!(INVALID_OPERATION_TAG, sink[0].key);
        assert_eq!(
            TagValue::Binary(vec![b'o', b'p', 0xff]),
            sink[0].value
        );
        // The repaired string is valid UTF-8
        assert!(std::str::from_utf8(s.as_bytes()).is_ok());
    }

    #[test]
    fn test_corrupted_tag_key_preserves_key_and_value() {
        let tag = tag_from_raw_key(&[0xfe, b'k'], TagValue::String("v".to_string()));
        assert_eq!(INVALID_TAG_KEY_TAG, tag.key);
        assert_eq!(TagValue::Binary(vec![0xfe, b'k', b':', b'v']), tag.value);
    }

    #[test]
    fn test_repair_is_idempotent() {
        let mut sink = Vec::new();
        let once = string_from_bytes(&[0xff], INVALID_SERVICE_TAG, &mut sink);
        let mut sink2 = Vec::new();
        let twice = string_from_bytes(once.as_bytes(), INVALID_SERVICE_TAG, &mut sink2);
        assert_eq!(once, twice);
        assert!(sink2.is_empty());
    }
}
