// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Service-name normalization for metric tags.

/// Byte mapping table: `[a-z0-9._-]` pass through, uppercase folds to
/// lowercase, every other byte becomes `_`.
const NORMALIZE_TABLE: [u8; 256] = build_table();

const fn build_table() -> [u8; 256] {
    let mut table = [b'_'; 256];
    let mut i = 0;
    while i < 256 {
        let b = i as u8;
        if b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'_' || b == b'-' {
            table[i] = b;
        } else if b.is_ascii_uppercase() {
            table[i] = b.to_ascii_lowercase();
        }
        i += 1;
    }
    table
}

/// Map any service name onto a string safe for metric tags. Total,
/// deterministic, and idempotent.
pub fn service_name(name: &str) -> String {
    let bytes: Vec<u8> = name
        .bytes()
        .map(|b| NORMALIZE_TABLE[b as usize])
        .collect();
    // The table only emits ASCII, so the result is always valid UTF-8.
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_characters_pass_through() {
        assert_eq!("abc.def_1-2", service_name("abc.def_1-2"));
    }

    #[test]
    fn test_uppercase_folds() {
        assert_eq!("abc", service_name("ABC"));
    }

    #[test]
    fn test_everything_else_is_underscore() {
        assert_eq!("a_b", service_name("a b"));
        assert_eq!("a_b", service_name("a/b"));
        assert_eq!("a___b", service_name("a:*?b"));
        // Multi-byte characters map byte-wise
        assert_eq!("__", service_name("\u{00e9}"));
    }

    #[test]
    fn test_idempotent() {
        for input in ["Foo Bar/baz", "ALL-CAPS", "under_score", "\u{1F600}"] {
            let once = service_name(input);
            assert_eq!(once, service_name(&once));
        }
    }

    #[test]
    fn test_output_alphabet() {
        let out = service_name("Some Service!@#$%^&*() 42");
        assert!(out
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b"._-".contains(&b)));
    }

    #[test]
    fn test_empty() {
        assert_eq!("", service_name(""));
    }
}
