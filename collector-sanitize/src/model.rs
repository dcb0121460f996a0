// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sanitizers over the domain model, applied to every span regardless of
//! the wire format it arrived in.
//!
//! UTF-8 repair deliberately does not appear here: model strings are valid
//! by construction, so corrupted input is repaired where raw bytes are
//! decoded (see [`collector_model::utf8`]) and preserved under the reserved
//! `invalid*` tags. What remains for the model chain is service-name
//! repair.

use collector_model::span::{Process, Span};

/// Service name given to spans whose process is missing entirely.
pub const NULL_PROCESS_SERVICE_NAME: &str = "null-process-and-service-name";
/// Service name given to processes with an empty name.
pub const EMPTY_SERVICE_NAME: &str = "empty-service-name";

/// A single repair step over a model span.
pub type Sanitizer = fn(&mut Span);

/// The standard model chain.
pub const CHAIN: [Sanitizer; 1] = [sanitize_empty_service_name];

/// Run the standard model chain over a span.
pub fn sanitize(span: &mut Span) {
    for sanitizer in CHAIN {
        sanitizer(span);
    }
}

/// Guarantees every span leaves with a non-empty service name.
pub fn sanitize_empty_service_name(span: &mut Span) {
    match &mut span.process {
        None => span.process = Some(Process::new(NULL_PROCESS_SERVICE_NAME)),
        Some(process) if process.service_name.is_empty() => {
            process.service_name = EMPTY_SERVICE_NAME.to_string();
        }
        Some(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_process_gets_placeholder() {
        let mut span = Span::default();
        sanitize(&mut span);
        assert_eq!(NULL_PROCESS_SERVICE_NAME, span.service_name());
    }

    #[test]
    fn test_empty_service_name_is_renamed() {
        let mut span = Span {
            process: Some(Process::new("")),
            ..Default::default()
        };
        sanitize(&mut span);
        assert_eq!(EMPTY_SERVICE_NAME, span.service_name());
    }

    #[test]
    fn test_real_service_name_untouched() {
        let mut span = Span {
            process: Some(Process::new("widgets")),
            ..Default::default()
        };
        sanitize(&mut span);
        assert_eq!("widgets", span.service_name());
    }

    #[test]
    fn test_idempotent() {
        let mut span = Span::default();
        sanitize(&mut span);
        let once = span.clone();
        sanitize(&mut span);
        assert_eq!(once, span);
    }
}
