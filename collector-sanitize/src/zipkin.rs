// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The Zipkin v1 repair chain, applied to each wire span before conversion.
//!
//! Every sanitizer is total and idempotent; the chain order matters and is
//! fixed by [`sanitize`].

use collector_model::wire::zipkincore::{
    AnnotationType, BinaryAnnotation, Span, CLIENT_RECV, CLIENT_SEND, SERVER_RECV,
};

const NEGATIVE_DURATION_TAG: &str = "errNegativeDuration";
const ZERO_PARENT_ID_TAG: &str = "errZeroParentID";
const ERROR_KEY: &str = "error";
const ERROR_MESSAGE_KEY: &str = "error.message";

/// A single repair step over a wire-level Zipkin span.
pub type Sanitizer = fn(&mut Span);

/// The standard chain, in the order the steps must run.
pub const CHAIN: [Sanitizer; 4] = [
    sanitize_duration,
    sanitize_start_time,
    sanitize_parent_id,
    sanitize_error_tag,
];

/// Run the standard chain over a span.
pub fn sanitize(span: &mut Span) {
    for sanitizer in CHAIN {
        sanitizer(span);
    }
}

/// Fills in a missing duration from annotations, preferring the `cs`..`cr`
/// pair and falling back to the first..last annotation timestamps. A
/// negative duration is replaced with 1 and preserved as an annotation.
pub fn sanitize_duration(span: &mut Span) {
    if let Some(duration) = span.duration {
        if duration < 0 {
            span.binary_annotations.push(BinaryAnnotation::string(
                NEGATIVE_DURATION_TAG,
                duration.to_string(),
            ));
            span.duration = Some(1);
        }
        return;
    }

    let derived = derive_window(span);
    if let Some((start, duration)) = derived {
        if span.timestamp.is_none_or(|current| start < current) {
            span.timestamp = Some(start);
        }
        span.duration = Some(duration);
    }
}

fn derive_window(span: &Span) -> Option<(i64, i64)> {
    let ts = |value: &str| {
        span.annotations
            .iter()
            .find(|a| a.value == value)
            .map(|a| a.timestamp)
    };
    if let (Some(cs), Some(cr)) = (ts(CLIENT_SEND), ts(CLIENT_RECV)) {
        if cr >= cs {
            return Some((cs, cr - cs));
        }
    }
    let first = span.annotations.iter().map(|a| a.timestamp).min()?;
    let last = span.annotations.iter().map(|a| a.timestamp).max()?;
    Some((first, last - first))
}

/// Fills in a missing start time from `cs`, or from `sr` for spans without
/// a parent.
pub fn sanitize_start_time(span: &mut Span) {
    if span.timestamp.is_some() {
        return;
    }
    let ts = |value: &str| {
        span.annotations
            .iter()
            .find(|a| a.value == value)
            .map(|a| a.timestamp)
    };
    if let Some(cs) = ts(CLIENT_SEND) {
        span.timestamp = Some(cs);
    } else if span.parent_id.unwrap_or(0) == 0 {
        if let Some(sr) = ts(SERVER_RECV) {
            span.timestamp = Some(sr);
        }
    }
}

/// A parent id of literally 0 means "no parent"; record it and clear it.
pub fn sanitize_parent_id(span: &mut Span) {
    if span.parent_id == Some(0) {
        span.binary_annotations
            .push(BinaryAnnotation::string(ZERO_PARENT_ID_TAG, "0"));
        span.parent_id = None;
    }
}

/// Forces every `error` annotation to a boolean. "true" and the empty
/// string mean true, "false" means false, and anything else means true with
/// the original string preserved under `error.message`.
pub fn sanitize_error_tag(span: &mut Span) {
    let mut preserved = Vec::new();
    for anno in &mut span.binary_annotations {
        if anno.annotation_type == AnnotationType::Bool
            || !anno.key.eq_ignore_ascii_case(ERROR_KEY.as_bytes())
        {
            continue;
        }
        let original = String::from_utf8_lossy(&anno.value).into_owned();
        let value = match original.as_str() {
            "true" | "" => true,
            "false" => false,
            _ => {
                preserved.push(BinaryAnnotation::string(ERROR_MESSAGE_KEY, original));
                true
            }
        };
        anno.annotation_type = AnnotationType::Bool;
        anno.value = vec![u8::from(value)];
    }
    span.binary_annotations.extend(preserved);
}
