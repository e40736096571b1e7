//! One explicit parse function per CLI field value. Each produces a typed
//! value or an error before the builder ever runs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use opentelemetry_proto::tonic::common::v1::any_value::Value;
use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue};
use opentelemetry_proto::tonic::trace::v1::span::SpanKind;
use opentelemetry_proto::tonic::trace::v1::status::StatusCode;

use crate::error::{Result, SpanpipeError};

pub fn parse_trace_id(input: &str) -> Result<Vec<u8>> {
    parse_hex_id(input, 16, "trace id")
}

pub fn parse_span_id(input: &str) -> Result<Vec<u8>> {
    parse_hex_id(input, 8, "span id")
}

fn parse_hex_id(input: &str, want: usize, label: &str) -> Result<Vec<u8>> {
    let bytes = hex::decode(input)
        .map_err(|e| SpanpipeError::Parse(format!("invalid {label} {input}: {e}")))?;
    if bytes.len() != want {
        return Err(SpanpipeError::Parse(format!(
            "{label} must be {want} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Span timestamp in unix nanos. Accepts an RFC3339 instant or a relative
/// duration meaning "that long ago" (`5m`, `2h30m`).
pub fn parse_span_time(input: &str) -> Result<u64> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return unix_nanos(ts.with_timezone(&Utc));
    }

    if let Ok(duration) = humantime::parse_duration(input) {
        let duration = chrono::Duration::from_std(duration)
            .map_err(|e| SpanpipeError::Parse(format!("relative time {input} out of range: {e}")))?;
        return unix_nanos(Utc::now() - duration);
    }

    Err(SpanpipeError::Parse(format!(
        "expected RFC3339 time or relative duration, got {input}"
    )))
}

fn unix_nanos(ts: DateTime<Utc>) -> Result<u64> {
    let nanos = ts
        .timestamp_nanos_opt()
        .ok_or_else(|| SpanpipeError::Parse(format!("time {ts} outside the nanosecond range")))?;
    u64::try_from(nanos)
        .map_err(|_| SpanpipeError::Parse(format!("time {ts} precedes the unix epoch")))
}

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input)
        .map_err(|e| SpanpipeError::Parse(format!("invalid duration {input}: {e}")))
}

/// Comma-separated `key=value` pairs, string values. Values may contain `=`;
/// keys must be non-empty.
pub fn parse_attributes(input: &str) -> Result<Vec<KeyValue>> {
    let mut attrs = Vec::new();
    for pair in input.split(',') {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(SpanpipeError::Parse(format!(
                "expected key=value attribute, got {pair}"
            )));
        };
        if key.is_empty() {
            return Err(SpanpipeError::Parse(format!(
                "empty attribute key in {input}"
            )));
        }
        attrs.push(KeyValue {
            key: key.to_string(),
            value: Some(AnyValue {
                value: Some(Value::StringValue(value.to_string())),
            }),
        });
    }
    Ok(attrs)
}

/// Status codes outside unset/ok/error are rejected here, before build.
pub fn parse_status_code(input: &str) -> Result<i32> {
    match input.to_ascii_lowercase().as_str() {
        "0" | "unset" => Ok(StatusCode::Unset as i32),
        "1" | "ok" => Ok(StatusCode::Ok as i32),
        "2" | "error" => Ok(StatusCode::Error as i32),
        _ => Err(SpanpipeError::Parse(format!("invalid status code: {input}"))),
    }
}

pub fn parse_span_kind(input: &str) -> Result<i32> {
    let kind = match input.to_ascii_lowercase().as_str() {
        "0" | "unspecified" => SpanKind::Unspecified,
        "1" | "internal" => SpanKind::Internal,
        "2" | "server" => SpanKind::Server,
        "3" | "client" => SpanKind::Client,
        "4" | "producer" => SpanKind::Producer,
        "5" | "consumer" => SpanKind::Consumer,
        _ => return Err(SpanpipeError::Parse(format!("invalid span kind: {input}"))),
    };
    Ok(kind as i32)
}
