use std::time::{SystemTime, UNIX_EPOCH};

use opentelemetry_proto::tonic::common::v1::KeyValue;
use opentelemetry_proto::tonic::trace::v1::{Span, Status};
use rand::TryRngCore;
use rand::rngs::OsRng;

use crate::error::{Result, SpanpipeError};
use crate::traceparent::TraceParent;

/// Field-level overrides layered onto an optional base span. `None` means
/// "not supplied on this invocation"; the base value passes through.
#[derive(Debug, Clone, Default)]
pub struct SpanOverrides {
    pub trace_id: Option<Vec<u8>>,
    pub span_id: Option<Vec<u8>>,
    pub parent_span_id: Option<Vec<u8>>,
    pub trace_state: Option<String>,
    pub traceparent: Option<TraceParent>,
    pub name: Option<String>,
    pub kind: Option<i32>,
    pub start_time_unix_nano: Option<u64>,
    pub end_time_unix_nano: Option<u64>,
    pub attributes: Vec<KeyValue>,
    pub status_code: Option<i32>,
    pub status_message: Option<String>,
}

/// Assemble the span for this pipeline stage.
///
/// Precedence per field: explicit override, then the base span, then a
/// valid traceparent seed, then a generated value. An explicit `trace_id`
/// suppresses the traceparent entirely; otherwise the traceparent still
/// donates its parent linkage even when the base supplies the trace id.
/// Ids are never regenerated once present, and never derived from other
/// fields. Override attributes append after the base's rather than
/// replacing them.
pub fn build(base: Option<Span>, overrides: &SpanOverrides) -> Result<Span> {
    let mut span = base.unwrap_or_default();

    if let Some(id) = &overrides.trace_id {
        span.trace_id = id.clone();
    } else {
        match &overrides.traceparent {
            Some(tp) if tp.is_valid() => {
                if span.trace_id.is_empty() {
                    span.trace_id = tp.trace_id.to_vec();
                }
                if span.parent_span_id.is_empty() {
                    span.parent_span_id = tp.parent_id.to_vec();
                }
            }
            _ => {
                if span.trace_id.is_empty() {
                    span.trace_id = random_bytes::<16>()?.to_vec();
                }
            }
        }
    }

    if let Some(id) = &overrides.span_id {
        span.span_id = id.clone();
    } else if span.span_id.is_empty() {
        span.span_id = random_bytes::<8>()?.to_vec();
    }

    if let Some(id) = &overrides.parent_span_id {
        span.parent_span_id = id.clone();
    }

    if let Some(state) = &overrides.trace_state {
        span.trace_state = state.clone();
    }
    if let Some(name) = &overrides.name {
        span.name = name.clone();
    }
    if let Some(kind) = overrides.kind {
        span.kind = kind;
    }

    if let Some(start) = overrides.start_time_unix_nano {
        span.start_time_unix_nano = start;
    } else if span.start_time_unix_nano == 0 {
        span.start_time_unix_nano = now_unix_nanos();
    }
    if let Some(end) = overrides.end_time_unix_nano {
        span.end_time_unix_nano = end;
    }

    span.attributes.extend(overrides.attributes.iter().cloned());

    if overrides.status_code.is_some() || overrides.status_message.is_some() {
        let status = span.status.get_or_insert_with(Status::default);
        if let Some(code) = overrides.status_code {
            status.code = code;
        }
        if let Some(message) = &overrides.status_message {
            status.message = message.clone();
        }
    }

    if span.name.is_empty() {
        return Err(SpanpipeError::MissingName);
    }
    if span.end_time_unix_nano != 0 && span.end_time_unix_nano < span.start_time_unix_nano {
        return Err(SpanpipeError::InvalidTimeRange {
            start: span.start_time_unix_nano,
            end: span.end_time_unix_nano,
        });
    }

    Ok(span)
}

fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| SpanpipeError::RandomSource(e.to_string()))?;
    Ok(buf)
}

fn now_unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::parse_attributes;

    fn named(name: &str) -> SpanOverrides {
        SpanOverrides {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn base_span(name: &str) -> Span {
        Span {
            trace_id: vec![0x11; 16],
            span_id: vec![0x22; 8],
            name: name.to_string(),
            start_time_unix_nano: 1_700_000_000_000_000_000,
            ..Default::default()
        }
    }

    #[test]
    fn generates_identity_and_start_time() {
        let span = build(None, &named("work")).unwrap();
        assert_eq!(span.trace_id.len(), 16);
        assert_eq!(span.span_id.len(), 8);
        assert!(span.parent_span_id.is_empty());
        assert!(span.start_time_unix_nano > 0);
        assert_eq!(span.end_time_unix_nano, 0);
    }

    #[test]
    fn independent_builds_get_distinct_ids() {
        let a = build(None, &named("work")).unwrap();
        let b = build(None, &named("work")).unwrap();
        assert_ne!(a.trace_id, b.trace_id);
        assert_ne!(a.span_id, b.span_id);
    }

    #[test]
    fn base_identity_is_stable() {
        let base = base_span("stage-one");
        let span = build(Some(base.clone()), &SpanOverrides::default()).unwrap();
        assert_eq!(span.trace_id, base.trace_id);
        assert_eq!(span.span_id, base.span_id);
        assert_eq!(span.start_time_unix_nano, base.start_time_unix_nano);
    }

    #[test]
    fn explicit_ids_win_over_base() {
        let overrides = SpanOverrides {
            trace_id: Some(vec![0x33; 16]),
            span_id: Some(vec![0x44; 8]),
            ..Default::default()
        };
        let span = build(Some(base_span("stage-one")), &overrides).unwrap();
        assert_eq!(span.trace_id, vec![0x33; 16]);
        assert_eq!(span.span_id, vec![0x44; 8]);
    }

    #[test]
    fn traceparent_seeds_trace_and_parent() {
        let overrides = SpanOverrides {
            traceparent: Some(
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"
                    .parse()
                    .unwrap(),
            ),
            name: Some("child".to_string()),
            ..Default::default()
        };
        let span = build(None, &overrides).unwrap();
        assert_eq!(hex::encode(&span.trace_id), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(hex::encode(&span.parent_span_id), "00f067aa0ba902b7");
        assert_ne!(span.span_id, span.parent_span_id);
    }

    #[test]
    fn traceparent_donates_parent_when_base_has_trace_id() {
        let base = base_span("stage-two");
        let overrides = SpanOverrides {
            traceparent: Some(
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"
                    .parse()
                    .unwrap(),
            ),
            ..Default::default()
        };
        let span = build(Some(base.clone()), &overrides).unwrap();
        assert_eq!(span.trace_id, base.trace_id);
        assert_eq!(span.span_id, base.span_id);
        assert_eq!(hex::encode(&span.parent_span_id), "00f067aa0ba902b7");
    }

    #[test]
    fn base_parent_survives_traceparent() {
        let mut base = base_span("stage-two");
        base.parent_span_id = vec![0x66; 8];
        let overrides = SpanOverrides {
            traceparent: Some(
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"
                    .parse()
                    .unwrap(),
            ),
            ..Default::default()
        };
        let span = build(Some(base), &overrides).unwrap();
        assert_eq!(span.parent_span_id, vec![0x66; 8]);
    }

    #[test]
    fn explicit_trace_id_ignores_traceparent() {
        let overrides = SpanOverrides {
            trace_id: Some(vec![0x55; 16]),
            traceparent: Some(
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"
                    .parse()
                    .unwrap(),
            ),
            name: Some("root".to_string()),
            ..Default::default()
        };
        let span = build(None, &overrides).unwrap();
        assert_eq!(span.trace_id, vec![0x55; 16]);
        assert!(span.parent_span_id.is_empty());
    }

    #[test]
    fn name_override_wins() {
        let overrides = named("b");
        let span = build(Some(base_span("a")), &overrides).unwrap();
        assert_eq!(span.name, "b");
    }

    #[test]
    fn attributes_append_after_base() {
        let mut base = base_span("stage-one");
        base.attributes = parse_attributes("k1=v1").unwrap();
        let overrides = SpanOverrides {
            attributes: parse_attributes("k2=v2").unwrap(),
            ..Default::default()
        };
        let span = build(Some(base), &overrides).unwrap();
        let keys: Vec<&str> = span.attributes.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, ["k1", "k2"]);
    }

    #[test]
    fn missing_name_rejected() {
        assert!(matches!(
            build(None, &SpanOverrides::default()),
            Err(SpanpipeError::MissingName)
        ));
        assert!(matches!(
            build(None, &named("")),
            Err(SpanpipeError::MissingName)
        ));
    }

    #[test]
    fn base_name_passes_through() {
        let span = build(Some(base_span("kept")), &SpanOverrides::default()).unwrap();
        assert_eq!(span.name, "kept");
    }

    #[test]
    fn end_before_start_rejected() {
        let overrides = SpanOverrides {
            name: Some("work".to_string()),
            start_time_unix_nano: Some(2_000),
            end_time_unix_nano: Some(1_000),
            ..Default::default()
        };
        assert!(matches!(
            build(None, &overrides),
            Err(SpanpipeError::InvalidTimeRange {
                start: 2_000,
                end: 1_000
            })
        ));
    }

    #[test]
    fn status_overlays_field_wise() {
        let mut base = base_span("stage-one");
        base.status = Some(Status {
            message: "earlier".to_string(),
            code: 1,
        });
        let overrides = SpanOverrides {
            status_code: Some(2),
            ..Default::default()
        };
        let span = build(Some(base), &overrides).unwrap();
        let status = span.status.unwrap();
        assert_eq!(status.code, 2);
        assert_eq!(status.message, "earlier");
    }

    #[test]
    fn status_left_unset_without_overrides() {
        let span = build(None, &named("work")).unwrap();
        assert!(span.status.is_none());
    }
}
