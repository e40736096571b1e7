use std::io::IsTerminal;
use std::str::FromStr;

use clap::Args;
use opentelemetry_proto::tonic::trace::v1::Span;
use spanpipe_core::builder::SpanOverrides;
use spanpipe_core::traceparent::TraceParent;
use spanpipe_core::{envelope, fields};
use tokio::io::AsyncReadExt;

#[derive(Args, Debug)]
pub struct SpanArgs {
    #[arg(long, help = "Trace id, 32 hex characters")]
    pub trace_id: Option<String>,
    #[arg(long, help = "Span id, 16 hex characters")]
    pub span_id: Option<String>,
    #[arg(long, help = "Span id of the parent span, 16 hex characters")]
    pub parent_span_id: Option<String>,
    #[arg(long, help = "W3C tracestate value")]
    pub trace_state: Option<String>,
    #[arg(long, help = "W3C traceparent seeding trace and parent ids")]
    pub traceparent: Option<String>,
    #[arg(long, help = "Span operation name")]
    pub name: Option<String>,
    #[arg(long, help = "Span kind: internal, server, client, producer, consumer")]
    pub kind: Option<String>,
    #[arg(long, help = "Start time, RFC3339 or relative like 5m")]
    pub start_time: Option<String>,
    #[arg(long, help = "End time, RFC3339 or relative like 5m")]
    pub end_time: Option<String>,
    #[arg(long = "attrs", help = "Comma separated key=value attributes")]
    pub attrs: Vec<String>,
    #[arg(long, help = "Status code: unset, ok or error")]
    pub status_code: Option<String>,
    #[arg(long, help = "Status message")]
    pub status_message: Option<String>,
}

impl SpanArgs {
    pub fn into_overrides(self) -> spanpipe_core::Result<SpanOverrides> {
        let mut overrides = SpanOverrides {
            trace_id: self.trace_id.as_deref().map(fields::parse_trace_id).transpose()?,
            span_id: self.span_id.as_deref().map(fields::parse_span_id).transpose()?,
            parent_span_id: self
                .parent_span_id
                .as_deref()
                .map(fields::parse_span_id)
                .transpose()?,
            trace_state: self.trace_state,
            traceparent: self
                .traceparent
                .as_deref()
                .map(TraceParent::from_str)
                .transpose()?,
            name: self.name,
            kind: self.kind.as_deref().map(fields::parse_span_kind).transpose()?,
            start_time_unix_nano: self
                .start_time
                .as_deref()
                .map(fields::parse_span_time)
                .transpose()?,
            end_time_unix_nano: self
                .end_time
                .as_deref()
                .map(fields::parse_span_time)
                .transpose()?,
            attributes: Vec::new(),
            status_code: self
                .status_code
                .as_deref()
                .map(fields::parse_status_code)
                .transpose()?,
            status_message: self.status_message,
        };
        for raw in &self.attrs {
            overrides.attributes.extend(fields::parse_attributes(raw)?);
        }
        Ok(overrides)
    }
}

/// Read a predecessor span envelope from stdin. Interactive or empty stdin
/// is the normal "no base span" state, not an error.
pub async fn read_piped_span() -> anyhow::Result<Option<Span>> {
    if std::io::stdin().is_terminal() {
        return Ok(None);
    }
    let mut text = String::new();
    tokio::io::stdin().read_to_string(&mut text).await?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(envelope::decode(&text)?))
}
