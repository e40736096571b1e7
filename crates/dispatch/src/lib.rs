//! Drives an external exporter with a fully built span. The provider here is
//! owned per invocation and handed around explicitly; nothing is registered
//! globally.

use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use opentelemetry::trace::{
    Span as _, SpanContext, SpanId, SpanKind, Status, TraceContextExt, TraceFlags, TraceId,
    TraceState, Tracer, TracerProvider as _,
};
use opentelemetry::Context;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_proto::tonic::trace::v1::span::SpanKind as ProtoSpanKind;
use opentelemetry_proto::tonic::trace::v1::status::StatusCode as ProtoStatusCode;
use opentelemetry_proto::tonic::trace::v1::{Span, Status as ProtoStatus};
use opentelemetry_sdk::trace::SdkTracerProvider;
use spanpipe_core::{Result, SpanpipeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkMode {
    Stdout,
    OtlpGrpc,
    OtlpHttp,
}

impl FromStr for SinkMode {
    type Err = SpanpipeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "stdout" => Ok(Self::Stdout),
            "otlp" | "otlp-grpc" | "grpc" => Ok(Self::OtlpGrpc),
            "otlphttp" | "otlp-http" | "http" => Ok(Self::OtlpHttp),
            _ => Err(SpanpipeError::UnknownSinkMode(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub mode: SinkMode,
    /// Collector endpoint. `None` defers to the exporter's standard
    /// `OTEL_EXPORTER_OTLP_*` environment configuration.
    pub endpoint: Option<String>,
    pub timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            mode: SinkMode::Stdout,
            endpoint: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Emit the span through the configured sink and block until it is flushed.
///
/// The span's identity was finalized by the builder, so the SDK's id
/// generation is bypassed by pinning trace and span ids on the span builder.
/// A non-empty `parent_span_id` becomes a remote parent with the sampled
/// flag forced on.
pub fn dispatch(span: &Span, cfg: &DispatchConfig) -> Result<()> {
    let identity = identity_of(span)?;
    let provider = build_provider(cfg)?;
    let tracer = provider.tracer("spanpipe");

    let mut cx = Context::new();
    if let Some(parent_id) = identity.parent_id {
        let parent = SpanContext::new(
            identity.trace_id,
            parent_id,
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );
        cx = cx.with_remote_span_context(parent);
    }

    let builder = tracer
        .span_builder(span.name.clone())
        .with_trace_id(identity.trace_id)
        .with_span_id(identity.span_id)
        .with_kind(kind_of(span.kind))
        .with_start_time(to_system_time(span.start_time_unix_nano));
    let mut emitted = tracer.build_with_context(builder, &cx);
    emitted.set_status(status_of(span.status.as_ref()));
    if span.end_time_unix_nano != 0 {
        emitted.end_with_timestamp(to_system_time(span.end_time_unix_nano));
    } else {
        emitted.end();
    }

    provider
        .force_flush()
        .map_err(|e| SpanpipeError::Flush(e.to_string()))?;
    if let Err(e) = provider.shutdown() {
        tracing::debug!(error = %e, "provider shutdown after flush failed");
    }
    Ok(())
}

struct SpanIdentity {
    trace_id: TraceId,
    span_id: SpanId,
    parent_id: Option<SpanId>,
}

fn identity_of(span: &Span) -> Result<SpanIdentity> {
    let trace_id: [u8; 16] = span.trace_id.as_slice().try_into().map_err(|_| {
        SpanpipeError::InvalidArgument(format!(
            "span trace id must be 16 bytes, got {}",
            span.trace_id.len()
        ))
    })?;
    let span_id: [u8; 8] = span.span_id.as_slice().try_into().map_err(|_| {
        SpanpipeError::InvalidArgument(format!(
            "span id must be 8 bytes, got {}",
            span.span_id.len()
        ))
    })?;
    let parent_id = if span.parent_span_id.is_empty() {
        None
    } else {
        let bytes: [u8; 8] = span.parent_span_id.as_slice().try_into().map_err(|_| {
            SpanpipeError::InvalidArgument(format!(
                "parent span id must be 8 bytes, got {}",
                span.parent_span_id.len()
            ))
        })?;
        Some(SpanId::from_bytes(bytes))
    };
    Ok(SpanIdentity {
        trace_id: TraceId::from_bytes(trace_id),
        span_id: SpanId::from_bytes(span_id),
        parent_id,
    })
}

fn build_provider(cfg: &DispatchConfig) -> Result<SdkTracerProvider> {
    let provider = match cfg.mode {
        SinkMode::Stdout => SdkTracerProvider::builder()
            .with_batch_exporter(opentelemetry_stdout::SpanExporter::default())
            .build(),
        SinkMode::OtlpGrpc => {
            let mut builder = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_timeout(cfg.timeout);
            if let Some(endpoint) = &cfg.endpoint {
                builder = builder.with_endpoint(endpoint.clone());
            }
            let exporter = builder
                .build()
                .map_err(|e| SpanpipeError::SinkTransport(e.to_string()))?;
            SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .build()
        }
        SinkMode::OtlpHttp => {
            let mut builder = opentelemetry_otlp::SpanExporter::builder()
                .with_http()
                .with_protocol(opentelemetry_otlp::Protocol::HttpBinary)
                .with_timeout(cfg.timeout);
            if let Some(endpoint) = &cfg.endpoint {
                builder = builder.with_endpoint(endpoint.clone());
            }
            let exporter = builder
                .build()
                .map_err(|e| SpanpipeError::SinkTransport(e.to_string()))?;
            SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .build()
        }
    };
    Ok(provider)
}

fn kind_of(kind: i32) -> SpanKind {
    match ProtoSpanKind::try_from(kind) {
        Ok(ProtoSpanKind::Server) => SpanKind::Server,
        Ok(ProtoSpanKind::Client) => SpanKind::Client,
        Ok(ProtoSpanKind::Producer) => SpanKind::Producer,
        Ok(ProtoSpanKind::Consumer) => SpanKind::Consumer,
        _ => SpanKind::Internal,
    }
}

fn status_of(status: Option<&ProtoStatus>) -> Status {
    match status {
        Some(s) => match ProtoStatusCode::try_from(s.code) {
            Ok(ProtoStatusCode::Ok) => Status::Ok,
            Ok(ProtoStatusCode::Error) => Status::error(s.message.clone()),
            _ => Status::Unset,
        },
        None => Status::Unset,
    }
}

fn to_system_time(unix_nano: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_nanos(unix_nano)
}
