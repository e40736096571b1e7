use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceParentField {
    Structure,
    Version,
    TraceId,
    ParentId,
    TraceFlags,
}

impl fmt::Display for TraceParentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Structure => "structure",
            Self::Version => "version",
            Self::TraceId => "trace id",
            Self::ParentId => "parent id",
            Self::TraceFlags => "trace flags",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Text,
    Binary,
}

impl fmt::Display for EnvelopeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Binary => "binary",
        })
    }
}

#[derive(Debug, Error)]
pub enum SpanpipeError {
    #[error("malformed traceparent: invalid {field}: {value:?}")]
    MalformedTraceParent {
        field: TraceParentField,
        value: String,
    },

    #[error("envelope decode failed in the {stage} layer: {detail}")]
    EnvelopeDecode {
        stage: EnvelopeStage,
        detail: String,
    },

    #[error("a span name is required")]
    MissingName,

    #[error("end time {end} is earlier than start time {start}")]
    InvalidTimeRange { start: u64, end: u64 },

    #[error("unknown sink mode: {0}")]
    UnknownSinkMode(String),

    #[error("random source failure: {0}")]
    RandomSource(String),

    #[error("sink transport error: {0}")]
    SinkTransport(String),

    #[error("flush failed: {0}")]
    Flush(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, SpanpipeError>;
