use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use opentelemetry_proto::tonic::trace::v1::Span;
use prost::Message;

use crate::error::{EnvelopeStage, Result, SpanpipeError};

/// Serialize a span to its single-line pipe-safe form: protobuf bytes wrapped
/// in unpadded standard base64.
pub fn encode(span: &Span) -> String {
    STANDARD_NO_PAD.encode(span.encode_to_vec())
}

/// Reverse of [`encode`]. Surrounding whitespace is tolerated since the
/// envelope usually arrives through a pipe with a trailing newline.
pub fn decode(text: &str) -> Result<Span> {
    let payload = STANDARD_NO_PAD
        .decode(text.trim())
        .map_err(|e| SpanpipeError::EnvelopeDecode {
            stage: EnvelopeStage::Text,
            detail: e.to_string(),
        })?;
    Span::decode(payload.as_slice()).map_err(|e| SpanpipeError::EnvelopeDecode {
        stage: EnvelopeStage::Binary,
        detail: e.to_string(),
    })
}
