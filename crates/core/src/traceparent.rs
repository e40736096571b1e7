use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SpanpipeError, TraceParentField};

pub const FLAG_SAMPLED: u8 = 0x01;

/// W3C `traceparent` header, recomputed per invocation and never persisted.
/// `valid` is only set by a successful parse or by [`TraceParent::propagation`];
/// downstream logic gates on it rather than on field contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraceParent {
    pub version: u8,
    pub trace_id: [u8; 16],
    pub parent_id: [u8; 8],
    pub trace_flags: u8,
    valid: bool,
}

impl TraceParent {
    /// Outbound header for a finished span: version 00, sampled flag on.
    pub fn propagation(trace_id: &[u8], parent_id: &[u8]) -> Result<Self> {
        let trace_id: [u8; 16] = trace_id.try_into().map_err(|_| {
            SpanpipeError::InvalidArgument(format!(
                "trace id must be 16 bytes, got {}",
                trace_id.len()
            ))
        })?;
        let parent_id: [u8; 8] = parent_id.try_into().map_err(|_| {
            SpanpipeError::InvalidArgument(format!(
                "span id must be 8 bytes, got {}",
                parent_id.len()
            ))
        })?;
        Ok(Self {
            version: 0x00,
            trace_id,
            parent_id,
            trace_flags: FLAG_SAMPLED,
            valid: true,
        })
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl FromStr for TraceParent {
    type Err = SpanpipeError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() != 4 {
            return Err(SpanpipeError::MalformedTraceParent {
                field: TraceParentField::Structure,
                value: s.to_string(),
            });
        }
        let version = decode_field::<1>(TraceParentField::Version, parts[0])?[0];
        let trace_id = decode_field::<16>(TraceParentField::TraceId, parts[1])?;
        let parent_id = decode_field::<8>(TraceParentField::ParentId, parts[2])?;
        let trace_flags = decode_field::<1>(TraceParentField::TraceFlags, parts[3])?[0];
        Ok(Self {
            version,
            trace_id,
            parent_id,
            trace_flags,
            valid: true,
        })
    }
}

impl fmt::Display for TraceParent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}-{}-{}-{:02x}",
            self.version,
            hex::encode(self.trace_id),
            hex::encode(self.parent_id),
            self.trace_flags
        )
    }
}

fn decode_field<const N: usize>(field: TraceParentField, part: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(part).map_err(|_| SpanpipeError::MalformedTraceParent {
        field,
        value: part.to_string(),
    })?;
    <[u8; N]>::try_from(bytes).map_err(|_| SpanpipeError::MalformedTraceParent {
        field,
        value: part.to_string(),
    })
}
