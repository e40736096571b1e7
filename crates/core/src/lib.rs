pub mod builder;
pub mod envelope;
pub mod error;
pub mod fields;
pub mod traceparent;

pub use error::{Result, SpanpipeError};
