pub mod json;

pub use json::JsonDecoder;

use crate::model::Object;
use thiserror::Error;

/// A single message body could not be deserialized into a row.
///
/// This is intentionally narrow: the core only ever catches the decoder's
/// own declared error type. A decoder that panics, or that fails for a
/// reason outside its declared `Error`, is a programmer error and is allowed
/// to propagate rather than being silently absorbed into `errors_bodies`.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to parse message body: {0}")]
    Syntax(#[from] serde_json::Error),

    #[error("decoded payload is not a flat object")]
    NotAnObject,
}

/// Pluggable payload decoder: the decoder is swappable and no field schema
/// is enforced by the core.
pub trait Decoder: Send + Sync {
    fn decode(&self, body: &[u8]) -> Result<Object, DecodeError>;
}
