//! Binary storage encoding.
//!
//! Engines persist values as CBOR. This plays the part of the browser's
//! structured clone: whatever a [`Value`] can hold round-trips unchanged,
//! and the encoded length is what quota accounting charges for.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Encode a value to its stored byte form.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn to_bytes(value: &Value) -> CodecResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::ser::into_writer(value, &mut buffer)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buffer)
}

/// Decode a value from its stored byte form.
///
/// # Errors
///
/// Returns an error if the bytes are not a valid encoded value.
pub fn from_bytes(bytes: &[u8]) -> CodecResult<Value> {
    ciborium::de::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}
