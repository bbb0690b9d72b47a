//! Blob envelope for engines without native blob support.
//!
//! When an engine cannot persist blobs directly, the blob is stored as an
//! object carrying a marker flag, the base64 payload and the MIME type.
//! The envelope only exists between a write and the matching read.

use crate::error::{CodecError, CodecResult};
use crate::value::{Blob, Value};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::BTreeMap;

/// Marker key identifying an encoded blob.
pub const ENVELOPE_FLAG: &str = "__local_forage_encoded_blob";
/// Key holding the base64 payload.
pub const ENVELOPE_DATA: &str = "data";
/// Key holding the MIME type.
pub const ENVELOPE_TYPE: &str = "type";

/// Wrap a blob into its storable envelope.
#[must_use]
pub fn encode_blob(blob: &Blob) -> Value {
    let mut map = BTreeMap::new();
    map.insert(ENVELOPE_FLAG.to_string(), Value::Bool(true));
    map.insert(
        ENVELOPE_DATA.to_string(),
        Value::Text(STANDARD.encode(&blob.data)),
    );
    map.insert(
        ENVELOPE_TYPE.to_string(),
        Value::Text(blob.mime_type.clone()),
    );
    Value::Object(map)
}

/// Returns true if the value is an encoded blob envelope.
#[must_use]
pub fn is_encoded_blob(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|map| map.get(ENVELOPE_FLAG))
        .is_some_and(|flag| matches!(flag, Value::Bool(true)))
}

/// Unwrap an envelope back into a blob.
///
/// # Errors
///
/// Returns an error if the value is not an envelope or the payload is not
/// valid base64.
pub fn decode_blob(value: &Value) -> CodecResult<Blob> {
    if !is_encoded_blob(value) {
        return Err(CodecError::decoding_failed("value is not an encoded blob"));
    }
    let map = value
        .as_object()
        .ok_or_else(|| CodecError::decoding_failed("envelope is not an object"))?;
    let data = map
        .get(ENVELOPE_DATA)
        .and_then(Value::as_str)
        .ok_or_else(|| CodecError::decoding_failed("envelope has no data"))?;
    let mime_type = map
        .get(ENVELOPE_TYPE)
        .and_then(Value::as_str)
        .unwrap_or_default();

    Ok(Blob::new(STANDARD.decode(data)?, mime_type))
}

/// Replace an envelope by the blob it carries; other values pass through.
///
/// # Errors
///
/// Returns an error if the value looks like an envelope but cannot be decoded.
pub fn unwrap_encoded(value: Value) -> CodecResult<Value> {
    if is_encoded_blob(&value) {
        decode_blob(&value).map(Value::Blob)
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn envelope_shape() {
        let blob = Blob::new(b"hi".to_vec(), "text/plain");
        let env = encode_blob(&blob);
        let map = env.as_object().unwrap();
        assert_eq!(map.get(ENVELOPE_FLAG), Some(&Value::Bool(true)));
        assert_eq!(map.get(ENVELOPE_DATA), Some(&Value::from("aGk=")));
        assert_eq!(map.get(ENVELOPE_TYPE), Some(&Value::from("text/plain")));
    }

    #[test]
    fn plain_values_pass_through() {
        let v = Value::from("not a blob");
        assert_eq!(unwrap_encoded(v.clone()).unwrap(), v);

        let mut map = BTreeMap::new();
        map.insert(ENVELOPE_FLAG.to_string(), Value::Bool(false));
        let lookalike = Value::Object(map);
        assert!(!is_encoded_blob(&lookalike));
        assert_eq!(unwrap_encoded(lookalike.clone()).unwrap(), lookalike);
    }

    #[test]
    fn corrupt_payload_is_an_error() {
        let mut map = BTreeMap::new();
        map.insert(ENVELOPE_FLAG.to_string(), Value::Bool(true));
        map.insert(ENVELOPE_DATA.to_string(), Value::from("***"));
        let result = decode_blob(&Value::Object(map));
        assert!(matches!(result, Err(CodecError::InvalidBase64 { .. })));
    }

    proptest! {
        #[test]
        fn envelope_preserves_length_and_type(data in proptest::collection::vec(any::<u8>(), 0..512), mime in "[a-z]{1,8}/[a-z0-9.+-]{1,12}") {
            let blob = Blob::new(data, mime);
            let decoded = decode_blob(&encode_blob(&blob)).unwrap();
            prop_assert_eq!(decoded.len(), blob.len());
            prop_assert_eq!(decoded.mime_type, blob.mime_type);
        }
    }
}
