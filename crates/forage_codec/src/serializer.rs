//! Lossless value <-> string serializer.
//!
//! Flat string stores cannot hold binary data, so byte buffers and blobs are
//! written as a marker, a four letter type tag and a base64 payload. Blobs
//! additionally carry their MIME type in a `~~local_forage_type~<mime>~`
//! prefix. Everything else is plain JSON.

use crate::error::{CodecError, CodecResult};
use crate::value::{Blob, Value};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::BTreeMap;

/// Prefix of every serialized binary payload.
pub const SERIALIZED_MARKER: &str = "__lfsc__:";
/// Prefix carrying the MIME type of a serialized blob.
pub const BLOB_TYPE_PREFIX: &str = "~~local_forage_type~";

const TYPE_BYTES: &str = "arbf";
const TYPE_BLOB: &str = "blob";
const TYPE_TAG_LEN: usize = 4;

/// Serialize a value to a string.
///
/// # Errors
///
/// Returns an error if binary data is nested inside an array or object,
/// or if a number is not finite.
pub fn serialize(value: &Value) -> CodecResult<String> {
    match value {
        Value::Bytes(bytes) => Ok(format!(
            "{SERIALIZED_MARKER}{TYPE_BYTES}{}",
            STANDARD.encode(bytes)
        )),
        Value::Blob(blob) => Ok(format!(
            "{SERIALIZED_MARKER}{TYPE_BLOB}{BLOB_TYPE_PREFIX}{}~{}",
            blob.mime_type,
            STANDARD.encode(&blob.data)
        )),
        other => {
            let json = to_json(other)?;
            serde_json::to_string(&json).map_err(|e| CodecError::encoding_failed(e.to_string()))
        }
    }
}

/// Deserialize a string produced by [`serialize`].
///
/// # Errors
///
/// Returns an error on an unknown type tag, invalid base64 or invalid JSON.
pub fn deserialize(text: &str) -> CodecResult<Value> {
    let Some(rest) = text.strip_prefix(SERIALIZED_MARKER) else {
        let json: serde_json::Value =
            serde_json::from_str(text).map_err(|e| CodecError::decoding_failed(e.to_string()))?;
        return Ok(from_json(json));
    };

    if rest.len() < TYPE_TAG_LEN || !rest.is_char_boundary(TYPE_TAG_LEN) {
        return Err(CodecError::decoding_failed("truncated type tag"));
    }
    let (tag, payload) = rest.split_at(TYPE_TAG_LEN);

    match tag {
        TYPE_BYTES => Ok(Value::Bytes(STANDARD.decode(payload)?)),
        TYPE_BLOB => {
            let (mime_type, data) = split_blob_type(payload)?;
            Ok(Value::Blob(Blob::new(STANDARD.decode(data)?, mime_type)))
        }
        other => Err(CodecError::unsupported_type(other)),
    }
}

fn split_blob_type(payload: &str) -> CodecResult<(&str, &str)> {
    let body = payload
        .strip_prefix(BLOB_TYPE_PREFIX)
        .ok_or_else(|| CodecError::decoding_failed("blob payload has no type prefix"))?;
    let end = body
        .find('~')
        .ok_or_else(|| CodecError::decoding_failed("unterminated blob type"))?;
    Ok((&body[..end], &body[end + 1..]))
}

fn to_json(value: &Value) -> CodecResult<serde_json::Value> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .ok_or_else(|| CodecError::unsupported_type("non-finite number"))?,
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(to_json).collect::<CodecResult<_>>()?)
        }
        Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), to_json(v)?)))
                .collect::<CodecResult<_>>()?,
        ),
        Value::Bytes(_) | Value::Blob(_) => {
            return Err(CodecError::unsupported_type(format!(
                "nested {}",
                value.type_name()
            )))
        }
    })
}

fn from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or_default()),
        serde_json::Value::String(s) => Value::Text(s),
        serde_json::Value::Array(items) => Value::Array(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, from_json(v)))
                .collect::<BTreeMap<_, _>>(),
        ),
    }
}
