//! # Forage Codec
//!
//! Value model and encodings for forage.
//!
//! This crate provides:
//! - [`Value`] and [`Blob`], the data a forage instance stores
//! - Binary storage encoding used by engines ([`to_bytes`], [`from_bytes`])
//! - The blob envelope used when an engine cannot store blobs natively
//! - A lossless string serializer for flat string stores
//!
//! ## Usage
//!
//! ```
//! use forage_codec::{decode_blob, encode_blob, Blob};
//!
//! let blob = Blob::new(vec![0xde, 0xad], "application/octet-stream");
//! let envelope = encode_blob(&blob);
//! assert_eq!(decode_blob(&envelope).unwrap(), blob);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod envelope;
mod error;
mod serializer;
mod storage;
mod value;

pub use envelope::{
    decode_blob, encode_blob, is_encoded_blob, unwrap_encoded, ENVELOPE_DATA, ENVELOPE_FLAG,
    ENVELOPE_TYPE,
};
pub use error::{CodecError, CodecResult};
pub use serializer::{deserialize, serialize, BLOB_TYPE_PREFIX, SERIALIZED_MARKER};
pub use storage::{from_bytes, to_bytes};
pub use value::{Blob, Value};
