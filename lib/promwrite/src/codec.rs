//! Wire codec for remote write payloads.
//!
//! Payloads are the Protocol Buffers encoding of a [`WriteRequest`], compressed with the Snappy block format. The
//! block format is unframed: remote write receivers expect the raw compressed block, not the Snappy stream format.
use bytes::{Bytes, BytesMut};
use prost::Message as _;
use promwrite_protos::prometheus::WriteRequest;
use snafu::ResultExt as _;

use crate::error::{Deserialize, Encoding, ExportError, Serialize, Snappy};

/// Serializes the write request.
///
/// # Errors
///
/// If the write request cannot be serialized, an error will be returned.
pub fn encode_write_request(request: &WriteRequest) -> Result<Bytes, ExportError> {
    let mut buf = BytesMut::with_capacity(request.encoded_len());
    request.encode(&mut buf).context(Serialize).context(Encoding)?;

    Ok(buf.freeze())
}

/// Deserializes a write request.
///
/// # Errors
///
/// If `buf` is not a valid serialized write request, an error will be returned.
pub fn decode_write_request(buf: &[u8]) -> Result<WriteRequest, ExportError> {
    WriteRequest::decode(buf).context(Deserialize).context(Encoding)
}

/// Compresses `buf` with the Snappy block format.
///
/// # Errors
///
/// If `buf` is too large to be compressed, an error will be returned.
pub fn compress(buf: &[u8]) -> Result<Bytes, ExportError> {
    snap::raw::Encoder::new()
        .compress_vec(buf)
        .map(Bytes::from)
        .context(Snappy { operation: "compression" })
        .context(Encoding)
}

/// Decompresses a Snappy block.
///
/// # Errors
///
/// If `buf` is not a valid Snappy block, an error will be returned.
pub fn decompress(buf: &[u8]) -> Result<Bytes, ExportError> {
    snap::raw::Decoder::new()
        .decompress_vec(buf)
        .map(Bytes::from)
        .context(Snappy {
            operation: "decompression",
        })
        .context(Encoding)
}

/// Serializes and compresses the write request, producing a payload ready to be sent.
///
/// # Errors
///
/// If the write request cannot be serialized or compressed, an error will be returned.
pub fn encode_and_compress(request: &WriteRequest) -> Result<Bytes, ExportError> {
    let encoded = encode_write_request(request)?;
    compress(&encoded)
}
