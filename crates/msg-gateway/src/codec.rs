//! 信封编解码与可选压缩
//!
//! 线格式为 `compress(encode(resp))`，入站方向对称地 `decode(decompress(frame))`。

use std::io::Write;

use domain::{Req, Resp};
use flate2::write::{GzDecoder, GzEncoder};
use flate2::Compression;

use crate::error::CodecError;

pub trait Encoder: Send + Sync {
    fn encode(&self, resp: &Resp) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<Req, CodecError>;
}

/// JSON 编码，字节字段使用 base64
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl Encoder for JsonEncoder {
    fn encode(&self, resp: &Resp) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(resp).map_err(CodecError::Encode)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Req, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::Decode)
    }
}

pub trait Compressor: Send + Sync {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCompressor;

impl Compressor for GzipCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).map_err(CodecError::Compress)?;
        encoder.finish().map_err(CodecError::Compress)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut decoder = GzDecoder::new(Vec::new());
        decoder.write_all(data).map_err(CodecError::Decompress)?;
        decoder.finish().map_err(CodecError::Decompress)
    }
}
