//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! KV负载的JSON序列化器，可选gzip压缩。
//!
//! 读取时按gzip魔数判断负载是否压缩，因此开关压缩后旧负载仍可读取。

use super::Serializer;
use crate::error::{Result, SyncError};
use serde::{de::DeserializeOwned, Serialize};

/// gzip 头部魔数
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// JSON序列化器
#[derive(Clone, Debug, Default)]
pub struct JsonSerializer {
    compress: bool,
}

impl JsonSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入时压缩负载（需要 `flate2` 特性，否则写入明文）
    pub fn with_compression() -> Self {
        Self { compress: true }
    }

    pub fn is_compressed(&self) -> bool {
        self.compress
    }
}

fn serialization_error(e: impl ToString) -> SyncError {
    SyncError::Serialization(e.to_string())
}

#[cfg(feature = "flate2")]
fn gzip(plain: Vec<u8>) -> Result<Vec<u8>> {
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::with_capacity(plain.len() / 2), Compression::fast());
    encoder.write_all(&plain).map_err(serialization_error)?;
    encoder.finish().map_err(serialization_error)
}

#[cfg(not(feature = "flate2"))]
fn gzip(plain: Vec<u8>) -> Result<Vec<u8>> {
    Ok(plain)
}

#[cfg(feature = "flate2")]
fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::read::GzDecoder;
    use std::io::Read;

    let mut plain = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut plain)
        .map_err(serialization_error)?;
    Ok(plain)
}

#[cfg(not(feature = "flate2"))]
fn gunzip(_data: &[u8]) -> Result<Vec<u8>> {
    Err(SyncError::Serialization(
        "payload is gzip-compressed but the flate2 feature is disabled".to_string(),
    ))
}

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let plain = serde_json::to_vec(value).map_err(serialization_error)?;
        if self.compress {
            gzip(plain)
        } else {
            Ok(plain)
        }
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        if data.starts_with(&GZIP_MAGIC) {
            let plain = gunzip(data)?;
            serde_json::from_slice(&plain).map_err(serialization_error)
        } else {
            serde_json::from_slice(data).map_err(serialization_error)
        }
    }
}
