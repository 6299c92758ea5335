//! Optional compression envelope for message-oriented transports.
//!
//! A compressed message is the character `z` followed by the base64 text of
//! the gzipped JSON. JSON text never starts with `z`, so both forms can share
//! one channel.

use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde_json::Value;

use crate::config::CompressionConfig;
use crate::error::{TransportError, TransportResult};

pub const COMPRESSED_PREFIX: char = 'z';

pub fn pack_message(message: &Value, config: &CompressionConfig) -> TransportResult<String> {
    let text = serde_json::to_string(message)?;
    if !config.enabled || text.len() <= config.threshold_bytes {
        return Ok(text);
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(text.as_bytes())
        .map_err(|e| TransportError::Compression(e.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|e| TransportError::Compression(e.to_string()))?;

    let mut packed = String::with_capacity(1 + compressed.len() * 4 / 3 + 4);
    packed.push(COMPRESSED_PREFIX);
    STANDARD.encode_string(compressed, &mut packed);
    Ok(packed)
}

pub fn unpack_message(message: &str) -> TransportResult<Value> {
    let Some(encoded) = message.strip_prefix(COMPRESSED_PREFIX) else {
        return Ok(serde_json::from_str(message)?);
    };

    let compressed = STANDARD
        .decode(encoded)
        .map_err(|e| TransportError::Compression(e.to_string()))?;
    let mut text = String::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_string(&mut text)
        .map_err(|e| TransportError::Compression(e.to_string()))?;
    Ok(serde_json::from_str(&text)?)
}
