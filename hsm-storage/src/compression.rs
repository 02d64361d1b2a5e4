//! Threshold-gated deflate codec for `payload`/`context`/`meta` fields.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use hsm_core::{HsmResult, InvalidData};
use hsm_dsl::CompressionConfig;
use serde_json::Value as Json;
use std::io::{Read, Write};

/// Before/after byte counts for one `encode` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionStats {
    pub original: usize,
    pub compressed: usize,
    pub ratio: f64,
    pub savings_percent: f64,
    pub was_compressed: bool,
}

/// Encodes/decodes field bytes per a machine definition's `compression.*`
/// config: deflate above `threshold`, skip when it wouldn't help, sniff the
/// zlib header on the way back in so legacy uncompressed JSON still decodes.
#[derive(Debug, Clone)]
pub struct CompressionCodec {
    config: CompressionConfig,
}

impl CompressionCodec {
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    /// Encode `data` for `field`, honoring `compression.enabled` and
    /// `compression.fields`. Fields not listed pass through unchanged.
    pub fn encode_field(&self, field: &str, data: &[u8]) -> Vec<u8> {
        if !self.config.enabled || !self.config.fields.iter().any(|f| f == field) {
            return data.to_vec();
        }
        self.encode(data)
    }

    /// Deflate `data` at the configured level if it is at least `threshold`
    /// bytes and compression actually shrinks it; otherwise return it as-is.
    pub fn encode(&self, data: &[u8]) -> Vec<u8> {
        if data.len() < self.config.threshold {
            return data.to_vec();
        }
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(self.config.level));
        encoder.write_all(data).expect("in-memory encoder never fails");
        let compressed = encoder.finish().expect("in-memory encoder never fails");
        if compressed.len() < data.len() {
            compressed
        } else {
            data.to_vec()
        }
    }

    /// Inflate `data` if it carries a zlib header, otherwise treat it as raw
    /// JSON. Either way, the result must parse as JSON or this fails with
    /// `InvalidData`.
    pub fn decode(&self, data: &[u8]) -> HsmResult<Vec<u8>> {
        let raw = if is_zlib_header(data) {
            let mut decoder = ZlibDecoder::new(data);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out).map_err(|e| InvalidData::Decompression { reason: e.to_string() })?;
            out
        } else {
            data.to_vec()
        };

        serde_json::from_slice::<Json>(&raw).map_err(|e| InvalidData::Json { reason: e.to_string() })?;
        Ok(raw)
    }

    pub fn stats(&self, original: &[u8]) -> CompressionStats {
        let compressed = self.encode(original);
        let was_compressed = compressed.len() < original.len();
        let ratio = if original.is_empty() {
            1.0
        } else {
            compressed.len() as f64 / original.len() as f64
        };
        CompressionStats {
            original: original.len(),
            compressed: compressed.len(),
            ratio,
            savings_percent: (1.0 - ratio) * 100.0,
            was_compressed,
        }
    }
}

/// zlib's RFC 1950 framing: `CMF` low nibble 8 (deflate), and the two-byte
/// header must be a multiple of 31.
fn is_zlib_header(data: &[u8]) -> bool {
    if data.len() < 2 {
        return false;
    }
    let cmf = data[0];
    let flg = data[1];
    (cmf & 0x0f) == 8 && (u16::from(cmf) * 256 + u16::from(flg)) % 31 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: usize) -> CompressionConfig {
        CompressionConfig { enabled: true, level: 6, fields: vec!["payload".into()], threshold }
    }

    #[test]
    fn round_trips_compressed_json() {
        let codec = CompressionCodec::new(config(10));
        let data = serde_json::to_vec(&serde_json::json!({"a": "b".repeat(200)})).unwrap();
        let encoded = codec.encode(&data);
        assert!(encoded.len() < data.len());
        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn small_payloads_stay_uncompressed() {
        let codec = CompressionCodec::new(config(100));
        let data = b"{\"a\":1}".to_vec();
        let encoded = codec.encode(&data);
        assert_eq!(encoded, data);
        assert_eq!(codec.decode(&encoded).unwrap(), data);
    }

    #[test]
    fn decode_is_backward_compatible_with_raw_json() {
        let codec = CompressionCodec::new(config(100));
        let raw = serde_json::to_vec(&serde_json::json!({"legacy": true})).unwrap();
        assert_eq!(codec.decode(&raw).unwrap(), raw);
    }

    #[test]
    fn encode_field_skips_unlisted_fields() {
        let codec = CompressionCodec::new(config(1));
        let data = b"x".repeat(200);
        assert_eq!(codec.encode_field("meta", &data), data);
        assert_ne!(codec.encode_field("payload", &data), data);
    }

    #[test]
    fn decode_corrupt_zlib_header_is_invalid_data() {
        let codec = CompressionCodec::new(config(1));
        let mut corrupt = vec![0x78, 0x9c];
        corrupt.extend_from_slice(&[0xff; 16]);
        assert!(codec.decode(&corrupt).is_err());
    }

    #[test]
    fn stats_reports_savings_for_compressible_data() {
        let codec = CompressionCodec::new(config(10));
        let data = b"a".repeat(1000);
        let stats = codec.stats(&data);
        assert!(stats.was_compressed);
        assert!(stats.compressed < stats.original);
        assert!(stats.savings_percent > 0.0);
    }

    #[test]
    fn unicode_payload_round_trips() {
        let codec = CompressionCodec::new(config(1));
        let data = serde_json::to_vec(&serde_json::json!({"text": "Türkçe 中文 🚀"})).unwrap();
        let encoded = codec.encode(&data);
        assert_eq!(codec.decode(&encoded).unwrap(), data);
    }
}
