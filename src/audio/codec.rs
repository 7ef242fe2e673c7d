// PCM codec for the live session wire format
//
// The remote model speaks 16-bit signed little-endian PCM, carried as base64 text
// inside JSON payloads. Frame boundaries are known out of band (fixed block size),
// so neither encoding adds any framing of its own.

use base64::Engine;

use crate::error::{CoachError, CoachResult};

/// Scale between normalized float samples and 16-bit PCM.
pub const PCM_SCALE: f32 = 32768.0;

/// Convert float samples in [-1, 1] to 16-bit LE PCM bytes.
///
/// Each sample maps to `round(s * 32768)`, clamped to the i16 range so that a
/// full-scale `1.0` lands on `i16::MAX` instead of wrapping.
pub fn encode_frame(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .map(|&s| {
            let scaled = (s * PCM_SCALE).round();
            scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
        })
        .flat_map(|s| s.to_le_bytes())
        .collect()
}

/// Convert 16-bit LE PCM bytes back to per-channel float planes.
///
/// Interleaved sample `i` belongs to channel `i % channels`.
pub fn decode_frame(bytes: &[u8], channels: u16) -> CoachResult<Vec<Vec<f32>>> {
    if channels == 0 {
        return Err(CoachError::Decode("channel count must be at least 1".to_string()));
    }
    if bytes.len() % 2 != 0 {
        return Err(CoachError::Decode(format!(
            "odd PCM byte length {}",
            bytes.len()
        )));
    }

    let channels = channels as usize;
    let frames = bytes.len() / 2 / channels;
    let mut planes = vec![Vec::with_capacity(frames); channels];

    for (i, pair) in bytes.chunks_exact(2).enumerate() {
        let sample = i16::from_le_bytes([pair[0], pair[1]]);
        planes[i % channels].push(sample as f32 / PCM_SCALE);
    }

    Ok(planes)
}

/// Binary to printable text (standard base64).
pub fn encode_transport(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Printable text back to binary.
pub fn decode_transport(text: &str) -> CoachResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(text)
        .map_err(|e| CoachError::Decode(format!("invalid base64 payload: {}", e)))
}
