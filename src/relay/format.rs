//! # PCM Wire Format
//!
//! Describes the fixed audio format every connection speaks: sample rate,
//! channel count, and bit depth. The format is read from configuration once
//! at startup and never negotiated per message, so every derived quantity
//! (bytes per second, chunk playback duration) is a pure function of it.

use serde::{Deserialize, Serialize};

/// Process-wide PCM format for inbound chunks and the persisted WAV file.
///
/// ## Defaults:
/// 16 kHz, mono, 16-bit signed little-endian — the format the relay was
/// designed around. Validation rejects anything the sample decoder cannot
/// handle (see `AppConfig::validate`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            bit_depth: 16,
        }
    }
}

impl AudioFormat {
    /// Width of one sample frame in bytes (all channels).
    pub fn sample_width_bytes(&self) -> usize {
        self.channels as usize * (self.bit_depth as usize / 8)
    }

    /// Raw PCM throughput at this format.
    ///
    /// For the default format: 16000 Hz * 1 channel * 2 bytes = 32000 B/s.
    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.sample_width_bytes()
    }

    /// Playback duration of a chunk of `len` bytes, in seconds.
    ///
    /// A trailing partial sample still counts toward the duration; the
    /// classifier is what ignores it, not the timing arithmetic.
    pub fn chunk_duration_secs(&self, len: usize) -> f64 {
        len as f64 / self.bytes_per_second() as f64
    }

    /// WAV spec for persisting a session recorded at this format.
    pub fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bit_depth,
            sample_format: hound::SampleFormat::Int,
        }
    }
}
