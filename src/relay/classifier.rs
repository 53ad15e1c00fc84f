//! # Silence Classification
//!
//! Pure, stateless scoring of a single PCM chunk as silent or not-silent.
//! Two interchangeable strategies sit behind the same contract: a peak
//! amplitude check (simple, the default) and a normalized RMS check (more
//! robust against single-sample spikes). A session picks one strategy at
//! creation and never mixes them mid-stream.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Chunk-level silence decision strategy.
///
/// ## Contract:
/// `is_silent` is deterministic and side-effect free. An empty chunk (zero
/// complete samples) is silent. A trailing partial sample is skipped, not an
/// error — the wire can legitimately split a sample across frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SilenceClassifier {
    /// Silent iff the maximum absolute sample magnitude is strictly below
    /// the threshold. Threshold is on the signed 16-bit range (0..=32767).
    PeakAmplitude { threshold: i32 },

    /// Silent iff the root-mean-square of samples normalized to [-1, 1] is
    /// strictly below the threshold (a small float, e.g. 0.005).
    Rms { threshold: f32 },
}

impl SilenceClassifier {
    /// Score one raw PCM chunk (16-bit signed little-endian samples).
    pub fn is_silent(&self, chunk: &[u8]) -> bool {
        match *self {
            SilenceClassifier::PeakAmplitude { threshold } => {
                peak_amplitude(chunk) < threshold
            }
            SilenceClassifier::Rms { threshold } => match rms(chunk) {
                Some(value) => value < threshold,
                // No complete samples to score
                None => true,
            },
        }
    }
}

/// Maximum absolute sample magnitude across the chunk.
///
/// Returns 0 for an empty chunk, which classifies as silent for any
/// positive threshold. `abs` is taken in i32 space so i16::MIN is handled.
fn peak_amplitude(chunk: &[u8]) -> i32 {
    let mut cursor = Cursor::new(chunk);
    let mut max_amplitude = 0i32;

    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        max_amplitude = max_amplitude.max((sample as i32).abs());
    }

    max_amplitude
}

/// Root-mean-square of the chunk with samples normalized to [-1, 1].
///
/// Returns None when the chunk holds no complete sample.
fn rms(chunk: &[u8]) -> Option<f32> {
    let mut cursor = Cursor::new(chunk);
    let mut sum_squares = 0.0f64;
    let mut sample_count = 0usize;

    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        let normalized = sample as f64 / 32767.0;
        sum_squares += normalized * normalized;
        sample_count += 1;
    }

    if sample_count == 0 {
        return None;
    }

    Some((sum_squares / sample_count as f64).sqrt() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_empty_chunk_is_silent() {
        let peak = SilenceClassifier::PeakAmplitude { threshold: 800 };
        let rms = SilenceClassifier::Rms { threshold: 0.005 };
        assert!(peak.is_silent(&[]));
        assert!(rms.is_silent(&[]));
    }

    #[test]
    fn test_all_zero_chunk_is_silent() {
        let classifier = SilenceClassifier::PeakAmplitude { threshold: 1 };
        for samples in [1usize, 8, 1000] {
            assert!(classifier.is_silent(&pcm(&vec![0i16; samples])));
        }
    }

    #[test]
    fn test_threshold_is_strict() {
        let classifier = SilenceClassifier::PeakAmplitude { threshold: 800 };
        // A sample exactly at the threshold is not-silent
        assert!(!classifier.is_silent(&pcm(&[0, 800, 0])));
        assert!(!classifier.is_silent(&pcm(&[0, -800, 0])));
        assert!(classifier.is_silent(&pcm(&[0, 799, -799])));
    }

    #[test]
    fn test_trailing_partial_sample_ignored() {
        let classifier = SilenceClassifier::PeakAmplitude { threshold: 800 };
        let mut chunk = pcm(&[50, -30]);
        chunk.push(0xFF); // partial trailing sample
        assert!(classifier.is_silent(&chunk));

        // A lone partial byte holds no complete sample at all
        assert!(classifier.is_silent(&[0xFF]));
    }

    #[test]
    fn test_extreme_negative_sample() {
        let classifier = SilenceClassifier::PeakAmplitude { threshold: 32767 };
        // i16::MIN must not overflow when taking the absolute value
        assert!(!classifier.is_silent(&pcm(&[i16::MIN])));
    }

    #[test]
    fn test_rms_scoring() {
        let classifier = SilenceClassifier::Rms { threshold: 0.01 };
        // Faint noise well below 1% of full scale
        assert!(classifier.is_silent(&pcm(&[50, -50, 30, -30])));
        // Loud steady tone at ~30% of full scale
        assert!(!classifier.is_silent(&pcm(&[10000, -10000, 10000, -10000])));
    }
}
