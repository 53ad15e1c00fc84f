//! # Persistence Writer
//!
//! Serializes a session's accumulated PCM chunks into a single WAV file at
//! teardown. The write goes to a `.part` sibling first and is renamed into
//! place after `finalize`, so a partially written file is never left as the
//! final artifact. One best-effort attempt per session; a failure is the
//! caller's to log, never to escalate.

use crate::error::AppResult;
use crate::relay::format::AudioFormat;
use byteorder::{LittleEndian, ReadBytesExt};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::info;

/// Write a session's buffered chunks as one WAV file at `output_path`.
///
/// Returns `Ok(None)` without touching the filesystem when the buffer is
/// empty — a session that received no audio leaves no artifact. A trailing
/// partial sample at the very end of the stream is dropped at encode time;
/// everything decodable is written in receipt order.
pub fn write_session_wav(
    output_path: &Path,
    format: AudioFormat,
    chunks: &[Vec<u8>],
) -> AppResult<Option<PathBuf>> {
    if chunks.iter().all(|chunk| chunk.is_empty()) {
        return Ok(None);
    }

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let part_path = output_path.with_extension("wav.part");
    let mut writer = hound::WavWriter::create(&part_path, format.wav_spec())?;

    // Chunks may split samples across frame boundaries, so decode the
    // concatenated stream rather than chunk by chunk
    let pcm: Vec<u8> = chunks.iter().flatten().copied().collect();
    let mut cursor = Cursor::new(pcm.as_slice());
    let mut sample_count = 0usize;

    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        writer.write_sample(sample)?;
        sample_count += 1;
    }

    writer.finalize()?;
    fs::rename(&part_path, output_path)?;

    info!(
        path = %output_path.display(),
        chunks = chunks.len(),
        samples = sample_count,
        "Session audio persisted"
    );

    Ok(Some(output_path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_empty_buffer_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");

        let result = write_session_wav(&path, AudioFormat::default(), &[]).unwrap();
        assert!(result.is_none());
        assert!(!path.exists());

        // Chunks that are all zero-length count as an empty buffer too
        let result =
            write_session_wav(&path, AudioFormat::default(), &[Vec::new(), Vec::new()]).unwrap();
        assert!(result.is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_wav_round_trips_concatenated_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.wav");
        let format = AudioFormat::default();

        let chunks = vec![pcm(&[1, -2, 300]), pcm(&[-400, 5]), pcm(&[32767, -32768])];
        let written = write_session_wav(&path, format, &chunks).unwrap();
        assert_eq!(written, Some(path.clone()));

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec(), format.wav_spec());
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![1, -2, 300, -400, 5, 32767, -32768]);

        // No .part leftover after a successful write
        assert!(!path.with_extension("wav.part").exists());
    }

    #[test]
    fn test_sample_split_across_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("split.wav");

        // 0x0102 split across two chunks, plus a dangling trailing byte
        let chunks = vec![vec![0x02], vec![0x01, 0xFF]];
        write_session_wav(&path, AudioFormat::default(), &chunks).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0x0102]);
    }

    #[test]
    fn test_missing_output_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out").join("session.wav");

        let written =
            write_session_wav(&path, AudioFormat::default(), &[pcm(&[7, 8])]).unwrap();
        assert!(written.unwrap().exists());
    }
}
