//! # Relay Session
//!
//! Per-connection aggregate: the append-only buffer of every received PCM
//! chunk, the relay gate, the classifier chosen for the session, and the
//! identity/output-path metadata fixed at creation. A session is exclusively
//! owned by its connection coordinator — nothing else reads or mutates its
//! buffer, so no locking is needed on any of this state.

use crate::relay::classifier::SilenceClassifier;
use crate::relay::format::AudioFormat;
use crate::relay::gate::{GateDecision, RelayGate};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Full lifetime state for one connection, from accept to teardown.
pub struct RelaySession {
    /// Unique identifier for this session (UUID v4)
    pub session_id: String,

    /// Human-readable remote address, as reported by the transport
    pub remote_addr: String,

    /// When the session was created
    pub started_at: DateTime<Utc>,

    /// Where the session's audio will be persisted at teardown
    pub output_path: PathBuf,

    /// Wire format all chunks are interpreted at
    format: AudioFormat,

    /// Classifier fixed at creation; strategies are never mixed mid-session
    classifier: SilenceClassifier,

    /// Silence-gated forwarding state machine
    gate: RelayGate,

    /// Every received binary chunk, verbatim, in arrival order.
    /// Grows for the session's lifetime; never reordered or mutated.
    chunks: Vec<Vec<u8>>,

    /// Total audio bytes received
    received_bytes: usize,
}

impl RelaySession {
    /// Create a session for a freshly accepted connection.
    ///
    /// The output path is derived once, here, from the sanitized remote
    /// address, a sub-second timestamp, and a short session-id suffix, so
    /// two sessions from the same address started within the same second
    /// still get distinct, filesystem-safe filenames.
    pub fn new(
        remote_addr: String,
        output_dir: &Path,
        format: AudioFormat,
        classifier: SilenceClassifier,
        max_silence_secs: f64,
    ) -> Self {
        let session_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let output_path = output_dir.join(format!(
            "audio_{}_{}_{}.wav",
            sanitize_identity(&remote_addr),
            started_at.format("%Y%m%d_%H%M%S_%6f"),
            &session_id[..8],
        ));

        Self {
            session_id,
            remote_addr,
            started_at,
            output_path,
            format,
            classifier,
            gate: RelayGate::new(max_silence_secs),
            chunks: Vec::new(),
            received_bytes: 0,
        }
    }

    /// Feed one inbound binary chunk through the engine.
    ///
    /// The chunk is buffered unconditionally — every received byte is
    /// persisted at teardown even if never relayed — then classified, and
    /// the gate decides whether the coordinator forwards it.
    pub fn ingest(&mut self, chunk: &[u8]) -> GateDecision {
        self.chunks.push(chunk.to_vec());
        self.received_bytes += chunk.len();

        let is_silent = self.classifier.is_silent(chunk);
        let duration = self.format.chunk_duration_secs(chunk.len());
        self.gate.update(is_silent, duration)
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn gate(&self) -> &RelayGate {
        &self.gate
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn received_bytes(&self) -> usize {
        self.received_bytes
    }

    /// Consume the session, yielding the buffered chunks for persistence.
    pub fn into_chunks(self) -> Vec<Vec<u8>> {
        self.chunks
    }
}

/// Reduce a remote-address string to filesystem-safe characters.
///
/// Keeps alphanumerics, dots and dashes; everything else (colons, brackets,
/// spaces) becomes an underscore. IPv6 literals and `ip:port` pairs both
/// come out flat.
fn sanitize_identity(identity: &str) -> String {
    identity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::gate::GateEdge;

    fn test_session(max_silence_secs: f64) -> RelaySession {
        RelaySession::new(
            "127.0.0.1:51234".to_string(),
            Path::new("/tmp/relay-test"),
            AudioFormat::default(),
            SilenceClassifier::PeakAmplitude { threshold: 800 },
            max_silence_secs,
        )
    }

    fn pcm_chunk(amplitude: i16, samples: usize) -> Vec<u8> {
        std::iter::repeat(amplitude)
            .take(samples)
            .flat_map(|s| s.to_le_bytes())
            .collect()
    }

    #[test]
    fn test_ingest_buffers_unconditionally() {
        let mut session = test_session(1.0);
        let silent = pcm_chunk(50, 8000); // 0.5s of faint noise
        let loud = pcm_chunk(2000, 8000);

        // Drive the gate into the paused state
        session.ingest(&silent);
        session.ingest(&silent);
        let withheld = session.ingest(&silent);
        assert!(!withheld.should_relay);

        session.ingest(&loud);

        // All four chunks are buffered, relayed or not
        assert_eq!(session.chunk_count(), 4);
        assert_eq!(session.received_bytes(), 4 * 16000);
        let chunks = session.into_chunks();
        assert_eq!(chunks[2], silent);
        assert_eq!(chunks[3], loud);
    }

    #[test]
    fn test_relayed_bytes_are_ordered_subsequence_of_received() {
        let mut session = test_session(1.0);
        let silent = pcm_chunk(50, 8000);
        let loud = pcm_chunk(2000, 8000);

        let inbound = [&silent, &silent, &silent, &silent, &loud, &silent];
        let mut received: Vec<u8> = Vec::new();
        let mut relayed: Vec<u8> = Vec::new();

        for chunk in inbound {
            received.extend_from_slice(chunk);
            if session.ingest(chunk).should_relay {
                relayed.extend_from_slice(chunk);
            }
        }

        // Exactly the silent-while-paused chunks (3 and 4) are omitted
        let mut expected: Vec<u8> = Vec::new();
        for chunk in [&silent, &silent, &loud, &silent] {
            expected.extend_from_slice(chunk);
        }
        assert_eq!(relayed, expected);

        // And what was relayed is an order-preserving subsequence
        let mut pos = 0;
        for byte in &relayed {
            pos += received[pos..]
                .iter()
                .position(|b| b == byte)
                .expect("relayed byte missing from received stream")
                + 1;
        }
    }

    #[test]
    fn test_resume_edge_after_paused_silence() {
        let mut session = test_session(1.0);
        let silent = pcm_chunk(50, 8000);
        let loud = pcm_chunk(2000, 8000);

        session.ingest(&silent);
        session.ingest(&silent);
        assert_eq!(
            session.ingest(&silent).transitioned,
            Some(GateEdge::Pause)
        );

        let resumed = session.ingest(&loud);
        assert!(resumed.should_relay);
        assert_eq!(resumed.transitioned, Some(GateEdge::Resume));
        assert_eq!(session.gate().accumulated_silence_secs(), 0.0);
    }

    #[test]
    fn test_output_paths_are_distinct_within_one_second() {
        let a = test_session(1.0);
        let b = test_session(1.0);
        assert_ne!(a.output_path, b.output_path);
    }

    #[test]
    fn test_output_path_is_filesystem_safe() {
        let session = RelaySession::new(
            "('127.0.0.1', 51234)".to_string(),
            Path::new("out"),
            AudioFormat::default(),
            SilenceClassifier::PeakAmplitude { threshold: 800 },
            1.0,
        );
        let name = session
            .output_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap();
        assert!(name.starts_with("audio__127.0.0.1___51234__"));
        assert!(name.ends_with(".wav"));
        assert!(!name.contains(':'));
        assert!(!name.contains('('));
    }

    #[test]
    fn test_sanitize_identity() {
        assert_eq!(sanitize_identity("127.0.0.1:8080"), "127.0.0.1_8080");
        assert_eq!(sanitize_identity("[::1]:443"), "___1__443");
        assert_eq!(sanitize_identity("host-name.local"), "host-name.local");
    }
}
