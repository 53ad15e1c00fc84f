//! # Relay Gate
//!
//! The per-session state machine that decides whether the current chunk is
//! forwarded back to the client. The gate accumulates the playback duration
//! of consecutive silent chunks and pauses the relay once that accumulation
//! reaches the configured maximum; any not-silent chunk resets the
//! accumulator and resumes immediately.
//!
//! Pure state transition plus accumulator arithmetic — no I/O, deterministic
//! given the initial state and the input sequence.

/// Whether the gate is currently forwarding chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Relaying,
    Paused,
}

/// A state transition that occurred during an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEdge {
    /// Accumulated silence reached the maximum; relay paused.
    Pause,
    /// Speech detected while paused; relay resumed.
    Resume,
}

/// Outcome of feeding one chunk through the gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateDecision {
    /// Forward the current chunk? Reflects the state *after* this update,
    /// so the chunk that trips the pause threshold is itself withheld.
    pub should_relay: bool,

    /// Set when this chunk caused a state transition.
    pub transitioned: Option<GateEdge>,
}

/// Silence-gated forwarding state machine.
///
/// Starts in `Relaying` with an empty accumulator. The pause check runs
/// against the silence accumulated *before* the current chunk, so the very
/// first chunk of a session is always relayed regardless of classification,
/// and a session that opens with silence keeps relaying until the leading
/// silence reaches the maximum.
#[derive(Debug, Clone)]
pub struct RelayGate {
    state: GateState,
    accumulated_silence_secs: f64,
    max_silence_secs: f64,
}

impl RelayGate {
    pub fn new(max_silence_secs: f64) -> Self {
        Self {
            state: GateState::Relaying,
            accumulated_silence_secs: 0.0,
            max_silence_secs,
        }
    }

    /// Apply one chunk's classification and duration.
    ///
    /// ## Transitions:
    /// - Silent: if the silence already accumulated has reached the maximum
    ///   while relaying, pause; then grow the accumulator by this chunk's
    ///   duration.
    /// - Not-silent: accumulator resets to exactly 0; if paused, resume.
    pub fn update(&mut self, is_silent: bool, chunk_duration_secs: f64) -> GateDecision {
        let mut transitioned = None;

        if is_silent {
            if self.accumulated_silence_secs >= self.max_silence_secs
                && self.state == GateState::Relaying
            {
                self.state = GateState::Paused;
                transitioned = Some(GateEdge::Pause);
            }
            self.accumulated_silence_secs += chunk_duration_secs;
        } else {
            self.accumulated_silence_secs = 0.0;
            if self.state == GateState::Paused {
                self.state = GateState::Relaying;
                transitioned = Some(GateEdge::Resume);
            }
        }

        GateDecision {
            should_relay: self.state == GateState::Relaying,
            transitioned,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn accumulated_silence_secs(&self) -> f64 {
        self.accumulated_silence_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_scenario() {
        // max silence 1.0s, three 0.5s silent chunks, then speech
        let mut gate = RelayGate::new(1.0);

        // Chunk 1: no silence accumulated yet, always relayed
        let d1 = gate.update(true, 0.5);
        assert!(d1.should_relay);
        assert_eq!(d1.transitioned, None);

        // Chunk 2: 0.5s accumulated < 1.0s, still relayed
        let d2 = gate.update(true, 0.5);
        assert!(d2.should_relay);
        assert_eq!(d2.transitioned, None);

        // Chunk 3: 1.0s accumulated >= 1.0s, gate pauses, chunk withheld
        let d3 = gate.update(true, 0.5);
        assert!(!d3.should_relay);
        assert_eq!(d3.transitioned, Some(GateEdge::Pause));

        // Speech: relayed again, accumulator reset
        let d4 = gate.update(false, 0.5);
        assert!(d4.should_relay);
        assert_eq!(d4.transitioned, Some(GateEdge::Resume));
        assert_eq!(gate.accumulated_silence_secs(), 0.0);
    }

    #[test]
    fn test_accumulator_tracks_trailing_silence() {
        let mut gate = RelayGate::new(10.0);
        gate.update(true, 0.25);
        gate.update(true, 0.5);
        gate.update(true, 0.125);
        assert_eq!(gate.accumulated_silence_secs(), 0.875);

        // Speech resets it to exactly zero
        gate.update(false, 0.5);
        assert_eq!(gate.accumulated_silence_secs(), 0.0);

        gate.update(true, 1.0);
        assert_eq!(gate.accumulated_silence_secs(), 1.0);
    }

    #[test]
    fn test_first_chunk_always_relayed() {
        // Even a silent chunk longer than the maximum is relayed when it is
        // the first thing the session hears
        let mut gate = RelayGate::new(1.0);
        let decision = gate.update(true, 5.0);
        assert!(decision.should_relay);
        assert_eq!(decision.transitioned, None);

        // The next silent chunk finds 5.0s accumulated and is withheld
        let next = gate.update(true, 0.1);
        assert!(!next.should_relay);
        assert_eq!(next.transitioned, Some(GateEdge::Pause));
    }

    #[test]
    fn test_speech_while_relaying_has_no_edge() {
        let mut gate = RelayGate::new(1.0);
        let decision = gate.update(false, 0.5);
        assert!(decision.should_relay);
        assert_eq!(decision.transitioned, None);
        assert_eq!(gate.state(), GateState::Relaying);
    }

    #[test]
    fn test_pause_edge_fires_once() {
        let mut gate = RelayGate::new(0.5);
        assert_eq!(gate.update(true, 0.5).transitioned, None);
        assert_eq!(gate.update(true, 0.5).transitioned, Some(GateEdge::Pause));
        assert_eq!(gate.update(true, 0.5).transitioned, None);
        assert_eq!(gate.state(), GateState::Paused);
    }

    #[test]
    fn test_resume_then_pause_again() {
        let mut gate = RelayGate::new(0.5);
        gate.update(true, 0.5);
        gate.update(true, 0.5); // paused
        gate.update(false, 0.5); // resumed, accumulator 0
        assert_eq!(gate.state(), GateState::Relaying);

        // Fresh silence run has to reach the maximum again
        assert!(gate.update(true, 0.4).should_relay);
        assert!(gate.update(true, 0.4).should_relay);
        assert!(!gate.update(true, 0.4).should_relay);
    }
}
