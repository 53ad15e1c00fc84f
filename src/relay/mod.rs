//! # Streaming Relay Engine
//!
//! The per-connection core of the audio relay: silence classification,
//! the silence-gated forwarding state machine, session state, the
//! process-wide session registry, and WAV persistence at teardown.
//!
//! ## Data Flow:
//! 1. A binary WebSocket frame arrives at the Connection Coordinator
//! 2. The session buffers the raw bytes (always, relayed or not)
//! 3. The silence classifier scores the chunk
//! 4. The relay gate updates its accumulator and decides forward/withhold
//! 5. On connection end the full buffer is written out as one WAV file
//!
//! ## Audio Format:
//! Raw PCM, fixed by configuration at startup: 16 kHz, mono, 16-bit
//! signed little-endian. No in-band headers, no negotiation per message.

pub mod classifier;
pub mod format;
pub mod gate;
pub mod registry;
pub mod session;
pub mod writer;
