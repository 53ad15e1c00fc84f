//! # WebSocket Connection Coordinator
//!
//! Drives one relay session from accept to teardown. Clients connect to
//! `/ws/audio` and stream binary PCM frames; the coordinator buffers each
//! frame, runs it through the silence gate, and echoes it back on the same
//! connection while the gate is open.
//!
//! ## Protocol:
//! - **Client → Server**: binary frames of raw PCM (16-bit LE mono), any size
//! - **Server → Client**: the same binary frames, relayed while speech is
//!   judged present; nothing while the gate is paused
//! - **Text frames**: out-of-band signals; logged, never relayed, never
//!   buffered as audio
//!
//! ## Lifecycle:
//! Each connection is an independent actor, so its frames are processed
//! serially in arrival order and per-session state never races with itself.
//! The coordinator moves `Active → Closing → Closed`; clean close, error
//! close, and internal faults all take the same teardown path: deregister,
//! then flush the session's buffer to a WAV file off the actor thread.

use crate::relay::gate::GateEdge;
use crate::relay::session::RelaySession;
use crate::relay::writer;
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often the server pings an idle connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long without any pong before the connection is considered dead.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Coordinator lifecycle phase. `Closed` is terminal; frames arriving after
/// `Active` are dropped without processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoordinatorPhase {
    Active,
    Closing,
    Closed,
}

/// WebSocket actor owning exactly one relay session.
pub struct RelayWebSocket {
    /// Shared state: config, registry, metrics
    state: AppState,

    /// The session this coordinator owns. Taken out at teardown and handed
    /// to the persistence writer.
    session: Option<RelaySession>,

    phase: CoordinatorPhase,

    /// Last time the peer answered a heartbeat
    last_heartbeat: Instant,
}

impl RelayWebSocket {
    pub fn new(state: AppState, session: RelaySession) -> Self {
        Self {
            state,
            session: Some(session),
            phase: CoordinatorPhase::Active,
            last_heartbeat: Instant::now(),
        }
    }

    /// Buffer, classify, and gate one binary frame; relay it back if the
    /// post-update gate state allows.
    fn handle_audio_chunk(&mut self, data: web::Bytes, ctx: &mut ws::WebsocketContext<Self>) {
        let session = match self.session.as_mut() {
            Some(session) => session,
            None => return,
        };

        let decision = session.ingest(&data);
        self.state.record_chunk(data.len(), decision.should_relay);

        match decision.transitioned {
            Some(GateEdge::Pause) => {
                info!(
                    session_id = %session.session_id,
                    remote_addr = %session.remote_addr,
                    accumulated_secs = session.gate().accumulated_silence_secs(),
                    "Silence threshold reached, pausing relay"
                );
            }
            Some(GateEdge::Resume) => {
                info!(
                    session_id = %session.session_id,
                    remote_addr = %session.remote_addr,
                    "Speech detected after silence, resuming relay"
                );
            }
            None => {}
        }

        if decision.should_relay {
            // Same bytes, same connection, arrival order preserved
            ctx.binary(data);
        } else {
            debug!(
                session_id = %session.session_id,
                bytes = data.len(),
                "Chunk withheld while relay is paused"
            );
        }
    }

    /// Deregister the session and flush its buffer to disk. Runs once, from
    /// `stopped`; the write happens on a blocking task so other connections
    /// never wait on file I/O. A failed write is logged and accepted.
    fn teardown(&mut self) {
        self.phase = CoordinatorPhase::Closing;

        let session = match self.session.take() {
            Some(session) => session,
            None => {
                self.phase = CoordinatorPhase::Closed;
                return;
            }
        };

        // Idempotent: a no-op if the session was already deregistered
        self.state.registry.remove(&session.session_id);
        self.state.record_session_completed();

        info!(
            session_id = %session.session_id,
            remote_addr = %session.remote_addr,
            chunks = session.chunk_count(),
            bytes = session.received_bytes(),
            "Session closed, flushing audio"
        );

        let state = self.state.clone();
        let session_id = session.session_id.clone();
        let output_path = session.output_path.clone();
        let format = session.format();
        let chunks = session.into_chunks();

        state.registry.flush_started();
        tokio::task::spawn_blocking(move || {
            match writer::write_session_wav(&output_path, format, &chunks) {
                Ok(Some(_)) => {
                    state.record_file_written();
                }
                Ok(None) => {
                    info!(session_id = %session_id, "No audio received, nothing to persist");
                }
                Err(err) => {
                    // Best-effort contract: the session's audio is lost but
                    // teardown still completes cleanly
                    state.record_write_failure();
                    error!(
                        session_id = %session_id,
                        path = %output_path.display(),
                        error = %err,
                        "Failed to persist session audio"
                    );
                }
            }
            state.registry.flush_finished();
        });

        self.phase = CoordinatorPhase::Closed;
    }
}

impl Actor for RelayWebSocket {
    type Context = ws::WebsocketContext<Self>;

    /// Connection accepted: register the session and start heartbeats.
    fn started(&mut self, ctx: &mut Self::Context) {
        if let Some(session) = &self.session {
            self.state
                .registry
                .insert(&session.session_id, &session.remote_addr, session.started_at);
            self.state.record_session_started();

            info!(
                session_id = %session.session_id,
                remote_addr = %session.remote_addr,
                output_path = %session.output_path.display(),
                "Client connected"
            );
        }

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("WebSocket heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    /// Connection gone, whatever the cause: run the uniform teardown path.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.teardown();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for RelayWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        if self.phase != CoordinatorPhase::Active {
            return;
        }

        match msg {
            Ok(ws::Message::Binary(data)) => {
                self.handle_audio_chunk(data, ctx);
            }
            Ok(ws::Message::Text(text)) => {
                // Out-of-band signal; no control protocol is defined yet
                let session_id = self
                    .session
                    .as_ref()
                    .map(|s| s.session_id.clone())
                    .unwrap_or_default();
                debug!(session_id = %session_id, "Ignoring text frame: {}", &*text);
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(reason = ?reason, "Client closed connection");
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                // Abnormal close is handled exactly like a clean one
                error!(error = %err, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// The WebSocket frame-size cap actix should enforce. A configured 0 means
/// unlimited, since audio chunks can be arbitrarily large.
fn effective_frame_size(configured: usize) -> usize {
    if configured == 0 {
        usize::MAX
    } else {
        configured
    }
}

/// WebSocket endpoint handler: upgrades the HTTP request and hands the
/// connection to a fresh coordinator actor.
pub async fn audio_relay(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let remote_addr = req
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let config = app_state.get_config();
    let session = RelaySession::new(
        remote_addr,
        std::path::Path::new(&config.storage.output_dir),
        config.audio,
        config.build_classifier(),
        config.relay.max_silence_secs,
    );

    let coordinator = RelayWebSocket::new(app_state.get_ref().clone(), session);

    ws::WsResponseBuilder::new(coordinator, &req, stream)
        .frame_size(effective_frame_size(config.server.max_frame_size_bytes))
        .start()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_frame_size() {
        assert_eq!(effective_frame_size(0), usize::MAX);
        assert_eq!(effective_frame_size(1 << 20), 1 << 20);
    }
}
