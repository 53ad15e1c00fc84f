use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": "audio-relay-backend",
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "sessions": {
            "active": state.registry.active_count(),
            "pending_flushes": state.registry.pending_flushes(),
            "started": metrics.sessions_started,
            "completed": metrics.sessions_completed
        },
        "relay": {
            "audio_bytes_received": metrics.audio_bytes_received,
            "chunks_relayed": metrics.chunks_relayed,
            "chunks_withheld": metrics.chunks_withheld,
            "files_written": metrics.files_written,
            "write_failures": metrics.write_failures
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            }
        },
        "memory": get_memory_info()
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let gated_chunks = metrics.chunks_relayed + metrics.chunks_withheld;
    let relay_rate = if gated_chunks > 0 {
        metrics.chunks_relayed as f64 / gated_chunks as f64
    } else {
        0.0
    };

    let mut endpoint_stats = Vec::new();
    for (endpoint, metric) in metrics.endpoint_metrics.iter() {
        endpoint_stats.push(json!({
            "endpoint": endpoint,
            "request_count": metric.request_count,
            "error_count": metric.error_count,
            "error_rate": metric.error_rate(),
            "average_duration_ms": metric.average_duration_ms(),
            "total_duration_ms": metric.total_duration_ms
        }));
    }

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            },
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "sessions": {
            "active": state.registry.active_count(),
            "started": metrics.sessions_started,
            "completed": metrics.sessions_completed,
            "pending_flushes": state.registry.pending_flushes()
        },
        "relay": {
            "audio_bytes_received": metrics.audio_bytes_received,
            "chunks_relayed": metrics.chunks_relayed,
            "chunks_withheld": metrics.chunks_withheld,
            "relay_rate": relay_rate,
            "files_written": metrics.files_written,
            "write_failures": metrics.write_failures
        },
        "endpoints": endpoint_stats,
        "memory": get_memory_info()
    }))
}

/// Introspection over the session registry: who is connected right now.
pub async fn active_sessions(state: web::Data<AppState>) -> HttpResponse {
    let sessions: Vec<_> = state
        .registry
        .snapshot()
        .into_iter()
        .map(|(session_id, entry)| {
            json!({
                "session_id": session_id,
                "remote_addr": entry.remote_addr,
                "started_at": entry.started_at.to_rfc3339()
            })
        })
        .collect();

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "active_count": sessions.len(),
        "sessions": sessions
    }))
}

fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        let pid = std::process::id();
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", pid)) {
            let mut vm_rss = 0;
            let mut vm_size = 0;

            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        vm_rss = kb_str.parse::<u64>().unwrap_or(0) * 1024;
                    }
                } else if line.starts_with("VmSize:") {
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        vm_size = kb_str.parse::<u64>().unwrap_or(0) * 1024;
                    }
                }
            }

            return json!({
                "resident_memory_bytes": vm_rss,
                "virtual_memory_bytes": vm_size,
                "available": true
            });
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false
    })
}
