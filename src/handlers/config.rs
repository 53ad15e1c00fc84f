use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": config_body(&config)
    })))
}

pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config
        .update_from_json(&json_str)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    state.update_config(current_config.clone())
        .map_err(AppError::ValidationError)?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated; new settings apply to sessions created from now on",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": config_body(&current_config)
    })))
}

fn config_body(config: &crate::config::AppConfig) -> serde_json::Value {
    json!({
        "server": {
            "host": config.server.host,
            "port": config.server.port,
            "max_frame_size_bytes": config.server.max_frame_size_bytes
        },
        "audio": {
            "sample_rate": config.audio.sample_rate,
            "channels": config.audio.channels,
            "bit_depth": config.audio.bit_depth
        },
        "relay": {
            "classifier": config.relay.classifier,
            "silence_threshold": config.relay.silence_threshold,
            "rms_threshold": config.relay.rms_threshold,
            "max_silence_secs": config.relay.max_silence_secs
        },
        "storage": {
            "output_dir": config.storage.output_dir
        }
    })
}
