//! # Configuration Management
//!
//! Loads application configuration from layered sources:
//! - Built-in defaults
//! - TOML configuration file (config.toml)
//! - Environment variables with an `APP_` prefix
//! - `HOST`/`PORT` overrides used by deployment platforms
//!
//! The audio wire format lives here because it is fixed configuration, not
//! something negotiated per connection: every inbound chunk is interpreted
//! at the configured rate/channels/depth, and the same values stamp the
//! persisted WAV files.

use crate::relay::classifier::SilenceClassifier;
use crate::relay::format::AudioFormat;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audio: AudioFormat,
    pub relay: RelayConfig,
    pub storage: StorageConfig,
}

/// HTTP/WebSocket listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Maximum accepted WebSocket frame size in bytes. Audio chunks can be
    /// large, so 0 means unlimited and is the default.
    pub max_frame_size_bytes: usize,
}

/// Silence-gating behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Scoring strategy: "peak" (max amplitude) or "rms" (normalized RMS).
    /// A session keeps the strategy it was created with.
    pub classifier: String,

    /// Peak-amplitude threshold on the signed 16-bit range (0..=32767).
    /// Lower is more sensitive to noise, higher calls faint speech silence.
    pub silence_threshold: u32,

    /// Normalized RMS threshold in (0, 1], used when classifier = "rms".
    pub rms_threshold: f32,

    /// Stop relaying once this much consecutive silence has accumulated.
    pub max_silence_secs: f64,
}

/// Where session recordings land.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub output_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                max_frame_size_bytes: 0, // unlimited
            },
            audio: AudioFormat::default(),
            relay: RelayConfig {
                classifier: "peak".to_string(),
                silence_threshold: 800,
                rms_threshold: 0.005,
                max_silence_secs: 1.0,
            },
            storage: StorageConfig {
                output_dir: "received_audio".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration in priority order: defaults, then config.toml,
    /// then `APP_*` environment variables, then `HOST`/`PORT` overrides.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms commonly inject these without the APP_ prefix
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// The audio format is pinned to what the sample decoder handles:
    /// 16-bit signed little-endian mono. The sample rate is free as long
    /// as it is positive.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("Audio sample rate must be greater than 0"));
        }

        if self.audio.channels != 1 {
            return Err(anyhow::anyhow!("Only mono audio is supported"));
        }

        if self.audio.bit_depth != 16 {
            return Err(anyhow::anyhow!("Only 16-bit PCM is supported"));
        }

        match self.relay.classifier.as_str() {
            "peak" | "rms" => {}
            other => {
                return Err(anyhow::anyhow!(
                    "Unknown classifier '{}': expected 'peak' or 'rms'",
                    other
                ));
            }
        }

        if self.relay.silence_threshold > 32767 {
            return Err(anyhow::anyhow!(
                "Silence threshold must be within the 16-bit sample range (0..=32767)"
            ));
        }

        if !(self.relay.rms_threshold > 0.0 && self.relay.rms_threshold <= 1.0) {
            return Err(anyhow::anyhow!("RMS threshold must be in (0, 1]"));
        }

        if self.relay.max_silence_secs <= 0.0 {
            return Err(anyhow::anyhow!("Max silence duration must be positive"));
        }

        if self.storage.output_dir.is_empty() {
            return Err(anyhow::anyhow!("Output directory cannot be empty"));
        }

        Ok(())
    }

    /// Build the classifier for a new session from the current settings.
    /// Sessions already in flight keep the classifier they started with.
    pub fn build_classifier(&self) -> SilenceClassifier {
        match self.relay.classifier.as_str() {
            "rms" => SilenceClassifier::Rms {
                threshold: self.relay.rms_threshold,
            },
            // validate() has pinned the variants down to these two
            _ => SilenceClassifier::PeakAmplitude {
                threshold: self.relay.silence_threshold as i32,
            },
        }
    }

    /// Apply a partial update from a JSON body (runtime config endpoint).
    /// Only the fields present in the JSON are touched; the result is
    /// re-validated before it is accepted.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial_config.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;
            }
            if let Some(size) = server.get("max_frame_size_bytes").and_then(|v| v.as_u64()) {
                self.server.max_frame_size_bytes = size as usize;
            }
        }

        if let Some(relay) = partial_config.get("relay") {
            if let Some(classifier) = relay.get("classifier").and_then(|v| v.as_str()) {
                self.relay.classifier = classifier.to_string();
            }
            if let Some(threshold) = relay.get("silence_threshold").and_then(|v| v.as_u64()) {
                self.relay.silence_threshold = threshold as u32;
            }
            if let Some(threshold) = relay.get("rms_threshold").and_then(|v| v.as_f64()) {
                self.relay.rms_threshold = threshold as f32;
            }
            if let Some(secs) = relay.get("max_silence_secs").and_then(|v| v.as_f64()) {
                self.relay.max_silence_secs = secs;
            }
        }

        if let Some(storage) = partial_config.get("storage") {
            if let Some(dir) = storage.get("output_dir").and_then(|v| v.as_str()) {
                self.storage.output_dir = dir.to_string();
            }
        }

        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.relay.silence_threshold, 800);
        assert_eq!(config.relay.max_silence_secs, 1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.relay.classifier = "fft".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.relay.silence_threshold = 40000;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.relay.max_silence_secs = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.bit_depth = 24;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_update() {
        let mut config = AppConfig::default();
        let json = r#"{"relay": {"silence_threshold": 1200, "max_silence_secs": 2.5}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.relay.silence_threshold, 1200);
        assert_eq!(config.relay.max_silence_secs, 2.5);
        // Untouched fields remain at their previous values
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.storage.output_dir, "received_audio");
    }

    #[test]
    fn test_config_update_rejects_invalid() {
        let mut config = AppConfig::default();
        let json = r#"{"relay": {"classifier": "magic"}}"#;
        assert!(config.update_from_json(json).is_err());
    }

    #[test]
    fn test_build_classifier_variants() {
        let mut config = AppConfig::default();
        assert_eq!(
            config.build_classifier(),
            SilenceClassifier::PeakAmplitude { threshold: 800 }
        );

        config.relay.classifier = "rms".to_string();
        assert_eq!(
            config.build_classifier(),
            SilenceClassifier::Rms { threshold: 0.005 }
        );
    }
}
