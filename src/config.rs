//! Configuration management for camcast
//!
//! Provides configuration loading, saving, and validation for the signaling
//! endpoint, ICE servers, camera selection and stream/heartbeat settings.

use crate::errors::CamcastError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CamcastConfig {
    pub signaling: SignalingConfig,
    pub ice: IceConfig,
    pub camera: CameraConfig,
    pub stream: StreamSettings,
}

/// HTTP signaling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingConfig {
    /// Offer/answer endpoint, e.g. `http://host:port/api/offer/`
    pub endpoint: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

/// ICE server entry (`stun:` or `turn:` URL with optional credentials)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub url: String,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// ICE configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceConfig {
    pub servers: Vec<IceServerConfig>,
}

/// Camera-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Platform device index, as a string (matches device listing IDs)
    pub device_id: String,
    /// Capture resolution [width, height]
    pub resolution: [u32; 2],
    /// Capture frames per second
    pub fps: u32,
    /// Fall back to a synthetic test pattern when no camera is available
    pub synthetic_fallback: bool,
}

/// Outbound stream and data channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Target video bitrate in bps (advisory; the encoder decides)
    pub bitrate: u32,
    /// Data channel label
    pub channel_label: String,
    /// Heartbeat period on the data channel, in milliseconds
    pub heartbeat_interval_ms: u64,
}

impl Default for CamcastConfig {
    fn default() -> Self {
        Self {
            signaling: SignalingConfig {
                endpoint: "http://127.0.0.1:8080/api/offer/".to_string(),
                timeout_ms: 10_000,
            },
            ice: IceConfig {
                servers: vec![IceServerConfig {
                    url: "turn:135.181.243.125:3478?transport=udp".to_string(),
                    username: Some("user-1".to_string()),
                    credential: Some("pass-1".to_string()),
                }],
            },
            camera: CameraConfig {
                device_id: "0".to_string(),
                resolution: [1280, 720],
                fps: 30,
                synthetic_fallback: false,
            },
            stream: StreamSettings {
                bitrate: 2_000_000,
                channel_label: "chat".to_string(),
                heartbeat_interval_ms: 1000,
            },
        }
    }
}

impl CamcastConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CamcastError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            CamcastError::InitializationError(format!("Failed to read config file: {}", e))
        })?;

        let config: CamcastConfig = toml::from_str(&contents).map_err(|e| {
            CamcastError::InitializationError(format!("Failed to parse config file: {}", e))
        })?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CamcastError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CamcastError::InitializationError(format!(
                    "Failed to create config directory: {}",
                    e
                ))
            })?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| {
            CamcastError::InitializationError(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, toml_string).map_err(|e| {
            CamcastError::InitializationError(format!("Failed to write config file: {}", e))
        })?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("camcast.toml")
    }

    /// Load from default location or create with defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.signaling.endpoint.is_empty() {
            return Err("Signaling endpoint must not be empty".to_string());
        }
        if !self.signaling.endpoint.starts_with("http://")
            && !self.signaling.endpoint.starts_with("https://")
        {
            return Err("Signaling endpoint must be an http(s) URL".to_string());
        }
        if self.signaling.timeout_ms == 0 {
            return Err("Signaling timeout must be non-zero".to_string());
        }

        for server in &self.ice.servers {
            if server.url.is_empty() {
                return Err("ICE server URL must not be empty".to_string());
            }
            if !server.url.starts_with("stun:") && !server.url.starts_with("turn:") {
                return Err(format!("Invalid ICE server URL scheme: {}", server.url));
            }
            if server.url.starts_with("turn:")
                && (server.username.is_none() || server.credential.is_none())
            {
                return Err("TURN servers require username and credential".to_string());
            }
        }

        let [width, height] = self.camera.resolution;
        if width == 0 || height == 0 {
            return Err("Invalid capture resolution".to_string());
        }
        // H.264 YUV420 needs even dimensions
        if width % 2 != 0 || height % 2 != 0 {
            return Err("Capture resolution must be even in both dimensions".to_string());
        }
        if self.camera.fps == 0 || self.camera.fps > 240 {
            return Err("Invalid capture FPS (must be 1-240)".to_string());
        }

        if self.stream.channel_label.is_empty() {
            return Err("Data channel label must not be empty".to_string());
        }
        if self.stream.heartbeat_interval_ms == 0 {
            return Err("Heartbeat interval must be non-zero".to_string());
        }

        Ok(())
    }
}
