//! camcast: native WebRTC camera publisher
//!
//! This crate streams a local camera feed to a remote endpoint over a
//! single WebRTC peer connection, keeps a heartbeat flowing on an
//! ordered data channel, and negotiates the session through one HTTP
//! offer/answer round trip.
//!
//! # Features
//! - Single-session controller with explicit start/stop lifecycle
//! - Camera capture via nokhwa with a synthetic fallback source
//! - H.264 encoding and sample-level track output
//! - HTTP signaling (`POST /api/offer/`, JSON `{sdp, type}`)
//! - TURN relay support with static credentials
//!
//! # Usage
//! ```rust,no_run
//! use camcast::{CamcastConfig, RemoteDisplay, SessionController};
//!
//! # async fn run() -> Result<(), camcast::CamcastError> {
//! let config = CamcastConfig::load_or_default();
//! let controller = SessionController::new(config, RemoteDisplay::new())?;
//! controller.start().await?;
//! // ... session is live ...
//! controller.stop().await;
//! # Ok(())
//! # }
//! ```
pub mod camera;
pub mod config;
pub mod errors;
pub mod session;
pub mod signaling;
pub mod types;
pub mod webrtc;

// Re-exports for convenience
pub use config::CamcastConfig;
pub use crate::webrtc::display::RemoteDisplay;
pub use errors::CamcastError;
pub use session::{SessionController, SessionState};
pub use types::{CameraDeviceInfo, CameraFormat, CameraFrame};

/// Initialize logging for the publisher
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "camcast=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}
