use std::fmt;

#[derive(Debug, Clone)]
pub enum CamcastError {
    InitializationError(String),
    CaptureError(String),
    EncodingError(String),
    StreamError(String),
    SignalingError(String),
}

impl fmt::Display for CamcastError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CamcastError::InitializationError(msg) => write!(f, "Initialization error: {}", msg),
            CamcastError::CaptureError(msg) => write!(f, "Capture error: {}", msg),
            CamcastError::EncodingError(msg) => write!(f, "Encoding error: {}", msg),
            CamcastError::StreamError(msg) => write!(f, "Stream error: {}", msg),
            CamcastError::SignalingError(msg) => write!(f, "Signaling error: {}", msg),
        }
    }
}

impl std::error::Error for CamcastError {}
