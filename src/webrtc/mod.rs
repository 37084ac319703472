//! WebRTC publishing module
//!
//! Provides the peer connection wrapper, the outbound camera streaming
//! pipeline and the inbound display sink used by the session controller.

pub mod display;
pub mod peer;
pub mod streaming;

pub use display::RemoteDisplay;
pub use peer::PeerConnection;
pub use streaming::{CameraStreamer, EncodedFrame, H264Encoder, StreamConfig};
