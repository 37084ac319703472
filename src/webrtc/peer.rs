//! Peer connection construction and lifecycle.
//!
//! One connection per session, configured from the ICE server list and
//! max-bundle policy. Three observers are registered at construction:
//! inbound track arrival (bound to the display), connection state changes
//! (logged), and local candidate discovery (logged; candidates are
//! gathered into the single offer rather than trickled).

use crate::config::IceServerConfig;
use crate::errors::CamcastError;
use crate::webrtc::display::RemoteDisplay;
use std::sync::Arc;
use tokio::sync::oneshot;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_H264};
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_gathering_state::RTCIceGatheringState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Convert configured ICE servers to the webrtc-rs form
fn build_ice_servers(servers: &[IceServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|server| RTCIceServer {
            urls: vec![server.url.clone()],
            username: server.username.clone().unwrap_or_default(),
            credential: server.credential.clone().unwrap_or_default(),
            ..Default::default()
        })
        .collect()
}

/// Single peer connection owned by the session controller
pub struct PeerConnection {
    id: String,
    inner: Arc<RTCPeerConnection>,
}

impl PeerConnection {
    /// Create the connection and register its observers.
    ///
    /// `display` receives the first inbound video track; if absent, track
    /// arrival is logged as an error and the track is ignored.
    pub async fn new(
        id: String,
        ice_servers: &[IceServerConfig],
        display: Option<Arc<RemoteDisplay>>,
    ) -> Result<Self, CamcastError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().map_err(|e| {
            CamcastError::InitializationError(format!("Failed to register codecs: {}", e))
        })?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| {
                CamcastError::InitializationError(format!(
                    "Failed to register interceptors: {}",
                    e
                ))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: build_ice_servers(ice_servers),
            bundle_policy: RTCBundlePolicy::MaxBundle,
            ..Default::default()
        };

        let inner = Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
            CamcastError::InitializationError(format!("Failed to create peer connection: {}", e))
        })?);

        // Inbound media: the first video track goes to the display.
        let display_for_track = display.clone();
        let peer_id = id.clone();
        inner.on_track(Box::new(move |track, _receiver, _transceiver| {
            let display = display_for_track.clone();
            let peer_id = peer_id.clone();
            Box::pin(async move {
                if track.kind() != RTPCodecType::Video {
                    log::debug!("Peer {}: ignoring non-video inbound track", peer_id);
                    return;
                }
                match display {
                    Some(display) => display.bind_track(track),
                    None => log::error!(
                        "Peer {}: no display attached for inbound video track",
                        peer_id
                    ),
                }
            })
        }));

        // Connection state transitions are logged only.
        let peer_id = id.clone();
        inner.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            log::info!("Peer {} connection state: {:?}", peer_id, state);
            Box::pin(async {})
        }));

        // Local candidates are logged only; the completed set is embedded
        // in the offer before it is sent.
        let peer_id = id.clone();
        inner.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            match candidate {
                Some(candidate) => {
                    log::debug!("Peer {} gathered ICE candidate: {}", peer_id, candidate)
                }
                None => log::debug!("Peer {} finished ICE candidate gathering", peer_id),
            }
            Box::pin(async {})
        }));

        Ok(Self { id, inner })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn connection_state(&self) -> RTCPeerConnectionState {
        self.inner.connection_state()
    }

    /// Create the ordered, reliable data channel
    pub async fn create_data_channel(
        &self,
        label: &str,
    ) -> Result<Arc<RTCDataChannel>, CamcastError> {
        log::info!("Peer {}: creating data channel '{}'", self.id, label);

        let init = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };

        self.inner
            .create_data_channel(label, Some(init))
            .await
            .map_err(|e| {
                CamcastError::StreamError(format!("Failed to create data channel: {}", e))
            })
    }

    /// Create the outbound H.264 video track and attach it
    pub async fn add_video_track(
        &self,
        stream_id: &str,
    ) -> Result<Arc<TrackLocalStaticSample>, CamcastError> {
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_H264.to_owned(),
                clock_rate: 90000,
                channels: 0,
                sdp_fmtp_line:
                    "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f"
                        .to_owned(),
                ..Default::default()
            },
            "video".to_owned(),
            stream_id.to_owned(),
        ));

        self.inner
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| CamcastError::StreamError(format!("Failed to add video track: {}", e)))?;

        Ok(track)
    }

    /// Create an offer and commit it as the local description
    pub async fn create_offer(&self) -> Result<(), CamcastError> {
        log::info!("Peer {}: creating SDP offer", self.id);

        let offer = self
            .inner
            .create_offer(None)
            .await
            .map_err(|e| CamcastError::SignalingError(format!("Failed to create offer: {}", e)))?;

        self.inner
            .set_local_description(offer)
            .await
            .map_err(|e| {
                CamcastError::SignalingError(format!("Failed to set local description: {}", e))
            })
    }

    /// Wait until ICE gathering reaches completion.
    ///
    /// Checked synchronously first; when gathering is already complete no
    /// observer is registered. Otherwise a one-shot state observer fires
    /// the wait and is dropped again once satisfied.
    pub async fn wait_for_ice_gathering_complete(&self) {
        if self.inner.ice_gathering_state() == RTCIceGatheringState::Complete {
            return;
        }

        let (tx, rx) = oneshot::channel::<()>();
        let tx = Arc::new(std::sync::Mutex::new(Some(tx)));
        self.inner
            .on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
                if state == RTCIceGathererState::Complete {
                    if let Ok(mut guard) = tx.lock() {
                        if let Some(tx) = guard.take() {
                            let _ = tx.send(());
                        }
                    }
                }
                Box::pin(async {})
            }));

        // The state may have flipped between the check and the
        // registration; re-check so the wait cannot hang.
        if self.inner.ice_gathering_state() == RTCIceGatheringState::Complete {
            self.inner
                .on_ice_gathering_state_change(Box::new(|_| Box::pin(async {})));
            return;
        }

        let _ = rx.await;
        self.inner
            .on_ice_gathering_state_change(Box::new(|_| Box::pin(async {})));
    }

    /// Completed local description (offer plus gathered candidates)
    pub async fn local_description(&self) -> Option<RTCSessionDescription> {
        self.inner.local_description().await
    }

    pub async fn remote_description(&self) -> Option<RTCSessionDescription> {
        self.inner.remote_description().await
    }

    /// Commit the remote answer
    pub async fn set_remote_answer(
        &self,
        answer: RTCSessionDescription,
    ) -> Result<(), CamcastError> {
        log::info!("Peer {}: setting remote description", self.id);
        self.inner
            .set_remote_description(answer)
            .await
            .map_err(|e| {
                CamcastError::SignalingError(format!("Failed to set remote description: {}", e))
            })
    }

    /// Tear the connection down: remove every sending track, stop every
    /// transceiver, then close. Errors are logged, not returned, so the
    /// teardown is safe to run in any connection state.
    pub async fn teardown(&self) {
        log::info!("Peer {}: tearing down connection", self.id);

        for sender in self.inner.get_senders().await {
            if sender.track().await.is_some() {
                if let Err(e) = self.inner.remove_track(&sender).await {
                    log::debug!("Peer {}: error removing track: {}", self.id, e);
                }
            }
        }

        for transceiver in self.inner.get_transceivers().await {
            if let Err(e) = transceiver.stop().await {
                log::debug!("Peer {}: error stopping transceiver: {}", self.id, e);
            }
        }

        if let Err(e) = self.inner.close().await {
            log::warn!("Peer {}: error closing connection: {}", self.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_peer_connection_creation() {
        let peer = PeerConnection::new("test_peer".to_string(), &[], None)
            .await
            .unwrap();

        assert_eq!(peer.id(), "test_peer");
        assert_eq!(peer.connection_state(), RTCPeerConnectionState::New);
    }

    #[tokio::test]
    async fn test_offer_commits_local_description() {
        let peer = PeerConnection::new("test_peer".to_string(), &[], None)
            .await
            .unwrap();

        peer.create_data_channel("chat").await.unwrap();
        peer.create_offer().await.unwrap();

        let desc = peer.local_description().await.unwrap();
        assert!(desc.sdp.contains("v=0"));
    }

    #[tokio::test]
    async fn test_ice_wait_completes_and_is_idempotent() {
        let peer = PeerConnection::new("test_peer".to_string(), &[], None)
            .await
            .unwrap();

        peer.create_data_channel("chat").await.unwrap();
        peer.create_offer().await.unwrap();

        // No ICE servers configured: host-only gathering finishes quickly.
        tokio::time::timeout(
            Duration::from_secs(10),
            peer.wait_for_ice_gathering_complete(),
        )
        .await
        .expect("ICE gathering should complete");

        // Already complete: the second wait must return immediately.
        tokio::time::timeout(
            Duration::from_millis(100),
            peer.wait_for_ice_gathering_complete(),
        )
        .await
        .expect("completed gathering state should resolve synchronously");

        // The committed description is still available afterwards.
        assert!(peer.local_description().await.is_some());
    }

    #[tokio::test]
    async fn test_teardown_closes_connection() {
        let peer = PeerConnection::new("test_peer".to_string(), &[], None)
            .await
            .unwrap();

        peer.teardown().await;
        assert_eq!(peer.connection_state(), RTCPeerConnectionState::Closed);

        // A second teardown on a closed connection must be harmless.
        peer.teardown().await;
        assert_eq!(peer.connection_state(), RTCPeerConnectionState::Closed);
    }
}
