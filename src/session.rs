//! Session controller.
//!
//! Owns the full lifecycle of one peer connection: construction with the
//! configured relay, the ordered data channel with its heartbeat, the
//! camera streaming pump, the offer/answer exchange and idempotent
//! teardown. At most one session exists at a time; a second start is
//! refused while one is live.
//!
//! Negotiations are tagged with a generation number that is bumped by
//! every start and stop. A negotiation whose generation no longer
//! matches the live session (a stop raced the HTTP exchange) is
//! discarded instead of touching the torn-down connection.

use crate::camera::FrameSource;
use crate::config::CamcastConfig;
use crate::errors::CamcastError;
use crate::signaling::SignalingClient;
use crate::webrtc::display::RemoteDisplay;
use crate::webrtc::peer::PeerConnection;
use crate::webrtc::streaming::{CameraStreamer, StreamConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use webrtc::data_channel::RTCDataChannel;

/// Observable session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Negotiating,
    Open,
    Closed,
}

type HeartbeatSlot = Arc<StdMutex<Option<JoinHandle<()>>>>;

/// Resources owned by one live session. The channel and heartbeat exist
/// only while the connection exists and are released before it.
struct ActiveSession {
    generation: u64,
    peer: Arc<PeerConnection>,
    channel: Arc<RTCDataChannel>,
    heartbeat: HeartbeatSlot,
    streamer: CameraStreamer,
}

/// Controller for the process-wide single session
pub struct SessionController {
    config: CamcastConfig,
    display: Arc<RemoteDisplay>,
    signaling: SignalingClient,
    active: Mutex<Option<ActiveSession>>,
    generation: AtomicU64,
    state: StdMutex<SessionState>,
}

impl SessionController {
    pub fn new(
        config: CamcastConfig,
        display: Arc<RemoteDisplay>,
    ) -> Result<Self, CamcastError> {
        config.validate().map_err(CamcastError::InitializationError)?;
        let signaling = SignalingClient::new(&config.signaling)?;

        Ok(Self {
            config,
            display,
            signaling,
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
            state: StdMutex::new(SessionState::Idle),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().map(|s| *s).unwrap_or(SessionState::Idle)
    }

    fn set_state(&self, state: SessionState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }

    pub async fn is_active(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Whether the live session has committed a remote description
    pub async fn has_remote_description(&self) -> bool {
        let guard = self.active.lock().await;
        match guard.as_ref() {
            Some(session) => session.peer.remote_description().await.is_some(),
            None => false,
        }
    }

    /// Start a session: connection, data channel, camera, negotiation.
    ///
    /// Setup failures and negotiation failures are logged and returned;
    /// neither is retried. A failed negotiation leaves the session live:
    /// the connection and stream stay up until an explicit stop.
    pub async fn start(&self) -> Result<(), CamcastError> {
        let generation;
        let peer;
        {
            let mut active = self.active.lock().await;
            if active.is_some() {
                return Err(CamcastError::StreamError(
                    "A session is already active".to_string(),
                ));
            }

            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            self.set_state(SessionState::Connecting);

            match self.open_session(generation).await {
                Ok(session) => {
                    peer = Arc::clone(&session.peer);
                    *active = Some(session);
                }
                Err(e) => {
                    self.set_state(SessionState::Idle);
                    log::error!("Failed to start session: {}", e);
                    return Err(e);
                }
            }
        }

        // Negotiate outside the session lock so stop() stays responsive
        // while the HTTP exchange is in flight.
        self.set_state(SessionState::Negotiating);
        match self.negotiate(generation, peer).await {
            Ok(()) => {
                self.set_state(SessionState::Open);
                log::info!("Negotiation completed successfully");
                Ok(())
            }
            Err(e) => {
                log::error!("Negotiation failed: {}", e);
                Err(e)
            }
        }
    }

    /// Build the session resources under the controller lock
    async fn open_session(&self, generation: u64) -> Result<ActiveSession, CamcastError> {
        log::info!("Starting session (generation {})", generation);

        let peer = Arc::new(
            PeerConnection::new(
                uuid::Uuid::new_v4().to_string(),
                &self.config.ice.servers,
                Some(Arc::clone(&self.display)),
            )
            .await?,
        );

        let channel = peer
            .create_data_channel(&self.config.stream.channel_label)
            .await?;
        let heartbeat = wire_heartbeat(&channel, self.config.stream.heartbeat_interval_ms);

        // Every local track must be attached before the offer is created.
        let source = FrameSource::open(&self.config.camera)?;
        let track = peer.add_video_track("camcast").await?;
        let streamer = CameraStreamer::spawn(StreamConfig::from_config(&self.config), source, track);

        self.display.show();

        Ok(ActiveSession {
            generation,
            peer,
            channel,
            heartbeat,
            streamer,
        })
    }

    /// Offer → ICE-complete → HTTP exchange → answer, strictly in order
    async fn negotiate(
        &self,
        generation: u64,
        peer: Arc<PeerConnection>,
    ) -> Result<(), CamcastError> {
        peer.create_offer().await?;

        let ice_deadline = Duration::from_millis(self.config.signaling.timeout_ms);
        tokio::time::timeout(ice_deadline, peer.wait_for_ice_gathering_complete())
            .await
            .map_err(|_| {
                CamcastError::SignalingError("Timed out waiting for ICE gathering".to_string())
            })?;

        let local = peer.local_description().await.ok_or_else(|| {
            CamcastError::SignalingError(
                "No local description after ICE gathering".to_string(),
            )
        })?;

        let answer = self.signaling.exchange_offer(&local).await?;

        if self.generation.load(Ordering::SeqCst) != generation {
            log::warn!(
                "Discarding stale negotiation result (generation {})",
                generation
            );
            return Err(CamcastError::SignalingError(
                "Negotiation superseded by session stop".to_string(),
            ));
        }

        peer.set_remote_answer(answer).await
    }

    /// Idempotent teardown. Safe to call with no active session; every
    /// step is guarded by presence checks.
    pub async fn stop(&self) {
        // Invalidate any in-flight negotiation before releasing resources.
        self.generation.fetch_add(1, Ordering::SeqCst);

        // Hold the slot for the whole teardown so a concurrent start
        // cannot begin building while resources are still being released.
        let mut active = self.active.lock().await;
        match active.take() {
            Some(mut session) => {
                log::info!("Stopping session (generation {})", session.generation);

                if let Err(e) = session.channel.close().await {
                    log::warn!("Error closing data channel: {}", e);
                }
                if let Ok(mut guard) = session.heartbeat.lock() {
                    if let Some(task) = guard.take() {
                        task.abort();
                    }
                }
                session.streamer.stop();
                session.peer.teardown().await;

                self.display.unbind();
                self.display.hide();
                self.set_state(SessionState::Closed);
            }
            None => {
                log::debug!("Stop requested with no active session");
                self.display.hide();
            }
        }
    }
}

/// Install open/close handlers on the data channel: the heartbeat task
/// exists exactly while the channel is open.
fn wire_heartbeat(channel: &Arc<RTCDataChannel>, interval_ms: u64) -> HeartbeatSlot {
    let slot: HeartbeatSlot = Arc::new(StdMutex::new(None));

    let channel_for_open = Arc::clone(channel);
    let slot_for_open = Arc::clone(&slot);
    channel.on_open(Box::new(move || {
        let channel = Arc::clone(&channel_for_open);
        let slot = Arc::clone(&slot_for_open);
        Box::pin(async move {
            log::info!("Data channel open, starting heartbeat");

            let task = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
                loop {
                    ticker.tick().await;
                    let message = format!("ping {}", chrono::Utc::now().timestamp_millis());
                    match channel.send_text(message.clone()).await {
                        Ok(_) => log::debug!("Sent heartbeat: {}", message),
                        Err(e) => {
                            log::warn!("Heartbeat send failed: {}", e);
                            break;
                        }
                    }
                }
            });

            if let Ok(mut guard) = slot.lock() {
                if let Some(previous) = guard.replace(task) {
                    previous.abort();
                }
            }
        })
    }));

    let slot_for_close = Arc::clone(&slot);
    channel.on_close(Box::new(move || {
        log::info!("Data channel closed, cancelling heartbeat");
        if let Ok(mut guard) = slot_for_close.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
        Box::pin(async {})
    }));

    channel.on_error(Box::new(move |e| {
        log::error!("Data channel error: {}", e);
        Box::pin(async {})
    }));

    slot
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CamcastConfig {
        let mut config = CamcastConfig::default();
        // Host-only candidates and a synthetic source keep unit tests
        // independent of network and hardware.
        config.ice.servers.clear();
        config.camera.synthetic_fallback = true;
        config.camera.resolution = [64, 48];
        config
    }

    #[tokio::test]
    async fn test_controller_starts_idle() {
        let controller = SessionController::new(test_config(), RemoteDisplay::new()).unwrap();
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(!controller.is_active().await);
        assert!(!controller.has_remote_description().await);
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let controller = SessionController::new(test_config(), RemoteDisplay::new()).unwrap();
        controller.stop().await;
        controller.stop().await;
        assert!(!controller.is_active().await);
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = test_config();
        config.stream.heartbeat_interval_ms = 0;
        assert!(SessionController::new(config, RemoteDisplay::new()).is_err());
    }
}
