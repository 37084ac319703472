//! Inbound video sink.
//!
//! Plays the role of a video display surface: accepts the first inbound
//! video track, drains its RTP and keeps receive counters, and carries
//! the visibility flag that is toggled around the session lifetime.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use webrtc::track::track_remote::TrackRemote;

struct BoundTrack {
    track_id: String,
    reader: JoinHandle<()>,
}

/// Display sink for the first inbound video track
pub struct RemoteDisplay {
    visible: AtomicBool,
    bound: Mutex<Option<BoundTrack>>,
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
}

impl RemoteDisplay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            visible: AtomicBool::new(false),
            bound: Mutex::new(None),
            packets_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
        })
    }

    pub fn show(&self) {
        self.visible.store(true, Ordering::Relaxed);
    }

    pub fn hide(&self) {
        self.visible.store(false, Ordering::Relaxed);
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Relaxed)
    }

    /// Bind an inbound video track. Only the first track is accepted;
    /// later arrivals are ignored.
    pub fn bind_track(self: &Arc<Self>, track: Arc<TrackRemote>) {
        let mut bound = match self.bound.lock() {
            Ok(guard) => guard,
            Err(_) => {
                log::error!("Display bind lock poisoned, dropping inbound track");
                return;
            }
        };

        if let Some(existing) = bound.as_ref() {
            log::debug!(
                "Display already bound to track {}, ignoring track {}",
                existing.track_id,
                track.id()
            );
            return;
        }

        let track_id = track.id();
        log::info!("Binding inbound video track {} to display", track_id);

        let display = Arc::clone(self);
        let reader_track_id = track_id.clone();
        let reader = tokio::spawn(async move {
            loop {
                match track.read_rtp().await {
                    Ok((packet, _)) => {
                        display.packets_received.fetch_add(1, Ordering::Relaxed);
                        display
                            .bytes_received
                            .fetch_add(packet.payload.len() as u64, Ordering::Relaxed);
                    }
                    Err(e) => {
                        log::debug!("Inbound track {} ended: {}", reader_track_id, e);
                        break;
                    }
                }
            }
        });

        *bound = Some(BoundTrack { track_id, reader });
    }

    /// Detach the bound track, if any
    pub fn unbind(&self) {
        if let Ok(mut bound) = self.bound.lock() {
            if let Some(existing) = bound.take() {
                existing.reader.abort();
                log::debug!("Unbound inbound track {}", existing.track_id);
            }
        }
    }

    pub fn is_bound(&self) -> bool {
        self.bound.lock().map(|b| b.is_some()).unwrap_or(false)
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }
}
