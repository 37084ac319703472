//! Shared test support: a minimal HTTP signaling endpoint backed by an
//! in-process answering peer, so session tests run against a real
//! offer/answer exchange over loopback without external services.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_H264};
use webrtc::api::APIBuilder;
use webrtc::data_channel::RTCDataChannel;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// State observed by tests on the remote (answering) side
pub struct RemoteEndpoint {
    /// Number of HTTP requests received
    pub requests: AtomicU64,
    /// Number of data channel messages received
    pub messages: AtomicU64,
    /// Body of the last offer POST, parsed as JSON
    pub last_offer: Mutex<Option<serde_json::Value>>,
    /// Raw header block of the last request
    pub last_headers: Mutex<Option<String>>,
    /// The answering peer connection, once created
    pub peer: Mutex<Option<Arc<RTCPeerConnection>>>,
}

impl RemoteEndpoint {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: AtomicU64::new(0),
            messages: AtomicU64::new(0),
            last_offer: Mutex::new(None),
            last_headers: Mutex::new(None),
            peer: Mutex::new(None),
        })
    }

    pub async fn close_peer(&self) {
        if let Some(pc) = self.peer.lock().await.take() {
            let _ = pc.close().await;
        }
    }
}

fn content_length(headers: &str) -> usize {
    headers
        .lines()
        .find_map(|line| {
            let lower = line.to_ascii_lowercase();
            lower
                .strip_prefix("content-length:")
                .and_then(|v| v.trim().parse().ok())
        })
        .unwrap_or(0)
}

async fn read_request(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return (String::new(), Vec::new()),
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&buf[..pos]).to_string();
            let want = content_length(&headers);
            let mut body = buf[pos + 4..].to_vec();
            while body.len() < want {
                let n = match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                body.extend_from_slice(&chunk[..n]);
            }
            return (headers, body);
        }
    }
}

async fn write_response(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// Serve a fixed response for every request. Returns the endpoint URL.
pub async fn spawn_static_endpoint(
    status: &'static str,
    body: &'static str,
) -> (String, Arc<RemoteEndpoint>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = RemoteEndpoint::new();

    let server_state = Arc::clone(&state);
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let state = Arc::clone(&server_state);
            tokio::spawn(async move {
                let (headers, body_bytes) = read_request(&mut stream).await;
                state.requests.fetch_add(1, Ordering::SeqCst);
                *state.last_headers.lock().await = Some(headers);
                if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&body_bytes) {
                    *state.last_offer.lock().await = Some(value);
                }
                write_response(&mut stream, status, body).await;
            });
        }
    });

    (format!("http://{}/api/offer/", addr), state)
}

/// Build a raw answering peer for direct (non-HTTP) exchanges
pub async fn direct_answering_peer(
) -> (Arc<RTCPeerConnection>, Arc<TrackLocalStaticSample>, Arc<RemoteEndpoint>) {
    let state = RemoteEndpoint::new();
    let (pc, track) = new_answering_peer(Arc::clone(&state)).await;
    (pc, track, state)
}

/// Feed a short synthetic H.264 pattern into the given track
pub fn start_test_pattern(track: Arc<TrackLocalStaticSample>) {
    spawn_test_pattern_writer(track);
}

async fn new_answering_peer(
    state: Arc<RemoteEndpoint>,
) -> (Arc<RTCPeerConnection>, Arc<TrackLocalStaticSample>) {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs().unwrap();
    let registry = register_default_interceptors(Registry::new(), &mut media_engine).unwrap();
    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let pc = Arc::new(
        api.new_peer_connection(RTCConfiguration::default())
            .await
            .unwrap(),
    );

    pc.on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
        let state = Arc::clone(&state);
        Box::pin(async move {
            channel.on_message(Box::new(move |_msg| {
                state.messages.fetch_add(1, Ordering::SeqCst);
                Box::pin(async {})
            }));
        })
    }));

    // A return video track so the offerer's display has something to bind.
    let video_track = Arc::new(TrackLocalStaticSample::new(
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
        "remote".to_owned(),
    ));
    pc.add_track(Arc::clone(&video_track) as Arc<dyn TrackLocal + Send + Sync>)
        .await
        .unwrap();

    (pc, video_track)
}

fn spawn_test_pattern_writer(track: Arc<TrackLocalStaticSample>) {
    tokio::spawn(async move {
        let mut encoder = match camcast::webrtc::streaming::H264Encoder::new(64, 48) {
            Ok(encoder) => encoder,
            Err(_) => return,
        };
        let mut source = camcast::camera::SyntheticSource::new(64, 48);

        for i in 0..300u64 {
            if i % 30 == 0 {
                encoder.force_keyframe();
            }
            if let Ok(frame) = encoder.encode_frame(&source.next_frame()) {
                if !frame.data.is_empty() {
                    let sample = webrtc::media::Sample {
                        data: bytes::Bytes::from(frame.data),
                        duration: Duration::from_millis(100),
                        ..Default::default()
                    };
                    let _ = track.write_sample(&sample).await;
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    });
}

/// Answer every posted offer with a real in-process peer. The response is
/// optionally delayed so tests can race a stop against the exchange.
pub async fn spawn_answering_endpoint(response_delay_ms: u64) -> (String, Arc<RemoteEndpoint>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = RemoteEndpoint::new();

    let server_state = Arc::clone(&state);
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let state = Arc::clone(&server_state);
            tokio::spawn(async move {
                let (headers, body_bytes) = read_request(&mut stream).await;
                state.requests.fetch_add(1, Ordering::SeqCst);
                *state.last_headers.lock().await = Some(headers);

                let payload: serde_json::Value = match serde_json::from_slice(&body_bytes) {
                    Ok(value) => value,
                    Err(_) => {
                        write_response(&mut stream, "400 Bad Request", "{}").await;
                        return;
                    }
                };
                *state.last_offer.lock().await = Some(payload.clone());

                let sdp = payload["sdp"].as_str().unwrap_or_default().to_string();
                let offer = match RTCSessionDescription::offer(sdp) {
                    Ok(offer) => offer,
                    Err(_) => {
                        write_response(&mut stream, "400 Bad Request", "{}").await;
                        return;
                    }
                };

                let (pc, video_track) = new_answering_peer(Arc::clone(&state)).await;
                pc.set_remote_description(offer).await.unwrap();
                let answer = pc.create_answer(None).await.unwrap();
                pc.set_local_description(answer).await.unwrap();

                let mut gathered = pc.gathering_complete_promise().await;
                let _ = gathered.recv().await;

                let local = pc.local_description().await.unwrap();
                *state.peer.lock().await = Some(Arc::clone(&pc));
                spawn_test_pattern_writer(video_track);

                if response_delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(response_delay_ms)).await;
                }

                let body = serde_json::json!({
                    "sdp": local.sdp,
                    "type": local.sdp_type.to_string(),
                })
                .to_string();
                write_response(&mut stream, "200 OK", &body).await;
            });
        }
    });

    (format!("http://{}/api/offer/", addr), state)
}

/// Poll until `predicate` holds or `timeout` elapses; returns whether it held.
pub async fn wait_until<F>(timeout: Duration, mut predicate: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    predicate()
}
