//! Outbound video streaming pipeline.
//!
//! Camera frames are resized to the stream resolution, encoded to H.264
//! access units and written as media samples to the outbound track. The
//! pump runs as one task per session and is cancelled on stop.

use crate::camera::FrameSource;
use crate::config::CamcastConfig;
use crate::errors::CamcastError;
use crate::types::CameraFrame;
use bytes::Bytes;
use openh264::encoder::{Encoder, FrameType};
use openh264::formats::YUVBuffer;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Keyframe cadence in frames
const KEYFRAME_INTERVAL: u64 = 30;

/// Convert RGB24 to YUV420 planar format
fn rgb_to_yuv420(rgb: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;

    // YUV420: Y plane (w*h) + U plane (w/2 * h/2) + V plane (w/2 * h/2)
    let y_size = w * h;
    let uv_size = (w / 2) * (h / 2);
    let mut yuv = vec![0u8; y_size + uv_size * 2];

    let (y_plane, uv_planes) = yuv.split_at_mut(y_size);
    let (u_plane, v_plane) = uv_planes.split_at_mut(uv_size);

    for y in 0..h {
        for x in 0..w {
            let rgb_idx = (y * w + x) * 3;
            let r = rgb[rgb_idx] as i32;
            let g = rgb[rgb_idx + 1] as i32;
            let b = rgb[rgb_idx + 2] as i32;

            // BT.601 conversion
            let y_val = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
            y_plane[y * w + x] = y_val.clamp(0, 255) as u8;

            // Subsample U and V (2x2 blocks)
            if y % 2 == 0 && x % 2 == 0 {
                let uv_idx = (y / 2) * (w / 2) + (x / 2);
                let u_val = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
                let v_val = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
                u_plane[uv_idx] = u_val.clamp(0, 255) as u8;
                v_plane[uv_idx] = v_val.clamp(0, 255) as u8;
            }
        }
    }

    yuv
}

/// Outbound stream parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Target bitrate in bps (advisory)
    pub bitrate: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            bitrate: 2_000_000,
        }
    }
}

impl StreamConfig {
    pub fn from_config(config: &CamcastConfig) -> Self {
        let [width, height] = config.camera.resolution;
        Self {
            width,
            height,
            fps: config.camera.fps,
            bitrate: config.stream.bitrate,
        }
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(1000 / self.fps.max(1) as u64)
    }
}

/// One encoded H.264 access unit
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub data: Vec<u8>,
    pub timestamp_ms: u64,
    pub keyframe: bool,
    pub width: u32,
    pub height: u32,
}

/// H.264 encoder bound to one stream resolution
pub struct H264Encoder {
    encoder: Encoder,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl H264Encoder {
    pub fn new(width: u32, height: u32) -> Result<Self, CamcastError> {
        let encoder = Encoder::new().map_err(|e| {
            CamcastError::EncodingError(format!("Failed to create H.264 encoder: {}", e))
        })?;

        Ok(Self {
            encoder,
            width,
            height,
            frame_count: 0,
        })
    }

    /// Encode one RGB frame to an H.264 access unit
    pub fn encode_frame(&mut self, frame: &CameraFrame) -> Result<EncodedFrame, CamcastError> {
        let expected = (self.width * self.height * 3) as usize;
        if frame.data.len() != expected {
            return Err(CamcastError::EncodingError(format!(
                "Frame size mismatch: expected {} bytes for {}x{} RGB, got {}",
                expected,
                self.width,
                self.height,
                frame.data.len()
            )));
        }

        let yuv_data = rgb_to_yuv420(&frame.data, self.width, self.height);
        let yuv_buffer =
            YUVBuffer::from_vec(yuv_data, self.width as usize, self.height as usize);

        let bitstream = self
            .encoder
            .encode(&yuv_buffer)
            .map_err(|e| CamcastError::EncodingError(format!("H.264 encoding failed: {}", e)))?;

        self.frame_count += 1;

        let keyframe = matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I);

        Ok(EncodedFrame {
            data: bitstream.to_vec(),
            timestamp_ms: frame.timestamp.timestamp_millis() as u64,
            keyframe,
            width: self.width,
            height: self.height,
        })
    }

    /// Force the next frame to be a keyframe
    pub fn force_keyframe(&mut self) {
        self.encoder.force_intra_frame();
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

/// Resize a captured frame to the stream resolution.
/// Returns the original data when dimensions already match.
pub fn prepare_frame(frame: &CameraFrame, config: &StreamConfig) -> Result<Vec<u8>, CamcastError> {
    if frame.width == config.width && frame.height == config.height {
        return Ok(frame.data.clone());
    }

    log::debug!(
        "Resizing frame from {}x{} to {}x{}",
        frame.width,
        frame.height,
        config.width,
        config.height
    );

    let img = image::RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
        .ok_or_else(|| {
            CamcastError::EncodingError(format!(
                "Failed to create image buffer from frame data (expected {} bytes for {}x{} RGB, got {})",
                frame.width as usize * frame.height as usize * 3,
                frame.width,
                frame.height,
                frame.data.len()
            ))
        })?;

    let resized = image::imageops::resize(
        &img,
        config.width,
        config.height,
        image::imageops::FilterType::Lanczos3,
    );

    Ok(resized.into_raw())
}

/// Pump task feeding the outbound video track from a frame source
pub struct CameraStreamer {
    running: Arc<AtomicBool>,
    frames_sent: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl CameraStreamer {
    /// Start the pump. The source is owned by the task and released when
    /// the pump stops.
    pub fn spawn(
        config: StreamConfig,
        mut source: FrameSource,
        track: Arc<TrackLocalStaticSample>,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let frames_sent = Arc::new(AtomicU64::new(0));

        let running_flag = Arc::clone(&running);
        let sent_counter = Arc::clone(&frames_sent);
        let task = tokio::spawn(async move {
            if let Err(e) = source.start() {
                log::error!("Failed to start frame source: {}", e);
                return;
            }

            let mut encoder = match H264Encoder::new(config.width, config.height) {
                Ok(encoder) => encoder,
                Err(e) => {
                    log::error!("Failed to create stream encoder: {}", e);
                    source.stop();
                    return;
                }
            };

            let frame_duration = config.frame_duration();
            let mut frame_counter = 0u64;

            log::info!(
                "Streaming {}x{} @ {} fps ({})",
                config.width,
                config.height,
                config.fps,
                if source.is_synthetic() { "synthetic" } else { "camera" }
            );

            while running_flag.load(Ordering::Relaxed) {
                let frame = match source.next_frame() {
                    Ok(frame) => frame,
                    Err(e) => {
                        log::warn!("Frame capture failed: {}", e);
                        tokio::time::sleep(frame_duration).await;
                        continue;
                    }
                };

                let data = match prepare_frame(&frame, &config) {
                    Ok(data) => data,
                    Err(e) => {
                        log::warn!("Frame preparation failed: {}", e);
                        continue;
                    }
                };
                let frame =
                    CameraFrame::new(data, config.width, config.height, frame.device_id.clone());

                if frame_counter % KEYFRAME_INTERVAL == 0 {
                    encoder.force_keyframe();
                }
                frame_counter += 1;

                let encoded = match encoder.encode_frame(&frame) {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        log::warn!("Frame encoding failed: {}", e);
                        continue;
                    }
                };

                if !encoded.data.is_empty() {
                    let sample = Sample {
                        data: Bytes::from(encoded.data),
                        duration: frame_duration,
                        ..Default::default()
                    };

                    if let Err(e) = track.write_sample(&sample).await {
                        log::debug!("Failed to write sample: {}", e);
                    } else {
                        sent_counter.fetch_add(1, Ordering::Relaxed);
                    }
                }

                tokio::time::sleep(frame_duration).await;
            }

            source.stop();
            log::info!("Streaming pump stopped");
        });

        Self {
            running,
            frames_sent,
            task: Some(task),
        }
    }

    /// Stop the pump and release the frame source
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }
}

impl Drop for CameraStreamer {
    fn drop(&mut self) {
        self.stop();
    }
}
