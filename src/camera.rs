//! Local camera access (video only).
//!
//! Wraps nokhwa for device listing and RGB frame capture, and provides a
//! synthetic test-pattern source so the streaming pipeline can run on
//! machines without a physical camera.

use crate::config::CameraConfig;
use crate::errors::CamcastError;
use crate::types::{CameraDeviceInfo, CameraFormat, CameraFrame};
use nokhwa::{
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType},
    CallbackCamera,
};

/// List available cameras
pub fn list_cameras() -> Result<Vec<CameraDeviceInfo>, CamcastError> {
    let cameras = query(ApiBackend::Auto).map_err(|e| {
        CamcastError::InitializationError(format!("Failed to query cameras: {}", e))
    })?;

    let mut device_list = Vec::new();
    for camera_info in cameras {
        let mut device =
            CameraDeviceInfo::new(camera_info.index().to_string(), camera_info.human_name());

        device = device.with_description(camera_info.description().to_string());

        // Common formats; the capture request below lets the backend pick.
        let formats = vec![
            CameraFormat::new(1920, 1080, 30.0),
            CameraFormat::new(1280, 720, 30.0),
            CameraFormat::new(640, 480, 30.0),
        ];
        device = device.with_formats(formats);

        device_list.push(device);
    }

    Ok(device_list)
}

/// Live camera capture handle
pub struct CameraCapture {
    camera: CallbackCamera,
    device_id: String,
    format: CameraFormat,
}

impl CameraCapture {
    /// Open the configured camera without starting the stream
    pub fn new(config: &CameraConfig) -> Result<Self, CamcastError> {
        let device_index = config
            .device_id
            .parse::<u32>()
            .map_err(|_| CamcastError::InitializationError("Invalid device ID".to_string()))?;

        let requested_format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);

        let camera = CallbackCamera::new(
            CameraIndex::Index(device_index),
            requested_format,
            |_| {},
        )
        .map_err(|e| {
            CamcastError::InitializationError(format!("Failed to initialize camera: {}", e))
        })?;

        let [width, height] = config.resolution;
        Ok(Self {
            camera,
            device_id: config.device_id.clone(),
            format: CameraFormat::new(width, height, config.fps as f32),
        })
    }

    pub fn start_stream(&mut self) -> Result<(), CamcastError> {
        self.camera
            .open_stream()
            .map_err(|e| CamcastError::CaptureError(format!("Failed to open stream: {}", e)))
    }

    /// Capture and decode one frame to RGB8
    pub fn capture_frame(&mut self) -> Result<CameraFrame, CamcastError> {
        let buffer = self
            .camera
            .poll_frame()
            .map_err(|e| CamcastError::CaptureError(format!("Failed to capture frame: {}", e)))?;

        let decoded = buffer.decode_image::<RgbFormat>().map_err(|e| {
            CamcastError::CaptureError(format!("Failed to decode frame to RGB: {}", e))
        })?;

        let (width, height) = (decoded.width(), decoded.height());
        Ok(CameraFrame::new(
            decoded.into_raw(),
            width,
            height,
            self.device_id.clone(),
        ))
    }

    pub fn stop_stream(&mut self) -> Result<(), CamcastError> {
        self.camera
            .stop_stream()
            .map_err(|e| CamcastError::CaptureError(format!("Failed to stop stream: {}", e)))
    }

    pub fn format(&self) -> &CameraFormat {
        &self.format
    }
}

/// Synthetic test-pattern source for camera-less operation
pub struct SyntheticSource {
    width: u32,
    height: u32,
    frame_counter: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_counter: 0,
        }
    }

    /// Generate the next test frame: alternating light/dark pattern with
    /// per-frame variation so the encoder sees motion.
    pub fn next_frame(&mut self) -> CameraFrame {
        let pattern = (self.frame_counter / 30) % 2;
        let pixel_value = if pattern == 0 { 16u8 } else { 235u8 };

        let mut data = vec![pixel_value; (self.width * self.height * 3) as usize];
        for (i, value) in data.iter_mut().enumerate() {
            *value = value.saturating_add(((self.frame_counter as usize + i) % 32) as u8);
        }

        self.frame_counter += 1;
        CameraFrame::new(data, self.width, self.height, "synthetic".to_string())
    }
}

/// Frame source for the streaming pipeline: a real camera, or the
/// synthetic pattern when none is available and fallback is allowed.
pub enum FrameSource {
    Camera(CameraCapture),
    Synthetic(SyntheticSource),
}

impl FrameSource {
    /// Open the configured camera, falling back to the synthetic source
    /// when permitted by configuration.
    pub fn open(config: &CameraConfig) -> Result<Self, CamcastError> {
        match CameraCapture::new(config) {
            Ok(camera) => Ok(FrameSource::Camera(camera)),
            Err(e) if config.synthetic_fallback => {
                log::warn!("Camera unavailable ({}), using synthetic source", e);
                Ok(FrameSource::synthetic(config))
            }
            Err(e) => Err(e),
        }
    }

    pub fn synthetic(config: &CameraConfig) -> Self {
        let [width, height] = config.resolution;
        FrameSource::Synthetic(SyntheticSource::new(width, height))
    }

    pub fn start(&mut self) -> Result<(), CamcastError> {
        match self {
            FrameSource::Camera(camera) => camera.start_stream(),
            FrameSource::Synthetic(_) => Ok(()),
        }
    }

    pub fn next_frame(&mut self) -> Result<CameraFrame, CamcastError> {
        match self {
            FrameSource::Camera(camera) => camera.capture_frame(),
            FrameSource::Synthetic(synthetic) => Ok(synthetic.next_frame()),
        }
    }

    pub fn stop(&mut self) {
        if let FrameSource::Camera(camera) = self {
            if let Err(e) = camera.stop_stream() {
                log::warn!("Error stopping camera stream: {}", e);
            }
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, FrameSource::Synthetic(_))
    }
}
