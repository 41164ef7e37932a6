//! V4L2 camera capture.
//!
//! Streams MJPG from a camera device and decodes each frame to the RGB8
//! layout the pipeline consumes. Opening is fail-fast: a missing device or
//! an unsupported format errors out at startup instead of surfacing as an
//! endless stream of capture failures.

use std::time::Duration;

use thiserror::Error;

use vigil_core::{CaptureError, Frame, FrameSource};

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("failed to open camera {device}: {source}")]
    Open {
        device: String,
        source: std::io::Error,
    },
    #[error(
        "failed to start MJPG capture on {device} at {width}x{height}: {reason} \
         (YUYV-only cameras are not supported)"
    )]
    Start {
        device: String,
        width: u32,
        height: u32,
        reason: String,
    },
    #[error("frame capture failed: {0}")]
    Capture(#[source] std::io::Error),
    #[error("jpeg decode failed: {0}")]
    Decode(#[source] image::ImageError),
}

/// A started V4L2 camera delivering RGB8 frames.
pub struct Camera {
    inner: rscam::Camera,
    device: String,
    width: u32,
    height: u32,
}

impl Camera {
    /// Open the device and start MJPG streaming at the requested geometry.
    /// `warmup` frames are captured and discarded so auto-exposure settles
    /// before the pipeline sees anything.
    pub fn open(
        device: &str,
        width: u32,
        height: u32,
        fps: u32,
        warmup: usize,
    ) -> Result<Camera, CameraError> {
        let mut inner = rscam::Camera::new(device).map_err(|source| CameraError::Open {
            device: device.to_string(),
            source,
        })?;
        inner
            .start(&rscam::Config {
                interval: (1, fps),
                resolution: (width, height),
                format: b"MJPG",
                ..Default::default()
            })
            .map_err(|e| CameraError::Start {
                device: device.to_string(),
                width,
                height,
                reason: e.to_string(),
            })?;
        tracing::info!(device, width, height, fps, "camera started");

        for _ in 0..warmup {
            let _ = inner.capture();
            std::thread::sleep(Duration::from_millis(50));
        }
        Ok(Camera {
            inner,
            device: device.to_string(),
            width,
            height,
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Capture one frame and decode it to RGB8. The decoded size follows
    /// the JPEG header, which some drivers round away from the requested
    /// resolution.
    pub fn capture_rgb(&mut self) -> Result<Frame, CameraError> {
        let raw = self.inner.capture().map_err(CameraError::Capture)?;
        let decoded = image::load_from_memory(&raw[..]).map_err(CameraError::Decode)?;
        let rgb = decoded.to_rgb8();
        Ok(Frame::new(rgb.width(), rgb.height(), rgb.into_raw()))
    }
}

impl FrameSource for Camera {
    fn grab(&mut self) -> Result<Frame, CaptureError> {
        self.capture_rgb().map_err(|e| match e {
            CameraError::Decode(err) => CaptureError::Decode(err.to_string()),
            other => CaptureError::Device(other.to_string()),
        })
    }
}
