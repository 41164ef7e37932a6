//! Frame types and the capture pump.
//!
//! The pump runs a dedicated producer thread that grabs frames as fast as
//! the source delivers them and overwrites a single latest-frame slot. The
//! processing loop reads a copy of that slot, so a slow consumer sees the
//! freshest frame instead of a backlog.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;

use crate::geometry::BoundingBox;

/// A decoded frame, tightly packed RGB8, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes.
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self { width, height, data }
    }

    /// Solid-color frame, useful for tests and synthetic sources.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&rgb);
        }
        Self { width, height, data }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = ((y * self.width + x) * 3) as usize;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Copy of the region under `bbox`, clamped to the frame. `None` when
    /// the clamped region is empty.
    pub fn crop(&self, bbox: &BoundingBox) -> Option<Frame> {
        let clamped = bbox.clamp(self.width, self.height);
        if clamped.is_empty() {
            return None;
        }
        let x1 = clamped.x1 as u32;
        let w = clamped.width() as u32;
        let h = clamped.height() as u32;
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in clamped.y1 as u32..clamped.y1 as u32 + h {
            let start = ((y * self.width + x1) * 3) as usize;
            data.extend_from_slice(&self.data[start..start + (w * 3) as usize]);
        }
        Some(Frame { width: w, height: h, data })
    }
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture device error: {0}")]
    Device(String),
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("frame source closed")]
    Closed,
}

/// Source of frames for the pump. Implementations block until a frame is
/// available.
pub trait FrameSource: Send {
    fn grab(&mut self) -> Result<Frame, CaptureError>;
}

/// Latest-frame holder fed by a dedicated capture thread.
pub struct FramePump {
    latest: Arc<Mutex<Option<Frame>>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FramePump {
    /// Spawn the producer thread. Grab failures are logged and the pump
    /// keeps running; the consumer simply sees a stale frame.
    pub fn start(mut source: impl FrameSource + 'static) -> FramePump {
        let latest: Arc<Mutex<Option<Frame>>> = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));

        let slot = Arc::clone(&latest);
        let run = Arc::clone(&running);
        let thread = std::thread::Builder::new()
            .name("vigil-capture".into())
            .spawn(move || {
                while run.load(Ordering::Relaxed) {
                    match source.grab() {
                        Ok(frame) => {
                            *slot.lock().unwrap() = Some(frame);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "frame grab failed");
                        }
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
            })
            .expect("failed to spawn capture thread");

        FramePump {
            latest,
            running,
            thread: Some(thread),
        }
    }

    /// Copy of the most recent frame, or `None` before the first grab.
    pub fn latest(&self) -> Option<Frame> {
        self.latest.lock().unwrap().clone()
    }

    /// Signal the producer to stop and join it.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FramePump {
    fn drop(&mut self) {
        self.stop();
    }
}
