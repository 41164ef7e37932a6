//! The pipeline thread and its async-facing handle.
//!
//! All camera and inference work runs on one dedicated OS thread; the
//! async side talks to it through commands with oneshot replies, reads
//! the latest render payload from a shared slot, and receives notable
//! events over a channel.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use vigil_core::{
    AttributeAnalyzer, AuthPipeline, Dashboard, EnrollError, FaceDetector, FaceEncoder, FramePump,
    FrameSource, PipelineEvent, RenderFrame, TrackId,
};

use crate::store::IdentityStore;

/// Spacing between pipeline iterations, and the idle wait while the
/// capture thread has not produced a frame yet.
const LOOP_PACE: Duration = Duration::from_millis(15);

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("pipeline thread exited")]
    ChannelClosed,
    #[error(transparent)]
    Enroll(#[from] EnrollError),
}

/// Messages sent from the async side to the pipeline thread.
enum PipelineCommand {
    ArmEnroll,
    CancelEnroll,
    CompleteEnroll {
        name: String,
        reply: oneshot::Sender<Result<String, EnrollError>>,
    },
    Shutdown,
}

/// Events surfaced to the dashboard.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    Pipeline(PipelineEvent),
    /// Enrollment is armed and a capture is being held for this track.
    EnrollReady { track: TrackId },
}

/// Clone-safe handle to the pipeline thread.
#[derive(Clone)]
pub struct PipelineHandle {
    tx: mpsc::Sender<PipelineCommand>,
}

impl PipelineHandle {
    /// Start watching for an enrollable capture.
    pub async fn arm_enroll(&self) -> Result<(), RuntimeError> {
        self.tx
            .send(PipelineCommand::ArmEnroll)
            .await
            .map_err(|_| RuntimeError::ChannelClosed)
    }

    pub async fn cancel_enroll(&self) -> Result<(), RuntimeError> {
        self.tx
            .send(PipelineCommand::CancelEnroll)
            .await
            .map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Persist the held capture under the given name. Returns the new
    /// identity id.
    pub async fn complete_enroll(&self, name: &str) -> Result<String, RuntimeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PipelineCommand::CompleteEnroll {
                name: name.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        let result = reply_rx.await.map_err(|_| RuntimeError::ChannelClosed)?;
        Ok(result?)
    }

    /// Ask the pipeline thread to exit. A closed channel means it is
    /// already gone, which is fine.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(PipelineCommand::Shutdown).await;
    }
}

/// Everything the daemon front end needs: the command handle, the event
/// stream, the latest render payload, and the thread to join on exit.
pub struct PipelineRuntime {
    pub handle: PipelineHandle,
    pub events: mpsc::Receiver<RuntimeEvent>,
    pub render: Arc<Mutex<RenderFrame>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl PipelineRuntime {
    /// Wait for the pipeline thread to exit. Call after `shutdown`.
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Spawn the pipeline on a dedicated OS thread.
///
/// The frame source is handed to a capture pump; the thread then loops
/// over the freshest frame, advancing the authentication state machine
/// and publishing a render payload per iteration. Commands are drained
/// between frames. Once an enrollment capture is held the loop parks on
/// the command channel until the operator names or discards it; only
/// the capture pump keeps running underneath.
pub fn spawn_pipeline<S, D, E, A>(
    source: S,
    mut pipeline: AuthPipeline<D, E, A>,
    mut store: IdentityStore,
    mode: &str,
) -> PipelineRuntime
where
    S: FrameSource + 'static,
    D: FaceDetector + 'static,
    E: FaceEncoder + 'static,
    A: AttributeAnalyzer + 'static,
{
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<PipelineCommand>(4);
    let (event_tx, event_rx) = mpsc::channel::<RuntimeEvent>(64);
    let render = Arc::new(Mutex::new(RenderFrame::default()));

    let render_slot = Arc::clone(&render);
    let base_mode = mode.to_string();

    let thread = std::thread::Builder::new()
        .name("vigil-pipeline".into())
        .spawn(move || {
            let mut pump = FramePump::start(source);
            let mut fps = FpsCounter::new();
            tracing::info!("pipeline thread started");

            'main: loop {
                loop {
                    match cmd_rx.try_recv() {
                        Ok(PipelineCommand::ArmEnroll) => pipeline.arm_enrollment(),
                        Ok(PipelineCommand::CancelEnroll) => pipeline.cancel_enrollment(),
                        Ok(PipelineCommand::CompleteEnroll { name, reply }) => {
                            let result = pipeline.complete_enrollment(&name, &mut store);
                            let _ = reply.send(result);
                        }
                        Ok(PipelineCommand::Shutdown) => break 'main,
                        Err(mpsc::error::TryRecvError::Empty) => break,
                        Err(mpsc::error::TryRecvError::Disconnected) => break 'main,
                    }
                }

                let Some(frame) = pump.latest() else {
                    std::thread::sleep(LOOP_PACE);
                    continue;
                };

                let report = pipeline.process_frame(&frame);
                fps.tick();

                for event in report.events {
                    let _ = event_tx.try_send(RuntimeEvent::Pipeline(event));
                }

                let mode = if pipeline.enrollment_armed() {
                    format!("{base_mode} [enroll armed]")
                } else {
                    base_mode.clone()
                };
                *render_slot.lock().unwrap() = RenderFrame {
                    overlays: report.overlays,
                    dashboard: Dashboard {
                        fps: fps.value(),
                        faces: report.faces,
                        mode,
                    },
                };

                if let Some(track) = report.enroll_ready {
                    let _ = event_tx.try_send(RuntimeEvent::EnrollReady { track });
                    tracing::info!(track, "holding capture, waiting for a name");
                    // Park until the operator names or discards the held
                    // capture. Only the capture pump keeps running.
                    loop {
                        match cmd_rx.blocking_recv() {
                            Some(PipelineCommand::CompleteEnroll { name, reply }) => {
                                let result = pipeline.complete_enrollment(&name, &mut store);
                                let _ = reply.send(result);
                                break;
                            }
                            Some(PipelineCommand::CancelEnroll) => {
                                pipeline.cancel_enrollment();
                                break;
                            }
                            Some(PipelineCommand::ArmEnroll) => {}
                            Some(PipelineCommand::Shutdown) | None => break 'main,
                        }
                    }
                    continue;
                }

                std::thread::sleep(LOOP_PACE);
            }

            pump.stop();
            tracing::info!("pipeline thread exiting");
        })
        .expect("failed to spawn pipeline thread");

    PipelineRuntime {
        handle: PipelineHandle { tx: cmd_tx },
        events: event_rx,
        render,
        thread: Some(thread),
    }
}

/// Frame rate over a sliding window of recent iterations.
pub struct FpsCounter {
    samples: VecDeque<Instant>,
}

impl FpsCounter {
    const WINDOW: usize = 30;

    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(Self::WINDOW),
        }
    }

    pub fn tick(&mut self) {
        if self.samples.len() == Self::WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(Instant::now());
    }

    pub fn value(&self) -> f32 {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        let elapsed = last.duration_since(*first).as_secs_f32();
        if self.samples.len() < 2 || elapsed <= 0.0 {
            return 0.0;
        }
        (self.samples.len() - 1) as f32 / elapsed
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use vigil_core::{
        CaptureError, Detection, Embedding, FaceAttributes, Frame, PipelineConfig,
        BoundingBox,
    };

    struct StaticSource(Frame);

    impl FrameSource for StaticSource {
        fn grab(&mut self) -> Result<Frame, CaptureError> {
            Ok(self.0.clone())
        }
    }

    struct NoDetector;

    impl FaceDetector for NoDetector {
        fn detect(&mut self, _frame: &Frame) -> Vec<Detection> {
            vec![]
        }
    }

    struct NoEncoder;

    impl FaceEncoder for NoEncoder {
        fn encode(&mut self, _frame: &Frame, _bbox: &BoundingBox) -> Option<Embedding> {
            None
        }
    }

    struct NoAnalyzer;

    impl AttributeAnalyzer for NoAnalyzer {
        fn analyze(&mut self, _frame: &Frame, _bbox: &BoundingBox) -> FaceAttributes {
            FaceAttributes::default()
        }
    }

    struct OneFace;

    impl FaceDetector for OneFace {
        fn detect(&mut self, _frame: &Frame) -> Vec<Detection> {
            vec![Detection::from_bbox(
                BoundingBox::new(220, 140, 420, 340),
                0.9,
            )]
        }
    }

    struct FixedEncoder;

    impl FaceEncoder for FixedEncoder {
        fn encode(&mut self, _frame: &Frame, _bbox: &BoundingBox) -> Option<Embedding> {
            Some(Embedding::new(vec![0.6, 0.8]))
        }
    }

    fn textured_frame() -> Frame {
        let (w, h) = (640u32, 480u32);
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                let v = if (x + y) % 2 == 0 { 190 } else { 70 };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        Frame::new(w, h, data)
    }

    fn test_runtime(mode: &str) -> PipelineRuntime {
        let store = IdentityStore::open(Path::new(":memory:")).unwrap();
        let pipeline = AuthPipeline::new(
            NoDetector,
            NoEncoder,
            NoAnalyzer,
            PipelineConfig::default(),
            vec![],
        );
        spawn_pipeline(
            StaticSource(Frame::filled(64, 48, [128, 128, 128])),
            pipeline,
            store,
            mode,
        )
    }

    async fn wait_for_mode(runtime: &PipelineRuntime, wanted: &str) -> bool {
        for _ in 0..200 {
            if runtime.render.lock().unwrap().dashboard.mode == wanted {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_runtime_publishes_render_frames() {
        let mut runtime = test_runtime("test");

        assert!(wait_for_mode(&runtime, "test").await);
        {
            let render = runtime.render.lock().unwrap();
            assert_eq!(render.dashboard.faces, 0);
            assert!(render.overlays.is_empty());
        }

        let err = runtime.handle.complete_enroll("alice").await.unwrap_err();
        assert!(matches!(err, RuntimeError::Enroll(EnrollError::NotReady)));

        runtime.handle.shutdown().await;
        runtime.join();
    }

    #[tokio::test]
    async fn test_enroll_ready_pauses_until_named() {
        let store = IdentityStore::open(Path::new(":memory:")).unwrap();
        let pipeline = AuthPipeline::new(
            OneFace,
            FixedEncoder,
            NoAnalyzer,
            PipelineConfig::default(),
            vec![],
        );
        let mut runtime = spawn_pipeline(StaticSource(textured_frame()), pipeline, store, "test");

        runtime.handle.arm_enroll().await.unwrap();
        let ready = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(event) = runtime.events.recv().await {
                if let RuntimeEvent::EnrollReady { track } = event {
                    return Some(track);
                }
            }
            None
        })
        .await
        .unwrap();
        assert_eq!(ready, Some(1));

        let id = runtime.handle.complete_enroll("alice").await.unwrap();
        assert!(!id.is_empty());

        // the loop resumed and the held capture was consumed
        let err = runtime.handle.complete_enroll("bob").await.unwrap_err();
        assert!(matches!(err, RuntimeError::Enroll(EnrollError::NotReady)));

        runtime.handle.shutdown().await;
        runtime.join();
    }

    #[tokio::test]
    async fn test_arm_and_cancel_show_in_mode() {
        let mut runtime = test_runtime("demo");

        assert!(wait_for_mode(&runtime, "demo").await);
        runtime.handle.arm_enroll().await.unwrap();
        assert!(wait_for_mode(&runtime, "demo [enroll armed]").await);
        runtime.handle.cancel_enroll().await.unwrap();
        assert!(wait_for_mode(&runtime, "demo").await);

        runtime.handle.shutdown().await;
        runtime.join();
    }

    #[test]
    fn test_fps_counter() {
        let mut fps = FpsCounter::new();
        assert_eq!(fps.value(), 0.0);
        fps.tick();
        assert_eq!(fps.value(), 0.0);

        std::thread::sleep(Duration::from_millis(5));
        fps.tick();
        std::thread::sleep(Duration::from_millis(5));
        fps.tick();
        assert!(fps.value() > 0.0);
    }

    #[test]
    fn test_fps_counter_window_is_bounded() {
        let mut fps = FpsCounter::new();
        for _ in 0..(FpsCounter::WINDOW * 3) {
            fps.tick();
        }
        assert_eq!(fps.samples.len(), FpsCounter::WINDOW);
    }
}
