//! Session orchestration: camera acquisition, start/stop transitions,
//! minimum-frame gating, and handoff to the assembler.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::capture::camera::CameraSource;
use crate::error::SessionError;
use crate::pipeline::assemble::{AssembledVideo, Assembler};
use crate::pipeline::buffer::FrameBuffer;
use crate::pipeline::clock::CaptureClock;
use crate::SessionConfig;

/// Where the session currently is. At most one session is active per
/// controller at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Assembling,
}

/// State shared between the controller and the clock callback.
struct SessionInner<C> {
    camera: Option<C>,
    buffer: FrameBuffer,
    state: SessionState,
    last_capture: Option<Instant>,
}

/// Orchestrates one recording session at a time: owns the camera, the
/// capture clock, and the frame buffer, and hands completed buffers to
/// the assembler.
pub struct SessionController<C: CameraSource> {
    inner: Arc<Mutex<SessionInner<C>>>,
    clock: CaptureClock,
    assembler: Assembler,
    interval: Duration,
    min_frames: usize,
    video: Option<AssembledVideo>,
}

impl<C: CameraSource> SessionController<C> {
    pub fn new(config: &SessionConfig, assembler: Assembler) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                camera: None,
                buffer: FrameBuffer::new(),
                state: SessionState::Idle,
                last_capture: None,
            })),
            clock: CaptureClock::new(),
            assembler,
            interval: Duration::from_secs(u64::from(config.interval_secs.max(1))),
            min_frames: config.min_frames,
            video: None,
        }
    }

    /// Hand the camera to the session. The session owns it exclusively
    /// until `release_camera`.
    pub fn attach_camera(&mut self, camera: C) {
        self.inner.lock().unwrap().camera = Some(camera);
    }

    /// Stop all hardware tracks and detach the camera. Runs on drop as
    /// well, so the device lock is never leaked to other consumers.
    pub fn release_camera(&mut self) {
        self.clock.stop();
        let mut inner = self.inner.lock().unwrap();
        if let Some(mut camera) = inner.camera.take() {
            camera.release();
            info!("camera released");
        }
        inner.state = SessionState::Idle;
    }

    /// Capture interval in whole seconds; only settable while idle.
    pub fn set_interval(&mut self, secs: u32) -> Result<(), SessionError> {
        if secs < 1 {
            return Err(SessionError::InvalidInterval(secs));
        }
        if self.state() != SessionState::Idle {
            return Err(SessionError::NotIdle);
        }
        self.interval = Duration::from_secs(u64::from(secs));
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().unwrap().state
    }

    pub fn frame_count(&self) -> usize {
        self.inner.lock().unwrap().buffer.count()
    }

    /// The last assembled video, kept until a new recording replaces it.
    pub fn video(&self) -> Option<&AssembledVideo> {
        self.video.as_ref()
    }

    /// Begin recording: clears the previous video and buffer, then arms
    /// the capture clock with an immediate first capture. No-op when
    /// already recording.
    pub fn start(&mut self) -> Result<(), SessionError> {
        {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                SessionState::Recording => {
                    debug!("start ignored: already recording");
                    return Ok(());
                }
                SessionState::Assembling => return Err(SessionError::NotIdle),
                SessionState::Idle => {}
            }
            let camera = inner.camera.as_ref().ok_or(SessionError::DeviceUnavailable)?;
            if !camera.is_ready() {
                return Err(SessionError::DeviceNotReady);
            }
            inner.buffer.clear();
            inner.last_capture = None;
            inner.state = SessionState::Recording;
        }
        self.video = None;

        info!(interval_secs = self.interval.as_secs(), "recording started");
        let inner = Arc::clone(&self.inner);
        self.clock
            .start(self.interval, move || Self::capture_frame(&inner));
        Ok(())
    }

    /// End the session. `Ok(None)` when nothing was recording. With
    /// fewer than the minimum frames the session is discarded; otherwise
    /// exactly one video or one assembly error is produced. The frame
    /// buffer is empty on every path out.
    pub async fn stop(&mut self) -> Result<Option<AssembledVideo>, SessionError> {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state != SessionState::Recording {
                debug!("stop ignored: not recording");
                return Ok(None);
            }
            inner.state = SessionState::Assembling;
        }
        self.clock.stop();

        let frames = self.inner.lock().unwrap().buffer.take();
        if frames.len() < self.min_frames {
            self.inner.lock().unwrap().state = SessionState::Idle;
            info!(
                got = frames.len(),
                need = self.min_frames,
                "recording discarded: too few frames"
            );
            return Err(SessionError::InsufficientFrames {
                got: frames.len(),
                need: self.min_frames,
            });
        }

        info!(frames = frames.len(), "assembling video");
        let result = self.assembler.assemble(&frames).await;
        self.inner.lock().unwrap().state = SessionState::Idle;
        match result {
            Ok(video) => {
                self.video = Some(video.clone());
                Ok(Some(video))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Clock callback: snapshot the live camera and append the still.
    /// Never appends once the session has left Recording, which closes
    /// the race with a concurrent `stop()`.
    fn capture_frame(inner: &Mutex<SessionInner<C>>) {
        let mut inner = inner.lock().unwrap();
        if inner.state != SessionState::Recording {
            debug!("capture tick after stop; ignoring");
            return;
        }
        let camera = match inner.camera.as_mut() {
            Some(camera) => camera,
            None => {
                warn!("capture tick with no camera attached");
                return;
            }
        };
        match camera.snapshot() {
            Ok(Some(frame)) => {
                let now = frame.meta.captured_at;
                if let Some(last) = inner.last_capture {
                    let gap = now.duration_since(last);
                    debug!(gap_ms = gap.as_millis() as u64, "time since last capture");
                    metrics::histogram!("capture_gap_ms").record(gap.as_millis() as f64);
                }
                inner.last_capture = Some(now);
                inner.buffer.append(frame);
            }
            Ok(None) => {
                // Transient gap, not a session failure
                debug!("camera not ready at capture instant; frame dropped");
                inner.buffer.note_dropped();
            }
            Err(e) => {
                warn!("snapshot failed: {}; frame dropped", e);
                inner.buffer.note_dropped();
            }
        }
    }
}

impl<C: CameraSource> Drop for SessionController<C> {
    fn drop(&mut self) {
        self.release_camera();
    }
}
