//! Timed playback of a recorded bundle.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::bundle::{BundleError, BundleReader};
use crate::codec::PointCloudCodec;
use crate::schema::PointCloudFrame;

/// Playback errors.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Bundle(#[from] BundleError),
    #[error("Playback already in progress")]
    AlreadyPlaying,
    #[error("Playback is not running")]
    NotPlaying,
    #[error("Playback session already finished")]
    Finished,
}

/// Observable playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Ready,
    Playing,
    Stopped,
}

struct Advancer {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
}

/// Plays a loaded bundle once at its recorded frame rate.
///
/// `open` covers the loading states (`Closed -> Loading -> Ready`); the
/// session is `Ready` on return. `play` drives one pass over the frames
/// from a dedicated timer thread, emitting frame 0 immediately and one
/// frame every `1 / frame_rate` seconds after that, then stops on its
/// own. A second `play` while one is in progress is rejected; restart is
/// an explicit `stop` followed by reopening the bundle.
///
/// Every emission is a freshly constructed [`PointCloudFrame`] value,
/// even when consecutive frames hold identical content, so observers may
/// rely on reference-change detection to trigger re-renders.
pub struct PlaybackSession {
    frames: Arc<Vec<PointCloudFrame>>,
    frame_rate: f32,
    advancer: Option<Advancer>,
    stopped: bool,
}

impl PlaybackSession {
    /// Open a bundle directory and eagerly decode its frames.
    ///
    /// Fails when the directory is unreadable or contains no playable
    /// frames; individual undecodable payloads are skipped during load.
    pub fn open(dir: &Path, codec: &dyn PointCloudCodec) -> Result<Self, PlaybackError> {
        let loaded = BundleReader::open(dir, codec)?;
        info!(
            "opened bundle {} ({} frames at {} fps)",
            dir.display(),
            loaded.frames.len(),
            loaded.frame_rate
        );
        Ok(Self {
            frames: Arc::new(loaded.frames),
            frame_rate: loaded.frame_rate,
            advancer: None,
            stopped: false,
        })
    }

    /// Number of playable frames.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Frame advancement interval.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate as f64)
    }

    /// Current state.
    pub fn state(&self) -> PlaybackState {
        match &self.advancer {
            Some(advancer) if !advancer.done.load(Ordering::Acquire) => PlaybackState::Playing,
            Some(_) => PlaybackState::Stopped,
            None if self.stopped => PlaybackState::Stopped,
            None => PlaybackState::Ready,
        }
    }

    /// Begin the single playback pass.
    ///
    /// Valid only from `Ready`. The observer runs on the timer thread;
    /// it receives each frame as an owned, freshly built value.
    pub fn play<F>(&mut self, mut observer: F) -> Result<(), PlaybackError>
    where
        F: FnMut(PointCloudFrame) + Send + 'static,
    {
        match self.state() {
            PlaybackState::Ready => {}
            PlaybackState::Playing => return Err(PlaybackError::AlreadyPlaying),
            PlaybackState::Stopped => return Err(PlaybackError::Finished),
        }

        let frames = Arc::clone(&self.frames);
        let interval = self.frame_interval();
        let stop = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));

        let thread_stop = Arc::clone(&stop);
        let thread_done = Arc::clone(&done);
        let handle = thread::Builder::new()
            .name("playback-advance".to_string())
            .spawn(move || {
                let start = Instant::now();
                for (i, frame) in frames.iter().enumerate() {
                    if i > 0 {
                        // Deadline scheduling keeps the pass drift-free.
                        let deadline = start + interval * i as u32;
                        if let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
                            thread::sleep(remaining);
                        }
                    }
                    if thread_stop.load(Ordering::Acquire) {
                        debug!("playback halted at frame {}", i);
                        break;
                    }
                    observer(PointCloudFrame::new(
                        frame.frame_index,
                        frame.timestamp,
                        frame.points.clone(),
                    ));
                }
                thread_done.store(true, Ordering::Release);
            })
            .map_err(|e| PlaybackError::Bundle(BundleError::Io(e)))?;

        self.advancer = Some(Advancer { handle, stop, done });
        Ok(())
    }

    /// Halt playback immediately.
    ///
    /// Valid while a pass is in progress (including one that just
    /// finished on its own); no further frames are emitted after this
    /// returns.
    pub fn stop(&mut self) -> Result<(), PlaybackError> {
        let Some(advancer) = self.advancer.take() else {
            return Err(PlaybackError::NotPlaying);
        };
        advancer.stop.store(true, Ordering::Release);
        if advancer.handle.join().is_err() {
            warn!("playback observer panicked");
        }
        self.stopped = true;
        Ok(())
    }

    /// Block until the pass completes on its own.
    pub fn wait(&mut self) -> Result<(), PlaybackError> {
        let Some(advancer) = self.advancer.take() else {
            return Err(PlaybackError::NotPlaying);
        };
        if advancer.handle.join().is_err() {
            warn!("playback observer panicked");
        }
        self.stopped = true;
        Ok(())
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        if let Some(advancer) = self.advancer.take() {
            advancer.stop.store(true, Ordering::Release);
            let _ = advancer.handle.join();
        }
    }
}
