//! Recording session: lifecycle state machine and the background
//! encode/write worker pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

use crate::bundle::{BundleError, BundleWriter};
use crate::codec::{PointCloudCodec, QualityTier};
use crate::schema::{CaptureConfig, CompressedFrame, ConfigError, PointCloudFrame};

/// Capture session errors.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Capture session already active")]
    SessionActive,
    #[error("No recording in progress")]
    NotRecording,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Bundle(#[from] BundleError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Recording,
    Finalizing,
}

struct EncodeJob {
    index: u64,
    frame: PointCloudFrame,
}

/// Tracks outstanding encode jobs so `stop()` can await drain.
struct Pending {
    count: Mutex<u64>,
    drained: Condvar,
}

impl Pending {
    fn new() -> Self {
        Self {
            count: Mutex::new(0),
            drained: Condvar::new(),
        }
    }

    fn add_one(&self) {
        if let Ok(mut count) = self.count.lock() {
            *count += 1;
        }
    }

    fn done_one(&self) {
        if let Ok(mut count) = self.count.lock() {
            *count -= 1;
            if *count == 0 {
                self.drained.notify_all();
            }
        }
    }

    /// Wait until no jobs remain or the timeout elapses. Returns the
    /// number of jobs still outstanding.
    fn wait_drained(&self, timeout: Duration) -> u64 {
        let Ok(guard) = self.count.lock() else {
            return 0;
        };
        let (guard, _) = match self
            .drained
            .wait_timeout_while(guard, timeout, |count| *count > 0)
        {
            Ok(result) => result,
            Err(_) => return 0,
        };
        *guard
    }
}

struct ActiveRecording {
    sender: Sender<EncodeJob>,
    workers: Vec<JoinHandle<()>>,
    pending: Arc<Pending>,
    written: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    bundle: Arc<BundleWriter>,
}

/// Recording lifecycle owner: `Idle -> Recording -> Finalizing -> Idle`.
///
/// The capture tick thread is the single writer of the frame counter; it
/// hands each frame to the worker pool and returns immediately. Workers
/// encode at a tier chosen from point count and persist under the index
/// they were given; they never touch session state. `stop()` is the only
/// blocking wait in the pipeline: it drains the pool (bounded by
/// `drain_timeout_ms`), then writes the metadata descriptor exactly once.
///
/// Usage:
/// ```ignore
/// let mut session = CaptureSession::new(config, Arc::new(QuantizedCodec::new()));
/// session.start()?;
/// for tick in camera {
///     let frame = project(&tick.grid, &tick.intrinsics, 0, tick.time);
///     session.submit_frame(frame)?;
/// }
/// let stats = session.stop()?;
/// ```
pub struct CaptureSession {
    config: CaptureConfig,
    codec: Arc<dyn PointCloudCodec>,
    state: SessionState,
    frame_counter: u64,
    active: Option<ActiveRecording>,
}

impl CaptureSession {
    pub fn new(config: CaptureConfig, codec: Arc<dyn PointCloudCodec>) -> Self {
        Self {
            config,
            codec,
            state: SessionState::Idle,
            frame_counter: 0,
            active: None,
        }
    }

    /// Whether a recording is in progress.
    pub fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }

    /// Frames submitted so far in the current recording.
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Begin recording into a freshly created bundle directory.
    ///
    /// Valid only from idle; starting while a recording is active fails
    /// with [`CaptureError::SessionActive`]. A name collision with an
    /// existing bundle directory is a fatal setup error, never an
    /// overwrite.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.state != SessionState::Idle {
            return Err(CaptureError::SessionActive);
        }
        self.config.validate()?;

        let bundle = Arc::new(BundleWriter::create(
            &self.config.base_dir,
            &self.config.bundle_prefix,
            self.codec.extension(),
        )?);

        let (sender, receiver) = channel::<EncodeJob>();
        let receiver = Arc::new(Mutex::new(receiver));
        let pending = Arc::new(Pending::new());
        let written = Arc::new(AtomicU64::new(0));
        let dropped = Arc::new(AtomicU64::new(0));

        let workers = (0..self.config.workers)
            .map(|i| {
                let receiver = Arc::clone(&receiver);
                let codec = Arc::clone(&self.codec);
                let bundle = Arc::clone(&bundle);
                let pending = Arc::clone(&pending);
                let written = Arc::clone(&written);
                let dropped = Arc::clone(&dropped);
                thread::Builder::new()
                    .name(format!("encode-worker-{}", i))
                    .spawn(move || {
                        worker_loop(&receiver, codec.as_ref(), &bundle, &pending, &written, &dropped)
                    })
                    .map_err(BundleError::Io)
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!("recording started into {}", bundle.dir().display());
        self.frame_counter = 0;
        self.active = Some(ActiveRecording {
            sender,
            workers,
            pending,
            written,
            dropped,
            bundle,
        });
        self.state = SessionState::Recording;
        Ok(())
    }

    /// Dispatch one captured frame to the encode pool.
    ///
    /// Never blocks on encode or I/O. The session assigns the frame its
    /// sequence index and returns it; the frame's own index field is
    /// overwritten so the bundle ordering is owned by the session alone.
    pub fn submit_frame(&mut self, frame: PointCloudFrame) -> Result<u64, CaptureError> {
        if self.state != SessionState::Recording {
            return Err(CaptureError::NotRecording);
        }
        let Some(active) = &self.active else {
            return Err(CaptureError::NotRecording);
        };

        let index = self.frame_counter;
        self.frame_counter += 1;

        let job = EncodeJob {
            index,
            frame: PointCloudFrame {
                frame_index: index,
                ..frame
            },
        };
        active.pending.add_one();
        if active.sender.send(job).is_err() {
            // Worker pool gone; count the frame as dropped.
            active.pending.done_one();
            active.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("encode pool unavailable, dropping frame {}", index);
        }
        Ok(index)
    }

    /// Stop recording: drain the pool, finalize the metadata descriptor,
    /// return to idle.
    ///
    /// Blocks until every dispatched job has completed or the drain
    /// timeout elapses; jobs past the deadline are abandoned (their
    /// frames are missing from the bundle, logged, not fatal). The
    /// metadata `frameCount` counts successfully written frames.
    pub fn stop(&mut self) -> Result<CaptureStats, CaptureError> {
        if self.state != SessionState::Recording {
            return Err(CaptureError::NotRecording);
        }
        let Some(active) = self.active.take() else {
            return Err(CaptureError::NotRecording);
        };
        self.state = SessionState::Finalizing;

        // Closing the channel lets workers exit once the queue is empty.
        drop(active.sender);

        let timeout = Duration::from_millis(self.config.drain_timeout_ms);
        let abandoned = active.pending.wait_drained(timeout);
        if abandoned > 0 {
            warn!(
                "drain timeout after {:?}: abandoning {} in-flight frames",
                timeout, abandoned
            );
            // Leave stragglers running to completion; joining would block
            // finalize indefinitely.
        } else {
            for worker in active.workers {
                if worker.join().is_err() {
                    warn!("encode worker panicked during recording");
                }
            }
        }

        let written = active.written.load(Ordering::Acquire);
        let dropped = active.dropped.load(Ordering::Acquire);
        let stats = CaptureStats {
            attempted: self.frame_counter,
            written,
            dropped,
            abandoned,
            bundle_dir: active.bundle.dir().to_path_buf(),
        };

        // Return to idle even when finalize fails.
        let finalized = active.bundle.finalize(written, self.config.frame_rate);
        self.state = SessionState::Idle;
        finalized?;
        info!("recording stopped: {}", stats);
        Ok(stats)
    }
}

fn worker_loop(
    receiver: &Mutex<Receiver<EncodeJob>>,
    codec: &dyn PointCloudCodec,
    bundle: &BundleWriter,
    pending: &Pending,
    written: &AtomicU64,
    dropped: &AtomicU64,
) {
    loop {
        let job = {
            let Ok(guard) = receiver.lock() else {
                break;
            };
            guard.recv()
        };
        let Ok(job) = job else {
            break;
        };

        let tier = QualityTier::for_point_count(job.frame.len());
        match codec.encode(&job.frame, tier) {
            Ok(bytes) => {
                // The session owns the compressed frame until the write
                // lands; afterwards the filesystem copy is authoritative.
                let compressed = CompressedFrame {
                    frame_index: job.index,
                    bytes,
                };
                match bundle.write_frame(compressed.frame_index, &compressed.bytes) {
                    Ok(()) => {
                        written.fetch_add(1, Ordering::Release);
                        debug!(
                            "frame {} written ({} points, {} bytes, {:?})",
                            compressed.frame_index,
                            job.frame.len(),
                            compressed.bytes.len(),
                            tier
                        );
                    }
                    Err(e) => {
                        dropped.fetch_add(1, Ordering::Release);
                        warn!("dropping frame {}: write failed: {}", job.index, e);
                    }
                }
            }
            Err(e) => {
                dropped.fetch_add(1, Ordering::Release);
                warn!("dropping frame {}: encode failed: {}", job.index, e);
            }
        }
        pending.done_one();
    }
}

/// Diagnostics from one recording session.
#[derive(Debug, Clone)]
pub struct CaptureStats {
    /// Frames submitted to the session.
    pub attempted: u64,
    /// Frames durably written to the bundle; this is the metadata
    /// `frameCount`.
    pub written: u64,
    /// Frames dropped by encode or write failures.
    pub dropped: u64,
    /// Frames abandoned at the drain timeout.
    pub abandoned: u64,
    /// The bundle directory this session produced.
    pub bundle_dir: std::path::PathBuf,
}

impl std::fmt::Display for CaptureStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} attempted, {} written, {} dropped, {} abandoned -> {}",
            self.attempted,
            self.written,
            self.dropped,
            self.abandoned,
            self.bundle_dir.display()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{BundleMetadata, METADATA_FILE};
    use crate::codec::QuantizedCodec;
    use crate::schema::Point3;
    use std::fs;
    use tempfile::tempdir;

    fn test_session(base: &std::path::Path) -> CaptureSession {
        let config = CaptureConfig {
            base_dir: base.to_path_buf(),
            bundle_prefix: "test".to_string(),
            frame_rate: 10.0,
            workers: 2,
            drain_timeout_ms: 5_000,
        };
        CaptureSession::new(config, Arc::new(QuantizedCodec::new()))
    }

    fn frame_with(count: usize) -> PointCloudFrame {
        let points = (0..count)
            .map(|i| Point3::new(i as f32 * 0.01, -0.5, 1.5))
            .collect();
        PointCloudFrame::new(0, 0.0, points)
    }

    fn read_metadata(dir: &std::path::Path) -> BundleMetadata {
        let json = fs::read_to_string(dir.join(METADATA_FILE)).unwrap();
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_record_stop_produces_finalized_bundle() {
        let dir = tempdir().unwrap();
        let mut session = test_session(dir.path());

        session.start().unwrap();
        assert!(session.is_recording());
        for i in 0..8 {
            let index = session.submit_frame(frame_with(10 + i)).unwrap();
            assert_eq!(index, i as u64);
        }
        let stats = session.stop().unwrap();

        assert_eq!(stats.attempted, 8);
        assert_eq!(stats.written, 8);
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.abandoned, 0);
        assert!(!session.is_recording());

        let metadata = read_metadata(&stats.bundle_dir);
        assert_eq!(metadata.frame_count, 8);
        assert!((metadata.frame_rate - 10.0).abs() < 1e-6);

        for i in 0..8 {
            assert!(stats.bundle_dir.join(format!("frame_{:04}.qpc", i)).exists());
        }
    }

    #[test]
    fn test_start_while_recording_rejected() {
        let dir = tempdir().unwrap();
        let mut session = test_session(dir.path());
        session.start().unwrap();
        assert!(matches!(session.start(), Err(CaptureError::SessionActive)));
        let stats = session.stop().unwrap();

        // Bundle names have one-second granularity; remove the first
        // bundle so a same-second restart does not collide with it.
        fs::remove_dir_all(&stats.bundle_dir).unwrap();

        // Back to idle: a new recording may start.
        session.start().unwrap();
        session.submit_frame(frame_with(1)).unwrap();
        session.stop().unwrap();
    }

    #[test]
    fn test_submit_and_stop_require_recording() {
        let dir = tempdir().unwrap();
        let mut session = test_session(dir.path());
        assert!(matches!(
            session.submit_frame(frame_with(1)),
            Err(CaptureError::NotRecording)
        ));
        assert!(matches!(session.stop(), Err(CaptureError::NotRecording)));
    }

    #[test]
    fn test_encode_failure_drops_frame_not_session() {
        let dir = tempdir().unwrap();
        let mut session = test_session(dir.path());
        session.start().unwrap();

        session.submit_frame(frame_with(3)).unwrap();
        // Non-finite position: encode rejects, frame dropped.
        session
            .submit_frame(PointCloudFrame::new(
                0,
                0.0,
                vec![Point3::new(f32::NAN, 0.0, 1.0)],
            ))
            .unwrap();
        session.submit_frame(frame_with(3)).unwrap();

        let stats = session.stop().unwrap();
        assert_eq!(stats.attempted, 3);
        assert_eq!(stats.written, 2);
        assert_eq!(stats.dropped, 1);

        // frameCount counts successes, never exceeding files on disk.
        let metadata = read_metadata(&stats.bundle_dir);
        assert_eq!(metadata.frame_count, 2);
        let files = fs::read_dir(&stats.bundle_dir)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .path()
                    .extension()
                    .is_some_and(|x| x == "qpc")
            })
            .count();
        assert_eq!(files as u64, metadata.frame_count);
        // The dropped frame leaves a gap at index 1.
        assert!(stats.bundle_dir.join("frame_0000.qpc").exists());
        assert!(!stats.bundle_dir.join("frame_0001.qpc").exists());
        assert!(stats.bundle_dir.join("frame_0002.qpc").exists());
    }

    #[test]
    fn test_empty_frames_persist() {
        let dir = tempdir().unwrap();
        let mut session = test_session(dir.path());
        session.start().unwrap();
        for _ in 0..4 {
            session.submit_frame(frame_with(0)).unwrap();
        }
        let stats = session.stop().unwrap();
        assert_eq!(stats.written, 4);
        assert_eq!(read_metadata(&stats.bundle_dir).frame_count, 4);

        let codec = QuantizedCodec::new();
        for i in 0..4 {
            let bytes = fs::read(stats.bundle_dir.join(format!("frame_{:04}.qpc", i))).unwrap();
            assert!(codec.decode(&bytes).unwrap().is_empty());
        }
    }

    #[test]
    fn test_lexicographic_order_matches_capture_order() {
        let dir = tempdir().unwrap();
        let mut session = test_session(dir.path());
        session.start().unwrap();
        for _ in 0..25 {
            session.submit_frame(frame_with(2)).unwrap();
        }
        let stats = session.stop().unwrap();

        let mut names: Vec<String> = fs::read_dir(&stats.bundle_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".qpc"))
            .collect();
        names.sort();
        for (i, name) in names.iter().enumerate() {
            assert_eq!(*name, format!("frame_{:04}.qpc", i));
        }
    }

    #[test]
    fn test_many_frames_under_worker_contention() {
        let dir = tempdir().unwrap();
        let mut session = test_session(dir.path());
        session.start().unwrap();
        for _ in 0..200 {
            session.submit_frame(frame_with(50)).unwrap();
        }
        let stats = session.stop().unwrap();
        assert_eq!(stats.written, 200);
        assert_eq!(stats.abandoned, 0);
        assert_eq!(read_metadata(&stats.bundle_dir).frame_count, 200);
    }
}
