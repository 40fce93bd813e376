//! End-to-end pipeline tests: capture, persist, reload, play.

use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cloudcast::{
    BundleMetadata, CameraIntrinsics, CaptureConfig, CaptureSession, DepthGrid, PlaybackSession,
    PlaybackState, QuantizedCodec, is_bundle_dir, project,
};
use tempfile::tempdir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn capture_config(base: &std::path::Path, frame_rate: f32) -> CaptureConfig {
    CaptureConfig {
        base_dir: base.to_path_buf(),
        bundle_prefix: "capture".to_string(),
        frame_rate,
        workers: 2,
        drain_timeout_ms: 5_000,
    }
}

/// A synthetic sensor tick: a sparse depth grid whose valid-cell count
/// varies per frame.
fn tick_grid(width: usize, height: usize, valid_cells: usize) -> DepthGrid {
    let mut samples = vec![0.0f32; width * height];
    for (i, sample) in samples.iter_mut().take(valid_cells).enumerate() {
        *sample = 0.5 + (i % 40) as f32 * 0.05;
    }
    DepthGrid::new(width, height, samples)
}

#[test]
fn record_then_play_roundtrip() {
    init_logging();
    let dir = tempdir().unwrap();
    let codec = Arc::new(QuantizedCodec::new());
    let intrinsics = CameraIntrinsics::new(200.0, 200.0, 32.0, 24.0);

    let mut session = CaptureSession::new(capture_config(dir.path(), 30.0), codec.clone());
    session.start().unwrap();

    let frame_points = [100usize, 0, 250, 7, 64];
    for (i, &count) in frame_points.iter().enumerate() {
        let grid = tick_grid(64, 48, count);
        let frame = project(&grid, &intrinsics, 0, i as f64 / 30.0);
        assert_eq!(frame.len(), count);
        session.submit_frame(frame).unwrap();
    }
    let stats = session.stop().unwrap();
    assert_eq!(stats.attempted, 5);
    assert_eq!(stats.written, 5);
    assert!(is_bundle_dir(&stats.bundle_dir));

    // Finalize-after-drain: the descriptor never claims more frames than
    // exist on disk.
    let payload_files = fs::read_dir(&stats.bundle_dir)
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .path()
                .extension()
                .is_some_and(|x| x == "qpc")
        })
        .count() as u64;
    let metadata: BundleMetadata = serde_json::from_str(
        &fs::read_to_string(stats.bundle_dir.join("metadata.json")).unwrap(),
    )
    .unwrap();
    assert!(metadata.frame_count <= payload_files);
    assert_eq!(metadata.frame_count, 5);

    // Reload and verify point counts survive the codec (lossy precision,
    // exact counts).
    let mut playback = PlaybackSession::open(&stats.bundle_dir, codec.as_ref()).unwrap();
    assert_eq!(playback.frame_count(), 5);

    let emitted = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&emitted);
    playback
        .play(move |frame| sink.lock().unwrap().push(frame.len()))
        .unwrap();
    playback.wait().unwrap();
    assert_eq!(playback.state(), PlaybackState::Stopped);

    let emitted = emitted.lock().unwrap();
    assert_eq!(*emitted, frame_points.to_vec());
}

#[test]
fn playback_paces_frames_at_recorded_rate() {
    init_logging();
    let dir = tempdir().unwrap();
    let codec = Arc::new(QuantizedCodec::new());
    let intrinsics = CameraIntrinsics::new(100.0, 100.0, 8.0, 8.0);

    let mut session = CaptureSession::new(capture_config(dir.path(), 10.0), codec.clone());
    session.start().unwrap();
    for i in 0..5 {
        let grid = tick_grid(16, 16, 20);
        session
            .submit_frame(project(&grid, &intrinsics, 0, i as f64 * 0.1))
            .unwrap();
    }
    let stats = session.stop().unwrap();

    let mut playback = PlaybackSession::open(&stats.bundle_dir, codec.as_ref()).unwrap();
    assert_eq!(playback.frame_interval(), Duration::from_millis(100));

    let stamps = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&stamps);
    playback
        .play(move |_| sink.lock().unwrap().push(std::time::Instant::now()))
        .unwrap();
    playback.wait().unwrap();

    let stamps = stamps.lock().unwrap();
    assert_eq!(stamps.len(), 5);
    let total = stamps[4].duration_since(stamps[0]);
    // Four ~100ms intervals; generous upper bound for loaded CI machines.
    assert!(total >= Duration::from_millis(350), "total was {:?}", total);
    assert!(total <= Duration::from_millis(1500), "total was {:?}", total);
}

#[test]
fn corrupt_and_foreign_files_are_tolerated() {
    init_logging();
    let dir = tempdir().unwrap();
    let codec = Arc::new(QuantizedCodec::new());
    let intrinsics = CameraIntrinsics::new(100.0, 100.0, 8.0, 8.0);

    let mut session = CaptureSession::new(capture_config(dir.path(), 10.0), codec.clone());
    session.start().unwrap();
    for _ in 0..4 {
        let grid = tick_grid(16, 16, 10);
        session
            .submit_frame(project(&grid, &intrinsics, 0, 0.0))
            .unwrap();
    }
    let stats = session.stop().unwrap();

    // Inject a zero-byte payload and an unrelated file.
    fs::write(stats.bundle_dir.join("frame_0004.qpc"), b"").unwrap();
    fs::write(stats.bundle_dir.join("notes.txt"), b"not a frame").unwrap();

    let playback = PlaybackSession::open(&stats.bundle_dir, codec.as_ref()).unwrap();
    assert_eq!(playback.frame_count(), 4);
}

#[test]
fn all_empty_recording_is_playable() {
    init_logging();
    let dir = tempdir().unwrap();
    let codec = Arc::new(QuantizedCodec::new());
    let intrinsics = CameraIntrinsics::new(100.0, 100.0, 8.0, 8.0);

    let mut session = CaptureSession::new(capture_config(dir.path(), 10.0), codec.clone());
    session.start().unwrap();
    for _ in 0..3 {
        // Every cell invalid: zero-point frames.
        let grid = tick_grid(16, 16, 0);
        session
            .submit_frame(project(&grid, &intrinsics, 0, 0.0))
            .unwrap();
    }
    let stats = session.stop().unwrap();
    assert_eq!(stats.written, 3);

    let mut playback = PlaybackSession::open(&stats.bundle_dir, codec.as_ref()).unwrap();
    assert_eq!(playback.frame_count(), 3);

    let emitted = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&emitted);
    playback
        .play(move |frame| sink.lock().unwrap().push(frame.is_empty()))
        .unwrap();
    playback.wait().unwrap();
    assert_eq!(*emitted.lock().unwrap(), vec![true, true, true]);
}

#[test]
fn unfinalized_bundle_still_plays_with_inferred_shape() {
    init_logging();
    let dir = tempdir().unwrap();
    let codec = Arc::new(QuantizedCodec::new());
    let intrinsics = CameraIntrinsics::new(100.0, 100.0, 8.0, 8.0);

    let mut session = CaptureSession::new(capture_config(dir.path(), 10.0), codec.clone());
    session.start().unwrap();
    for _ in 0..2 {
        let grid = tick_grid(16, 16, 5);
        session
            .submit_frame(project(&grid, &intrinsics, 0, 0.0))
            .unwrap();
    }
    let stats = session.stop().unwrap();

    // Simulate an interrupted finalize.
    fs::remove_file(stats.bundle_dir.join("metadata.json")).unwrap();

    let playback = PlaybackSession::open(&stats.bundle_dir, codec.as_ref()).unwrap();
    assert_eq!(playback.frame_count(), 2);
    assert_eq!(playback.frame_interval(), Duration::from_secs(1));
}
