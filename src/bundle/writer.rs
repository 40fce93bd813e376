//! Streaming bundle writer.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Local;
use log::debug;

use super::{
    BundleError, BundleMetadata, MAX_FRAME_INDEX, METADATA_FILE, STAMP_FORMAT, bundle_dir_name,
    frame_file_name,
};

/// Writes one bundle directory: frame payloads during recording, the
/// metadata descriptor exactly once at finalize.
///
/// `write_frame` takes `&self` so encode workers can share the writer;
/// callers must not write the same index concurrently (re-writing an
/// index sequentially is allowed and overwrites).
pub struct BundleWriter {
    dir: PathBuf,
    extension: &'static str,
    recording_date: String,
    finalized: AtomicBool,
}

impl BundleWriter {
    /// Create a new bundle directory under `base_dir`, named from the
    /// current local time.
    ///
    /// Fails with [`BundleError::AlreadyExists`] if the directory is
    /// already present; an existing directory is never silently reused
    /// or overwritten.
    pub fn create(
        base_dir: &Path,
        prefix: &str,
        extension: &'static str,
    ) -> Result<Self, BundleError> {
        let stamp = Local::now().format(STAMP_FORMAT).to_string();
        let dir = base_dir.join(bundle_dir_name(prefix, &stamp));
        Self::create_at(dir, extension, stamp)
    }

    /// Create a bundle at an explicit directory path with an explicit
    /// recording stamp. `create` delegates here; tests use it for
    /// deterministic naming.
    pub fn create_at(
        dir: PathBuf,
        extension: &'static str,
        recording_date: String,
    ) -> Result<Self, BundleError> {
        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(BundleError::AlreadyExists(dir));
            }
            Err(e) => return Err(e.into()),
        }
        debug!("created bundle directory {}", dir.display());
        Ok(Self {
            dir,
            extension,
            recording_date,
            finalized: AtomicBool::new(false),
        })
    }

    /// Persist one compressed frame payload under its sequential name.
    pub fn write_frame(&self, index: u64, bytes: &[u8]) -> Result<(), BundleError> {
        if index > MAX_FRAME_INDEX {
            return Err(BundleError::IndexOutOfRange(index));
        }
        let path = self.dir.join(frame_file_name(index, self.extension));
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Write the metadata descriptor. Write-once: a second call is an
    /// error. Callers must only finalize after every dispatched frame
    /// job has completed or been abandoned.
    pub fn finalize(&self, frame_count: u64, frame_rate: f32) -> Result<(), BundleError> {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return Err(BundleError::AlreadyFinalized);
        }
        let metadata = BundleMetadata {
            frame_count,
            recording_date: self.recording_date.clone(),
            frame_rate,
        };
        let json = serde_json::to_string_pretty(&metadata)?;
        fs::write(self.dir.join(METADATA_FILE), json)?;
        debug!(
            "finalized bundle {} with {} frames",
            self.dir.display(),
            frame_count
        );
        Ok(())
    }

    /// Bundle directory path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Recording stamp used in the metadata descriptor.
    pub fn recording_date(&self) -> &str {
        &self.recording_date
    }
}
