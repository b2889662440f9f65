//! # Temp File Staging
//!
//! The decoder works on files, so each upload is written to disk for the
//! duration of one request. `StagedAudio` owns that file:
//!
//! - **Acquire**: `StagedAudio::stage` creates `audio_<uuid-v4>.<ext>` and writes the bytes
//! - **Release**: `StagedAudio::release` deletes it once analysis is done
//! - **Fallback**: `Drop` deletes it on every other exit path (errors, panics, cancelled futures)
//!
//! Names come from a fresh v4 UUID and the file is opened with `create_new`,
//! so concurrent requests can never write into each other's file.

use anyhow::{Context, Result};
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Extension used when the declared format is not a plausible file extension.
const NEUTRAL_EXTENSION: &str = "bin";

/// A decoded upload on disk, removed when released or dropped.
#[derive(Debug)]
pub struct StagedAudio {
    path: PathBuf,
    size_bytes: usize,
    released: bool,
}

impl StagedAudio {
    /// Write `bytes` to a new uniquely named file inside `dir`.
    ///
    /// `format_hint` is the client's `audioFormat` value. It only picks the
    /// file extension (which the decoder uses as a probing hint).
    ///
    /// If the write fails part-way, the partial file is removed before the
    /// error is returned.
    pub async fn stage(dir: &Path, format_hint: &str, bytes: &[u8]) -> Result<Self> {
        let path = dir.join(Self::file_name(format_hint));

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to create staging file {}", path.display()))?;

        // From here on the file exists and belongs to us.
        let staged = Self {
            path,
            size_bytes: bytes.len(),
            released: false,
        };

        file.write_all(bytes)
            .await
            .with_context(|| format!("Failed to write staging file {}", staged.path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("Failed to flush staging file {}", staged.path.display()))?;

        debug!(path = %staged.path.display(), size_bytes = staged.size_bytes, "Staged audio upload");
        Ok(staged)
    }

    /// Path of the staged file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of bytes written.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Delete the staged file now and report the outcome.
    ///
    /// A file that is already gone counts as released.
    pub async fn release(mut self) -> io::Result<()> {
        self.released = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "Released staged audio");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// `audio_<uuid>.<ext>` where `<ext>` is the sanitised format hint.
    pub fn file_name(format_hint: &str) -> String {
        format!("audio_{}.{}", Uuid::new_v4(), Self::extension(format_hint))
    }

    fn extension(format_hint: &str) -> String {
        let hint = format_hint.trim().trim_start_matches('.').to_ascii_lowercase();
        let plausible = !hint.is_empty()
            && hint.len() <= 8
            && hint.chars().all(|c| c.is_ascii_alphanumeric());

        if plausible {
            hint
        } else {
            NEUTRAL_EXTENSION.to_string()
        }
    }
}

impl Drop for StagedAudio {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed staged audio on drop"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                path = %self.path.display(),
                error = %err,
                "Failed to remove staged audio"
            ),
        }
    }
}
