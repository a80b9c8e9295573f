use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use crate::error::PxError;

/// Holds the physical artifacts of the dataset currently being
/// classified. A dataset transition flushes them into the transfer
/// directory; sources are deleted after the copy, best-effort.
#[derive(Debug)]
pub struct StagingArea {
    transfer_dir: Utf8PathBuf,
    staged: Vec<Utf8PathBuf>,
    leftovers: Vec<Utf8PathBuf>,
}

impl StagingArea {
    pub fn new(transfer_dir: Utf8PathBuf) -> Self {
        Self {
            transfer_dir,
            staged: Vec::new(),
            leftovers: Vec::new(),
        }
    }

    pub fn transfer_dir(&self) -> &Utf8Path {
        &self.transfer_dir
    }

    pub fn stage(&mut self, path: Utf8PathBuf) {
        if !self.staged.contains(&path) {
            self.staged.push(path);
        }
    }

    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    /// Sources that survived a delete retry; the caller must not stage
    /// or transfer them again.
    pub fn excluded(&self) -> &[Utf8PathBuf] {
        &self.leftovers
    }

    /// Copies every staged file into the transfer directory and deletes
    /// the sources. A failed copy fails the flush; a failed delete is a
    /// warning, retried on the next flush.
    pub fn flush(&mut self) -> Result<(), PxError> {
        self.retry_leftovers();

        let staged = std::mem::take(&mut self.staged);
        for source in staged {
            if !source.as_std_path().exists() {
                return Err(PxError::FileNotFound(source));
            }
            let file_name = source
                .file_name()
                .ok_or_else(|| PxError::Filesystem(format!("staged path has no file name: {source}")))?;
            let dest = self.transfer_dir.join(file_name);
            copy_file_atomic(&source, &dest)?;
            self.remove_source(source);
        }
        Ok(())
    }

    fn retry_leftovers(&mut self) {
        let leftovers = std::mem::take(&mut self.leftovers);
        for path in leftovers {
            if !path.as_std_path().exists() {
                continue;
            }
            if let Err(err) = fs::remove_file(path.as_std_path()) {
                warn!(%path, %err, "staged file still cannot be deleted; excluding from transfer");
                self.leftovers.push(path);
            } else {
                info!(%path, "removed leftover staged file");
            }
        }
    }

    fn remove_source(&mut self, source: Utf8PathBuf) {
        for attempt in 0..2 {
            match fs::remove_file(source.as_std_path()) {
                Ok(()) => return,
                Err(err) if attempt == 0 => {
                    warn!(path = %source, %err, "delete failed, retrying once");
                }
                Err(err) => {
                    warn!(path = %source, %err, "could not delete staged source; will retry on next flush");
                    self.leftovers.push(source);
                    return;
                }
            }
        }
    }
}

fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), PxError> {
    let parent = dest
        .parent()
        .ok_or_else(|| PxError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| PxError::Filesystem(err.to_string()))?;
    let temp = tempfile::Builder::new()
        .prefix("px-packager-stage")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| PxError::Filesystem(err.to_string()))?;
    fs::copy(source.as_std_path(), temp.path())
        .map_err(|err| PxError::Filesystem(err.to_string()))?;
    if dest.as_std_path().exists() {
        fs::remove_file(dest.as_std_path())
            .map_err(|err| PxError::Filesystem(err.to_string()))?;
    }
    temp.persist(dest.as_std_path())
        .map_err(|err| PxError::Filesystem(err.to_string()))?;
    Ok(())
}
