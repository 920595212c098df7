use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// An uploaded payload staged on disk for the engine.
///
/// The file name is unique per request and the file is removed when the value
/// is released or dropped, including while unwinding from a panic.
pub(crate) struct ScratchFile {
    file: NamedTempFile,
}

impl ScratchFile {
    pub(crate) fn create(dir: Option<&Path>, extension: &str, bytes: &[u8]) -> Result<Self> {
        let suffix = format!(".{extension}");
        let mut builder = tempfile::Builder::new();
        builder.prefix("upload-").suffix(&suffix);
        let mut file = match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .context("Failed to create scratch file")?;

        file.write_all(bytes)
            .and_then(|()| file.flush())
            .context("Failed to write scratch file")?;
        debug!(path = %file.path().display(), size = bytes.len(), "staged upload");
        Ok(Self { file })
    }

    pub(crate) fn path(&self) -> &Path {
        self.file.path()
    }

    /// Removes the file, logging instead of failing when that is not possible.
    pub(crate) fn release(self) {
        let path = self.file.path().to_path_buf();
        match self.file.close() {
            Ok(()) => debug!(path = %path.display(), "removed scratch file"),
            Err(err) => warn!(path = %path.display(), error = %err, "failed to remove scratch file"),
        }
    }
}
