use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{FieldProblem, SyncError, ValidationError};

pub const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];
pub const IMAGE_FIELD: &str = "image";

const STAGING_DIR: &str = "league_feed";

static STAGE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Temporary copy of a local image, held for the duration of one upload. The copy is
/// removed when the handle is dropped, whatever happened to the upload.
#[derive(Debug)]
pub struct StagedImage {
    path: PathBuf,
    file_name: String,
    mime: &'static str,
    len: u64,
}

impl StagedImage {
    pub fn acquire(source: &Path, max_bytes: u64) -> Result<Self, SyncError> {
        Self::acquire_in(&staging_dir(), source, max_bytes)
    }

    /// Stages `source` under `dir`. A copy that fails part way is removed before the
    /// error is returned.
    pub fn acquire_in(dir: &Path, source: &Path, max_bytes: u64) -> Result<Self, SyncError> {
        let ext = source
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(invalid(format!(
                "unsupported image type (use {})",
                ALLOWED_EXTENSIONS.join(", ")
            )));
        }

        let meta = fs::metadata(source)
            .map_err(|err| invalid(format!("cannot read {}: {err}", source.display())))?;
        if !meta.is_file() {
            return Err(invalid(format!("{} is not a file", source.display())));
        }
        if meta.len() > max_bytes {
            return Err(invalid(format!(
                "image is larger than {} MB",
                max_bytes / (1024 * 1024)
            )));
        }

        fs::create_dir_all(dir)
            .map_err(|err| invalid(format!("cannot prepare upload: {err}")))?;
        let seq = STAGE_SEQ.fetch_add(1, Ordering::Relaxed);
        let file_name = source
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.to_string())
            .unwrap_or_else(|| format!("image.{ext}"));
        let staged = Self {
            path: dir.join(format!("upload-{}-{seq}.{ext}", std::process::id())),
            file_name,
            mime: mime_for(&ext),
            len: meta.len(),
        };

        fs::copy(source, &staged.path)
            .map_err(|err| invalid(format!("cannot read {}: {err}", source.display())))?;
        log::debug!("staged {} as {}", source.display(), staged.path.display());
        Ok(staged)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime(&self) -> &'static str {
        self.mime
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        fs::read(&self.path)
    }
}

impl Drop for StagedImage {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => log::warn!("failed to release {}: {err}", self.path.display()),
        }
    }
}

pub fn staging_dir() -> PathBuf {
    std::env::temp_dir().join(STAGING_DIR)
}

fn mime_for(ext: &str) -> &'static str {
    match ext {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
}

fn invalid(reason: String) -> SyncError {
    SyncError::Validation(ValidationError::single(
        IMAGE_FIELD,
        FieldProblem::InvalidFormat(reason),
    ))
}
