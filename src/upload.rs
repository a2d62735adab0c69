//! Temporary storage for uploaded PDFs.
//!
//! [`TempUpload`] owns the file it writes and removes it on drop, so the
//! upload never outlives the request that produced it, whether the request
//! succeeds, returns an error, or unwinds.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::PipelineError;

pub const MIME_PDF: &str = "application/pdf";

/// An uploaded file on disk, deleted when dropped.
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
    original_name: String,
}

impl TempUpload {
    /// Write `bytes` to `dir/temp_<uuid>_<sanitized name>`.
    pub fn write(dir: &Path, original_name: &str, bytes: &[u8]) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create upload directory: {}", dir.display()))?;
        let path = dir.join(format!(
            "temp_{}_{}",
            Uuid::new_v4().simple(),
            sanitize_filename(original_name)
        ));
        // Construct the guard first so a failed write still cleans up.
        let upload = Self {
            path,
            original_name: original_name.to_string(),
        };
        std::fs::write(&upload.path, bytes)
            .with_context(|| format!("Failed to write upload: {}", upload.path.display()))?;
        tracing::debug!(path = %upload.path.display(), bytes = bytes.len(), "stored upload");
        Ok(upload)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        if self.path.exists() {
            match std::fs::remove_file(&self.path) {
                Ok(()) => tracing::debug!(path = %self.path.display(), "removed upload"),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "failed to remove upload")
                }
            }
        }
    }
}

/// Keep only `[A-Za-z0-9._-]`, never return an empty or dot-only name.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "upload.pdf".to_string()
    } else {
        cleaned
    }
}

/// Reject anything that is not named or typed as a PDF.
pub fn check_pdf(file_name: &str, content_type: Option<&str>) -> Result<(), PipelineError> {
    let by_name = file_name.to_lowercase().ends_with(".pdf");
    let by_type = content_type.is_some_and(|ct| ct == MIME_PDF);
    if by_name || by_type {
        Ok(())
    } else {
        Err(PipelineError::NotPdf(file_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = {
            let upload = TempUpload::write(dir.path(), "report.pdf", b"%PDF-1.4").unwrap();
            assert!(upload.path().exists());
            upload.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_file_removed_when_processing_fails() {
        let dir = TempDir::new().unwrap();
        let result: Result<()> = (|| {
            let _upload = TempUpload::write(dir.path(), "report.pdf", b"junk")?;
            anyhow::bail!("processing failed")
        })();
        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_file_removed_on_panic() {
        let dir = TempDir::new().unwrap();
        let dir_path = dir.path().to_path_buf();
        let outcome = std::panic::catch_unwind(move || {
            let _upload = TempUpload::write(&dir_path, "report.pdf", b"junk").unwrap();
            panic!("boom");
        });
        assert!(outcome.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_name_keeps_original_and_prefix() {
        let dir = TempDir::new().unwrap();
        let upload = TempUpload::write(dir.path(), "My Report.pdf", b"x").unwrap();
        let file_name = upload.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(file_name.starts_with("temp_"));
        assert!(file_name.ends_with("My_Report.pdf"));
        assert_eq!(upload.original_name(), "My Report.pdf");
    }

    #[test]
    fn test_sanitize_strips_paths() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\docs\\a b.pdf"), "a_b.pdf");
        assert_eq!(sanitize_filename(".."), "upload.pdf");
    }

    #[test]
    fn test_check_pdf() {
        assert!(check_pdf("a.PDF", None).is_ok());
        assert!(check_pdf("blob", Some(MIME_PDF)).is_ok());
        assert!(matches!(
            check_pdf("notes.txt", Some("text/plain")),
            Err(PipelineError::NotPdf(_))
        ));
    }
}
