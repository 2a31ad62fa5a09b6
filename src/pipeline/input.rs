//! Input resolution: validate the user-supplied local PDF path before any
//! rendering work starts.
//!
//! The CLI surface takes exactly one local file path (no URL fetching), so
//! resolution here is just existence, permission, and magic-byte checks —
//! cheap checks done up front so a bad path fails fast with a clear error
//! instead of a confusing pdfium error deep inside rendering.

use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::PipelineError;

/// Validate `path_str` exists, is readable, and starts with the `%PDF`
/// magic bytes. Returns the canonical path on success.
pub fn resolve_local_pdf(path_str: &str) -> Result<PathBuf, PipelineError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(PipelineError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(PipelineError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PipelineError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(PipelineError::FileNotFound { path });
        }
    }

    debug!(path = %path.display(), "resolved local PDF input");
    Ok(path)
}

/// Resolve an output directory, creating it if it does not yet exist.
pub fn resolve_output_dir(path_str: &str) -> Result<PathBuf, PipelineError> {
    let path = PathBuf::from(path_str);
    std::fs::create_dir_all(&path).map_err(|e| PipelineError::OutputWriteFailed {
        path: path.clone(),
        source: e,
    })?;
    Ok(path)
}

pub fn is_pdf_path(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("pdf")).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_file_not_found() {
        let err = resolve_local_pdf("/nonexistent/path/doc.pdf").unwrap_err();
        assert!(matches!(err, PipelineError::FileNotFound { .. }));
    }

    #[test]
    fn non_pdf_content_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-pdf.pdf");
        std::fs::write(&path, b"not a pdf at all").unwrap();
        let err = resolve_local_pdf(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, PipelineError::NotAPdf { .. }));
    }

    #[test]
    fn valid_magic_bytes_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("valid.pdf");
        std::fs::write(&path, b"%PDF-1.7\n...").unwrap();
        assert!(resolve_local_pdf(path.to_str().unwrap()).is_ok());
    }

    #[test]
    fn is_pdf_path_checks_extension_case_insensitively() {
        assert!(is_pdf_path(Path::new("a.PDF")));
        assert!(is_pdf_path(Path::new("a.pdf")));
        assert!(!is_pdf_path(Path::new("a.txt")));
    }
}
