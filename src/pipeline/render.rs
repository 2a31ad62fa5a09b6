//! PDF rasterisation and text extraction: turns a PDF file into a
//! [`PageInput`] per page, ready for the Router/Extractor to send to a
//! vision LLM.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto a dedicated thread pool
//! thread designed for blocking operations, preventing the Tokio worker
//! threads from stalling during CPU-heavy rendering.
//!
//! ## Why cap pixels, not DPI?
//!
//! Page sizes vary wildly: an A0 poster at 150 DPI would produce a
//! 12,000 × 17,000 px image. `max_rendered_pixels` caps the longest edge
//! regardless of physical size, keeping memory bounded and matching the
//! image-size sweet spot for vision models (around 1,024–2,048 px).

use std::path::Path;

use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::model::PageInput;
use crate::pipeline::encode::encode_page;

/// Render every page of a PDF into a [`PageInput`]: a base64 raster plus the
/// native text layer. Encryption with an empty password is attempted
/// transparently; a document that is still encrypted after that surfaces as
/// [`PipelineError::PasswordRequired`] before any page work starts.
pub async fn render_document(pdf_path: &Path, max_rendered_pixels: u32) -> Result<Vec<PageInput>, PipelineError> {
    let path = pdf_path.to_path_buf();

    tokio::task::spawn_blocking(move || render_document_blocking(&path, max_rendered_pixels))
        .await
        .map_err(|e| PipelineError::Internal(format!("render task panicked: {e}")))?
}

fn open_document<'a>(pdfium: &'a Pdfium, pdf_path: &Path) -> Result<PdfDocument<'a>, PipelineError> {
    match pdfium.load_pdf_from_file(pdf_path, None) {
        Ok(doc) => Ok(doc),
        Err(e) => {
            let err_str = format!("{e:?}");
            if !err_str.to_lowercase().contains("password") {
                return Err(PipelineError::CorruptPdf {
                    path: pdf_path.to_path_buf(),
                    detail: err_str,
                });
            }
            match pdfium.load_pdf_from_file(pdf_path, Some("")) {
                Ok(doc) => Ok(doc),
                Err(_) => Err(PipelineError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }),
            }
        }
    }
}

fn render_document_blocking(pdf_path: &Path, max_pixels: u32) -> Result<Vec<PageInput>, PipelineError> {
    let pdfium = bind_pdfium(pdf_path)?;
    let document = open_document(&pdfium, pdf_path)?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!(total_pages, "PDF loaded");

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut inputs = Vec::with_capacity(total_pages);

    for idx in 0..total_pages {
        let page = pages.get(idx as u16).map_err(|e| PipelineError::RasterisationFailed {
            page: idx,
            detail: format!("{e:?}"),
        })?;

        let text = page
            .text()
            .map(|t| t.all())
            .unwrap_or_else(|e| {
                warn!(page = idx, error = ?e, "native text extraction failed, continuing with empty text layer");
                String::new()
            });

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| PipelineError::RasterisationFailed {
                page: idx,
                detail: format!("{e:?}"),
            })?;

        let image = bitmap.as_image();
        let (page_width, page_height) = (image.width(), image.height());

        let encoded = encode_page(&image).map_err(|e| PipelineError::RasterisationFailed {
            page: idx,
            detail: format!("failed to encode page image: {e}"),
        })?;

        debug!(page = idx, page_width, page_height, "rendered page");

        inputs.push(PageInput {
            page_index: idx,
            page_width,
            page_height,
            image_base64: encoded.data,
            text,
        });
    }

    Ok(inputs)
}

fn bind_pdfium(_pdf_path: &Path) -> Result<Pdfium, PipelineError> {
    pdfium_auto::bind_pdfium_silent().map_err(|e| PipelineError::PdfiumBindingFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_surfaces_as_corrupt_or_io_error() {
        let result = render_document(Path::new("/nonexistent/does-not-exist.pdf"), 1600).await;
        assert!(result.is_err());
    }
}
