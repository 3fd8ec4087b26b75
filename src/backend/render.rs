//! PDF rasterisation via pdfium: one JPEG per page in a scratch directory.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and is CPU-bound. Rendering runs on the blocking pool so the async
//! workers driving other documents never stall behind it.
//!
//! ## Why cap pixels?
//!
//! Page sizes vary wildly; an A0 poster would render to a huge bitmap.
//! `max_pixels` bounds the longest edge, which also keeps each JPEG small
//! enough that several fit inside the vision request budget.

use crate::capability::Rasterizer;
use crate::error::PipelineError;
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// [`Rasterizer`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    max_pixels: u32,
    password: Option<String>,
}

impl PdfiumRasterizer {
    pub fn new(max_pixels: u32) -> Self {
        Self {
            max_pixels,
            password: None,
        }
    }

    /// Open encrypted documents with this user password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

/// File name for a 1-indexed page; zero-padded so names sort in page order.
pub fn page_file_name(page_num: usize) -> String {
    format!("page-{page_num:04}.jpeg")
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    async fn rasterize(&self, pdf: &Path, scratch: &Path) -> Result<Vec<PathBuf>, PipelineError> {
        let pdf = pdf.to_path_buf();
        let scratch = scratch.to_path_buf();
        let max_pixels = self.max_pixels;
        let password = self.password.clone();

        tokio::task::spawn_blocking(move || {
            render_pages_blocking(&pdf, &scratch, max_pixels, password.as_deref())
        })
        .await
        .map_err(|e| PipelineError::Internal(format!("Render task panicked: {}", e)))?
    }
}

/// Blocking implementation of page rendering.
fn render_pages_blocking(
    pdf_path: &Path,
    scratch: &Path,
    max_pixels: u32,
    password: Option<&str>,
) -> Result<Vec<PathBuf>, PipelineError> {
    let pdfium = Pdfium::default();

    // Page 0 stands for the document as a whole.
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| PipelineError::RasterisationFailed {
            page: 0,
            detail: format!("{:?}", e),
        })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut written = Vec::with_capacity(total_pages);

    for idx in 0..total_pages {
        let page_num = idx + 1;
        let page = pages
            .get(idx as u16)
            .map_err(|e| PipelineError::RasterisationFailed {
                page: page_num,
                detail: format!("{:?}", e),
            })?;

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            PipelineError::RasterisationFailed {
                page: page_num,
                detail: format!("{:?}", e),
            }
        })?;

        // JPEG has no alpha channel.
        let image = DynamicImage::ImageRgb8(bitmap.as_image().to_rgb8());
        let out = scratch.join(page_file_name(page_num));
        image
            .save_with_format(&out, ImageFormat::Jpeg)
            .map_err(|e| PipelineError::RasterisationFailed {
                page: page_num,
                detail: format!("write '{}': {}", out.display(), e),
            })?;
        debug!(
            "Rendered page {} → {}x{} px → {}",
            page_num,
            image.width(),
            image.height(),
            out.display()
        );

        written.push(out);
    }

    Ok(written)
}
