//! Shipped capability implementations.
//!
//! * [`render`] — pdfium page rasterisation
//! * [`llm`]    — extraction, summary and vision OCR over `edgequake-llm`

pub mod llm;
pub mod render;
