//! Image reduction: bound the page images attached to an extraction call.
//!
//! Vision deployments cap request size, so the page set is cut down in two
//! steps before it is attached:
//!
//! 1. keep at most `max_count` pages, earliest first;
//! 2. while the combined base64 size exceeds the budget, drop the last page.
//!
//! Each drop shrinks the set, so the loop always terminates. If even the
//! first page is over budget the result is empty, which the extraction stage
//! accepts as "text only".

use crate::error::PipelineError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A page image as sent to a vision model.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    /// 1-indexed page number.
    pub page_num: usize,
    pub mime_type: &'static str,
    pub base64: String,
}

impl EncodedImage {
    /// Size of the base64 payload in bytes.
    pub fn encoded_len(&self) -> u64 {
        self.base64.len() as u64
    }

    /// Convert into the chat-message attachment type.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.base64.clone(), self.mime_type).with_detail("high")
    }
}

/// Keep the longest prefix of `items` that fits `max_count` and `budget`.
///
/// `size` gives each item's encoded size. Deterministic for identical input.
pub fn reduce_to_budget<T>(
    mut items: Vec<T>,
    max_count: usize,
    budget: u64,
    size: impl Fn(&T) -> u64,
) -> Vec<T> {
    items.truncate(max_count);
    let mut total: u64 = items.iter().map(&size).sum();
    while total > budget {
        match items.pop() {
            Some(dropped) => total -= size(&dropped),
            None => break,
        }
    }
    items
}

/// Load, encode and reduce rasterised pages.
///
/// Only the first `max_count` files are read.
pub async fn load_reduced(
    pages: &[PathBuf],
    max_count: usize,
    budget: u64,
) -> Result<Vec<EncodedImage>, PipelineError> {
    let mut encoded = Vec::with_capacity(pages.len().min(max_count));
    for (idx, path) in pages.iter().take(max_count).enumerate() {
        encoded.push(encode_file(path, idx + 1).await?);
    }

    let loaded = encoded.len();
    let kept = reduce_to_budget(encoded, max_count, budget, EncodedImage::encoded_len);
    debug!(
        "Image reduction: {} pages → {} loaded → {} kept (budget {} bytes)",
        pages.len(),
        loaded,
        kept.len(),
        budget
    );
    Ok(kept)
}

/// Read an image file and base64-encode it.
pub async fn encode_file(path: &Path, page_num: usize) -> Result<EncodedImage, PipelineError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| PipelineError::Scratch {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(EncodedImage {
        page_num,
        mime_type: mime_for(path),
        base64: STANDARD.encode(&bytes),
    })
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn drops_trailing_pages_until_within_budget() {
        let sizes = vec![9 * MB, 6 * MB, 3 * MB, 8 * MB, 2 * MB];
        let kept = reduce_to_budget(sizes, 10, 20 * MB, |s| *s);
        assert_eq!(kept, vec![9 * MB, 6 * MB, 3 * MB]);
    }

    #[test]
    fn truncates_to_max_count_first() {
        let kept = reduce_to_budget(vec![1u64, 1, 1, 1, 1], 3, 100, |s| *s);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn oversized_first_page_yields_empty_set() {
        let kept = reduce_to_budget(vec![30 * MB, MB], 10, 20 * MB, |s| *s);
        assert!(kept.is_empty());
    }

    #[test]
    fn empty_input_is_empty_output() {
        let kept = reduce_to_budget(Vec::<u64>::new(), 10, 20 * MB, |s| *s);
        assert!(kept.is_empty());
    }

    #[test]
    fn result_is_a_prefix_within_bounds() {
        let sizes: Vec<u64> = (1..=12).map(|i| (i * 7 % 5 + 1) * MB).collect();
        for max in [1, 4, 10, 20] {
            for budget in [0, 3 * MB, 10 * MB, 100 * MB] {
                let kept = reduce_to_budget(sizes.clone(), max, budget, |s| *s);
                assert!(kept.len() <= max.min(sizes.len()));
                assert!(kept.iter().sum::<u64>() <= budget);
                assert_eq!(kept[..], sizes[..kept.len()]);
                assert_eq!(kept, reduce_to_budget(sizes.clone(), max, budget, |s| *s));
            }
        }
    }

    #[tokio::test]
    async fn load_reduced_reads_only_allowed_pages() {
        let dir = tempfile::tempdir().unwrap();
        let mut pages = Vec::new();
        for i in 1..=4 {
            let p = dir.path().join(format!("page-{i:04}.jpeg"));
            std::fs::write(&p, vec![0u8; 30]).unwrap();
            pages.push(p);
        }
        // A listed page that does not exist beyond max_count must not be read.
        pages.push(dir.path().join("page-0005.jpeg"));

        let kept = load_reduced(&pages, 4, 1_000).await.unwrap();
        assert_eq!(kept.len(), 4);
        assert_eq!(kept[0].page_num, 1);
        assert_eq!(kept[0].mime_type, "image/jpeg");
        // 30 bytes → 40 base64 chars
        assert_eq!(kept[0].encoded_len(), 40);

        let kept = load_reduced(&pages, 4, 100).await.unwrap();
        assert_eq!(kept.len(), 2);
    }

    #[tokio::test]
    async fn png_pages_get_png_mime() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("page.PNG");
        std::fs::write(&p, b"x").unwrap();
        let img = encode_file(&p, 1).await.unwrap();
        assert_eq!(img.mime_type, "image/png");
    }
}
