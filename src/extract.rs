// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text extraction from submitted files.

use std::path::Path;

use crate::errors::{Error, Result};

/// Plain text pulled out of a file, with its count of logical units
/// (pages or slides).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub unit_count: u32,
}

/// Turns a file into plain text.
pub trait TextExtractor: Send + Sync {
    fn supports(&self, path: &Path) -> bool;

    fn extract(&self, path: &Path) -> Result<ExtractedText>;
}

/// Extracts `.txt`, `.text` and `.md` files. Form feeds separate pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

const PLAIN_EXTENSIONS: &[&str] = &["txt", "text", "md"];

impl TextExtractor for PlainTextExtractor {
    fn supports(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| PLAIN_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    fn extract(&self, path: &Path) -> Result<ExtractedText> {
        if !self.supports(path) {
            return Err(Error::Extraction(format!(
                "unsupported file type: {}",
                path.display()
            )));
        }

        let bytes = std::fs::read(path)
            .map_err(|e| Error::Extraction(format!("cannot read {}: {}", path.display(), e)))?;
        let text = String::from_utf8(bytes)
            .map_err(|_| Error::Extraction(format!("{} is not valid UTF-8", path.display())))?;

        let unit_count = count_pages(&text);
        Ok(ExtractedText { text, unit_count })
    }
}

fn count_pages(text: &str) -> u32 {
    let pages = text
        .split('\u{000c}')
        .filter(|page| !page.trim().is_empty())
        .count();
    pages.max(1) as u32
}
