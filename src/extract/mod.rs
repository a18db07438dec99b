
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Text of a single document page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-based page number
    pub page: usize,
    /// Extracted text with normalized whitespace
    pub text: String,
}

/// Turns raw document bytes into per-page text
pub trait TextExtractor: Send + Sync {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>>;
}

/// PDF text extraction backed by `pdf-extract`
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    #[inline]
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>> {
        debug!("Extracting text from PDF ({} bytes)", bytes.len());

        if !bytes.starts_with(b"%PDF") {
            return Err(anyhow!("File does not start with a PDF header"));
        }

        // pdf-extract panics on some malformed inputs
        let raw_pages =
            std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
                .map_err(|_| anyhow!("PDF parser aborted on malformed input"))?
                .map_err(|e| anyhow!("Failed to parse PDF: {:?}", e))?;

        let pages: Vec<PageText> = raw_pages
            .into_iter()
            .enumerate()
            .map(|(index, text)| PageText {
                page: index + 1,
                text: clean_text(&text),
            })
            .collect();

        debug!(
            "Extracted {} pages ({} characters)",
            pages.len(),
            pages.iter().map(|p| p.text.chars().count()).sum::<usize>()
        );

        Ok(pages)
    }
}

/// True when at least one page carries non-whitespace text
#[inline]
pub fn has_text(pages: &[PageText]) -> bool {
    pages.iter().any(|page| !page.text.trim().is_empty())
}

/// Normalize line endings, drop control characters and collapse runs of blank lines
fn clean_text(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut cleaned = String::with_capacity(normalized.len());
    let mut blank_run = 0;

    for line in normalized.lines() {
        let line: String = line
            .chars()
            .filter(|c| !c.is_control() || *c == '\t')
            .collect();
        let line = line.trim_end();

        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }

        cleaned.push_str(line);
        cleaned.push('\n');
    }

    cleaned.trim().to_string()
}
