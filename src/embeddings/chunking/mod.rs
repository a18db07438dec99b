
use serde::{Deserialize, Serialize};
use std::slice;

use crate::extract::PageText;

/// A bounded slice of document text, the unit of retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The chunk text
    pub text: String,
    /// Name of the document this chunk came from
    pub source: String,
    /// 1-based page the chunk was cut from
    pub page: usize,
    /// Position of this chunk within the document
    pub chunk_index: usize,
}

/// Configuration for fixed-window chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size in characters
    pub chunk_size: usize,
    /// Characters shared between consecutive windows of the same page
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 0,
        }
    }
}

impl ChunkingConfig {
    /// Distance between the starts of consecutive windows, never zero
    #[inline]
    pub fn step(&self) -> usize {
        self.chunk_size.saturating_sub(self.chunk_overlap).max(1)
    }
}

/// Lazily split page texts into fixed-size character windows.
///
/// Pages are split independently, windows never straddle a page boundary,
/// and windows containing only whitespace are skipped. Splits fall on `char`
/// boundaries and may cut words.
#[inline]
pub fn split_pages<'a>(
    pages: &'a [PageText],
    source: &'a str,
    config: &ChunkingConfig,
) -> SplitChunks<'a> {
    SplitChunks {
        pages: pages.iter(),
        source,
        window: config.chunk_size.max(1),
        step: config.step(),
        current: None,
        offset: 0,
        next_index: 0,
    }
}

/// Iterator returned by [`split_pages`]
#[derive(Debug)]
pub struct SplitChunks<'a> {
    pages: slice::Iter<'a, PageText>,
    source: &'a str,
    window: usize,
    step: usize,
    current: Option<(usize, Vec<char>)>,
    offset: usize,
    next_index: usize,
}

impl Iterator for SplitChunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        loop {
            if let Some((page, chars)) = &self.current {
                if self.offset < chars.len() {
                    let end = (self.offset + self.window).min(chars.len());
                    let text: String = chars[self.offset..end].iter().collect();

                    // The last window of a page ends the page even with overlap configured
                    self.offset = if end == chars.len() {
                        chars.len()
                    } else {
                        self.offset + self.step
                    };

                    if text.trim().is_empty() {
                        continue;
                    }

                    let chunk = Chunk {
                        text,
                        source: self.source.to_string(),
                        page: *page,
                        chunk_index: self.next_index,
                    };
                    self.next_index += 1;
                    return Some(chunk);
                }
            }

            let page = self.pages.next()?;
            self.current = Some((page.page, page.text.chars().collect()));
            self.offset = 0;
        }
    }
}
