//! Paragraph-aware text chunking with overlap.
//!
//! Extracted PDF/DOCX text rarely keeps clean blank-line paragraphing, so every
//! line break is treated as a paragraph boundary. Paragraphs are packed into
//! chunks of at most `chunk_size` characters; a paragraph that is too large on
//! its own is carved at sentence ends, then whitespace, then hard cuts. Each new
//! chunk starts with the tail of the previous one.
//!
//! All sizes are counted in `char`s.

use crate::models::ChunkingConfig;
use crate::utils::char_suffix;

/// Text chunker that splits extracted text into overlapping passages.
///
/// The size bound takes priority over overlap: when the carried tail plus the
/// next paragraph would exceed `chunk_size`, the tail is shortened (possibly to
/// nothing), so a chunk never grows past `chunk_size` and the overlap between
/// neighbours is at most `chunk_overlap`.
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Target chunk size in characters
    chunk_size: usize,
    /// Overlap size in characters
    overlap: usize,
}

impl TextChunker {
    /// Create a new text chunker with the given configuration.
    pub fn new(config: &ChunkingConfig) -> Self {
        Self::with_sizes(config.chunk_size as usize, config.chunk_overlap as usize)
    }

    /// Create a chunker with explicit sizes.
    pub fn with_sizes(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            overlap,
        }
    }

    /// Create a chunker with default settings.
    pub fn with_defaults() -> Self {
        Self::new(&ChunkingConfig::default())
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split text into trimmed, non-empty, overlapping chunks.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let mut builder = ChunkBuilder::new(self.chunk_size, self.overlap);

        for paragraph in split_paragraphs(text) {
            let len = paragraph.chars().count();
            if len > self.chunk_size {
                builder.carve(paragraph);
            } else {
                builder.push_paragraph(paragraph, len);
            }
        }

        builder.finish()
    }
}

/// Split on `\n\n`, `\r\n\r\n`, `\n` and `\r\n` alike, dropping blank paragraphs.
fn split_paragraphs(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty())
}

/// Working state of a single chunking run.
struct ChunkBuilder {
    chunk_size: usize,
    overlap: usize,
    buffer: String,
    buffer_len: usize,
    /// Buffer holds text beyond the carried-over seed.
    fresh: bool,
    chunks: Vec<String>,
}

impl ChunkBuilder {
    fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
            buffer: String::new(),
            buffer_len: 0,
            fresh: false,
            chunks: Vec::new(),
        }
    }

    fn separator_len(&self) -> usize {
        usize::from(self.buffer_len > 0)
    }

    fn append(&mut self, text: &str, len: usize, separator: char) {
        if self.buffer_len > 0 {
            self.buffer.push(separator);
            self.buffer_len += 1;
        }
        self.buffer.push_str(text);
        self.buffer_len += len;
        self.fresh = true;
    }

    fn push_paragraph(&mut self, paragraph: &str, len: usize) {
        if self.buffer_len > 0 && self.buffer_len + 1 + len > self.chunk_size {
            self.flush(len + 1);
        }
        self.append(paragraph, len, '\n');
    }

    /// Emit the buffer (if it holds new text) and reseed it with the overlap tail,
    /// shortened so that `reserve` more characters still fit.
    fn flush(&mut self, reserve: usize) {
        let trimmed = self.buffer.trim();
        if self.fresh && !trimmed.is_empty() {
            self.chunks.push(trimmed.to_string());
        }

        let room = self.chunk_size.saturating_sub(reserve);
        let seed = char_suffix(trimmed, self.overlap.min(room))
            .trim_start()
            .to_string();

        self.buffer_len = seed.chars().count();
        self.buffer = seed;
        self.fresh = false;
    }

    /// Cut an oversized paragraph into pieces that fit the remaining budget.
    fn carve(&mut self, paragraph: &str) {
        if self.fresh {
            self.flush(0);
        }

        let chars: Vec<char> = paragraph.chars().collect();
        let mut start = 0;

        loop {
            while start < chars.len() && chars[start].is_whitespace() {
                start += 1;
            }
            if start >= chars.len() {
                break;
            }

            let rest = &chars[start..];
            if self.buffer_len + self.separator_len() + rest.len() <= self.chunk_size {
                self.append(&rest.iter().collect::<String>(), rest.len(), ' ');
                break;
            }

            let mut budget = self
                .chunk_size
                .saturating_sub(self.buffer_len + self.separator_len());
            if budget == 0 {
                // Seed leaves no room for new text; drop it rather than overflow.
                self.buffer.clear();
                self.buffer_len = 0;
                budget = self.chunk_size;
            }

            let cut = find_break_point(rest, budget);
            let piece: String = rest[..cut].iter().collect();
            self.append(&piece, cut, ' ');
            self.flush(0);
            start += cut;
        }
    }

    fn finish(mut self) -> Vec<String> {
        let trimmed = self.buffer.trim();
        if self.fresh && !trimmed.is_empty() {
            let last = trimmed.to_string();
            self.chunks.push(last);
        }
        self.chunks
    }
}

/// Pick a cut position `<= max_len` in `text`, which is longer than `max_len`.
///
/// Searches backward through the second half of the window for a sentence
/// terminator, then for whitespace; falls back to a hard cut at `max_len`.
fn find_break_point(text: &[char], max_len: usize) -> usize {
    if max_len >= text.len() {
        return text.len();
    }

    let window = (max_len / 2 + 1)..max_len;

    if let Some(i) = window
        .clone()
        .rev()
        .find(|&i| matches!(text[i], '.' | '!' | '?'))
    {
        return i + 1;
    }

    if let Some(i) = window.rev().find(|&i| text[i].is_whitespace()) {
        return i + 1;
    }

    max_len
}
