//! Fixed-size overlapping text windows.
//!
//! Sizes are in characters, not bytes. Window `i` starts at `i * (size - overlap)`;
//! every window but the last is exactly `size` long, so dropping the first
//! `overlap` characters of each later window rebuilds the input.

/// One window of the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 0-based position.
    pub index: usize,
    pub total: usize,
    pub text: String,
}

impl Chunk {
    /// `"2/5"`.
    pub fn label(&self) -> String {
        format!("{}/{}", self.index + 1, self.total)
    }
}

/// Split `text` into windows of `size` characters overlapping by `overlap`.
///
/// Empty input gives no windows. `overlap` is clamped below `size`.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<Chunk> {
    let size = size.max(1);
    let overlap = overlap.min(size - 1);
    let step = size - overlap;

    // Byte offset of every char, plus the end.
    let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let len = bounds.len();
    bounds.push(text.len());

    let mut windows = Vec::new();
    let mut start = 0;
    while start < len {
        let end = (start + size).min(len);
        windows.push(text[bounds[start]..bounds[end]].to_string());
        if end == len {
            break;
        }
        start += step;
    }

    let total = windows.len();
    windows
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk { index, total, text })
        .collect()
}

/// Inverse of [`chunk_text`]: concatenate windows, dropping the repeated overlap.
pub fn merge_chunks(chunks: &[Chunk], overlap: usize) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            out.push_str(&chunk.text);
        } else {
            out.extend(chunk.text.chars().skip(overlap));
        }
    }
    out
}
