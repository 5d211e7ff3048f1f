//! Fixed-window text chunker.
//!
//! Slides a window of `chunk_size` characters across the text, stepping
//! back `chunk_overlap` characters between windows. Each window's end is
//! pulled back to the last whitespace inside the window when that still
//! leaves the window longer than the overlap, so words are rarely cut.
//!
//! Sizes are counted in Unicode scalar values; reported offsets are byte
//! offsets into the UTF-8 source and always fall on char boundaries.
//!
//! # Guarantees
//!
//! - Every character of the input is covered by at least one window.
//! - No window is longer than `chunk_size` characters.
//! - Window text is the exact source slice starting at `start`.
//! - Start offsets are strictly increasing.
//! - Empty input yields no windows.
//!
//! # Example
//!
//! ```rust
//! use rag_chat_core::chunk::FixedWindow;
//!
//! let splitter = FixedWindow::new(10, 2).unwrap();
//! let windows = splitter.split("alpha beta gamma delta");
//! assert_eq!(windows[0].text, "alpha ");
//! assert_eq!(windows[0].start, 0);
//! ```

use crate::error::{RagError, Result};

/// A slice of the source text produced by [`FixedWindow::split`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window<'a> {
    /// Byte offset of `text` in the source.
    pub start: usize,
    pub text: &'a str,
}

/// Validated fixed-window splitting parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindow {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedWindow {
    /// Validate and build. Fails when `chunk_size` is zero or the overlap
    /// is not strictly smaller than the window.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::split("chunk_size must be > 0"));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::split(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn split<'a>(&self, text: &'a str) -> Vec<Window<'a>> {
        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let n = chars.len();
        let byte_at = |i: usize| if i < n { chars[i].0 } else { text.len() };

        let mut windows = Vec::new();
        if n == 0 {
            return windows;
        }

        let mut start = 0usize;
        loop {
            let mut end = (start + self.chunk_size).min(n);
            if end < n {
                let floor = start + self.chunk_overlap + 1;
                if let Some(j) = (floor..=end)
                    .rev()
                    .find(|&j| chars[j - 1].1.is_whitespace())
                {
                    end = j;
                }
            }

            windows.push(Window {
                start: byte_at(start),
                text: &text[byte_at(start)..byte_at(end)],
            });

            if end >= n {
                break;
            }
            // end > start + overlap, so this always advances.
            start = end - self.chunk_overlap;
        }

        windows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covered(text: &str, windows: &[Window<'_>]) -> bool {
        let mut covered = vec![false; text.len()];
        for w in windows {
            for b in w.start..w.start + w.text.len() {
                covered[b] = true;
            }
        }
        covered.iter().all(|c| *c)
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        assert!(FixedWindow::new(10, 10).is_err());
        assert!(FixedWindow::new(10, 11).is_err());
        assert!(FixedWindow::new(0, 0).is_err());
        assert!(FixedWindow::new(10, 9).is_ok());
    }

    #[test]
    fn test_empty_text() {
        let fw = FixedWindow::new(400, 0).unwrap();
        assert!(fw.split("").is_empty());
    }

    #[test]
    fn test_small_text_single_window() {
        let fw = FixedWindow::new(400, 0).unwrap();
        let windows = fw.split("Hello, world!");
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].text, "Hello, world!");
        assert_eq!(windows[0].start, 0);
    }

    #[test]
    fn test_snaps_to_whitespace() {
        let fw = FixedWindow::new(10, 0).unwrap();
        let windows = fw.split("alpha beta gamma delta");
        let texts: Vec<&str> = windows.iter().map(|w| w.text).collect();
        assert_eq!(texts, vec!["alpha ", "beta ", "gamma ", "delta"]);
    }

    #[test]
    fn test_hard_split_without_whitespace() {
        let fw = FixedWindow::new(4, 0).unwrap();
        let windows = fw.split("abcdefghij");
        let texts: Vec<&str> = windows.iter().map(|w| w.text).collect();
        assert_eq!(texts, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_overlap_repeats_tail() {
        let fw = FixedWindow::new(4, 2).unwrap();
        let windows = fw.split("abcdefgh");
        let texts: Vec<&str> = windows.iter().map(|w| w.text).collect();
        assert_eq!(texts, vec!["abcd", "cdef", "efgh"]);
        assert_eq!(windows[1].start, 2);
    }

    #[test]
    fn test_covers_every_character_and_respects_size() {
        let text = (0..200)
            .map(|i| format!("word{} ", i))
            .collect::<String>();
        for (size, overlap) in [(7, 0), (16, 5), (50, 49), (400, 0)] {
            let fw = FixedWindow::new(size, overlap).unwrap();
            let windows = fw.split(&text);
            assert!(covered(&text, &windows), "size={} overlap={}", size, overlap);
            for w in &windows {
                assert!(w.text.chars().count() <= size);
                assert_eq!(&text[w.start..w.start + w.text.len()], w.text);
            }
            for pair in windows.windows(2) {
                assert!(pair[0].start < pair[1].start);
            }
        }
    }

    #[test]
    fn test_multibyte_offsets_on_char_boundaries() {
        let text = "┌──────────────────┐\n│ Hællo wørld      │\n└──────────────────┘";
        let fw = FixedWindow::new(7, 3).unwrap();
        let windows = fw.split(text);
        assert!(covered(text, &windows));
        for w in &windows {
            assert!(text.is_char_boundary(w.start));
            assert!(w.text.chars().count() <= 7);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let fw = FixedWindow::new(6, 1).unwrap();
        assert_eq!(fw.split(text), fw.split(text));
    }
}
