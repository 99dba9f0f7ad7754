// splitter.rs — Recursive character splitting into non-overlapping chunks.
//
// Tries the coarsest separator first (paragraph, then line, then word) and only
// falls back to a hard character cut when a piece has no usable boundary.
// Separators stay attached to the piece that follows them, so every chunk is an
// exact substring and the chunks concatenate back to the input.

use std::ops::Range;

/// A contiguous slice of a transcript, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    pub text: String,
    /// Byte offset of `text` in the source document.
    pub offset: usize,
    pub source: String,
}

/// Chunking capability used by the summarizer.
pub trait Splitter {
    /// Ordered, non-overlapping chunks of at most `max_chunk_size` characters.
    fn split(&self, text: &str, source: &str, max_chunk_size: usize) -> Vec<DocumentChunk>;
}

pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct RecursiveCharacterSplitter {
    separators: Vec<String>,
}

impl Default for RecursiveCharacterSplitter {
    fn default() -> Self {
        Self::new(&DEFAULT_SEPARATORS)
    }
}

impl RecursiveCharacterSplitter {
    /// An empty separator is always appended so splitting can never get stuck.
    pub fn new(separators: &[&str]) -> Self {
        let mut separators: Vec<String> = separators.iter().map(|s| s.to_string()).collect();
        if separators.last().map(|s| !s.is_empty()).unwrap_or(true) {
            separators.push(String::new());
        }
        Self { separators }
    }

    /// Byte ranges of the chunks in `text`.
    pub fn split_ranges(&self, text: &str, max_chunk_size: usize) -> Vec<Range<usize>> {
        let mut out = Vec::new();
        if text.is_empty() {
            return out;
        }
        let max = max_chunk_size.max(1);
        self.split_recursive(text, 0..text.len(), max, &self.separators, &mut out);
        out
    }

    fn split_recursive(
        &self,
        text: &str,
        range: Range<usize>,
        max: usize,
        separators: &[String],
        out: &mut Vec<Range<usize>>,
    ) {
        let slice = &text[range.clone()];
        if char_len(slice) <= max {
            out.push(range);
            return;
        }

        // First separator that occurs in this slice; "" always matches.
        let idx = separators
            .iter()
            .position(|s| s.is_empty() || slice.contains(s.as_str()))
            .unwrap_or(separators.len().saturating_sub(1));
        let sep = separators.get(idx).map(String::as_str).unwrap_or("");
        let rest = separators.get(idx + 1..).unwrap_or(&[]);

        let pieces = pieces_of(slice, sep, range.start);

        // Greedily merge small pieces; recurse into any piece that is too big on its own.
        let mut current: Option<(Range<usize>, usize)> = None;
        for piece in pieces {
            let piece_len = char_len(&text[piece.clone()]);
            if piece_len > max {
                if let Some((r, _)) = current.take() {
                    out.push(r);
                }
                if rest.is_empty() {
                    // "" yields single characters, which always fit.
                    out.push(piece);
                } else {
                    self.split_recursive(text, piece, max, rest, out);
                }
                continue;
            }
            current = match current.take() {
                Some((r, len)) if len + piece_len <= max => Some((r.start..piece.end, len + piece_len)),
                Some((r, _)) => {
                    out.push(r);
                    Some((piece, piece_len))
                }
                None => Some((piece, piece_len)),
            };
        }
        if let Some((r, _)) = current {
            out.push(r);
        }
    }
}

impl Splitter for RecursiveCharacterSplitter {
    fn split(&self, text: &str, source: &str, max_chunk_size: usize) -> Vec<DocumentChunk> {
        self.split_ranges(text, max_chunk_size)
            .into_iter()
            .map(|r| DocumentChunk {
                text: text[r.clone()].to_string(),
                offset: r.start,
                source: source.to_string(),
            })
            .collect()
    }
}

/// Split `slice` on `sep`, keeping each separator at the start of the following
/// piece. An empty separator splits into single characters. Ranges are absolute.
fn pieces_of(slice: &str, sep: &str, base: usize) -> Vec<Range<usize>> {
    if sep.is_empty() {
        return slice
            .char_indices()
            .map(|(i, c)| base + i..base + i + c.len_utf8())
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (i, _) in slice.match_indices(sep) {
        if i > start {
            pieces.push(base + start..base + i);
            start = i;
        }
    }
    if start < slice.len() {
        pieces.push(base + start..base + slice.len());
    }
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(chunks: &[DocumentChunk]) -> String {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    fn assert_covers(text: &str, chunks: &[DocumentChunk], max: usize) {
        assert_eq!(joined(chunks), text);
        let mut expected_offset = 0;
        for c in chunks {
            assert_eq!(c.offset, expected_offset, "gap or overlap at {}", c.offset);
            assert!(c.text.chars().count() <= max, "chunk of {} chars", c.text.chars().count());
            assert!(!c.text.is_empty());
            expected_offset += c.text.len();
        }
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = RecursiveCharacterSplitter::default().split("just a few words", "local", 4000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "just a few words");
        assert_eq!(chunks[0].source, "local");
    }

    #[test]
    fn test_empty_text_gives_no_chunks() {
        assert!(RecursiveCharacterSplitter::default().split("", "local", 10).is_empty());
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let text = "aaaa aaaa\n\nbbbb bbbb\n\ncccc";
        let chunks = RecursiveCharacterSplitter::default().split(text, "local", 12);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["aaaa aaaa", "\n\nbbbb bbbb", "\n\ncccc"]);
        assert_covers(text, &chunks, 12);
    }

    #[test]
    fn test_falls_back_to_words_then_characters() {
        let text = "one two three supercalifragilistic four";
        let chunks = RecursiveCharacterSplitter::default().split(text, "local", 8);
        assert_covers(text, &chunks, 8);
        // The long word has no boundary inside it and must be hard-cut.
        assert!(chunks.iter().any(|c| c.text == " superca"));
        assert!(chunks.iter().any(|c| c.text == "lifragil"));
    }

    #[test]
    fn test_merges_small_pieces_up_to_budget() {
        let text = "a b c d e f g h";
        let chunks = RecursiveCharacterSplitter::default().split(text, "local", 7);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a b c d", " e f g", " h"]);
    }

    #[test]
    fn test_coverage_on_mixed_text() {
        let mut text = String::new();
        for i in 0..200 {
            text.push_str(&format!("Speaker {}: line number {} of the transcript.", i % 3, i));
            text.push(if i % 7 == 0 { '\n' } else { ' ' });
            if i % 19 == 0 {
                text.push_str("\n\n");
            }
        }
        for max in [1, 5, 40, 100, 4000] {
            let chunks = RecursiveCharacterSplitter::default().split(&text, "local", max);
            assert_covers(&text, &chunks, max);
        }
    }

    #[test]
    fn test_multibyte_characters_counted_as_chars() {
        let text = "żółć gęślą jaźń ✓✓✓✓";
        let chunks = RecursiveCharacterSplitter::default().split(text, "local", 5);
        assert_covers(text, &chunks, 5);
    }

    #[test]
    fn test_custom_separators_get_char_fallback() {
        let splitter = RecursiveCharacterSplitter::new(&["|"]);
        let text = "ab|cdefgh";
        let chunks = splitter.split(text, "local", 3);
        assert_covers(text, &chunks, 3);
    }
}
