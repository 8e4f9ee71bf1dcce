//! Sliding-window text chunker with semantic-boundary snapping.
//!
//! Windows of `chunk_size` characters slide over the text with `overlap`
//! characters of context carried between neighbors. Before cutting, the
//! window end snaps back to the best separator in the trailing
//! lookback region so chunks end on paragraph/sentence boundaries when one
//! is available. Offsets are char offsets, matching how documents store
//! `start_char`/`end_char`.

use crate::core::config::SEPARATOR_LOOKBACK_CHARS;

/// Boundary candidates, best first.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", ";", ":", " "];

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub start_char: usize,
    pub end_char: usize,
}

/// Split `text` into overlapping chunks of at most roughly `chunk_size`
/// characters.
///
/// Start offsets are strictly increasing; when `overlap >= chunk_size` the
/// window is forced forward by half a chunk so termination is guaranteed.
/// Whitespace-only windows are suppressed.
pub fn chunk(text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    if total == 0 || chunk_size == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < total {
        let mut end = (start + chunk_size).min(total);

        if end < total {
            if let Some(snapped) = snap_to_separator(&chars, start, end) {
                end = snapped;
            }
        }

        let content: String = chars[start..end].iter().collect();
        if !content.trim().is_empty() {
            chunks.push(Chunk {
                content,
                start_char: start,
                end_char: end,
            });
        }

        if end >= total {
            break;
        }

        let mut next = end.saturating_sub(overlap);
        if next <= start {
            // Force progress when the overlap would stall the window.
            next = start + (chunk_size / 2).max(1);
        }
        start = next;
    }

    chunks
}

/// Search the last [`SEPARATOR_LOOKBACK_CHARS`] chars before `end` for the
/// highest-precedence separator and return the offset just past it.
fn snap_to_separator(chars: &[char], start: usize, end: usize) -> Option<usize> {
    let window_start = end.saturating_sub(SEPARATOR_LOOKBACK_CHARS).max(start);
    let window: String = chars[window_start..end].iter().collect();

    for sep in SEPARATORS {
        if let Some(byte_pos) = window.rfind(sep) {
            let chars_before = window[..byte_pos].chars().count();
            let cut = window_start + chars_before + sep.chars().count();
            if cut > start {
                return Some(cut);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariants(text: &str, chunks: &[Chunk]) {
        let total = text.chars().count();
        for (i, c) in chunks.iter().enumerate() {
            assert!(c.start_char < c.end_char, "chunk {i} is empty-range");
            assert!(c.end_char <= total);
            assert_eq!(c.content.chars().count(), c.end_char - c.start_char);
            if i > 0 {
                assert!(
                    c.start_char > chunks[i - 1].start_char,
                    "start offsets must strictly increase"
                );
            }
        }
        if let Some(last) = chunks.last() {
            assert_eq!(last.end_char, total, "chunks must reach the end of text");
        }
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = chunk("hello world", 100, 20);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "hello world");
        assert_eq!((chunks[0].start_char, chunks[0].end_char), (0, 11));
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(chunk("", 100, 20).is_empty());
        assert!(chunk("   \n  ", 3, 1).is_empty());
    }

    #[test]
    fn splits_at_sentence_boundaries() {
        // Windows snap back to the ". " separators.
        let chunks = chunk("A. B. C. D.", 6, 2);
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(
                c.content.chars().count() <= 8,
                "chunk too long: {:?}",
                c.content
            );
        }
        assert_invariants("A. B. C. D.", &chunks);
        // All but the final chunk end just past a sentence separator.
        for c in &chunks[..chunks.len() - 1] {
            assert!(c.content.ends_with(". "), "bad boundary: {:?}", c.content);
        }
    }

    #[test]
    fn prefers_paragraph_breaks_over_sentences() {
        let text = format!("{}.\n\n{}", "a".repeat(80), "b".repeat(80));
        let chunks = chunk(&text, 100, 10);
        assert!(chunks[0].content.ends_with("\n\n"));
        assert_invariants(&text, &chunks);
    }

    #[test]
    fn overlap_carries_context() {
        let text = "x".repeat(250);
        let chunks = chunk(&text, 100, 20);
        assert_invariants(&text, &chunks);
        for w in chunks.windows(2) {
            assert!(
                w[1].start_char < w[0].end_char,
                "consecutive chunks must overlap"
            );
        }
    }

    #[test]
    fn degenerate_overlap_still_terminates() {
        let text = "y".repeat(500);
        // overlap >= chunk_size would stall a naive implementation
        let chunks = chunk(&text, 50, 50);
        assert!(!chunks.is_empty());
        assert_invariants(&text, &chunks);
    }

    #[test]
    fn rechunking_is_deterministic() {
        let text = "Sentence one. Sentence two. Sentence three. Sentence four.";
        let a = chunk(text, 25, 5);
        let b = chunk(text, 25, 5);
        assert_eq!(a, b);
    }

    #[test]
    fn offsets_are_char_based_for_multibyte_text() {
        let text = "héllo wörld. ünïcode content here. final bit.";
        let chunks = chunk(text, 20, 5);
        let chars: Vec<char> = text.chars().collect();
        for c in &chunks {
            let expect: String = chars[c.start_char..c.end_char].iter().collect();
            assert_eq!(c.content, expect);
        }
        assert_invariants(text, &chunks);
    }

    #[test]
    fn nonoverlapping_prefixes_reconstruct_input() {
        let text = "The quick brown fox jumps over the lazy dog. \
                    Pack my box with five dozen liquor jugs. \
                    How vexingly quick daft zebras jump.";
        let chunks = chunk(text, 40, 10);
        assert_invariants(text, &chunks);
        let chars: Vec<char> = text.chars().collect();
        let mut rebuilt = String::new();
        let mut covered = 0usize;
        for c in &chunks {
            let from = c.start_char.max(covered);
            if from < c.end_char {
                let piece: String = chars[from..c.end_char].iter().collect();
                rebuilt.push_str(&piece);
                covered = c.end_char;
            }
        }
        assert_eq!(rebuilt, text);
    }
}
