//! Splits cleaned text into bounded, overlapping chunks (§4.3).

use core_types::{Chunk, FileMetadata};
use std::path::Path;

const SENTENCE_BOUNDARIES: [char; 3] = ['.', '!', '?'];

/// Normalize, split, and assign offsets to produce the chunk set for one
/// file. Empty or whitespace-only input yields an empty list.
pub fn chunk(
    text: &str,
    source_path: &Path,
    metadata: &FileMetadata,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Chunk> {
    let cleaned = normalize(text);
    if cleaned.trim().is_empty() {
        return Vec::new();
    }

    let segments = split_segments(&cleaned, chunk_size, chunk_overlap);

    let mut chunks = Vec::with_capacity(segments.len());
    let mut cursor = 0usize;
    for (i, segment) in segments.iter().enumerate() {
        let start_char = find_from(&cleaned, segment, cursor).unwrap_or(cursor);
        let end_char = start_char + segment.chars().count();
        cursor = end_char.saturating_sub(chunk_overlap);

        chunks.push(Chunk {
            chunk_id: Chunk::make_id(source_path, i),
            source_path: source_path.to_path_buf(),
            chunk_index: i,
            start_char,
            end_char,
            text: segment.clone(),
            metadata: metadata.clone(),
        });
    }
    chunks
}

/// Collapse whitespace runs, strip control characters, normalize line
/// endings, and trim — mirroring the original content cleaner exactly.
fn normalize(text: &str) -> String {
    let mut collapsed = String::with_capacity(text.len());
    let mut last_was_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                collapsed.push(' ');
                last_was_space = true;
            }
        } else {
            collapsed.push(ch);
            last_was_space = false;
        }
    }

    let stripped: String = collapsed
        .chars()
        .filter(|&c| !is_stripped_control(c))
        .collect();

    stripped.trim().to_string()
}

fn is_stripped_control(c: char) -> bool {
    matches!(c as u32,
        0x00..=0x08 | 0x0b | 0x0c | 0x0e..=0x1f | 0x7f..=0x9f)
}

/// Split `text` into segments of roughly `chunk_size` characters, preferring
/// a sentence boundary, falling back to a space, within the target window.
fn split_segments(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let mut segments = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let max_end = (start + chunk_size).min(chars.len());
        let end = if max_end >= chars.len() {
            chars.len()
        } else {
            find_boundary(&chars, start, max_end).unwrap_or(max_end)
        };

        let end = end.max(start + 1); // guarantee forward progress
        let segment: String = chars[start..end].iter().collect();
        let trimmed = segment.trim();
        if !trimmed.is_empty() {
            segments.push(trimmed.to_string());
        }

        if end >= chars.len() {
            break;
        }

        let next_start = end.saturating_sub(overlap);
        start = if next_start > start { next_start } else { end };
    }

    segments
}

/// Search backward from `max_end` for a sentence-ending punctuation mark
/// followed by whitespace; fall back to the nearest preceding space.
fn find_boundary(chars: &[char], start: usize, max_end: usize) -> Option<usize> {
    for i in (start + 1..max_end).rev() {
        if SENTENCE_BOUNDARIES.contains(&chars[i - 1]) && chars[i].is_whitespace() {
            return Some(i);
        }
    }
    for i in (start + 1..max_end).rev() {
        if chars[i].is_whitespace() {
            return Some(i);
        }
    }
    None
}

fn find_from(haystack: &str, needle: &str, cursor_chars: usize) -> Option<usize> {
    let byte_cursor = char_to_byte_index(haystack, cursor_chars);
    haystack[byte_cursor..]
        .find(needle)
        .map(|byte_off| byte_to_char_index(haystack, byte_cursor + byte_off))
}

fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(b, _)| b)
        .unwrap_or(s.len())
}

fn byte_to_char_index(s: &str, byte_idx: usize) -> usize {
    s[..byte_idx].chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> FileMetadata {
        FileMetadata::skeleton(Path::new("/tmp/a.txt").to_path_buf())
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk("", Path::new("/tmp/a.txt"), &meta(), 512, 50).is_empty());
        assert!(chunk("   \n\t  ", Path::new("/tmp/a.txt"), &meta(), 512, 50).is_empty());
    }

    #[test]
    fn chunk_ids_are_dense_and_deterministic() {
        let text = "word ".repeat(400);
        let chunks = chunk(&text, Path::new("/tmp/a.txt"), &meta(), 50, 10);
        assert!(!chunks.is_empty());
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert_eq!(c.chunk_id, format!("/tmp/a.txt:chunk:{i}"));
            assert!(c.start_char < c.end_char);
        }
    }

    #[test]
    fn adjacent_chunks_overlap_within_bound() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa ".repeat(20);
        let chunks = chunk(&text, Path::new("/tmp/a.txt"), &meta(), 40, 10);
        for pair in chunks.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(b.start_char + 10 >= a.end_char.saturating_sub(10));
        }
    }

    #[test]
    fn normalize_collapses_whitespace_and_strips_control_chars() {
        let raw = "hello\r\n\tworld\x0bfoo  bar";
        let cleaned = normalize(raw);
        assert!(!cleaned.contains('\u{b}'));
        assert!(!cleaned.contains("  "));
        assert_eq!(cleaned, "hello world foo bar");
    }

    #[test]
    fn single_short_text_produces_one_chunk() {
        let chunks = chunk(
            "The quick brown fox jumps over the lazy dog",
            Path::new("/tmp/a.txt"),
            &meta(),
            512,
            50,
        );
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_char, 0);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn words() -> impl Strategy<Value = String> {
        proptest::collection::vec("[a-zA-Z]{1,12}", 0..200).prop_map(|ws| ws.join(" "))
    }

    proptest! {
        /// §8 invariant: chunk indices for a given source form a dense
        /// `0..N-1` run with no gaps, and every chunk has `start < end`.
        #[test]
        fn chunk_indices_are_dense_and_ordered(
            text in words(),
            chunk_size in 10usize..200,
            overlap in 0usize..50,
        ) {
            let meta = FileMetadata::skeleton(Path::new("/tmp/doc.txt").to_path_buf());
            let chunks = chunk(&text, Path::new("/tmp/doc.txt"), &meta, chunk_size, overlap);
            for (i, c) in chunks.iter().enumerate() {
                prop_assert_eq!(c.chunk_index, i);
                prop_assert!(c.start_char < c.end_char);
            }
        }

        /// §8 invariant: `chunks[i+1].start_char >= chunks[i].end_char - chunk_overlap`.
        #[test]
        fn adjacent_chunks_respect_overlap_bound(
            text in words(),
            chunk_size in 10usize..200,
            overlap in 0usize..50,
        ) {
            let meta = FileMetadata::skeleton(Path::new("/tmp/doc.txt").to_path_buf());
            let chunks = chunk(&text, Path::new("/tmp/doc.txt"), &meta, chunk_size, overlap);
            for pair in chunks.windows(2) {
                prop_assert!(pair[1].start_char >= pair[0].end_char.saturating_sub(overlap));
            }
        }

        /// Empty or whitespace-only input always yields an empty chunk list,
        /// regardless of the requested chunk size or overlap.
        #[test]
        fn blank_input_never_produces_chunks(
            spaces in proptest::collection::vec(" |\t|\n", 0..20),
            chunk_size in 10usize..200,
            overlap in 0usize..50,
        ) {
            let blank: String = spaces.concat();
            let meta = FileMetadata::skeleton(Path::new("/tmp/doc.txt").to_path_buf());
            let chunks = chunk(&blank, Path::new("/tmp/doc.txt"), &meta, chunk_size, overlap);
            prop_assert!(chunks.is_empty());
        }
    }
}
