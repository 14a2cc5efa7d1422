//! Property tests for chunk coverage and overlap.

use mria_rag::chunking::{Chunk, Chunker, SplitStrategy};
use proptest::prelude::*;

fn arb_strategy() -> impl Strategy<Value = SplitStrategy> {
    prop_oneof![
        Just(SplitStrategy::FixedWidth),
        Just(SplitStrategy::SentenceAware),
        Just(SplitStrategy::ParagraphAware),
    ]
}

/// Prose-like text with sentence ends, line breaks and some multi-byte characters.
fn arb_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            4 => "[a-z]{1,9}",
            1 => Just(". ".to_string()),
            1 => Just("\n".to_string()),
            1 => Just("\n\n".to_string()),
            1 => Just("é✓ü".to_string()),
            3 => Just(" ".to_string()),
        ],
        0..80,
    )
    .prop_map(|parts| parts.concat())
}

/// Chunk sizes with `overlap < max_len`.
fn arb_sizes() -> impl Strategy<Value = (usize, usize)> {
    (1usize..60).prop_flat_map(|max_len| (Just(max_len), 0..max_len))
}

fn reconstruct(chunks: &[Chunk<'_>], overlap: usize) -> String {
    let mut text = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let skip = if i == 0 { 0 } else { overlap };
        text.extend(chunk.text.chars().skip(skip));
    }
    text
}

/// *For any* text and valid sizes, concatenating the chunks with overlaps
/// stripped SHALL reproduce the text exactly, for every strategy.
mod prop_chunk_reconstruction {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_reconstruct_text(
            text in arb_text(),
            (max_len, overlap) in arb_sizes(),
            strategy in arb_strategy(),
        ) {
            let chunker = Chunker::new(max_len, overlap, strategy).unwrap();
            let chunks: Vec<_> = chunker.chunks(&text).collect();
            prop_assert_eq!(reconstruct(&chunks, overlap), text);
        }
    }
}

/// *For any* text, chunks SHALL respect the length bound and the
/// `start = previous end - overlap` invariant, be indexed in order, and
/// cover the text from offset 0 to its end.
mod prop_chunk_bounds {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_are_bounded_and_overlapping(
            text in arb_text(),
            (max_len, overlap) in arb_sizes(),
            strategy in arb_strategy(),
        ) {
            let chunker = Chunker::new(max_len, overlap, strategy).unwrap();
            let chunks: Vec<_> = chunker.chunks(&text).collect();
            let total = text.chars().count();

            if total == 0 {
                prop_assert!(chunks.is_empty());
                return Ok(());
            }

            prop_assert_eq!(chunks[0].start, 0);
            prop_assert_eq!(chunks.last().unwrap().end, total);

            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.index, i);
                prop_assert!(chunk.char_len() >= 1);
                prop_assert!(chunk.char_len() <= max_len);
                prop_assert_eq!(chunk.text.chars().count(), chunk.char_len());
            }
            for pair in chunks.windows(2) {
                prop_assert_eq!(pair[1].start, pair[0].end - overlap);
                prop_assert!(pair[1].end > pair[0].end);
            }
        }
    }
}

#[test]
fn free_function_matches_fixed_width_chunker() {
    let text = "A cat sat on a mat. The mat was red.";
    let free: Vec<_> = mria_rag::chunk(text, 20, 5).unwrap().collect();
    let chunker: Vec<_> =
        Chunker::new(20, 5, SplitStrategy::FixedWidth).unwrap().chunks(text).collect();
    assert_eq!(free, chunker);
    assert!(free.len() >= 2);
}
