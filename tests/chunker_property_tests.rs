//! Property-based tests for the layout-aware chunker

use docpipe::{
    ChunkingConfig, Chunker, DocumentMetadata, ExtractedPage, ExtractedTable, PageMetadata,
    TableCell, TokenCounter,
};
use proptest::prelude::*;
use std::collections::HashSet;

/// Whitespace-word token counter: concatenation never changes counts,
/// so packed sums equal exact counts.
struct WordCounter;

impl TokenCounter for WordCounter {
    fn count_tokens(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn tokenize(&self, text: &str) -> Vec<usize> {
        (0..self.count_tokens(text)).collect()
    }

    fn tail(&self, text: &str, n: usize) -> String {
        let words: Vec<&str> = text.split_whitespace().collect();
        let start = words.len().saturating_sub(n);
        words[start..].join(" ")
    }

    fn name(&self) -> &str {
        "word"
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn doc() -> DocumentMetadata {
    DocumentMetadata::new("prop.txt", "file:///prop.txt", b"bytes")
}

fn build_pages(page_texts: &[String]) -> Vec<(PageMetadata, ExtractedPage)> {
    page_texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let page_num = i as u32 + 1;
            (
                PageMetadata::new("prop.txt", page_num, None),
                ExtractedPage::new(page_num, text),
            )
        })
        .collect()
}

prop_compose! {
    /// A paragraph of 1..40 short words
    fn arb_paragraph()(words in prop::collection::vec("[a-z]{1,8}", 1..40)) -> String {
        words.join(" ")
    }
}

prop_compose! {
    /// A page of 1..6 paragraphs separated by blank lines
    fn arb_page()(paragraphs in prop::collection::vec(arb_paragraph(), 1..6)) -> String {
        paragraphs.join("\n\n")
    }
}

prop_compose! {
    fn arb_config()(
        target_tokens in 8usize..80,
        overlap_percent in 0usize..30,
        cross_page_overlap in any::<bool>(),
    ) -> ChunkingConfig {
        ChunkingConfig {
            target_tokens,
            overlap_percent,
            cross_page_overlap,
            max_chars: 1_000_000,
            absolute_max_tokens: None,
            fallback_max_seq_length: None,
        }
    }
}

proptest! {
    /// P1: packed content stays within the effective budget; full chunk
    /// text additionally carries at most the overlap rider. Oversize
    /// exceptions hold a single sentinel.
    #[test]
    fn prop_token_budget_holds(
        pages in prop::collection::vec(arb_page(), 1..5),
        config in arb_config(),
    ) {
        let counter = WordCounter;
        let (chunker, _) = Chunker::new(&counter, &config, 100_000);
        let budget = chunker.budget();

        let outcome = chunker.chunk_document(&doc(), &build_pages(&pages));
        for chunk in &outcome.chunks {
            let sentinel_only = chunk.tables.len() + chunk.figures.len() == 1;
            prop_assert!(
                sentinel_only
                    || chunk.token_count
                        <= budget.effective_max_tokens + budget.overlap_tokens,
                "{} has {} tokens, budget {} (+{} overlap)",
                chunk.chunk_id,
                chunk.token_count,
                budget.effective_max_tokens,
                budget.overlap_tokens
            );
        }
    }

    /// P2: without overlap, chunk texts concatenate back to the page
    /// text up to whitespace normalization.
    #[test]
    fn prop_text_reassembles(
        pages in prop::collection::vec(arb_page(), 1..5),
        target_tokens in 8usize..80,
    ) {
        let counter = WordCounter;
        let config = ChunkingConfig {
            target_tokens,
            overlap_percent: 0,
            cross_page_overlap: false,
            max_chars: 1_000_000,
            absolute_max_tokens: None,
            fallback_max_seq_length: None,
        };
        let (chunker, _) = Chunker::new(&counter, &config, 100_000);

        let outcome = chunker.chunk_document(&doc(), &build_pages(&pages));

        let reassembled = normalize(
            &outcome
                .chunks
                .iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        );
        let expected = normalize(&pages.join(" "));
        prop_assert_eq!(reassembled, expected);
    }

    /// P3: chunk ids are unique across the document.
    #[test]
    fn prop_chunk_ids_unique(
        pages in prop::collection::vec(arb_page(), 1..5),
        config in arb_config(),
    ) {
        let counter = WordCounter;
        let (chunker, _) = Chunker::new(&counter, &config, 100_000);

        let outcome = chunker.chunk_document(&doc(), &build_pages(&pages));
        let mut seen = HashSet::new();
        for chunk in &outcome.chunks {
            prop_assert!(seen.insert(chunk.chunk_id.clone()), "duplicate {}", chunk.chunk_id);
        }
    }

    /// P4: identical inputs produce identical chunk sequences.
    #[test]
    fn prop_deterministic(
        pages in prop::collection::vec(arb_page(), 1..5),
        config in arb_config(),
    ) {
        let counter = WordCounter;
        let (chunker, _) = Chunker::new(&counter, &config, 100_000);
        let built = build_pages(&pages);

        let a = chunker.chunk_document(&doc(), &built);
        let b = chunker.chunk_document(&doc(), &built);

        prop_assert_eq!(a.chunks.len(), b.chunks.len());
        for (x, y) in a.chunks.iter().zip(b.chunks.iter()) {
            prop_assert_eq!(&x.chunk_id, &y.chunk_id);
            prop_assert_eq!(&x.text, &y.text);
            prop_assert_eq!(x.token_count, y.token_count);
        }
    }

    /// Tables stay atomic: the rendered text lands in exactly one
    /// chunk, and that chunk references the table id.
    #[test]
    fn prop_table_atomic(
        before in arb_paragraph(),
        after in arb_paragraph(),
        table_words in 1usize..60,
        target_tokens in 8usize..40,
    ) {
        let counter = WordCounter;
        let config = ChunkingConfig {
            target_tokens,
            overlap_percent: 0,
            cross_page_overlap: false,
            max_chars: 1_000_000,
            absolute_max_tokens: None,
            fallback_max_seq_length: None,
        };
        let (chunker, _) = Chunker::new(&counter, &config, 100_000);

        let text = format!("{}\n\n{}", before, after);
        let rendered: String = (0..table_words)
            .map(|i| format!("cell{}", i))
            .collect::<Vec<_>>()
            .join(" ");

        let mut table = ExtractedTable::new("tbl", 1, 1, vec![TableCell::new(0, 0, "x")])
            .at_offset(before.len() + 2);
        table.rendered_text = Some(rendered.clone());
        table.token_count = table_words;

        let mut page = ExtractedPage::new(1, &text);
        page.tables.push(table);
        let pages = vec![(PageMetadata::new("prop.txt", 1, None), page)];

        let outcome = chunker.chunk_document(&doc(), &pages);

        let holders: Vec<_> = outcome
            .chunks
            .iter()
            .filter(|c| c.tables.contains(&"tbl".to_string()))
            .collect();
        prop_assert_eq!(holders.len(), 1);
        prop_assert!(holders[0].text.contains(&rendered));

        let appearances: usize = outcome
            .chunks
            .iter()
            .map(|c| c.text.matches(&rendered).count())
            .sum();
        prop_assert_eq!(appearances, 1);
    }
}
