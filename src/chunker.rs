//! Layout-aware chunking
//!
//! Converts enriched pages into ordered chunks under an adaptive token
//! budget. Tables and figures travel as atomic sentinels; plain text is
//! split at paragraph, then sentence, then word boundaries. Successive
//! chunks share a token-tail overlap that never crosses a sentinel.

use crate::config::ChunkingConfig;
use crate::tokens::TokenCounter;
use crate::types::{ChunkDocument, DocumentMetadata, ExtractedPage, PageMetadata};
use tracing::{debug, warn};

/// Resolved token budget for one document
#[derive(Debug, Clone, Copy)]
pub struct TokenBudget {
    /// Packing budget for chunk content (excludes the overlap prefix)
    pub effective_max_tokens: usize,
    /// Tokens carried from one chunk into the next
    pub overlap_tokens: usize,
}

/// Compute the effective budget from the provider's max sequence length.
///
/// The 15% margin plus the overlap share keep content + overlap safely
/// inside the model window. Returns a warning when the requested target
/// had to be reduced.
pub fn compute_budget(
    config: &ChunkingConfig,
    max_seq_length: usize,
) -> (TokenBudget, Option<String>) {
    let overlap_share = config.overlap_percent as f64 / 100.0;
    let safe_limit = (max_seq_length as f64 * (1.0 - 0.15 - overlap_share)).floor() as usize;
    let safe_limit = safe_limit.max(1);

    let mut warning = None;
    let effective = match config.absolute_max_tokens {
        Some(abs) => abs,
        None => {
            if config.target_tokens > safe_limit {
                warning = Some(format!(
                    "target_tokens {} exceeds the safe limit {} for max_seq_length {}; using {}",
                    config.target_tokens, safe_limit, max_seq_length, safe_limit
                ));
                safe_limit
            } else {
                config.target_tokens
            }
        }
    };

    let overlap_tokens = (effective as f64 * overlap_share).round() as usize;
    (
        TokenBudget {
            effective_max_tokens: effective,
            overlap_tokens,
        },
        warning,
    )
}

/// Chunker output: ordered chunks plus accumulated warnings
#[derive(Debug)]
pub struct ChunkOutcome {
    pub chunks: Vec<ChunkDocument>,
    pub warnings: Vec<String>,
}

/// One span of enriched page content
enum Span {
    /// Contiguous substring of the page text
    Text(String),
    /// Atomic table or figure
    Sentinel {
        id: String,
        is_table: bool,
        text: String,
    },
}

/// Chunk under construction
#[derive(Default)]
struct Building {
    /// Full chunk text including the overlap prefix
    full: String,
    /// Packed content only
    core: String,
    /// Sum of packed span token counts plus inserted separators.
    /// An upper bound on the exact count of `core`: concatenation can
    /// only merge tokens at the seams, never add them.
    sum_tokens: usize,
    /// Content text accumulated since the last sentinel (overlap source)
    trailing_text: String,
    tables: Vec<String>,
    figures: Vec<String>,
    ends_with_sentinel: bool,
}

impl Building {
    fn is_empty(&self) -> bool {
        self.core.is_empty() && self.tables.is_empty() && self.figures.is_empty()
    }
}

/// Finished chunk before id assignment
struct RawChunk {
    full: String,
    core: String,
    core_tokens: usize,
    /// Content since the last sentinel; the only legal overlap source
    trailing_text: String,
    tables: Vec<String>,
    figures: Vec<String>,
    ends_with_sentinel: bool,
}

/// Layout-aware chunker bound to one token counter and budget
pub struct Chunker<'a> {
    counter: &'a dyn TokenCounter,
    config: ChunkingConfig,
    budget: TokenBudget,
}

impl<'a> Chunker<'a> {
    /// Create a chunker; emits the budget-adjustment warning at most once
    pub fn new(
        counter: &'a dyn TokenCounter,
        config: &ChunkingConfig,
        max_seq_length: usize,
    ) -> (Self, Option<String>) {
        let (budget, warning) = compute_budget(config, max_seq_length);
        if let Some(w) = &warning {
            warn!("{}", w);
        }
        (
            Self {
                counter,
                config: config.clone(),
                budget,
            },
            warning,
        )
    }

    pub fn budget(&self) -> TokenBudget {
        self.budget
    }

    /// Chunk all pages of one document.
    ///
    /// Identical inputs produce identical chunk sequences.
    pub fn chunk_document(
        &self,
        document: &DocumentMetadata,
        pages: &[(PageMetadata, ExtractedPage)],
    ) -> ChunkOutcome {
        let mut chunks = Vec::new();
        let mut warnings = Vec::new();
        let mut carried_overlap: Option<String> = None;

        for (page_meta, page) in pages {
            let spans = self.build_spans(page);
            let raw = self.pack_page(spans, carried_overlap.take(), &mut warnings);
            let raw = self.merge_orphan(raw);

            if self.config.cross_page_overlap && self.budget.overlap_tokens > 0 {
                if let Some(last) = raw.last() {
                    if !last.ends_with_sentinel && !last.trailing_text.is_empty() {
                        carried_overlap = Some(self.overlap_tail(&last.trailing_text));
                    }
                }
            }

            for (i, r) in raw.into_iter().enumerate() {
                let chunk_id = format!(
                    "{}_p{}_c{}",
                    document.sourcefile,
                    page_meta.page_num,
                    i + 1
                );
                let token_count = self.counter.count_tokens(&r.full);
                chunks.push(ChunkDocument {
                    document: document.clone(),
                    page: page_meta.clone(),
                    chunk_id,
                    text: r.full,
                    token_count,
                    embedding: None,
                    tables: r.tables,
                    figures: r.figures,
                });
            }
        }

        debug!(
            "Chunked {} into {} chunks (budget {} tokens, overlap {})",
            document.sourcefile,
            chunks.len(),
            self.budget.effective_max_tokens,
            self.budget.overlap_tokens
        );
        ChunkOutcome { chunks, warnings }
    }

    /// Assemble the span sequence for one page: text runs split at
    /// semantic boundaries, tables and figures inlined as sentinels at
    /// their anchors.
    fn build_spans(&self, page: &ExtractedPage) -> Vec<Span> {
        // (offset, insertion order, span) — stable across runs
        let mut anchors: Vec<(usize, usize, Span)> = Vec::new();
        let mut order = 0usize;

        for table in &page.tables {
            let text = table.rendered_text.clone().unwrap_or_default();
            anchors.push((
                table.offset,
                order,
                Span::Sentinel {
                    id: table.table_id.clone(),
                    is_table: true,
                    text,
                },
            ));
            order += 1;
        }
        for image in &page.images {
            let text = if !image.description.is_empty() {
                image.description.clone()
            } else {
                image.caption.clone().unwrap_or_default()
            };
            anchors.push((
                image.offset,
                order,
                Span::Sentinel {
                    id: image.figure_id.clone(),
                    is_table: false,
                    text,
                },
            ));
            order += 1;
        }
        anchors.sort_by_key(|(offset, order, _)| (*offset, *order));

        let text = page.text.as_str();
        let mut spans = Vec::new();
        let mut pos = 0usize;

        for (offset, _, sentinel) in anchors {
            let mut cut = offset.clamp(pos, text.len());
            while cut < text.len() && !text.is_char_boundary(cut) {
                cut += 1;
            }
            if cut > pos {
                self.push_text_units(&text[pos..cut], &mut spans);
            }
            spans.push(sentinel);
            pos = cut;
        }
        if pos < text.len() {
            self.push_text_units(&text[pos..], &mut spans);
        }
        spans
    }

    fn push_text_units(&self, segment: &str, out: &mut Vec<Span>) {
        let budget = self.budget.effective_max_tokens;
        for para in split_after(segment, is_paragraph_break) {
            if self.counter.count_tokens(para) <= budget {
                out.push(Span::Text(para.to_string()));
                continue;
            }
            for sentence in split_after(para, is_sentence_break) {
                if self.counter.count_tokens(sentence) <= budget {
                    out.push(Span::Text(sentence.to_string()));
                    continue;
                }
                for word in split_after(sentence, is_word_break) {
                    if self.counter.count_tokens(word) <= budget {
                        out.push(Span::Text(word.to_string()));
                    } else {
                        // A single word larger than the whole budget;
                        // the budget wins over the word boundary.
                        for piece in self.split_by_chars(word) {
                            out.push(Span::Text(piece));
                        }
                    }
                }
            }
        }
    }

    fn split_by_chars(&self, word: &str) -> Vec<String> {
        let budget = self.budget.effective_max_tokens;
        let mut pieces = Vec::new();
        let mut current = String::new();
        for ch in word.chars() {
            current.push(ch);
            if self.counter.count_tokens(&current) >= budget {
                pieces.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            pieces.push(current);
        }
        pieces
    }

    /// Greedily pack spans into chunks for one page
    fn pack_page(
        &self,
        spans: Vec<Span>,
        mut pending_overlap: Option<String>,
        warnings: &mut Vec<String>,
    ) -> Vec<RawChunk> {
        let budget = self.budget.effective_max_tokens;
        let mut chunks: Vec<RawChunk> = Vec::new();
        let mut current = Building::default();

        for span in spans {
            match &span {
                Span::Sentinel { id, is_table, text } => {
                    let tokens = self.counter.count_tokens(text);
                    if tokens > budget {
                        // Oversize sentinel forms its own chunk; overlap
                        // never crosses a sentinel boundary.
                        if !current.is_empty() {
                            self.close(&mut current, &mut chunks, &mut pending_overlap);
                        }
                        pending_overlap = None;
                        let mut oversize = Building::default();
                        self.append(&mut oversize, &span, None);
                        warnings.push(format!(
                            "{} {} spans {} tokens, above the {}-token budget; emitted as an oversize chunk",
                            if *is_table { "table" } else { "figure" },
                            id,
                            tokens,
                            budget
                        ));
                        self.close(&mut oversize, &mut chunks, &mut None);
                        continue;
                    }
                    if !current.is_empty() && !self.fits(&current, text) {
                        self.close(&mut current, &mut chunks, &mut pending_overlap);
                    }
                    self.append(&mut current, &span, pending_overlap.take());
                }
                Span::Text(text) => {
                    let over_chars = !current.core.is_empty()
                        && current.core.len() + text.len() > self.config.max_chars;
                    if !current.is_empty() && (!self.fits(&current, text) || over_chars) {
                        self.close(&mut current, &mut chunks, &mut pending_overlap);
                    }
                    self.append(&mut current, &span, pending_overlap.take());
                }
            }
        }

        if !current.is_empty() {
            self.close(&mut current, &mut chunks, &mut pending_overlap);
        }
        chunks
    }

    /// Would appending `text` keep the packed content inside the budget?
    ///
    /// Packing sums span token counts (plus one for any inserted
    /// separator); the exact count of the joined text never exceeds
    /// that sum.
    fn fits(&self, current: &Building, text: &str) -> bool {
        let sep = usize::from(needs_separator(&current.core, text));
        current.sum_tokens + self.counter.count_tokens(text) + sep
            <= self.budget.effective_max_tokens
    }

    fn append(&self, current: &mut Building, span: &Span, overlap: Option<String>) {
        if let Some(prefix) = overlap {
            if current.full.is_empty() && !prefix.is_empty() {
                current.full = prefix;
            }
        }
        match span {
            Span::Text(text) => {
                let sep = usize::from(needs_separator(&current.core, text));
                current.sum_tokens += self.counter.count_tokens(text) + sep;
                current.core = compose(&current.core, text, false);
                current.full = compose(&current.full, text, false);
                current.trailing_text = compose(&current.trailing_text, text, false);
                current.ends_with_sentinel = false;
            }
            Span::Sentinel { id, is_table, text } => {
                let sep = usize::from(needs_separator(&current.core, text));
                current.sum_tokens += self.counter.count_tokens(text) + sep;
                current.core = compose(&current.core, text, true);
                current.full = compose(&current.full, text, true);
                current.trailing_text.clear();
                current.ends_with_sentinel = true;
                if *is_table {
                    current.tables.push(id.clone());
                } else {
                    current.figures.push(id.clone());
                }
            }
        }
    }

    /// Close the current chunk and stage the overlap for the next one
    fn close(
        &self,
        current: &mut Building,
        chunks: &mut Vec<RawChunk>,
        pending_overlap: &mut Option<String>,
    ) {
        let finished = std::mem::take(current);

        *pending_overlap = if self.budget.overlap_tokens > 0
            && !finished.ends_with_sentinel
            && !finished.trailing_text.is_empty()
        {
            Some(self.overlap_tail(&finished.trailing_text))
        } else {
            None
        };

        // Whitespace-only leftovers carry nothing worth indexing
        if finished.core.trim().is_empty()
            && finished.tables.is_empty()
            && finished.figures.is_empty()
        {
            return;
        }

        chunks.push(RawChunk {
            core_tokens: self.counter.count_tokens(&finished.core),
            full: finished.full.trim_end().to_string(),
            core: finished.core,
            trailing_text: finished.trailing_text,
            tables: finished.tables,
            figures: finished.figures,
            ends_with_sentinel: finished.ends_with_sentinel,
        });
    }

    fn overlap_tail(&self, text: &str) -> String {
        self.counter.tail(text.trim_end(), self.budget.overlap_tokens)
    }

    /// Fold an undersized final page chunk back into its predecessor
    /// when the predecessor has headroom.
    fn merge_orphan(&self, mut chunks: Vec<RawChunk>) -> Vec<RawChunk> {
        if chunks.len() < 2 {
            return chunks;
        }
        let threshold = ((self.budget.effective_max_tokens as f64) * 0.2) as usize;
        let threshold = threshold.max(self.budget.overlap_tokens);

        let last = &chunks[chunks.len() - 1];
        if last.core_tokens >= threshold {
            return chunks;
        }

        let prev = &chunks[chunks.len() - 2];
        let merged_core = compose(&prev.core, &last.core, last.ends_with_sentinel);
        if self.counter.count_tokens(&merged_core) > self.budget.effective_max_tokens {
            return chunks;
        }

        let last = chunks.pop().expect("checked len");
        let prev = chunks.last_mut().expect("checked len");
        prev.full = compose(&prev.full, &last.core, last.ends_with_sentinel);
        prev.core = merged_core;
        prev.core_tokens = self.counter.count_tokens(&prev.core);
        prev.trailing_text = if last.ends_with_sentinel {
            String::new()
        } else if last.tables.is_empty() && last.figures.is_empty() {
            compose(&prev.trailing_text, &last.core, false)
        } else {
            last.trailing_text.clone()
        };
        prev.tables.extend(last.tables);
        prev.figures.extend(last.figures);
        prev.ends_with_sentinel = last.ends_with_sentinel;
        chunks
    }
}

/// True when joining the two pieces requires an inserted separator
fn needs_separator(left: &str, right: &str) -> bool {
    !left.is_empty()
        && !right.is_empty()
        && !left.ends_with(char::is_whitespace)
        && !right.starts_with(char::is_whitespace)
}

/// Join two pieces of chunk text. Sentinel junctions get a newline when
/// neither side provides whitespace; plain text pieces are contiguous
/// substrings and join verbatim, except across an overlap seam.
fn compose(left: &str, right: &str, sentinel: bool) -> String {
    if left.is_empty() {
        return right.to_string();
    }
    if right.is_empty() {
        return left.to_string();
    }
    if !needs_separator(left, right) {
        format!("{}{}", left, right)
    } else if sentinel {
        format!("{}\n{}", left, right)
    } else {
        format!("{} {}", left, right)
    }
}

fn is_paragraph_break(text: &str, i: usize) -> bool {
    text[..i].ends_with("\n\n") && !text[i..].starts_with('\n')
}

fn is_sentence_break(text: &str, i: usize) -> bool {
    let before = &text[..i];
    let ended = before
        .trim_end_matches(char::is_whitespace)
        .ends_with(['.', '!', '?']);
    ended
        && before.ends_with(char::is_whitespace)
        && !text[i..].starts_with(char::is_whitespace)
}

fn is_word_break(text: &str, i: usize) -> bool {
    text[..i].ends_with(char::is_whitespace) && !text[i..].starts_with(char::is_whitespace)
}

/// Split `text` into contiguous substrings, cutting wherever `breaks`
/// reports a boundary. Separator characters stay attached to the
/// preceding piece, so the pieces concatenate back to the input.
fn split_after(text: &str, breaks: fn(&str, usize) -> bool) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (i, _) in text.char_indices() {
        if i > start && breaks(text, i) {
            pieces.push(&text[start..i]);
            start = i;
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}
