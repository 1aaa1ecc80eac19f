//! Token counting for chunk budgets

use std::sync::OnceLock;
use tiktoken_rs::{cl100k_base, p50k_base, r50k_base, CoreBPE};

/// Trait for model-specific token counting
pub trait TokenCounter: Send + Sync {
    /// Count tokens in text
    fn count_tokens(&self, text: &str) -> usize;

    /// Tokenize text and return token IDs
    fn tokenize(&self, text: &str) -> Vec<usize>;

    /// Return the text spanned by the trailing `n` tokens.
    ///
    /// Used to carry overlap into the next chunk; implementations must
    /// return a suffix of the input.
    fn tail(&self, text: &str, n: usize) -> String;

    /// Get tokenizer name
    fn name(&self) -> &str;
}

fn cl100k() -> &'static CoreBPE {
    static BPE: OnceLock<CoreBPE> = OnceLock::new();
    BPE.get_or_init(|| cl100k_base().expect("cl100k_base encoder data is embedded"))
}

fn p50k() -> &'static CoreBPE {
    static BPE: OnceLock<CoreBPE> = OnceLock::new();
    BPE.get_or_init(|| p50k_base().expect("p50k_base encoder data is embedded"))
}

fn r50k() -> &'static CoreBPE {
    static BPE: OnceLock<CoreBPE> = OnceLock::new();
    BPE.get_or_init(|| r50k_base().expect("r50k_base encoder data is embedded"))
}

/// Tiktoken-based counter for OpenAI-family embedding models
pub struct TiktokenCounter {
    tokenizer: &'static CoreBPE,
    model_name: String,
}

impl TiktokenCounter {
    /// Create a counter for a specific model
    pub fn for_model(model: &str) -> Self {
        let (tokenizer, model_name) = match model {
            "text-embedding-3-small" | "text-embedding-3-large" | "gpt-4" | "gpt-4o"
            | "gpt-4o-mini" | "gpt-3.5-turbo" => (cl100k(), "cl100k_base"),
            "text-davinci-003" | "text-davinci-002" => (p50k(), "p50k_base"),
            "text-embedding-ada-002" | "davinci" | "curie" | "babbage" | "ada" => {
                (r50k(), "r50k_base")
            }
            // Unknown models get the modern default
            _ => (cl100k(), "cl100k_base"),
        };

        Self {
            tokenizer,
            model_name: model_name.to_string(),
        }
    }
}

impl TokenCounter for TiktokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        self.tokenizer.encode_ordinary(text).len()
    }

    fn tokenize(&self, text: &str) -> Vec<usize> {
        self.tokenizer.encode_ordinary(text)
    }

    fn tail(&self, text: &str, n: usize) -> String {
        if n == 0 {
            return String::new();
        }
        let tokens = self.tokenizer.encode_ordinary(text);
        if tokens.len() <= n {
            return text.to_string();
        }
        let suffix = tokens[tokens.len() - n..].to_vec();
        match self.tokenizer.decode(suffix) {
            Ok(s) => s,
            // Token boundary fell inside a multi-byte sequence; fall back
            // to a character tail of comparable length.
            Err(_) => char_tail(text, n * 4),
        }
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

/// Character-estimate counter used when no encoder fits the model
#[derive(Debug)]
pub struct CharacterTokenCounter {
    chars_per_token: usize,
}

impl CharacterTokenCounter {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharacterTokenCounter {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TokenCounter for CharacterTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }

    fn tokenize(&self, text: &str) -> Vec<usize> {
        (0..self.count_tokens(text)).collect()
    }

    fn tail(&self, text: &str, n: usize) -> String {
        char_tail(text, n * self.chars_per_token)
    }

    fn name(&self) -> &str {
        "character_estimate"
    }
}

fn char_tail(text: &str, chars: usize) -> String {
    let total = text.chars().count();
    if total <= chars {
        return text.to_string();
    }
    text.chars().skip(total - chars).collect()
}

/// Create the counter matching an embedding model name
pub fn counter_for_model(model: &str) -> Box<dyn TokenCounter> {
    Box::new(TiktokenCounter::for_model(model))
}
