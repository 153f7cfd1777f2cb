//! Text processing for indexing
//!
//! - Cleaning (whitespace collapse, punctuation allow-list)
//! - Sentence-aware chunking with overlap between neighbouring chunks
//! - Keyword extraction (stopwords removed, lemmatized, ranked by frequency)
//! - Tokenization shared by the lexical index and its queries

mod lexicon;

pub use lexicon::{is_stopword, lemmatize};

use std::collections::HashMap;
use tracing::debug;

/// Punctuation kept by [`TextProcessor::clean`]
const ALLOWED_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '(', ')', '-'];

/// A chunk of cleaned text ready for indexing
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// The chunk content
    pub text: String,
    /// Length in characters
    pub size: usize,
    /// Sentences contained, counting a partial overlap sentence as one
    pub sentence_count: usize,
    /// Leading characters repeated from the previous chunk
    pub overlap: usize,
}

impl TextChunk {
    /// The part of the chunk that is not repeated from its predecessor
    pub fn fresh_text(&self) -> &str {
        if self.overlap == 0 {
            return &self.text;
        }
        let start = self
            .text
            .char_indices()
            .nth(self.overlap)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len());
        self.text[start..].trim_start()
    }
}

/// Cleans, chunks and mines keywords from raw document text
#[derive(Debug, Clone, Default)]
pub struct TextProcessor;

impl TextProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Collapse whitespace and strip characters outside the allow-list
    pub fn clean(&self, text: &str) -> String {
        let filtered: String = text
            .chars()
            .filter(|c| {
                c.is_alphanumeric()
                    || *c == '_'
                    || c.is_whitespace()
                    || ALLOWED_PUNCTUATION.contains(c)
            })
            .collect();

        filtered.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Split text into sentence-aligned chunks of at most `max_size` characters.
    ///
    /// Each new chunk starts with up to `overlap` characters from the tail of the
    /// previous one. A sentence that leaves no room for that seed (one of at least
    /// `max_size - 1` characters) still gets it, so such a chunk may run past
    /// `max_size`.
    pub fn chunk(&self, text: &str, max_size: usize, overlap: usize) -> Vec<TextChunk> {
        let sentences = split_sentences(text);
        let mut chunks = Vec::new();

        let mut current = String::new();
        let mut current_len = 0;
        let mut current_sentences = 0;
        let mut current_overlap = 0;

        for sentence in sentences {
            let sentence_len = sentence.chars().count();

            if current_len > 0 && current_len + 1 + sentence_len > max_size {
                // Seed must leave room for the sentence and the joining space
                let room = max_size.saturating_sub(sentence_len + 1);
                let mut seed = overlap_tail(&current, overlap.min(room));
                if seed.is_empty() {
                    // No room next to this sentence; overlap wins over max_size
                    seed = overlap_tail(&current, overlap);
                }

                chunks.push(TextChunk {
                    text: std::mem::take(&mut current),
                    size: current_len,
                    sentence_count: current_sentences,
                    overlap: current_overlap,
                });

                current_overlap = seed.chars().count();
                current_sentences = if seed.is_empty() { 0 } else { split_sentences(&seed).len() };
                current = seed;
                current_len = current_overlap;
            }

            if !current.is_empty() {
                current.push(' ');
                current_len += 1;
            }
            current.push_str(sentence);
            current_len += sentence_len;
            current_sentences += 1;
        }

        if !current.is_empty() {
            chunks.push(TextChunk {
                text: current,
                size: current_len,
                sentence_count: current_sentences,
                overlap: current_overlap,
            });
        }

        debug!(
            input_len = text.len(),
            chunk_count = chunks.len(),
            max_size,
            overlap,
            "Text chunked"
        );

        chunks
    }

    /// Most frequent lemmatized non-stopword terms, ties broken by first occurrence
    pub fn extract_keywords(&self, text: &str, top_k: usize) -> Vec<String> {
        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();

        for (position, token) in tokenize(text)
            .into_iter()
            .filter(|t| t.chars().count() > 2 && !is_stopword(t))
            .enumerate()
        {
            let entry = counts.entry(lemmatize(&token)).or_insert((0, position));
            entry.0 += 1;
        }

        let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
        ranked.into_iter().take(top_k).map(|(word, _)| word).collect()
    }
}

/// Lowercase alphanumeric runs
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// First `max_chars` characters, with an ellipsis when cut
pub fn snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Sentences end at `.`, `!` or `?` followed by whitespace or end of text
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let at_boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
        if at_boundary {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

/// Tail of `text` no longer than `budget` characters, preferring whole sentences
fn overlap_tail(text: &str, budget: usize) -> String {
    if budget == 0 {
        return String::new();
    }
    if text.chars().count() <= budget {
        return text.to_string();
    }

    let sentences = split_sentences(text);
    let mut taken = 0;
    let mut len = 0;
    for sentence in sentences.iter().rev() {
        let extra = sentence.chars().count() + usize::from(taken > 0);
        if len + extra > budget {
            break;
        }
        len += extra;
        taken += 1;
    }
    if taken > 0 {
        return sentences[sentences.len() - taken..].join(" ");
    }

    // Last sentence alone is too long: fall back to a word boundary
    let total = text.chars().count();
    let start = text
        .char_indices()
        .nth(total - budget)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let tail = &text[start..];
    match tail.find(char::is_whitespace) {
        Some(space) if !tail[space..].trim().is_empty() => tail[space..].trim_start().to_string(),
        _ => tail.to_string(),
    }
}
