use super::SearchMatch;
use std::collections::HashSet;

const EMBEDDING_WEIGHT: f32 = 0.6;
const TERM_OVERLAP_WEIGHT: f32 = 0.3;
const POSITION_WEIGHT: f32 = 0.05;
const EXACT_PHRASE_BONUS: f32 = 0.05;

/// Reorders similarity-ranked candidates using extra relevance signals.
pub trait Reranker: Send + Sync {
    /// Returns the candidates best first, each carrying its `rerank_score`.
    fn rerank(&self, query: &str, candidates: Vec<SearchMatch>) -> Vec<SearchMatch>;
}

/// Deterministic hybrid of embedding similarity and lexical matching.
///
/// Score = 0.6 * embedding score + 0.3 * query-term overlap
///       + 0.05 * first-match position score + 0.05 if the query phrase
///       appears verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct HybridReranker;

impl HybridReranker {
    pub fn new() -> Self {
        Self
    }
}

impl Reranker for HybridReranker {
    fn rerank(&self, query: &str, candidates: Vec<SearchMatch>) -> Vec<SearchMatch> {
        if candidates.is_empty() {
            return candidates;
        }

        let query_tokens = tokenize(query);
        let query_phrase = query_tokens.join(" ");

        let mut reranked = candidates;
        for candidate in &mut reranked {
            let score = hybrid_score(&query_tokens, &query_phrase, candidate.text(), candidate.score);
            candidate.rerank_score = Some(score);
        }

        // stable: exact ties keep their incoming order
        reranked.sort_by(|a, b| {
            b.rerank_score
                .unwrap_or(0.0)
                .total_cmp(&a.rerank_score.unwrap_or(0.0))
        });

        tracing::debug!(candidates = reranked.len(), "Reranked results");
        reranked
    }
}

fn hybrid_score(query_tokens: &[String], query_phrase: &str, text: &str, embedding_score: f32) -> f32 {
    let text_tokens = tokenize(text);

    let phrase_bonus = if !query_phrase.is_empty() && text.to_lowercase().contains(query_phrase) {
        EXACT_PHRASE_BONUS
    } else {
        0.0
    };

    embedding_score * EMBEDDING_WEIGHT
        + term_overlap(query_tokens, &text_tokens) * TERM_OVERLAP_WEIGHT
        + position_score(query_tokens, &text_tokens) * POSITION_WEIGHT
        + phrase_bonus
}

/// Fraction of query tokens that occur anywhere in the text.
fn term_overlap(query_tokens: &[String], text_tokens: &[String]) -> f32 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let text_set: HashSet<&str> = text_tokens.iter().map(String::as_str).collect();
    let matched = query_tokens
        .iter()
        .filter(|token| text_set.contains(token.as_str()))
        .count();
    matched as f32 / query_tokens.len() as f32
}

/// `1 / (1 + ln(i + 1))` for the first text token `i` matching any query token.
fn position_score(query_tokens: &[String], text_tokens: &[String]) -> f32 {
    let query_set: HashSet<&str> = query_tokens.iter().map(String::as_str).collect();
    text_tokens
        .iter()
        .position(|token| query_set.contains(token.as_str()))
        .map_or(0.0, |index| 1.0 / (1.0 + ((index + 1) as f32).ln()))
}

/// Lowercases and splits on anything that is not ASCII alphanumeric.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}
