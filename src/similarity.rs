//! Lexical similarity between short free-text work descriptions.
//!
//! Words are lowercase `[a-z0-9]` runs longer than three characters; two texts
//! are compared by the Jaccard index of their word sets. No stemming, no
//! stopwords beyond the length filter.

use regex_lite::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Title similarity at or above this rejects a new task as a near-duplicate.
pub const DEDUP_THRESHOLD: f64 = 0.5;

/// Task-vs-claim similarity at or above this marks the task contested.
pub const CONTENTION_THRESHOLD: f64 = 0.25;

fn non_word_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9\s]").expect("static regex"))
}

/// Extract the comparable word set of a text.
pub fn extract_words(text: &str) -> HashSet<String> {
    let lowered = text.to_lowercase();
    non_word_chars()
        .replace_all(&lowered, " ")
        .split_whitespace()
        .filter(|w| w.len() > 3)
        .map(str::to_string)
        .collect()
}

/// Jaccard index of two word sets, 0 when either is empty.
pub fn similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

/// Similarity of two raw texts.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    similarity(&extract_words(a), &extract_words(b))
}

/// Similarity as a rounded percentage.
pub fn percent(similarity: f64) -> u32 {
    (similarity * 100.0).round() as u32
}

/// Display name of an agent identity: the segment after the last `/`.
pub fn short_agent_name(agent: &str) -> &str {
    agent.rsplit('/').next().unwrap_or(agent)
}

/// Paths of `mine` that also appear in `theirs`, in `mine`'s order.
pub fn file_overlap(mine: &[String], theirs: &[String]) -> Vec<String> {
    let theirs: HashSet<&str> = theirs.iter().map(String::as_str).collect();
    mine.iter()
        .filter(|f| theirs.contains(f.as_str()))
        .cloned()
        .collect()
}
