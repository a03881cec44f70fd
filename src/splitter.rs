//! Word-bounded document splitting.
//!
//! Splits a cleaned document into sections that respect a `max_words`
//! limit. Headings (`# …` / `## …`) are preferred split points; oversize
//! sections fall back to blank-line paragraph boundaries. A paragraph is
//! never split internally, so a single anomalously long paragraph can
//! exceed the limit — it is kept whole rather than cut mid-sentence.
//!
//! The split is a one-shot pure computation. Concatenating the returned
//! sections reproduces the document's heading/paragraph order.

use once_cell::sync::Lazy;
use regex::Regex;

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,2}\s").expect("heading pattern"));
static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{2,}").expect("paragraph pattern"));

/// Number of whitespace-separated words in `text`.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Split a long document into sections of at most `max_words` words.
///
/// Strategy:
/// 1. Split on top-level headings (`# …` or `## …`) when present.
/// 2. If a resulting section still exceeds `max_words`, split on blank-line
///    paragraph boundaries.
/// 3. Never split mid-paragraph.
pub fn split_text(text: &str, max_words: usize) -> Vec<String> {
    if word_count(text) <= max_words {
        return vec![text.to_string()];
    }

    // Try heading-based split first.
    let sections = split_on_headings(text);
    if sections.len() > 1 {
        return enforce_limit(sections, max_words);
    }

    // Fall back to paragraph-based split.
    split_on_paragraphs(text, max_words)
}

/// Split on lines starting with `#` or `##`, keeping each heading with the
/// content that follows it. Empty sections are dropped.
fn split_on_headings(text: &str) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    for line in text.split_inclusive('\n') {
        if HEADING.is_match(line) && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Greedily pack paragraphs into sections until adding the next paragraph
/// would exceed `max_words`. A single oversize paragraph becomes its own
/// section, unsplit.
fn split_on_paragraphs(text: &str, max_words: usize) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_wc = 0;
    for para in PARAGRAPH_BREAK.split(text) {
        let wc = word_count(para);
        if !current.is_empty() && current_wc + wc > max_words {
            chunks.push(current.join("\n\n"));
            current.clear();
            current_wc = 0;
        }
        current.push(para);
        current_wc += wc;
    }
    if !current.is_empty() {
        chunks.push(current.join("\n\n"));
    }
    chunks
}

/// Re-split any heading section that exceeds `max_words` on paragraph
/// boundaries, preserving order.
fn enforce_limit(sections: Vec<String>, max_words: usize) -> Vec<String> {
    let mut result = Vec::new();
    for section in sections {
        if word_count(&section) <= max_words {
            result.push(section);
        } else {
            result.extend(split_on_paragraphs(&section, max_words));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn short_text_returned_unchanged() {
        let text = "a small document";
        assert_eq!(split_text(text, 100), vec![text.to_string()]);
    }

    #[test]
    fn splits_on_headings() {
        let text = format!("# Alpha\n\n{}\n\n# Beta\n\n{}", words(30), words(30));
        let sections = split_text(&text, 40);
        assert_eq!(sections.len(), 2);
        assert!(sections[0].starts_with("# Alpha"));
        assert!(sections[1].starts_with("# Beta"));
    }

    #[test]
    fn keeps_heading_with_following_content() {
        let text = format!("## Intro\n{}\n## Next\n{}", words(20), words(20));
        let sections = split_text(&text, 25);
        assert_eq!(sections.len(), 2);
        assert!(sections[0].contains("w19"));
        assert!(sections[1].starts_with("## Next"));
    }

    #[test]
    fn sections_respect_word_bound() {
        let paras: Vec<String> = (0..20).map(|_| words(50)).collect();
        let text = paras.join("\n\n");
        for section in split_text(&text, 120) {
            assert!(word_count(&section) <= 120, "section exceeds bound");
        }
    }

    #[test]
    fn oversize_paragraph_kept_whole() {
        let big = words(500);
        let text = format!("{}\n\n{}", words(10), big);
        let sections = split_text(&text, 100);
        assert!(sections.contains(&big));
    }

    #[test]
    fn concatenation_preserves_order() {
        let paras: Vec<String> = (0..12).map(|i| format!("paragraph {} {}", i, words(40))).collect();
        let text = paras.join("\n\n");
        let sections = split_text(&text, 100);
        let rejoined: Vec<&str> = sections
            .iter()
            .flat_map(|s| s.split_whitespace())
            .collect();
        let original: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(rejoined, original);
    }

    #[test]
    fn heading_sections_over_limit_are_resplit_on_paragraphs() {
        let long_section = (0..10).map(|_| words(50)).collect::<Vec<_>>().join("\n\n");
        let text = format!("# Big\n\n{}\n\n# Small\n\n{}", long_section, words(10));
        let sections = split_text(&text, 120);
        assert!(sections.len() > 2);
        for section in &sections {
            let wc = word_count(section);
            assert!(wc <= 120, "got section of {} words", wc);
        }
    }

    #[test]
    fn two_heading_document_splits_at_headings() {
        // ~9000 words under two level-1 headings with 4000-word budget.
        let part = (0..9).map(|_| words(500)).collect::<Vec<_>>().join("\n\n");
        let text = format!("# First\n\n{}\n\n# Second\n\n{}", part, part);
        let sections = split_text(&text, 4000);
        // Each heading section is ~4500 words, so each is re-split once.
        assert!(sections.len() >= 2);
        assert!(sections[0].starts_with("# First"));
        assert!(sections.iter().any(|s| s.starts_with("# Second")));
        for section in &sections {
            assert!(word_count(section) <= 4000);
        }
    }

    #[test]
    fn no_headings_falls_back_to_paragraphs() {
        let paras: Vec<String> = (0..6).map(|_| words(50)).collect();
        let text = paras.join("\n\n");
        let sections = split_text(&text, 100);
        assert_eq!(sections.len(), 3);
    }
}
