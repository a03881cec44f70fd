//! Boilerplate stripping and whitespace normalization.
//!
//! Extracted web content arrives littered with share buttons, cookie
//! banners, and navigation markers. [`clean_text`] removes lines matching
//! the known patterns and tidies the remaining whitespace. The function is
//! pure and idempotent: `clean_text(clean_text(x)) == clean_text(x)`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Line-anchored, case-insensitive boilerplate markers. A line whose
/// trimmed form matches any of these is dropped wholesale.
static BOILERPLATE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^(share|tweet|pin|email|print|subscribe|follow us|related posts?)",
        r"(?i)^(cookie|privacy|terms of service|copyright ©)",
        r"(?i)^(advertisement|sponsored|promoted)",
        r"(?i)^\[?\s*(menu|navigation|sidebar|footer|header)\s*\]?$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("boilerplate pattern"))
    .collect()
});

static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("blank-run pattern"));
static TRAILING_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+\n").expect("trailing pattern"));

/// Strip boilerplate lines, normalize whitespace, and tidy up extracted text.
pub fn clean_text(text: &str) -> String {
    let kept: Vec<&str> = text
        .lines()
        .filter(|line| {
            let stripped = line.trim();
            !BOILERPLATE.iter().any(|p| p.is_match(stripped))
        })
        .collect();

    let joined = kept.join("\n");

    // Collapse runs of 3+ blank lines into 2.
    let collapsed = BLANK_RUNS.replace_all(&joined, "\n\n");

    // Normalize non-breaking spaces and strip trailing whitespace per line.
    let despaced = collapsed.replace('\u{a0}', " ");
    let trimmed_lines = TRAILING_WS.replace_all(&despaced, "\n");

    trimmed_lines.trim().to_string()
}
