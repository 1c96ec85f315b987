//! Keyword-based category classification and tag extraction.
//!
//! Classification scores each category by how many of its keywords appear
//! in the combined URL + title + text prefix. Ties resolve to the first
//! category in [`CATEGORY_KEYWORDS`] — the table order is a contract, not
//! an accident, and reordering it changes classification results.

use crate::models::Category;

/// Keyword table, iterated in declaration order.
pub const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::ServiceWorkflow,
        &["how to", "steps", "process", "procedure", "apply", "register", "application"],
    ),
    (
        Category::MinistryFaq,
        &["faq", "frequently asked", "question", "answer", "q&a"],
    ),
    (Category::CountyService, &["county", "local", "municipal"]),
    (
        Category::LegalSnippet,
        &["act", "law", "regulation", "legal", "constitution", "right"],
    ),
    (
        Category::UssdSms,
        &["ussd", "sms", "text", "mobile", "short code"],
    ),
    (
        Category::LanguagePack,
        &["translation", "language", "phrase", "dictionary"],
    ),
    (
        Category::AgentOps,
        &["agent", "operation", "procedure", "guideline", "policy"],
    ),
    (
        Category::SafetyEthics,
        &["safety", "ethics", "privacy", "data protection", "security"],
    ),
    (
        Category::OfficerTemplate,
        &["template", "response", "script", "format"],
    ),
];

/// How much of the text participates in classification.
const CLASSIFY_TEXT_PREFIX: usize = 500;

/// How much of the text participates in tag extraction.
const TAG_TEXT_PREFIX: usize = 200;

const MAX_TAGS: usize = 5;

/// Classify a document from its URL, title, and leading text.
///
/// A category's score is the number of its keywords present in the
/// lowercased `"{url} {title} {prefix}"` string; the first category
/// reaching the maximum wins. No keyword hits at all falls back to
/// [`Category::ServiceWorkflow`].
pub fn classify(url: &str, title: &str, text: &str) -> Category {
    let combined = format!("{} {} {}", url, title, char_prefix(text, CLASSIFY_TEXT_PREFIX))
        .to_lowercase();

    let mut best = Category::default();
    let mut best_score = 0usize;
    for (category, keywords) in CATEGORY_KEYWORDS {
        let score = keywords.iter().filter(|k| combined.contains(**k)).count();
        if score > best_score {
            best = *category;
            best_score = score;
        }
    }
    best
}

/// Derive up to five tags from the source URL and leading text.
///
/// `auto_import` always comes first; agency tags follow from independent
/// URL substring checks; service-keyword tags come from the first 200
/// chars of text.
pub fn extract_tags(text: &str, url: &str) -> Vec<String> {
    let mut tags = vec!["auto_import".to_string()];
    let url_lower = url.to_lowercase();

    let agency_checks: [(&[&str], &str); 6] = [
        (&["kra", "tax"], "kra"),
        (&["nhif", "health"], "nhif"),
        (&["huduma"], "huduma"),
        (&["ecitizen"], "ecitizen"),
        (&["immigration", "passport"], "immigration"),
        (&["nssf"], "nssf"),
    ];
    for (needles, tag) in agency_checks {
        if needles.iter().any(|n| url_lower.contains(n)) {
            tags.push(tag.to_string());
        }
    }

    let text_lower = char_prefix(text, TAG_TEXT_PREFIX).to_lowercase();
    for keyword in ["pin", "registration", "application"] {
        if text_lower.contains(keyword) {
            tags.push(keyword.to_string());
        }
    }

    tags.truncate(MAX_TAGS);
    tags
}

/// First `n` chars of `s`, respecting char boundaries.
pub fn char_prefix(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
