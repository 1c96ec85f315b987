//! Text cleaning and paragraph-boundary chunking.
//!
//! Scraped page text arrives full of navigation debris: breadcrumb trails,
//! inline script fragments, and single-word menu links. The cleaning pass
//! drops those line by line inside each paragraph; the chunking pass then
//! greedily packs whole paragraphs into chunks of roughly `target_words`
//! words. A chunk is never split mid-paragraph, so one oversized paragraph
//! becomes one oversized chunk.

/// Lines longer than this are treated as non-prose garbage (minified
/// scripts, tracking URLs) and dropped.
const MAX_LINE_CHARS: usize = 300;

/// Standalone navigation words dropped during cleaning.
const NAV_WORDS: [&str; 5] = ["home", "back", "next", "previous", "menu"];

/// Split raw text into cleaned paragraphs.
///
/// Paragraph boundaries are runs of blank lines in the raw text. Within
/// each paragraph, lines failing the content filters are dropped; a
/// paragraph whose lines all fail disappears entirely.
pub fn clean_paragraphs(raw: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
            continue;
        }
        if keep_line(trimmed) {
            current.push(trimmed);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }

    paragraphs
}

fn keep_line(line: &str) -> bool {
    let chars = line.chars().count();
    if chars > MAX_LINE_CHARS {
        return false;
    }
    if line.contains("function(") || line.contains("var ") || line.contains("const ") {
        return false;
    }
    // Breadcrumb trails: "Home > Services > Apply"
    if line.contains(" > ") && chars < 100 {
        return false;
    }
    let lower = line.to_lowercase();
    if NAV_WORDS.contains(&lower.as_str()) {
        return false;
    }
    true
}

/// The cleaned form of the raw text: surviving paragraphs joined by a
/// blank line. Joining the chunks of [`chunk_text`] with `"\n\n"`
/// reconstructs exactly this string.
pub fn cleaned_text(raw: &str) -> String {
    clean_paragraphs(raw).join("\n\n")
}

/// Greedily pack paragraphs into chunks of at most `target_words` words.
///
/// A paragraph that would push the current chunk past the target closes
/// the chunk and starts the next one. A single paragraph longer than the
/// target is emitted whole as its own chunk. The final partial chunk is
/// always emitted.
pub fn chunk_paragraphs(paragraphs: &[String], target_words: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_words = 0usize;

    for para in paragraphs {
        let para_words = para.split_whitespace().count();
        if current_words + para_words > target_words && !current.is_empty() {
            chunks.push(current.join("\n\n"));
            current.clear();
            current_words = 0;
        }
        current.push(para);
        current_words += para_words;
    }
    if !current.is_empty() {
        chunks.push(current.join("\n\n"));
    }

    chunks
}

/// Clean `raw` and chunk it: the full chunker contract. Empty or
/// all-garbage input yields no chunks.
pub fn chunk_text(raw: &str, target_words: usize) -> Vec<String> {
    chunk_paragraphs(&clean_paragraphs(raw), target_words)
}
