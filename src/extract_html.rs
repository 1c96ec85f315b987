//! HTML title and body-text extraction.
//!
//! Government portals bury the service prose under navigation bars, script
//! blobs, and footers. Extraction walks the parsed document with
//! `<script>`, `<style>`, `<nav>`, `<header>`, `<footer>`, and `<aside>`
//! subtrees removed, preferring a recognizable content container before
//! falling back to the whole page. Titles resolve heading-first: a short
//! `<h1>` beats a short `<h2>` beats `<title>`.
//!
//! Parsing never fails on malformed input; the degenerate result is an
//! empty body with an "Untitled" title.

use scraper::{ElementRef, Html, Selector};

const JUNK_TAGS: [&str; 6] = ["script", "style", "nav", "header", "footer", "aside"];

/// Containers tried in order for the main content block.
const CANDIDATE_SELECTORS: [&str; 6] = ["main", "article", "#content", ".content", "#main", ".main"];

/// Headings longer than this are boilerplate, not titles.
const MAX_TITLE_CHARS: usize = 200;

/// A candidate container must carry at least this much text to count as
/// the main content.
const MIN_MAIN_CHARS: usize = 200;

/// Extract `(title, body_text)` from an HTML page.
///
/// The body has one trimmed text node per line; blank-ish nodes are
/// dropped. `url` is only used in diagnostics.
pub fn extract(html: &str, url: &str) -> (String, String) {
    let doc = Html::parse_document(html);
    let title = resolve_title(&doc);

    let body = main_content(&doc);
    if !body.is_empty() {
        return (title, body);
    }

    let full = full_page_text(&doc);
    if full.is_empty() && !html.trim().is_empty() {
        eprintln!("warning: no text extracted from {}", url);
    }
    (title, full)
}

fn resolve_title(doc: &Html) -> String {
    for heading in ["h1", "h2"] {
        if let Some(text) = first_element_text(doc, heading) {
            if !text.is_empty() && text.chars().count() < MAX_TITLE_CHARS {
                return text;
            }
        }
    }
    if let Some(text) = first_element_text(doc, "title") {
        if !text.is_empty() {
            return text;
        }
    }
    "Untitled".to_string()
}

fn first_element_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let el = doc.select(&sel).next()?;
    let joined = el.text().collect::<Vec<_>>().join(" ");
    Some(joined.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Pick the first candidate container with enough text; fall back to
/// `<body>` when none qualifies.
fn main_content(doc: &Html) -> String {
    for sel_str in CANDIDATE_SELECTORS {
        let Ok(sel) = Selector::parse(sel_str) else {
            continue;
        };
        let mut best = String::new();
        for el in doc.select(&sel) {
            let text = element_text(el);
            if text.len() > best.len() {
                best = text;
            }
        }
        if best.chars().count() >= MIN_MAIN_CHARS {
            return best;
        }
    }

    if let Ok(sel) = Selector::parse("body") {
        if let Some(el) = doc.select(&sel).next() {
            return element_text(el);
        }
    }
    String::new()
}

fn full_page_text(doc: &Html) -> String {
    element_text(doc.root_element())
}

/// All text under `el`, one trimmed text node per line, with junk
/// subtrees skipped.
fn element_text(el: ElementRef) -> String {
    let mut lines = Vec::new();
    collect_text(el, &mut lines);
    lines.join("\n")
}

fn collect_text(el: ElementRef, out: &mut Vec<String>) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
        } else if let Some(child_el) = ElementRef::wrap(child) {
            if !JUNK_TAGS.contains(&child_el.value().name()) {
                collect_text(child_el, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_prefers_h1() {
        let html = "<html><head><title>Site Name</title></head><body><h1>NHIF Registration</h1><h2>Subheading</h2><p>Body.</p></body></html>";
        let (title, _) = extract(html, "https://example.go.ke");
        assert_eq!(title, "NHIF Registration");
    }

    #[test]
    fn overlong_h1_falls_through_to_h2() {
        let long_h1 = "x".repeat(250);
        let html = format!(
            "<html><head><title>Site</title></head><body><h1>{}</h1><h2>Passport Renewal</h2></body></html>",
            long_h1
        );
        let (title, _) = extract(&html, "https://example.go.ke");
        assert_eq!(title, "Passport Renewal");
    }

    #[test]
    fn title_falls_back_to_title_tag_then_untitled() {
        let (title, _) = extract(
            "<html><head><title>eCitizen Portal</title></head><body><p>text</p></body></html>",
            "u",
        );
        assert_eq!(title, "eCitizen Portal");

        let (title, _) = extract("<html><body><p>text</p></body></html>", "u");
        assert_eq!(title, "Untitled");
    }

    #[test]
    fn junk_subtrees_are_excluded() {
        let html = "<html><body>\
            <nav>Home Services Contact</nav>\
            <script>var tracker = 1;</script>\
            <style>.x { color: red }</style>\
            <p>Apply for your certificate online.</p>\
            <footer>Copyright ministry</footer>\
            </body></html>";
        let (_, body) = extract(html, "u");
        assert!(body.contains("Apply for your certificate online."));
        assert!(!body.contains("tracker"));
        assert!(!body.contains("color: red"));
        assert!(!body.contains("Copyright"));
        assert!(!body.contains("Home Services"));
    }

    #[test]
    fn prefers_main_container_when_substantial() {
        let filler = "Service requirements and detailed application steps. ".repeat(6);
        let html = format!(
            "<html><body><div class=\"sidebar\">Sidebar links here</div><main><p>{}</p></main></body></html>",
            filler
        );
        let (_, body) = extract(&html, "u");
        assert!(body.contains("Service requirements"));
        assert!(!body.contains("Sidebar links"));
    }

    #[test]
    fn small_page_uses_body_text() {
        let html = "<html><body><main><p>Short.</p></main><p>Outside main.</p></body></html>";
        let (_, body) = extract(html, "u");
        // main is under the content threshold, so the whole body is used
        assert!(body.contains("Short."));
        assert!(body.contains("Outside main."));
    }

    #[test]
    fn text_nodes_become_lines() {
        let html = "<html><body><p>First.</p><p>Second.</p><div><span>Third.</span></div></body></html>";
        let (_, body) = extract(html, "u");
        assert_eq!(body, "First.\nSecond.\nThird.");
    }

    #[test]
    fn malformed_html_does_not_panic() {
        let cases = [
            "",
            "<<<>>>",
            "<html><body><p>unclosed",
            "<div><div><div>nested<p>mess</div>",
            "plain text, no markup at all",
        ];
        for html in cases {
            let (title, _) = extract(html, "u");
            assert!(!title.is_empty());
        }
    }

    #[test]
    fn empty_html_degenerates_cleanly() {
        let (title, body) = extract("", "u");
        assert_eq!(title, "Untitled");
        assert_eq!(body, "");
    }
}
