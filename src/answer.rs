//! Retrieval answer assembly.
//!
//! Turns search hits into the chat reply: strips residual markdown from
//! each stored excerpt, cuts excerpts at a sentence boundary where one
//! exists, joins the survivors with a rule, and collects deduplicated
//! citations. When a generation endpoint is configured the excerpts are
//! forwarded as grounding context instead, and any generation failure
//! degrades back to the extractive reply.
//!
//! The chat surface never propagates an error: every failure resolves to
//! a textual reply, so a broken index or embedder degrades the answer
//! instead of the endpoint.

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::embedding::{self, Embedder};
use crate::generate;
use crate::index::{self, RagState};
use crate::models::{Category, DocEntry};

pub const NO_RESULTS_REPLY: &str =
    "No relevant documents found. Please try rephrasing your question.";
pub const INDEX_MISSING_REPLY: &str =
    "RAG index not found. Please run the indexing pipeline first.";

const EXCERPT_CHARS: usize = 300;
const SENTENCE_CUT_MIN: usize = 150;
const REPLY_CAP_CHARS: usize = 6000;

/// The chat response body.
#[derive(Debug, Serialize)]
pub struct ChatAnswer {
    pub reply: String,
    pub citations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugInfo>,
}

impl ChatAnswer {
    pub fn index_missing() -> Self {
        Self {
            reply: INDEX_MISSING_REPLY.to_string(),
            citations: Vec::new(),
            debug: None,
        }
    }

    pub fn retrieval_error(e: &anyhow::Error) -> Self {
        Self {
            reply: format!("Error retrieving documents: {}", e),
            citations: Vec::new(),
            debug: None,
        }
    }
}

/// Retrieval internals echoed back when the caller asks for them.
#[derive(Debug, Serialize)]
pub struct DebugInfo {
    pub query_embedding_shape: Vec<usize>,
    pub top_k_results: Vec<DebugHit>,
}

#[derive(Debug, Serialize)]
pub struct DebugHit {
    pub rank: usize,
    pub title: String,
    pub filename: String,
    pub source: String,
    pub distance: f32,
    pub category: Category,
    pub chunk_index: usize,
}

// ============ Markdown stripping ============

fn strip_header(line: &str) -> &str {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if (1..=6).contains(&hashes) {
        let rest = &line[hashes..];
        if rest.starts_with(char::is_whitespace) {
            return rest.trim_start();
        }
    }
    line
}

/// Drop paired `marker` delimiters, keeping the inner text. Unpaired
/// markers stay as written.
fn strip_pairs(line: &str, marker: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    loop {
        let Some(start) = rest.find(marker) else { break };
        let after = &rest[start + marker.len()..];
        let Some(inner_len) = after.find(marker) else { break };
        if inner_len == 0 {
            out.push_str(&rest[..start + marker.len()]);
            rest = after;
            continue;
        }
        out.push_str(&rest[..start]);
        out.push_str(&after[..inner_len]);
        rest = &after[inner_len + marker.len()..];
    }
    out.push_str(rest);
    out
}

fn strip_list_marker(line: &str) -> &str {
    let rest = line.trim_start();
    if let Some(after) = rest.strip_prefix(['-', '*']) {
        if after.starts_with(char::is_whitespace) {
            return after.trim_start();
        }
    }
    line
}

fn strip_numbered(line: &str) -> &str {
    let rest = line.trim_start();
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        if let Some(after_dot) = rest[digits..].strip_prefix('.') {
            if after_dot.starts_with(char::is_whitespace) {
                return after_dot.trim_start();
            }
        }
    }
    line
}

fn strip_indent(line: &str) -> &str {
    let ws_chars = line.chars().take_while(|c| c.is_whitespace()).count();
    if ws_chars >= 2 {
        return line.trim_start();
    }
    line
}

fn collapse_newline_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = 0usize;
    for c in text.chars() {
        if c == '\n' {
            run += 1;
            if run <= 2 {
                out.push(c);
            }
        } else {
            run = 0;
            out.push(c);
        }
    }
    out
}

/// Strip residual markdown from a stored excerpt: ATX headers, bold,
/// italic, list markers, leading indentation, excess blank lines.
pub fn strip_markdown(text: &str) -> String {
    let cleaned: Vec<String> = text
        .lines()
        .map(|line| {
            let line = strip_header(line);
            let line = strip_pairs(line, "**");
            let line = strip_pairs(&line, "*");
            let rest = strip_list_marker(&line);
            let rest = strip_numbered(rest);
            strip_indent(rest).to_string()
        })
        .collect();
    collapse_newline_runs(&cleaned.join("\n")).trim().to_string()
}

// ============ Excerpting ============

/// First 300 chars of the cleaned text. When that truncates, cut back to
/// the last sentence boundary if one falls late enough, else mark the cut
/// with an ellipsis.
pub fn excerpt_of(cleaned: &str) -> String {
    let total = cleaned.chars().count();
    let cut: String = cleaned.chars().take(EXCERPT_CHARS).collect();
    let cut = cut.trim().to_string();
    if total <= EXCERPT_CHARS {
        return cut;
    }
    let chars: Vec<char> = cut.chars().collect();
    match chars.iter().rposition(|&c| c == '.') {
        Some(pos) if pos > SENTENCE_CUT_MIN => chars[..=pos].iter().collect(),
        _ => format!("{}...", cut),
    }
}

fn cite(doc: &DocEntry) -> String {
    let source = doc.source.trim();
    if !source.is_empty() {
        return source.to_string();
    }
    let title = doc.title.trim();
    if !title.is_empty() {
        return title.to_string();
    }
    if !doc.filename.is_empty() {
        return doc.filename.clone();
    }
    "Untitled".to_string()
}

fn cap_reply(reply: String) -> String {
    if reply.chars().count() > REPLY_CAP_CHARS {
        let cut: String = reply.chars().take(REPLY_CAP_CHARS).collect();
        format!("{}...", cut)
    } else {
        reply
    }
}

// ============ Assembly ============

/// Compose the extractive reply from ranked hits and their doc rows.
pub fn assemble_extractive(
    hits: &[(f32, usize)],
    doc_map: &[DocEntry],
    debug: bool,
    query_dims: usize,
) -> ChatAnswer {
    let mut parts: Vec<String> = Vec::new();
    let mut citations: Vec<String> = Vec::new();
    let mut debug_hits: Vec<DebugHit> = Vec::new();

    for (rank0, (distance, ordinal)) in hits.iter().enumerate() {
        let Some(doc) = doc_map.get(*ordinal) else {
            continue;
        };

        let cleaned = strip_markdown(&doc.text);
        let excerpt = excerpt_of(&cleaned);
        if excerpt.trim().chars().count() > 10 {
            parts.push(format!("{}\n\n{}", doc.title, excerpt));
        }

        let citation = cite(doc);
        if !citations.contains(&citation) {
            citations.push(citation);
        }

        if debug {
            debug_hits.push(DebugHit {
                rank: rank0 + 1,
                title: doc.title.clone(),
                filename: doc.filename.clone(),
                source: doc.source.clone(),
                distance: *distance,
                category: doc.category,
                chunk_index: doc.chunk_index,
            });
        }
    }

    let meaningful: Vec<&str> = parts
        .iter()
        .map(|p| p.as_str())
        .filter(|p| p.trim().chars().count() > 20)
        .collect();

    let reply = if meaningful.is_empty() {
        citations.clear();
        NO_RESULTS_REPLY.to_string()
    } else {
        cap_reply(meaningful.join("\n\n---\n\n"))
    };

    let debug_info = if debug && !debug_hits.is_empty() {
        Some(DebugInfo {
            query_embedding_shape: vec![query_dims],
            top_k_results: debug_hits,
        })
    } else {
        None
    };

    ChatAnswer {
        reply,
        citations,
        debug: debug_info,
    }
}

fn generation_context(hits: &[(f32, usize)], doc_map: &[DocEntry]) -> Vec<String> {
    hits.iter()
        .filter_map(|(_, ordinal)| doc_map.get(*ordinal))
        .map(|doc| {
            let text: String = doc.text.chars().take(1500).collect();
            format!("{}\n{}", doc.title, text)
        })
        .collect()
}

async fn try_answer(
    config: &Config,
    state: &RagState,
    embedder: &dyn Embedder,
    message: &str,
    language: Option<&str>,
    debug: bool,
) -> Result<ChatAnswer> {
    let query_vec = embedding::embed_query(embedder, message).await?;

    let use_generation = config.llm.is_enabled();
    let k = if use_generation {
        config.answer.llm_top_k
    } else {
        config.answer.top_k
    };
    let hits = state.searcher.search(&query_vec, k)?;

    let mut answer = assemble_extractive(&hits, &state.doc_map, debug, query_vec.len());

    if use_generation && !hits.is_empty() {
        let context_docs = generation_context(&hits, &state.doc_map);
        match generate::generate_reply(&config.llm, message, &context_docs, language).await {
            Ok(reply) => answer.reply = reply,
            Err(e) => {
                eprintln!(
                    "Warning: generation failed: {:#}. Returning extractive answer.",
                    e
                );
            }
        }
    }

    Ok(answer)
}

/// Answer one chat message. Infallible by contract: errors become the
/// reply text.
pub async fn answer_message(
    config: &Config,
    state: &RagState,
    embedder: &dyn Embedder,
    message: &str,
    language: Option<&str>,
    debug: bool,
) -> ChatAnswer {
    match try_answer(config, state, embedder, message, language, debug).await {
        Ok(answer) => answer,
        Err(e) => ChatAnswer::retrieval_error(&e),
    }
}

/// Run the `ask` command: one question, answer and citations on stdout.
pub async fn run_ask(config: &Config, message: &str, k: Option<usize>, debug: bool) -> Result<()> {
    if !index::artifacts_present(config) {
        println!("{}", INDEX_MISSING_REPLY);
        return Ok(());
    }

    let mut config = config.clone();
    if let Some(k) = k {
        config.answer.top_k = k;
        config.answer.llm_top_k = k;
    }

    let state = index::load_state(&config)?;
    let embedder = embedding::create_embedder(&config.embedding)?;
    let answer = answer_message(&config, &state, embedder.as_ref(), message, None, debug).await;

    println!("{}", answer.reply);
    if !answer.citations.is_empty() {
        println!();
        println!("Sources:");
        for citation in &answer.citations {
            println!("  - {}", citation);
        }
    }
    if let Some(debug_info) = &answer.debug {
        println!();
        println!("{}", serde_json::to_string_pretty(debug_info)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(title: &str, text: &str, source: &str) -> DocEntry {
        DocEntry {
            title: title.to_string(),
            filename: format!("{}.md", title.to_lowercase().replace(' ', "_")),
            text: text.to_string(),
            source: source.to_string(),
            category: Category::ServiceWorkflow,
            word_count: text.split_whitespace().count(),
            chunk_index: 0,
            last_scraped: "2026-08-24".to_string(),
            url_path: String::new(),
        }
    }

    #[test]
    fn strip_markdown_removes_formatting() {
        let text = "## Heading\n\n**Bold** and *italic* text.\n- bullet one\n1. numbered\n   indented line";
        let cleaned = strip_markdown(text);
        assert_eq!(
            cleaned,
            "Heading\n\nBold and italic text.\nbullet one\nnumbered\nindented line"
        );
    }

    #[test]
    fn strip_markdown_leaves_unpaired_markers() {
        assert_eq!(strip_markdown("a ** b"), "a ** b");
        assert_eq!(strip_markdown("####### seven hashes"), "####### seven hashes");
        assert_eq!(strip_markdown("-no space"), "-no space");
    }

    #[test]
    fn strip_markdown_collapses_blank_runs() {
        assert_eq!(strip_markdown("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn short_excerpt_passes_through() {
        assert_eq!(excerpt_of("A short answer."), "A short answer.");
    }

    #[test]
    fn long_excerpt_cuts_at_late_sentence_boundary() {
        let sentence = "This sentence is about forty chars long. ";
        let text = sentence.repeat(10);
        let excerpt = excerpt_of(&text);
        assert!(excerpt.ends_with('.'));
        assert!(!excerpt.ends_with("..."));
        assert!(excerpt.chars().count() <= 300);
        assert!(excerpt.chars().count() > 150);
    }

    #[test]
    fn long_excerpt_without_boundary_gets_ellipsis() {
        let text = "word ".repeat(100);
        let excerpt = excerpt_of(&text);
        assert!(excerpt.ends_with("..."));
        // 300-char cut loses its trailing space to the trim, then +3 dots
        assert_eq!(excerpt.chars().count(), 302);
    }

    #[test]
    fn early_period_does_not_count_as_boundary() {
        let text = format!("Short. {}", "x".repeat(400));
        let excerpt = excerpt_of(&text);
        assert!(excerpt.ends_with("..."));
    }

    #[test]
    fn parts_join_with_rule_and_citations_dedup() {
        let doc_map = vec![
            doc(
                "NHIF Registration",
                &"Visit any NHIF branch with your national ID. ".repeat(3),
                "https://www.nhif.or.ke/register",
            ),
            doc(
                "NHIF Registration (Part 2)",
                &"Monthly contributions are payable via M-Pesa. ".repeat(3),
                "https://www.nhif.or.ke/register",
            ),
        ];
        let hits = vec![(0.1, 0), (0.2, 1)];

        let answer = assemble_extractive(&hits, &doc_map, false, 384);
        assert!(answer.reply.contains("\n\n---\n\n"));
        assert!(answer.reply.starts_with("NHIF Registration\n\n"));
        assert_eq!(answer.citations, vec!["https://www.nhif.or.ke/register"]);
        assert!(answer.debug.is_none());
    }

    #[test]
    fn empty_hits_yield_fixed_reply() {
        let answer = assemble_extractive(&[], &[], false, 384);
        assert_eq!(answer.reply, NO_RESULTS_REPLY);
        assert!(answer.citations.is_empty());
    }

    #[test]
    fn short_excerpts_are_dropped_and_citations_cleared() {
        let doc_map = vec![doc("T", "tiny", "")];
        let answer = assemble_extractive(&[(0.0, 0)], &doc_map, false, 384);
        assert_eq!(answer.reply, NO_RESULTS_REPLY);
        assert!(answer.citations.is_empty());
    }

    #[test]
    fn citation_falls_back_source_title_filename() {
        let with_source = doc("Title", "text", "https://example.go.ke");
        assert_eq!(cite(&with_source), "https://example.go.ke");

        let with_title = doc("Title", "text", "  ");
        assert_eq!(cite(&with_title), "Title");

        let mut bare = doc("  ", "text", "");
        assert_eq!(cite(&bare), "__.md");
        bare.filename = String::new();
        assert_eq!(cite(&bare), "Untitled");
    }

    #[test]
    fn reply_is_capped_at_6000_chars() {
        let body = "Sentence with useful words inside here padding out. ".repeat(40);
        let doc_map: Vec<DocEntry> = (0..30)
            .map(|i| {
                let mut d = doc(&format!("Doc {}", i), &body, "");
                d.chunk_index = i;
                d
            })
            .collect();
        let hits: Vec<(f32, usize)> = (0..30).map(|i| (i as f32 * 0.01, i)).collect();

        let answer = assemble_extractive(&hits, &doc_map, false, 384);
        assert!(answer.reply.ends_with("..."));
        assert_eq!(answer.reply.chars().count(), 6003);
    }

    #[test]
    fn debug_block_records_ranks_and_distances() {
        let doc_map = vec![
            doc(
                "KRA PIN",
                &"Apply for a KRA PIN on iTax with your ID number. ".repeat(3),
                "https://www.kra.go.ke/pin",
            ),
            doc(
                "Passport",
                &"Apply for a passport on eCitizen and book biometrics. ".repeat(3),
                "https://immigration.go.ke/passport",
            ),
        ];
        let hits = vec![(0.05, 1), (0.2, 0)];

        let answer = assemble_extractive(&hits, &doc_map, true, 384);
        let debug = answer.debug.unwrap();
        assert_eq!(debug.query_embedding_shape, vec![384]);
        assert_eq!(debug.top_k_results.len(), 2);
        assert_eq!(debug.top_k_results[0].rank, 1);
        assert_eq!(debug.top_k_results[0].title, "Passport");
        assert!((debug.top_k_results[0].distance - 0.05).abs() < 1e-6);
        assert_eq!(debug.top_k_results[1].rank, 2);
    }

    #[test]
    fn out_of_range_ordinals_are_skipped() {
        let doc_map = vec![doc(
            "Only Doc",
            &"Some reasonably long body text for the excerpt. ".repeat(3),
            "",
        )];
        let hits = vec![(0.1, 5), (0.2, 0)];

        let answer = assemble_extractive(&hits, &doc_map, false, 384);
        assert!(answer.reply.starts_with("Only Doc"));
        assert_eq!(answer.citations, vec!["Only Doc"]);
    }

    #[test]
    fn generation_context_prefixes_titles() {
        let doc_map = vec![doc("Huduma Centre", "Walk-in services list.", "")];
        let docs = generation_context(&[(0.0, 0)], &doc_map);
        assert_eq!(docs, vec!["Huduma Centre\nWalk-in services list.".to_string()]);
    }
}
