//! PDF ingestion: extract text, clean it, and persist corpus documents.
//!
//! PDFs enter the same pipeline as scraped pages from the chunk stage on,
//! so a long handbook splits into `_chunk{N}` parts exactly like a long
//! web page. Title, category, and tags are derived from the file name and
//! content when not supplied. `raia pdf <path>` accepts a single file or
//! a directory; directory mode converts every PDF in it, skipping ones
//! whose corpus documents already exist.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use crate::chunk;
use crate::config::Config;
use crate::corpus::{self, ChunkWriteRequest, WrittenChunks};
use crate::models::Category;
use crate::progress::{PipelineEvent, ProgressReporter};

/// Per-conversion overrides. `None` fields are derived from the PDF's
/// file name and extracted text.
#[derive(Debug, Clone, Default)]
pub struct PdfOptions {
    pub title: Option<String>,
    pub category: Option<Category>,
    pub source: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Extract and clean the text of one PDF.
///
/// Very short output means the PDF is scanned images or damaged, which no
/// amount of downstream processing can fix, so it is rejected here.
pub fn extract_pdf_text(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read PDF: {}", path.display()))?;
    let raw = pdf_extract::extract_text_from_mem(&bytes)
        .with_context(|| format!("Failed to extract text from {}", path.display()))?;
    let text = clean_pdf_text(&raw);
    if text.chars().count() < 50 {
        bail!("Extracted text is too short or empty. PDF may be image-based or corrupted.");
    }
    Ok(text)
}

/// Clean raw PDF text: collapse runs of 3+ newlines, blank out lines that
/// are nothing but a page number, collapse runs of spaces, trim.
pub fn clean_pdf_text(raw: &str) -> String {
    let collapsed = collapse_newline_runs(raw);
    let lines: Vec<&str> = collapsed
        .lines()
        .map(|line| {
            let t = line.trim();
            if !t.is_empty() && t.chars().all(|c| c.is_ascii_digit()) {
                ""
            } else {
                line
            }
        })
        .collect();
    collapse_space_runs(&lines.join("\n")).trim().to_string()
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

fn collapse_space_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_space = false;
    for c in text.chars() {
        if c == ' ' {
            if !prev_space {
                out.push(c);
            }
            prev_space = true;
        } else {
            prev_space = false;
            out.push(c);
        }
    }
    out
}

/// Filename-safe stem for a PDF: lowercased, every char outside
/// `[word, -, _]` replaced with `_`, underscore runs collapsed, trimmed.
pub fn safe_stem(pdf_stem: &str) -> String {
    let mut mapped = String::with_capacity(pdf_stem.len());
    for c in pdf_stem.to_lowercase().chars() {
        if c.is_alphanumeric() || c == '_' || c == '-' {
            mapped.push(c);
        } else {
            mapped.push('_');
        }
    }
    let mut out = String::with_capacity(mapped.len());
    let mut prev_underscore = false;
    for c in mapped.chars() {
        if c == '_' {
            if !prev_underscore {
                out.push(c);
            }
            prev_underscore = true;
        } else {
            prev_underscore = false;
            out.push(c);
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "document".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Title-case the stem with separators turned into spaces:
/// `sha_handbook-2024` → `Sha Handbook 2024`.
pub fn derive_title(pdf_stem: &str) -> String {
    pdf_stem
        .replace(['_', '-'], " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Guess a category from the PDF's file name; `None` when nothing matches.
pub fn detect_category(pdf_stem: &str) -> Option<Category> {
    let lower = pdf_stem.to_lowercase();
    if lower.contains("faq") || lower.contains("question") {
        Some(Category::MinistryFaq)
    } else if lower.contains("handbook") || lower.contains("guide") {
        Some(Category::ServiceWorkflow)
    } else if lower.contains("legal") || lower.contains("act") {
        Some(Category::LegalSnippet)
    } else {
        None
    }
}

/// Default tag set for an imported PDF, with content-based additions.
pub fn default_tags(text: &str) -> Vec<String> {
    let mut tags = vec!["pdf_import".to_string(), "handbook".to_string()];
    let lower = text.to_lowercase();
    if lower.contains("sha") || lower.contains("social health") {
        tags.push("sha".to_string());
    }
    if lower.contains("nhif") {
        tags.push("nhif".to_string());
    }
    if lower.contains("health") {
        tags.push("health".to_string());
    }
    tags
}

/// True when a previous run already produced corpus documents for this PDF.
pub fn already_converted(config: &Config, path: &Path) -> bool {
    let stem = safe_stem(file_stem(path));
    let corpus_dir = config.corpus_dir();
    corpus_dir.join(format!("{}.md", stem)).exists()
        || corpus_dir.join(format!("{}_chunk1.md", stem)).exists()
}

fn file_stem(path: &Path) -> &str {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("document")
}

/// Convert one PDF into corpus documents.
pub fn convert_pdf(
    config: &Config,
    path: &Path,
    opts: &PdfOptions,
    force: bool,
) -> Result<WrittenChunks> {
    let stem_raw = file_stem(path);
    let text = extract_pdf_text(path)?;

    let title = opts
        .title
        .clone()
        .unwrap_or_else(|| derive_title(stem_raw));
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("document.pdf");
    let source = opts
        .source
        .clone()
        .unwrap_or_else(|| format!("PDF: {}", file_name));
    let category = opts.category.unwrap_or_default();
    let tags = opts.tags.clone().unwrap_or_else(|| default_tags(&text));

    let chunks = chunk::chunk_text(&text, config.chunk.target_words);
    if chunks.is_empty() {
        bail!("Extracted text is too short or empty. PDF may be image-based or corrupted.");
    }

    let req = ChunkWriteRequest {
        stem: safe_stem(stem_raw),
        title,
        source,
        category,
        tags,
        chunks,
    };
    corpus::write_chunk_files(config, &req, &corpus::today(), force)
}

/// Run PDF ingestion for a single file or, in directory mode, every PDF
/// in the directory.
pub fn run_pdf(
    config: &Config,
    path: &Path,
    opts: &PdfOptions,
    force: bool,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    if path.is_dir() {
        return run_pdf_dir(config, path, opts, force, reporter);
    }
    if !path.exists() {
        bail!("PDF file not found: {}", path.display());
    }

    let outcome = convert_pdf(config, path, opts, force)?;
    println!("pdf {}", path.display());
    println!("  documents written: {}", outcome.written.len());
    println!("  documents skipped: {}", outcome.skipped);
    for filename in &outcome.written {
        println!("    {}", filename);
    }
    Ok(())
}

fn run_pdf_dir(
    config: &Config,
    dir: &Path,
    opts: &PdfOptions,
    force: bool,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read PDF dir: {}", dir.display()))?;
    let mut pdfs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|s| s.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
        })
        .collect();
    pdfs.sort();

    if pdfs.is_empty() {
        println!("No PDF files found in {}", dir.display());
        return Ok(());
    }

    let total = pdfs.len();
    reporter.report(PipelineEvent::Stage {
        stage: "pdf".to_string(),
        total: total as u64,
    });

    let mut converted = 0usize;
    let mut written = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;

    for (n, pdf) in pdfs.iter().enumerate() {
        let name = pdf
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        reporter.report(PipelineEvent::Step {
            stage: "pdf".to_string(),
            n: (n + 1) as u64,
            total: total as u64,
            detail: name.clone(),
        });

        if !force && already_converted(config, pdf) {
            skipped += 1;
            continue;
        }

        // File-name detection wins over the shared category flag; the
        // flag is the fallback for names that match nothing.
        let per_file = PdfOptions {
            title: None,
            category: Some(
                detect_category(file_stem(pdf))
                    .or(opts.category)
                    .unwrap_or_default(),
            ),
            source: None,
            tags: None,
        };
        match convert_pdf(config, pdf, &per_file, force) {
            Ok(outcome) => {
                converted += 1;
                written += outcome.written.len();
            }
            Err(e) => {
                eprintln!("Failed to convert {}: {:#}", name, e);
                failed += 1;
            }
        }
    }

    println!("pdf {}", dir.display());
    println!("  pdfs found: {}", total);
    println!("  converted: {}", converted);
    println!("  skipped (already converted): {}", skipped);
    println!("  failed: {}", failed);
    println!("  documents written: {}", written);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_collapses_newlines_and_blanks_page_numbers() {
        let raw = "Intro\n\n\n\n42\nBody  text  here";
        assert_eq!(clean_pdf_text(raw), "Intro\n\n\nBody text here");
    }

    #[test]
    fn clean_keeps_lines_with_mixed_content() {
        let raw = "Section 42 applies\n7\nNext line";
        assert_eq!(clean_pdf_text(raw), "Section 42 applies\n\nNext line");
    }

    #[test]
    fn safe_stem_maps_and_collapses() {
        assert_eq!(safe_stem("SHA Handbook (2024)"), "sha_handbook_2024");
        assert_eq!(safe_stem("nhif-faq"), "nhif-faq");
        assert_eq!(safe_stem("???"), "document");
    }

    #[test]
    fn title_from_stem() {
        assert_eq!(derive_title("sha_handbook-2024"), "Sha Handbook 2024");
        assert_eq!(derive_title("NHIF_GUIDE"), "Nhif Guide");
    }

    #[test]
    fn category_from_file_name() {
        assert_eq!(detect_category("nhif_faq_2024"), Some(Category::MinistryFaq));
        assert_eq!(
            detect_category("services_handbook"),
            Some(Category::ServiceWorkflow)
        );
        assert_eq!(detect_category("health_act"), Some(Category::LegalSnippet));
        assert_eq!(detect_category("random_notes"), None);
    }

    #[test]
    fn tags_detected_from_content() {
        let tags = default_tags("The Social Health Authority replaces NHIF cover.");
        assert_eq!(tags, vec!["pdf_import", "handbook", "sha", "nhif", "health"]);

        let tags = default_tags("County business permits.");
        assert_eq!(tags, vec!["pdf_import", "handbook"]);
    }
}
