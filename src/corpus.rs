//! Corpus document serialization and the chunk-stage driver.
//!
//! A corpus document is one chunk of source text wrapped in a front-matter
//! block: the durable unit every later stage (indexing, citation) works
//! from. Filenames derive deterministically from the title, so re-running
//! the pipeline over unchanged input rewrites the same files instead of
//! accumulating duplicates.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;

use crate::chunk;
use crate::classify;
use crate::config::Config;
use crate::models::{Category, FetchManifestEntry};
use crate::progress::{PipelineEvent, ProgressReporter};

/// Metadata serialized into a document's front-matter block.
#[derive(Debug, Clone)]
pub struct DocumentMeta {
    pub title: String,
    pub filename: String,
    pub category: Category,
    pub jurisdiction: String,
    pub lang: String,
    pub source: String,
    pub last_updated: String,
    pub tags: Vec<String>,
}

/// Front-matter fields recovered by [`parse_document`]. Absent or
/// unparseable fields stay `None`; callers choose their own defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub filename: Option<String>,
    pub category: Option<String>,
    pub jurisdiction: Option<String>,
    pub lang: Option<String>,
    pub source: Option<String>,
    pub last_updated: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// One parsed corpus file.
#[derive(Debug, Clone)]
pub struct CorpusFile {
    pub filename: String,
    pub meta: FrontMatter,
    /// Body text with the trailing `Sources:` section removed.
    pub body: String,
}

/// Today's date in the `last_updated` format.
pub fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Lowercase `text` and reduce it to word characters separated by single
/// `sep` chars, truncated to `max_len`. Deterministic: the same title
/// always yields the same slug.
pub fn slugify(text: &str, sep: char, max_len: usize) -> String {
    let mut out = String::new();
    let mut pending_sep = false;
    for c in text.to_lowercase().chars() {
        if c.is_alphanumeric() || c == '_' {
            if pending_sep && !out.is_empty() {
                out.push(sep);
            }
            pending_sep = false;
            out.push(c);
        } else if c.is_whitespace() || c == '-' {
            pending_sep = true;
        }
    }
    let truncated: String = out.chars().take(max_len).collect();
    truncated
        .trim_matches(|c| c == '_' || c == '-')
        .to_string()
}

/// Normalize a title for front-matter: trimmed, double quotes swapped for
/// single, capped at 100 chars with an ellipsis.
pub fn sanitize_title(title: &str) -> String {
    let trimmed = title.trim();
    let replaced = trimmed.replace('"', "'");
    if replaced.chars().count() > 100 {
        let cut: String = replaced.chars().take(97).collect();
        format!("{}...", cut)
    } else {
        replaced
    }
}

/// Serialize one chunk and its metadata into the corpus document format.
pub fn render_document(meta: &DocumentMeta, body: &str) -> String {
    let tags_json = serde_json::to_string(&meta.tags).unwrap_or_else(|_| "[]".to_string());
    format!(
        "---\n\
         title: \"{}\"\n\
         filename: \"{}\"\n\
         category: \"{}\"\n\
         jurisdiction: \"{}\"\n\
         lang: \"{}\"\n\
         source: \"{}\"\n\
         last_updated: \"{}\"\n\
         tags: {}\n\
         ---\n\
         \n\
         {}\n\
         \n\
         Sources:\n\
         - {}\n",
        meta.title,
        meta.filename,
        meta.category,
        meta.jurisdiction,
        meta.lang,
        meta.source,
        meta.last_updated,
        tags_json,
        body,
        meta.source,
    )
}

/// Parse a corpus document into front-matter and body.
///
/// Tolerant by design: a missing or malformed front-matter block yields an
/// empty [`FrontMatter`] and the full content as body — the document is
/// still usable, just without metadata. The trailing `Sources:` section is
/// stripped from the body.
pub fn parse_document(content: &str) -> (FrontMatter, String) {
    let mut meta = FrontMatter::default();
    let mut body = content;

    let mut lines = content.lines();
    if lines.next().map(str::trim) == Some("---") {
        // Byte offset of the line after the closing marker.
        let mut offset = content.find('\n').map(|i| i + 1).unwrap_or(content.len());
        let mut closed = false;
        for line in content[offset..].lines() {
            let line_len = line.len() + 1;
            if line.trim() == "---" {
                offset += line_len;
                closed = true;
                break;
            }
            parse_meta_line(line, &mut meta);
            offset += line_len;
        }
        if closed {
            body = content.get(offset..).unwrap_or("");
        } else {
            meta = FrontMatter::default();
        }
    }

    let body = match body.find("\nSources:") {
        Some(pos) => &body[..pos],
        None => body,
    };

    (meta, body.trim().to_string())
}

fn parse_meta_line(line: &str, meta: &mut FrontMatter) {
    let Some((key, value)) = line.split_once(':') else {
        return;
    };
    let key = key.trim();
    let value = value.trim();
    if key == "tags" {
        meta.tags = serde_json::from_str(value).ok();
        return;
    }
    let unquoted = value.trim_matches('"').to_string();
    match key {
        "title" => meta.title = Some(unquoted),
        "filename" => meta.filename = Some(unquoted),
        "category" => meta.category = Some(unquoted),
        "jurisdiction" => meta.jurisdiction = Some(unquoted),
        "lang" => meta.lang = Some(unquoted),
        "source" => meta.source = Some(unquoted),
        "last_updated" => meta.last_updated = Some(unquoted),
        _ => {}
    }
}

/// Filename for chunk `n` (1-based) of a document split into `total`
/// chunks. Single-chunk documents get no suffix.
pub fn chunk_filename(stem: &str, n: usize, total: usize) -> String {
    if total > 1 {
        format!("{}_chunk{}.md", stem, n)
    } else {
        format!("{}.md", stem)
    }
}

/// Title for chunk `n` of `total`, with a "(Part N)" suffix when split.
pub fn part_title(title: &str, n: usize, total: usize) -> String {
    if total > 1 {
        format!("{} (Part {})", title, n)
    } else {
        title.to_string()
    }
}

/// A request to persist one source document's chunks.
#[derive(Debug)]
pub struct ChunkWriteRequest {
    /// Filename stem without extension or chunk suffix, e.g.
    /// `003_nhif_registration`.
    pub stem: String,
    pub title: String,
    pub source: String,
    pub category: Category,
    pub tags: Vec<String>,
    pub chunks: Vec<String>,
}

/// Outcome of [`write_chunk_files`].
#[derive(Debug, Default)]
pub struct WrittenChunks {
    pub written: Vec<String>,
    pub skipped: usize,
}

/// Write one corpus file per chunk. Existing files are left untouched
/// unless `force` is set, keeping re-runs idempotent.
pub fn write_chunk_files(
    config: &Config,
    req: &ChunkWriteRequest,
    date: &str,
    force: bool,
) -> Result<WrittenChunks> {
    let corpus_dir = config.corpus_dir();
    std::fs::create_dir_all(&corpus_dir)
        .with_context(|| format!("Failed to create corpus dir: {}", corpus_dir.display()))?;

    let total = req.chunks.len();
    let title = sanitize_title(&req.title);
    let mut out = WrittenChunks::default();

    for (i, chunk_body) in req.chunks.iter().enumerate() {
        let n = i + 1;
        let filename = chunk_filename(&req.stem, n, total);
        let path = corpus_dir.join(&filename);
        if path.exists() && !force {
            out.skipped += 1;
            continue;
        }
        let meta = DocumentMeta {
            title: part_title(&title, n, total),
            filename: filename.clone(),
            category: req.category,
            jurisdiction: config.corpus.jurisdiction.clone(),
            lang: config.corpus.lang.clone(),
            source: req.source.clone(),
            last_updated: date.to_string(),
            tags: req.tags.clone(),
        };
        std::fs::write(&path, render_document(&meta, chunk_body))
            .with_context(|| format!("Failed to write corpus file: {}", path.display()))?;
        out.written.push(filename);
    }

    Ok(out)
}

/// Read and parse every `.md` file in the corpus directory, in sorted
/// filename order (the ordinal order of the index build).
pub fn scan_corpus(dir: &Path) -> Result<Vec<CorpusFile>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read corpus dir: {}", dir.display()))?;

    let mut paths: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("md"))
        .collect();
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read corpus file: {}", path.display()))?;
        let (meta, body) = parse_document(&content);
        if meta == FrontMatter::default() {
            eprintln!(
                "warning: no front-matter in {}; indexing with defaults",
                path.display()
            );
        }
        let filename = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        files.push(CorpusFile {
            filename,
            meta,
            body,
        });
    }

    Ok(files)
}

/// Run the chunk stage: fetch manifest → corpus documents. Returns the
/// number of documents written.
pub async fn run_chunk(
    config: &Config,
    force: bool,
    reporter: &dyn ProgressReporter,
) -> Result<usize> {
    let manifest_path = config.fetch_manifest_path();
    let raw = std::fs::read_to_string(&manifest_path).with_context(|| {
        format!(
            "Fetch manifest not found: {}. Run `raia fetch` first",
            manifest_path.display()
        )
    })?;
    let manifest: Vec<FetchManifestEntry> =
        serde_json::from_str(&raw).context("Failed to parse fetch manifest")?;

    let date = today();
    let total = manifest.len();
    let mut written = 0usize;
    let mut skipped = 0usize;
    let mut empty = 0usize;

    reporter.report(PipelineEvent::Stage {
        stage: "chunk".to_string(),
        total: total as u64,
    });

    for (n, entry) in manifest.iter().enumerate() {
        reporter.report(PipelineEvent::Step {
            stage: "chunk".to_string(),
            n: (n + 1) as u64,
            total: total as u64,
            detail: entry.url.clone(),
        });

        let txt_path = config.workspace.dir.join(&entry.txt_file);
        let content = std::fs::read_to_string(&txt_path)
            .with_context(|| format!("Failed to read text artifact: {}", txt_path.display()))?;

        let (first_line, rest) = content.split_once('\n').unwrap_or((content.as_str(), ""));
        let title = if first_line.trim().is_empty() {
            if entry.title.is_empty() {
                "Untitled".to_string()
            } else {
                entry.title.clone()
            }
        } else {
            first_line.trim().to_string()
        };

        let chunks = chunk::chunk_text(rest, config.chunk.target_words);
        if chunks.is_empty() {
            empty += 1;
            continue;
        }

        let category = classify::classify(&entry.url, &title, rest);
        let tags = classify::extract_tags(rest, &entry.url);
        let stem = format!("{:03}_{}", entry.index, slugify(&title, '_', 60));
        let req = ChunkWriteRequest {
            stem,
            title,
            source: entry.url.clone(),
            category,
            tags,
            chunks,
        };
        let outcome = write_chunk_files(config, &req, &date, force)?;
        written += outcome.written.len();
        skipped += outcome.skipped;
    }

    println!(
        "Chunked {} pages into {} documents ({} already present, {} empty after cleaning)",
        total, written, skipped, empty
    );
    println!("Corpus dir: {}", config.corpus_dir().display());

    Ok(written)
}
