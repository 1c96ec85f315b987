//! Workspace statistics and pipeline overview.
//!
//! Provides a quick summary of the pipeline state: raw page counts, corpus
//! size, per-category breakdowns, index artifacts, and job history. Used by
//! `raia stats` to give confidence that crawls and index builds are working
//! as expected.

use anyhow::Result;
use sqlx::Row;
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::Config;
use crate::corpus;
use crate::db;
use crate::index;
use crate::migrate;

/// Run the stats command: survey the workspace and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let raw_pages = count_files_with_ext(&config.raw_dir(), "html");

    let corpus_dir = config.corpus_dir();
    let corpus_files = if corpus_dir.is_dir() {
        corpus::scan_corpus(&corpus_dir)?
    } else {
        Vec::new()
    };
    let total_words: usize = corpus_files
        .iter()
        .map(|f| f.body.split_whitespace().count())
        .sum();

    // (docs, words) per category
    let mut by_category: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for file in &corpus_files {
        let category = file
            .meta
            .category
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        let entry = by_category.entry(category).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += file.body.split_whitespace().count();
    }

    println!("Raia Assist - Workspace Stats");
    println!("=============================");
    println!();
    println!("  Workspace:   {}", config.workspace.dir.display());
    println!();
    println!("  Raw pages:   {}", raw_pages);
    println!("  Corpus docs: {}", corpus_files.len());
    println!("  Words:       {}", total_words);

    if !by_category.is_empty() {
        println!();
        println!("  By category:");
        println!("  {:<20} {:>6} {:>10}", "CATEGORY", "DOCS", "WORDS");
        println!("  {}", "-".repeat(40));
        for (category, (docs, words)) in &by_category {
            println!("  {:<20} {:>6} {:>10}", category, docs, words);
        }
    }

    println!();
    if index::artifacts_present(config) {
        match index::open_search(config) {
            Ok(searcher) => println!(
                "  Index:       {} ({} vectors, {} dims)",
                searcher.backend(),
                searcher.len(),
                searcher.dims()
            ),
            Err(e) => println!("  Index:       unreadable ({})", e),
        }
        for path in [
            index::packed_path(config),
            index::scan_path(config),
            index::doc_map_path(config),
        ] {
            if let Ok(meta) = std::fs::metadata(&path) {
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("artifact");
                println!("    {:<14} {}", name, format_bytes(meta.len()));
            }
        }
    } else {
        println!("  Index:       not built");
    }

    println!();
    // Connecting would create an empty database file, so only report jobs
    // when one already exists.
    if config.db.path.exists() {
        print_job_stats(config).await?;
    } else {
        println!("  Jobs:        no database yet");
    }

    println!();
    Ok(())
}

async fn print_job_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;

    let status_rows = sqlx::query(
        "SELECT status, COUNT(*) AS n FROM processing_jobs GROUP BY status ORDER BY status",
    )
    .fetch_all(&pool)
    .await?;

    let last_created: Option<String> =
        sqlx::query_scalar("SELECT MAX(created_at) FROM processing_jobs")
            .fetch_one(&pool)
            .await?;

    pool.close().await;

    let total: i64 = status_rows.iter().map(|row| row.get::<i64, _>("n")).sum();
    println!("  Jobs:        {}", total);
    for row in &status_rows {
        let status: String = row.get("status");
        let n: i64 = row.get("n");
        println!("    {:<12} {}", status, n);
    }
    if let Some(ts) = last_created {
        println!("  Last job:    {}", format_ts_relative(&ts));
    }
    Ok(())
}

fn count_files_with_ext(dir: &Path, ext: &str) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .filter(|e| {
            e.path()
                .extension()
                .map(|x| x.eq_ignore_ascii_case(ext))
                .unwrap_or(false)
        })
        .count()
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a job timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: &str) -> String {
    let parsed = match chrono::DateTime::parse_from_rfc3339(ts) {
        Ok(dt) => dt.with_timezone(&chrono::Utc),
        Err(_) => return ts.to_string(),
    };
    let delta = chrono::Utc::now()
        .signed_duration_since(parsed)
        .num_seconds();

    if delta < 0 {
        return ts.to_string();
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        // Old enough that the date alone reads better.
        ts.split('T').next().unwrap_or(ts).to_string()
    }
}
