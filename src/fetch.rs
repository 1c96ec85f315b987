//! Polite page fetching and the crawl driver.
//!
//! `raia fetch` walks a URL list, honors robots.txt, downloads each page
//! with a fixed identifying user-agent and a rate-limit delay, extracts
//! title and text, and writes two artifacts per page under the raw
//! directory (the original HTML and the extracted text as
//! `{title}\n\n{body}`) plus one shared fetch manifest consumed by the
//! chunk stage. Re-runs skip pages whose artifacts already exist, so the
//! crawl is idempotent unless forced.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::config::Config;
use crate::corpus::slugify;
use crate::extract_html;
use crate::models::{FetchManifestEntry, RobotsUrlReport, RobotsVerdict};
use crate::progress::{PipelineEvent, ProgressReporter};
use crate::robots::{read_url_list, RobotsGate};

/// Filename-safe slug for a URL: its last non-empty path segment, else its
/// host. Hyphen-separated, at most 50 chars.
pub fn url_slug(url: &str) -> String {
    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(_) => return fallback_slug(url),
    };
    let segment = parsed
        .path_segments()
        .and_then(|segments| segments.rev().find(|s| !s.is_empty()))
        .map(str::to_string);
    let base = match segment {
        Some(s) => s,
        None => parsed.host_str().unwrap_or_default().to_string(),
    };
    fallback_slug(&base)
}

fn fallback_slug(text: &str) -> String {
    let slug = slugify(text, '-', 50);
    if slug.is_empty() {
        "page".to_string()
    } else {
        slug
    }
}

/// First 8 hex chars of the URL's SHA-256. Distinguishes URLs that share
/// a slug.
pub fn url_hash8(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex.chars().take(8).collect()
}

/// Artifact stem for one crawl entry: `{ordinal:03}_{slug}_{hash8}`.
pub fn artifact_stem(index: usize, url: &str) -> String {
    format!("{:03}_{}_{}", index, url_slug(url), url_hash8(url))
}

/// Fetch one page. Non-2xx and network errors are failures for the caller
/// to log and skip; nothing is retried here.
pub async fn fetch_page(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch {}", url))?;

    let status = response.status();
    if !status.is_success() {
        bail!("HTTP {} for {}", status, url);
    }

    response
        .text()
        .await
        .with_context(|| format!("Failed to read response body of {}", url))
}

fn read_title_line(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let first = content.lines().next().unwrap_or("").trim();
    if first.is_empty() {
        None
    } else {
        Some(first.to_string())
    }
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

fn load_robots_lookup(config: &Config) -> Option<HashMap<String, RobotsVerdict>> {
    let report_path = config.robots_report_path();
    if !report_path.exists() {
        eprintln!(
            "Warning: robots report not found at {}. Checking robots.txt live.",
            report_path.display()
        );
        return None;
    }
    let raw = match std::fs::read_to_string(&report_path) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!(
                "Warning: could not read robots report: {}. Checking robots.txt live.",
                e
            );
            return None;
        }
    };
    match serde_json::from_str::<Vec<RobotsUrlReport>>(&raw) {
        Ok(rows) => Some(rows.into_iter().map(|r| (r.url, r.allowed)).collect()),
        Err(e) => {
            eprintln!(
                "Warning: could not parse robots report: {}. Checking robots.txt live.",
                e
            );
            None
        }
    }
}

/// Run the crawl: URL list file → raw artifacts + fetch manifest.
///
/// Per-URL failures are logged and skipped, never fatal to the run.
pub async fn run_fetch(
    config: &Config,
    urls_file: &Path,
    max_pages: Option<usize>,
    force: bool,
    skip_disallowed: bool,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    let mut urls = read_url_list(urls_file)?;
    if let Some(max) = max_pages {
        urls.truncate(max);
    }

    let raw_dir = config.raw_dir();
    std::fs::create_dir_all(&raw_dir)
        .with_context(|| format!("Failed to create raw dir: {}", raw_dir.display()))?;

    // With --skip-disallowed a previously generated compliance report
    // decides; URLs it does not cover (or a missing report) fall back to a
    // live per-domain check.
    let report_lookup = if skip_disallowed {
        load_robots_lookup(config)
    } else {
        None
    };
    let mut gate = RobotsGate::new(config)?;

    let client = reqwest::Client::builder()
        .user_agent(config.crawl.user_agent.clone())
        .timeout(Duration::from_secs(config.crawl.timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;

    let total = urls.len();
    let rate_limit = Duration::from_millis(config.crawl.rate_limit_ms);
    let mut manifest: Vec<FetchManifestEntry> = Vec::new();
    let mut fetched = 0usize;
    let mut cached = 0usize;
    let mut disallowed = 0usize;
    let mut failed = 0usize;

    reporter.report(PipelineEvent::Stage {
        stage: "fetch".to_string(),
        total: total as u64,
    });

    for (n, url) in urls.iter().enumerate() {
        let idx = n + 1;
        reporter.report(PipelineEvent::Step {
            stage: "fetch".to_string(),
            n: idx as u64,
            total: total as u64,
            detail: url.clone(),
        });

        let verdict = match report_lookup.as_ref().and_then(|lookup| lookup.get(url)) {
            Some(verdict) => *verdict,
            None => gate.is_allowed(url).await,
        };
        match verdict {
            RobotsVerdict::Disallowed => {
                eprintln!("Skipping {} (disallowed by robots.txt)", url);
                disallowed += 1;
                continue;
            }
            RobotsVerdict::Unknown => {
                eprintln!(
                    "Warning: robots.txt verdict unknown for {}, fetching anyway",
                    url
                );
            }
            RobotsVerdict::Allowed => {}
        }

        let stem = artifact_stem(idx, url);
        let html_rel = format!("raw/{}.html", stem);
        let txt_rel = format!("raw/{}.txt", stem);
        let html_path = config.workspace.dir.join(&html_rel);
        let txt_path = config.workspace.dir.join(&txt_rel);

        // Cached entry: keep the manifest row, with the title re-read from
        // the text artifact's first line. No fetch, no sleep.
        if !force && html_path.exists() && txt_path.exists() {
            let title = read_title_line(&txt_path).unwrap_or_else(|| "Untitled".to_string());
            manifest.push(FetchManifestEntry {
                index: idx,
                url: url.clone(),
                title,
                base: host_of(url),
                html_file: html_rel,
                txt_file: txt_rel,
            });
            cached += 1;
            continue;
        }

        let html = match fetch_page(&client, url).await {
            Ok(html) => html,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                failed += 1;
                continue;
            }
        };

        let (title, body) = extract_html::extract(&html, url);

        std::fs::write(&html_path, &html)
            .with_context(|| format!("Failed to write {}", html_path.display()))?;
        std::fs::write(&txt_path, format!("{}\n\n{}", title, body))
            .with_context(|| format!("Failed to write {}", txt_path.display()))?;

        manifest.push(FetchManifestEntry {
            index: idx,
            url: url.clone(),
            title,
            base: host_of(url),
            html_file: html_rel,
            txt_file: txt_rel,
        });
        fetched += 1;

        if idx < total {
            tokio::time::sleep(rate_limit).await;
        }
    }

    let manifest_path = config.fetch_manifest_path();
    let json = serde_json::to_string_pretty(&manifest).context("Failed to encode manifest")?;
    std::fs::write(&manifest_path, json)
        .with_context(|| format!("Failed to write {}", manifest_path.display()))?;

    println!("fetch");
    println!("  urls: {}", total);
    println!("  fetched: {}", fetched);
    println!("  skipped (cached): {}", cached);
    println!("  skipped (robots): {}", disallowed);
    println!("  failed: {}", failed);
    println!("  manifest: {}", manifest_path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_uses_last_path_segment() {
        assert_eq!(
            url_slug("https://www.kra.go.ke/services/pin-registration"),
            "pin-registration"
        );
        assert_eq!(
            url_slug("https://www.kra.go.ke/services/PIN%20Guide/"),
            "pin20guide"
        );
    }

    #[test]
    fn slug_falls_back_to_host() {
        assert_eq!(url_slug("https://hudumakenya.go.ke/"), "hudumakenyagoke");
        assert_eq!(url_slug("not a url"), "not-a-url");
    }

    #[test]
    fn slug_is_bounded() {
        let long = format!("https://example.go.ke/{}", "segment-".repeat(30));
        assert!(url_slug(&long).chars().count() <= 50);
    }

    #[test]
    fn hash8_is_stable_and_distinct() {
        let a = url_hash8("https://www.kra.go.ke/a");
        let b = url_hash8("https://www.kra.go.ke/b");
        assert_eq!(a.len(), 8);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, url_hash8("https://www.kra.go.ke/a"));
        assert_ne!(a, b);
    }

    #[test]
    fn artifact_stem_is_zero_padded() {
        let stem = artifact_stem(7, "https://www.kra.go.ke/services/pin");
        assert!(stem.starts_with("007_pin_"));
        let stem = artifact_stem(123, "https://www.kra.go.ke/services/pin");
        assert!(stem.starts_with("123_pin_"));
    }

    #[test]
    fn title_line_reads_first_nonempty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.txt");

        std::fs::write(&path, "NHIF Registration\n\nBody text here.").unwrap();
        assert_eq!(
            read_title_line(&path).as_deref(),
            Some("NHIF Registration")
        );

        std::fs::write(&path, "\n\nBody only.").unwrap();
        assert_eq!(read_title_line(&path), None);
    }

    #[test]
    fn host_of_extracts_domain() {
        assert_eq!(host_of("https://www.kra.go.ke/services/pin"), "www.kra.go.ke");
        assert_eq!(host_of("nonsense"), "");
    }
}
