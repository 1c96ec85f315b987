//! robots.txt fetching, parsing, and crawl-permission decisions.
//!
//! Matching is prefix-only: a rule pattern matches any path it is a prefix
//! of. Wildcard (`*`) and end-anchor (`$`) syntax from the extended robots
//! grammar are not interpreted; this keeps decisions predictable for the
//! handful of government portals being crawled, and the limitation is part
//! of the documented contract rather than something to upgrade silently.
//!
//! Resolution: among the rules for the exact user-agent plus the `*` group
//! whose pattern prefixes the path, the longest pattern wins; at equal
//! length an Allow beats a Disallow. No matching rule means allowed. A
//! missing robots.txt (HTTP 404) means allowed; any other fetch outcome is
//! "unknown" and the caller picks a policy (the crawler fails open, the
//! compliance report keeps the verdict as-is).

use anyhow::{Context, Result};
use reqwest::Client;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::config::Config;
use crate::models::{MatchedRule, RobotsUrlReport, RobotsVerdict};

/// A single parsed Allow/Disallow rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RobotsRule {
    pub user_agent: String,
    pub allow: bool,
    pub pattern: String,
}

/// Rules parsed from one robots.txt body.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<RobotsRule>,
}

impl RuleSet {
    /// Line-oriented parse. `#` starts a comment; directives are matched
    /// case-insensitively; Allow/Disallow lines before any `User-agent`
    /// line are ignored; anything unrecognized is skipped. An empty
    /// Disallow pattern imposes no restriction.
    pub fn parse(text: &str) -> RuleSet {
        let mut rules = Vec::new();
        let mut current_ua: Option<String> = None;

        for raw_line in text.lines() {
            let line = match raw_line.find('#') {
                Some(pos) => &raw_line[..pos],
                None => raw_line,
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    if !value.is_empty() {
                        current_ua = Some(value.to_string());
                    }
                }
                "allow" | "disallow" => {
                    if let Some(ua) = &current_ua {
                        rules.push(RobotsRule {
                            user_agent: ua.clone(),
                            allow: directive == "allow",
                            pattern: value.to_string(),
                        });
                    }
                }
                _ => {}
            }
        }

        RuleSet { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Decide whether `path` is allowed for `user_agent`, returning the
    /// verdict and every rule that matched (most specific first).
    pub fn decide(&self, path: &str, user_agent: &str) -> (RobotsVerdict, Vec<MatchedRule>) {
        let normalized = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };

        let mut matched: Vec<&RobotsRule> = self
            .rules
            .iter()
            .filter(|r| r.user_agent == user_agent || r.user_agent == "*")
            .filter(|r| pattern_matches(&r.pattern, &normalized))
            .collect();

        if matched.is_empty() {
            return (RobotsVerdict::Allowed, Vec::new());
        }

        // Longest pattern first; Allow before Disallow at equal length.
        matched.sort_by(|a, b| {
            b.pattern
                .len()
                .cmp(&a.pattern.len())
                .then_with(|| b.allow.cmp(&a.allow))
        });

        let verdict = if matched[0].allow {
            RobotsVerdict::Allowed
        } else {
            RobotsVerdict::Disallowed
        };
        let rules = matched
            .into_iter()
            .map(|r| MatchedRule {
                user_agent: r.user_agent.clone(),
                rule: if r.allow { "allow" } else { "disallow" }.to_string(),
                pattern: r.pattern.clone(),
            })
            .collect();

        (verdict, rules)
    }
}

fn pattern_matches(pattern: &str, path: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    path.starts_with(pattern)
}

/// Outcome of fetching one domain's robots.txt.
#[derive(Debug, Clone)]
pub struct DomainRobots {
    pub robots_url: String,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub rules: RuleSet,
}

impl DomainRobots {
    /// Report-facing fetch status: "ok", "no_robots", "http_{code}", or
    /// "error".
    pub fn fetch_status(&self) -> String {
        match (self.status_code, &self.error) {
            (Some(200), _) => "ok".to_string(),
            (Some(404), _) => "no_robots".to_string(),
            (Some(code), _) => format!("http_{}", code),
            (None, _) => "error".to_string(),
        }
    }

    /// Evaluate one path against this domain's robots outcome.
    pub fn check(&self, path: &str, user_agent: &str) -> (RobotsVerdict, Vec<MatchedRule>, String) {
        match self.status_code {
            Some(200) => {
                let (verdict, matched) = self.rules.decide(path, user_agent);
                let detail = match matched.first() {
                    Some(rule) => format!("longest match: {} {}", rule.rule, rule.pattern),
                    None => "no matching rules".to_string(),
                };
                (verdict, matched, detail)
            }
            Some(404) => (
                RobotsVerdict::Allowed,
                Vec::new(),
                "no robots.txt (404)".to_string(),
            ),
            Some(code) => (
                RobotsVerdict::Unknown,
                Vec::new(),
                format!("robots.txt returned HTTP {}", code),
            ),
            None => (
                RobotsVerdict::Unknown,
                Vec::new(),
                self.error.clone().unwrap_or_else(|| "fetch failed".to_string()),
            ),
        }
    }
}

/// `scheme://host[:port]` of a URL, the cache key for robots lookups.
pub fn canonical_domain(url: &str) -> Result<String> {
    let parsed = Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;
    let host = parsed
        .host_str()
        .with_context(|| format!("URL has no host: {}", url))?;
    let mut domain = format!("{}://{}", parsed.scheme(), host);
    if let Some(port) = parsed.port() {
        domain.push_str(&format!(":{}", port));
    }
    Ok(domain)
}

async fn fetch_domain_robots(client: &Client, domain: &str, timeout: Duration) -> DomainRobots {
    let robots_url = format!("{}/robots.txt", domain.trim_end_matches('/'));
    match client.get(&robots_url).timeout(timeout).send().await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            if status == 200 {
                match resp.text().await {
                    Ok(text) => DomainRobots {
                        robots_url,
                        status_code: Some(200),
                        error: None,
                        rules: RuleSet::parse(&text),
                    },
                    Err(e) => DomainRobots {
                        robots_url,
                        status_code: None,
                        error: Some(e.to_string()),
                        rules: RuleSet::default(),
                    },
                }
            } else {
                DomainRobots {
                    robots_url,
                    status_code: Some(status),
                    error: None,
                    rules: RuleSet::default(),
                }
            }
        }
        Err(e) => DomainRobots {
            robots_url,
            status_code: None,
            error: Some(e.to_string()),
            rules: RuleSet::default(),
        },
    }
}

/// Per-run robots gate with a per-domain cache, used by the crawl driver.
pub struct RobotsGate {
    client: Client,
    user_agent: String,
    timeout: Duration,
    cache: HashMap<String, DomainRobots>,
}

impl RobotsGate {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.crawl.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            user_agent: config.crawl.user_agent.clone(),
            timeout: Duration::from_secs(config.crawl.robots_timeout_secs),
            cache: HashMap::new(),
        })
    }

    /// Verdict for one URL, fetching and caching the domain's robots.txt
    /// on first sight. Unparseable URLs come back as unknown.
    pub async fn is_allowed(&mut self, url: &str) -> RobotsVerdict {
        let domain = match canonical_domain(url) {
            Ok(d) => d,
            Err(_) => return RobotsVerdict::Unknown,
        };
        if !self.cache.contains_key(&domain) {
            let fetched = fetch_domain_robots(&self.client, &domain, self.timeout).await;
            self.cache.insert(domain.clone(), fetched);
        }
        let path = Url::parse(url).map(|u| u.path().to_string()).unwrap_or_else(|_| "/".to_string());
        let (verdict, _, _) = self.cache[&domain].check(&path, &self.user_agent);
        verdict
    }
}

/// Read a URL list file: one URL per line, `#` comments and blank lines
/// skipped.
pub fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read URL list: {}", path.display()))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Run the compliance report: one robots.txt fetch per unique domain, one
/// verdict row per URL, written as pretty JSON and CSV.
pub async fn run_robots_report(
    config: &Config,
    urls_file: &Path,
    json_out: Option<&Path>,
    csv_out: Option<&Path>,
) -> Result<()> {
    let urls = read_url_list(urls_file)?;
    if urls.is_empty() {
        anyhow::bail!("URL list is empty: {}", urls_file.display());
    }

    let client = Client::builder()
        .user_agent(config.crawl.user_agent.clone())
        .build()
        .context("Failed to build HTTP client")?;
    let timeout = Duration::from_secs(config.crawl.robots_timeout_secs);
    let delay = Duration::from_millis(config.crawl.robots_delay_ms);

    // One fetch per unique domain, in first-seen order.
    let mut domains: Vec<String> = Vec::new();
    for url in &urls {
        if let Ok(domain) = canonical_domain(url) {
            if !domains.contains(&domain) {
                domains.push(domain);
            }
        }
    }

    let mut fetched: HashMap<String, DomainRobots> = HashMap::new();
    for (i, domain) in domains.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(delay).await;
        }
        let result = fetch_domain_robots(&client, domain, timeout).await;
        println!("{} -> {}", domain, result.fetch_status());
        fetched.insert(domain.clone(), result);
    }

    let mut rows = Vec::with_capacity(urls.len());
    for url in &urls {
        let row = match canonical_domain(url) {
            Ok(domain) => {
                let robots = &fetched[&domain];
                let path = Url::parse(url)
                    .map(|u| u.path().to_string())
                    .unwrap_or_else(|_| "/".to_string());
                let (verdict, matched, detail) = robots.check(&path, &config.crawl.user_agent);
                RobotsUrlReport {
                    url: url.clone(),
                    domain,
                    robots_url: robots.robots_url.clone(),
                    robots_status_code: robots.status_code,
                    fetch_status: robots.fetch_status(),
                    allowed: verdict,
                    matched_rules: matched,
                    detail,
                }
            }
            Err(e) => RobotsUrlReport {
                url: url.clone(),
                domain: String::new(),
                robots_url: String::new(),
                robots_status_code: None,
                fetch_status: "error".to_string(),
                allowed: RobotsVerdict::Unknown,
                matched_rules: Vec::new(),
                detail: e.to_string(),
            },
        };
        rows.push(row);
    }

    let json_path = json_out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.robots_report_path());
    let csv_path = csv_out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.workspace.dir.join("robots_report.csv"));
    if let Some(parent) = json_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(&json_path, serde_json::to_string_pretty(&rows)?)
        .with_context(|| format!("Failed to write {}", json_path.display()))?;
    std::fs::write(&csv_path, report_csv(&rows))
        .with_context(|| format!("Failed to write {}", csv_path.display()))?;

    let allowed = rows.iter().filter(|r| r.allowed == RobotsVerdict::Allowed).count();
    let disallowed = rows.iter().filter(|r| r.allowed == RobotsVerdict::Disallowed).count();
    let unknown = rows.iter().filter(|r| r.allowed == RobotsVerdict::Unknown).count();

    println!();
    println!(
        "Checked {} URLs across {} domains: {} allowed, {} disallowed, {} unknown",
        rows.len(),
        domains.len(),
        allowed,
        disallowed,
        unknown
    );
    println!("Wrote {}", json_path.display());
    println!("Wrote {}", csv_path.display());
    if disallowed > 0 {
        eprintln!(
            "warning: {} URLs are disallowed for {}; they will be skipped when fetching with --skip-disallowed",
            disallowed, config.crawl.user_agent
        );
    }

    Ok(())
}

/// Render report rows as CSV. Matched rules are JSON-encoded into a
/// single cell.
pub fn report_csv(rows: &[RobotsUrlReport]) -> String {
    let mut out = String::from(
        "url,domain,robots_url,robots_status_code,fetch_status,allowed,matched_rules,detail\n",
    );
    for row in rows {
        let status = row
            .robots_status_code
            .map(|c| c.to_string())
            .unwrap_or_default();
        let rules_json = serde_json::to_string(&row.matched_rules).unwrap_or_else(|_| "[]".into());
        let fields = [
            row.url.as_str(),
            row.domain.as_str(),
            row.robots_url.as_str(),
            status.as_str(),
            row.fetch_status.as_str(),
            row.allowed.as_str(),
            rules_json.as_str(),
            row.detail.as_str(),
        ];
        let line: Vec<String> = fields.iter().map(|f| csv_escape(f)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decide(robots: &str, path: &str) -> RobotsVerdict {
        RuleSet::parse(robots).decide(path, "*").0
    }

    #[test]
    fn no_rules_means_allowed() {
        assert_eq!(decide("", "/anything"), RobotsVerdict::Allowed);
        assert_eq!(
            decide("User-agent: *\n", "/anything"),
            RobotsVerdict::Allowed
        );
    }

    #[test]
    fn basic_disallow() {
        let robots = "User-agent: *\nDisallow: /private\n";
        assert_eq!(decide(robots, "/private/page"), RobotsVerdict::Disallowed);
        assert_eq!(decide(robots, "/public/page"), RobotsVerdict::Allowed);
    }

    #[test]
    fn longer_allow_overrides_disallow() {
        let robots = "User-agent: *\nDisallow: /admin\nAllow: /admin/public\n";
        assert_eq!(decide(robots, "/admin/public/form"), RobotsVerdict::Allowed);
        assert_eq!(decide(robots, "/admin/private"), RobotsVerdict::Disallowed);
    }

    #[test]
    fn longer_disallow_overrides_allow() {
        let robots = "User-agent: *\nAllow: /docs\nDisallow: /docs/internal\n";
        assert_eq!(decide(robots, "/docs/internal/x"), RobotsVerdict::Disallowed);
        assert_eq!(decide(robots, "/docs/guide"), RobotsVerdict::Allowed);
    }

    #[test]
    fn equal_length_tie_favors_allow() {
        let robots = "User-agent: *\nDisallow: /a\nAllow: /a\n";
        assert_eq!(decide(robots, "/a/page"), RobotsVerdict::Allowed);
    }

    #[test]
    fn empty_disallow_is_no_restriction() {
        let robots = "User-agent: *\nDisallow:\n";
        assert_eq!(decide(robots, "/anything"), RobotsVerdict::Allowed);
    }

    #[test]
    fn comments_and_case_insensitive_directives() {
        let robots = "# main group\nUSER-AGENT: *   # everyone\nDISALLOW: /hidden # secret\n";
        assert_eq!(decide(robots, "/hidden/x"), RobotsVerdict::Disallowed);
        assert_eq!(decide(robots, "/visible"), RobotsVerdict::Allowed);
    }

    #[test]
    fn rules_before_user_agent_are_ignored() {
        let robots = "Disallow: /early\nUser-agent: *\nDisallow: /late\n";
        assert_eq!(decide(robots, "/early/x"), RobotsVerdict::Allowed);
        assert_eq!(decide(robots, "/late/x"), RobotsVerdict::Disallowed);
    }

    #[test]
    fn exact_agent_rules_combine_with_wildcard() {
        let robots = "User-agent: RaiaBot\nDisallow: /internal\nUser-agent: *\nDisallow: /all\n";
        let rules = RuleSet::parse(robots);
        let (verdict, _) = rules.decide("/internal/x", "RaiaBot");
        assert_eq!(verdict, RobotsVerdict::Disallowed);
        let (verdict, _) = rules.decide("/all/x", "RaiaBot");
        assert_eq!(verdict, RobotsVerdict::Disallowed);
        // Another agent only sees the wildcard group.
        let (verdict, _) = rules.decide("/internal/x", "OtherBot");
        assert_eq!(verdict, RobotsVerdict::Allowed);
    }

    #[test]
    fn garbage_lines_are_skipped() {
        let robots = "<<html garbage>>\nUser-agent *\n????\nUser-agent: *\nDisallow: /x\n";
        assert_eq!(decide(robots, "/x/1"), RobotsVerdict::Disallowed);
    }

    #[test]
    fn path_without_leading_slash_is_normalized() {
        let robots = "User-agent: *\nDisallow: /admin\n";
        let rules = RuleSet::parse(robots);
        let (verdict, _) = rules.decide("admin/panel", "*");
        assert_eq!(verdict, RobotsVerdict::Disallowed);
    }

    #[test]
    fn matched_rules_are_reported_most_specific_first() {
        let robots = "User-agent: *\nDisallow: /admin\nAllow: /admin/public\n";
        let rules = RuleSet::parse(robots);
        let (_, matched) = rules.decide("/admin/public/form", "*");
        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].pattern, "/admin/public");
        assert_eq!(matched[0].rule, "allow");
        assert_eq!(matched[1].pattern, "/admin");
    }

    #[test]
    fn canonical_domain_keeps_scheme_and_port() {
        assert_eq!(
            canonical_domain("https://www.kra.go.ke/tax/pin").unwrap(),
            "https://www.kra.go.ke"
        );
        assert_eq!(
            canonical_domain("http://localhost:8000/x").unwrap(),
            "http://localhost:8000"
        );
        assert!(canonical_domain("not a url").is_err());
    }

    #[test]
    fn csv_escaping() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn read_url_list_skips_comments_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.txt");
        std::fs::write(
            &path,
            "# seed list\nhttps://a.go.ke/one\n\n  https://b.go.ke/two  \n# trailing\n",
        )
        .unwrap();
        let urls = read_url_list(&path).unwrap();
        assert_eq!(urls, vec!["https://a.go.ke/one", "https://b.go.ke/two"]);
    }
}
