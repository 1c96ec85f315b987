//! Core data models shared across the pipeline stages.
//!
//! These types cross module boundaries: manifest entries hand off from the
//! fetch stage to the chunk stage, doc-map rows join the vector index to
//! citation metadata, and job rows track background ingestion runs.

use serde::{Deserialize, Serialize};

/// Corpus content category. The variant order matches the classifier's
/// keyword table; see `classify::CATEGORY_KEYWORDS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ServiceWorkflow,
    MinistryFaq,
    CountyService,
    LegalSnippet,
    UssdSms,
    LanguagePack,
    AgentOps,
    SafetyEthics,
    OfficerTemplate,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::ServiceWorkflow => "service_workflow",
            Category::MinistryFaq => "ministry_faq",
            Category::CountyService => "county_service",
            Category::LegalSnippet => "legal_snippet",
            Category::UssdSms => "ussd_sms",
            Category::LanguagePack => "language_pack",
            Category::AgentOps => "agent_ops",
            Category::SafetyEthics => "safety_ethics",
            Category::OfficerTemplate => "officer_template",
        }
    }

    /// Parse a category string; unknown values return `None` so callers can
    /// decide between defaulting and rejecting.
    pub fn parse(s: &str) -> Option<Category> {
        match s {
            "service_workflow" => Some(Category::ServiceWorkflow),
            "ministry_faq" => Some(Category::MinistryFaq),
            "county_service" => Some(Category::CountyService),
            "legal_snippet" => Some(Category::LegalSnippet),
            "ussd_sms" => Some(Category::UssdSms),
            "language_pack" => Some(Category::LanguagePack),
            "agent_ops" => Some(Category::AgentOps),
            "safety_ethics" => Some(Category::SafetyEthics),
            "officer_template" => Some(Category::OfficerTemplate),
            _ => None,
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::ServiceWorkflow
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the fetch manifest, handing a fetched page to the chunk stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchManifestEntry {
    /// 1-based ordinal of the URL within the crawl run.
    pub index: usize,
    pub url: String,
    pub title: String,
    /// Host the URL belongs to.
    pub base: String,
    /// Raw HTML artifact path, relative to the workspace dir.
    pub html_file: String,
    /// Extracted text artifact path, relative to the workspace dir.
    pub txt_file: String,
}

/// One row of `doc_map.json`: the citation/excerpt metadata for the corpus
/// document at the same ordinal position as its embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocEntry {
    pub title: String,
    pub filename: String,
    /// First ~1000 chars of the document body; also the text that was embedded.
    pub text: String,
    pub source: String,
    pub category: Category,
    pub word_count: usize,
    /// Ordinal position within the index build.
    pub chunk_index: usize,
    pub last_scraped: String,
    /// Last path segment of the source URL, when there is one.
    pub url_path: String,
}

/// Verdict of a robots.txt check for one URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RobotsVerdict {
    Allowed,
    Disallowed,
    /// robots.txt could not be fetched or returned an unexpected status;
    /// the caller's policy decides how to treat this.
    Unknown,
}

impl RobotsVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            RobotsVerdict::Allowed => "allowed",
            RobotsVerdict::Disallowed => "disallowed",
            RobotsVerdict::Unknown => "unknown",
        }
    }
}

/// A robots rule that matched the checked path, echoed in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedRule {
    pub user_agent: String,
    /// "allow" or "disallow".
    pub rule: String,
    pub pattern: String,
}

/// Per-URL record of the robots compliance report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotsUrlReport {
    pub url: String,
    pub domain: String,
    pub robots_url: String,
    pub robots_status_code: Option<u16>,
    /// "ok", "no_robots", "http_{code}", or "error".
    pub fetch_status: String,
    pub allowed: RobotsVerdict,
    pub matched_rules: Vec<MatchedRule>,
    pub detail: String,
}

/// Lifecycle state of a processing job. Completed and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<JobStatus> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of work a processing job tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobType {
    PdfUpload,
    UrlScrape,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::PdfUpload => "pdf_upload",
            JobType::UrlScrape => "url_scrape",
        }
    }

    pub fn parse(s: &str) -> Option<JobType> {
        match s {
            "pdf_upload" => Some(JobType::PdfUpload),
            "url_scrape" => Some(JobType::UrlScrape),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A processing job row as stored in SQLite.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProcessingJob {
    pub id: String,
    pub job_type: String,
    pub status: String,
    /// What the job ingests: a PDF path or a URL-list description.
    pub source: String,
    /// 0–100, monotonic within a run.
    pub progress: i64,
    pub documents_processed: i64,
    pub error_message: Option<String>,
    /// JSON payload describing produced artifacts, set on completion.
    pub result: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ProcessingJob {
    /// Parse the result payload, if any.
    pub fn result_value(&self) -> Option<serde_json::Value> {
        self.result
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}
