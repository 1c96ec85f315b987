//! Processing job store.
//!
//! Every ingestion run (PDF upload or URL scrape) is tracked as a row in
//! `processing_jobs`. The background task that owns a job moves it
//! pending → processing → completed|failed, bumping progress at
//! checkpoints. Completed and failed are terminal: the guard lives in the
//! SQL itself so a stale writer cannot resurrect a finished job. Retrying
//! a failed job creates a fresh row for the same source; the failed row
//! stays in place as failure history.

use anyhow::{bail, Context, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::{JobStatus, JobType, ProcessingJob};

fn now_ts() -> String {
    // Fixed-width UTC timestamp so lexicographic order is chronological.
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.6fZ")
        .to_string()
}

/// Insert a new pending job and return it.
pub async fn create_job(
    pool: &SqlitePool,
    job_type: JobType,
    source: &str,
) -> Result<ProcessingJob> {
    let id = Uuid::new_v4().to_string();
    let now = now_ts();
    sqlx::query(
        "INSERT INTO processing_jobs \
         (id, job_type, status, source, progress, documents_processed, created_at, updated_at) \
         VALUES (?, ?, 'pending', ?, 0, 0, ?, ?)",
    )
    .bind(&id)
    .bind(job_type.as_str())
    .bind(source)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    get_job(pool, &id)
        .await?
        .context("job row missing after insert")
}

/// Move a pending job to processing. Returns false when the job was not
/// pending (already claimed, or terminal).
pub async fn claim_job(pool: &SqlitePool, id: &str) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE processing_jobs SET status = 'processing', updated_at = ? \
         WHERE id = ? AND status = 'pending'",
    )
    .bind(now_ts())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Update progress (0–100) and the processed-document count.
/// No-op on terminal jobs.
pub async fn set_progress(
    pool: &SqlitePool,
    id: &str,
    progress: i64,
    documents_processed: i64,
) -> Result<()> {
    sqlx::query(
        "UPDATE processing_jobs SET progress = ?, documents_processed = ?, updated_at = ? \
         WHERE id = ? AND status NOT IN ('completed', 'failed')",
    )
    .bind(progress)
    .bind(documents_processed)
    .bind(now_ts())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Mark a job completed with its result payload. No-op on terminal jobs.
pub async fn complete_job(
    pool: &SqlitePool,
    id: &str,
    documents_processed: i64,
    result: &serde_json::Value,
) -> Result<()> {
    sqlx::query(
        "UPDATE processing_jobs \
         SET status = 'completed', progress = 100, documents_processed = ?, result = ?, updated_at = ? \
         WHERE id = ? AND status NOT IN ('completed', 'failed')",
    )
    .bind(documents_processed)
    .bind(result.to_string())
    .bind(now_ts())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Mark a job failed with an error message. No-op on terminal jobs.
pub async fn fail_job(pool: &SqlitePool, id: &str, error: &str) -> Result<()> {
    sqlx::query(
        "UPDATE processing_jobs SET status = 'failed', error_message = ?, updated_at = ? \
         WHERE id = ? AND status NOT IN ('completed', 'failed')",
    )
    .bind(error)
    .bind(now_ts())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_job(pool: &SqlitePool, id: &str) -> Result<Option<ProcessingJob>> {
    let job = sqlx::query_as::<_, ProcessingJob>(
        "SELECT id, job_type, status, source, progress, documents_processed, \
         error_message, result, created_at, updated_at \
         FROM processing_jobs WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(job)
}

/// Newest-first job list.
pub async fn list_jobs(pool: &SqlitePool, limit: i64) -> Result<Vec<ProcessingJob>> {
    let jobs = sqlx::query_as::<_, ProcessingJob>(
        "SELECT id, job_type, status, source, progress, documents_processed, \
         error_message, result, created_at, updated_at \
         FROM processing_jobs ORDER BY created_at DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(jobs)
}

/// Create a fresh pending job re-running a failed job's source. The failed
/// row is left untouched. Errors when the job is unknown or not failed.
pub async fn retry_job(pool: &SqlitePool, id: &str) -> Result<ProcessingJob> {
    let job = match get_job(pool, id).await? {
        Some(job) => job,
        None => bail!("job not found: {}", id),
    };
    if JobStatus::parse(&job.status) != Some(JobStatus::Failed) {
        bail!(
            "only failed jobs can be retried (job {} is {})",
            id,
            job.status
        );
    }
    let job_type = JobType::parse(&job.job_type)
        .with_context(|| format!("job {} has unknown type {}", id, job.job_type))?;
    create_job(pool, job_type, &job.source).await
}

async fn connect_migrated(config: &Config) -> Result<SqlitePool> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    Ok(pool)
}

/// CLI entry point: `raia jobs list`.
pub async fn run_jobs_list(config: &Config, limit: i64) -> Result<()> {
    let pool = connect_migrated(config).await?;
    let jobs = list_jobs(&pool, limit).await?;
    pool.close().await;

    if jobs.is_empty() {
        println!("No jobs recorded.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<10}  {:<10}  {:>8}  {:>4}  source",
        "id", "type", "status", "progress", "docs"
    );
    for job in &jobs {
        println!(
            "{:<36}  {:<10}  {:<10}  {:>7}%  {:>4}  {}",
            job.id, job.job_type, job.status, job.progress, job.documents_processed, job.source
        );
    }
    Ok(())
}

/// CLI entry point: `raia jobs show <id>`.
pub async fn run_jobs_show(config: &Config, id: &str) -> Result<()> {
    let pool = connect_migrated(config).await?;
    let job = get_job(&pool, id).await?;
    pool.close().await;

    let job = match job {
        Some(job) => job,
        None => bail!("job not found: {}", id),
    };

    println!("--- Job ---");
    println!("id:          {}", job.id);
    println!("type:        {}", job.job_type);
    println!("status:      {}", job.status);
    println!("source:      {}", job.source);
    println!("progress:    {}%", job.progress);
    println!("documents:   {}", job.documents_processed);
    if let Some(ref err) = job.error_message {
        println!("error:       {}", err);
    }
    if let Some(result) = job.result_value() {
        println!("result:      {}", result);
    }
    println!("created_at:  {}", job.created_at);
    println!("updated_at:  {}", job.updated_at);
    Ok(())
}

/// CLI entry point: `raia jobs retry <id>`. Creates the replacement job in
/// pending state; a running server picks jobs up when they are submitted
/// over HTTP, so the CLI path reports the new id for `POST /jobs` clients
/// to re-drive, or for manual re-runs of the pipeline commands.
pub async fn run_jobs_retry(config: &Config, id: &str) -> Result<()> {
    let pool = connect_migrated(config).await?;
    let result = retry_job(&pool, id).await;
    pool.close().await;
    let new_job = result?;

    println!("Created retry job {} (source: {})", new_job.id, new_job.source);
    println!("Original job {} remains failed.", id);
    Ok(())
}
