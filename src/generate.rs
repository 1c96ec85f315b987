//! Chat-completions client for the optional generation step.
//!
//! When `[llm].endpoint` is configured, retrieved excerpts are forwarded
//! as grounding context and the endpoint composes the reply. Every
//! failure here is recoverable: the caller degrades to the extractive
//! answer, so this module only has to report errors, not hide them.

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::time::Duration;

use crate::config::LlmConfig;

/// Render retrieved excerpts as one grounding-context block.
fn render_context(docs: &[String]) -> String {
    docs.iter()
        .enumerate()
        .map(|(i, doc)| format!("Document {}:\n{}", i + 1, doc))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn build_system_prompt(base: &str, language: Option<&str>) -> String {
    match language {
        Some(lang) if !lang.trim().is_empty() => {
            format!("{} Respond in {}.", base, lang.trim())
        }
        _ => base.to_string(),
    }
}

fn build_messages(
    system_prompt: &str,
    context_docs: &[String],
    user_message: &str,
) -> Vec<serde_json::Value> {
    let mut messages = vec![json!({ "role": "system", "content": system_prompt })];
    if !context_docs.is_empty() {
        messages.push(json!({
            "role": "system",
            "content": format!(
                "Context from retrieved documents:\n{}",
                render_context(context_docs)
            ),
        }));
    }
    messages.push(json!({ "role": "user", "content": user_message }));
    messages
}

fn parse_reply(data: &serde_json::Value) -> Result<String> {
    let content = data
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str());
    match content {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        _ => bail!("Generation response missing choices[0].message.content"),
    }
}

/// Ask the configured generation endpoint for a grounded reply.
pub async fn generate_reply(
    config: &LlmConfig,
    user_message: &str,
    context_docs: &[String],
    language: Option<&str>,
) -> Result<String> {
    if !config.is_enabled() {
        bail!("No generation endpoint configured");
    }

    let system_prompt = build_system_prompt(&config.system_prompt, language);
    let payload = json!({
        "model": config.model,
        "messages": build_messages(&system_prompt, context_docs, user_message),
        "temperature": config.temperature,
        "max_tokens": config.max_tokens,
        "stream": false,
    });

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;

    let response = client
        .post(&config.endpoint)
        .json(&payload)
        .send()
        .await
        .context("Generation request failed")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("Generation endpoint error {}: {}", status, body);
    }

    let data: serde_json::Value = response
        .json()
        .await
        .context("Failed to parse generation response")?;
    parse_reply(&data)
}
