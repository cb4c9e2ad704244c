use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use reclaim_types::models::{MatchCandidate, ReportSnapshot};

/// Comparison quality and latency degrade with larger batches; this caps
/// how many found reports go into one judgment call. A design constant,
/// not a protocol limit.
pub const ORACLE_BATCH_SIZE: usize = 5;

/// External similarity judgment. A `None` verdict means the oracle could
/// not produce a usable answer for this batch — callers skip the batch and
/// let the next scheduled pass retry naturally.
#[async_trait]
pub trait MatchOracle: Send + Sync {
    async fn judge(
        &self,
        lost: &ReportSnapshot,
        found_batch: &[ReportSnapshot],
    ) -> Option<Vec<MatchCandidate>>;
}

#[derive(Debug, Error)]
enum OracleError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("oracle returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("response carried no text content")]
    EmptyResponse,
    #[error("response carried no JSON object")]
    MissingJson,
    #[error("response JSON did not match the matches schema: {0}")]
    Schema(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.5-flash".to_string(),
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Gemini-backed oracle. Every failure mode — transport, timeout, non-2xx,
/// fence-garbled or schema-invalid JSON — is soft: logged and reported as
/// "no verdict".
pub struct GeminiOracle {
    client: Client,
    config: GeminiConfig,
}

impl GeminiOracle {
    pub fn new(config: GeminiConfig) -> anyhow::Result<Self> {
        // The explicit timeout keeps a hung oracle call from stalling a
        // whole matching pass.
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    async fn invoke(
        &self,
        lost: &ReportSnapshot,
        found_batch: &[ReportSnapshot],
    ) -> Result<Vec<MatchCandidate>, OracleError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            self.config.model
        );

        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: build_prompt(lost, found_batch),
                }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            return Err(OracleError::Status { status, body });
        }

        let response: GenerateResponse = response.json().await?;
        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or(OracleError::EmptyResponse)?;

        parse_matches(&text)
    }
}

#[async_trait]
impl MatchOracle for GeminiOracle {
    async fn judge(
        &self,
        lost: &ReportSnapshot,
        found_batch: &[ReportSnapshot],
    ) -> Option<Vec<MatchCandidate>> {
        match self.invoke(lost, found_batch).await {
            Ok(candidates) => Some(candidates),
            Err(e) => {
                warn!("Oracle judgment failed for lost report {}: {}", lost.id, e);
                None
            }
        }
    }
}

fn build_prompt(lost: &ReportSnapshot, found_batch: &[ReportSnapshot]) -> String {
    let lost_json = serde_json::to_string_pretty(lost).unwrap_or_default();
    let found_json = serde_json::to_string_pretty(found_batch).unwrap_or_default();

    format!(
        "You are a lost-and-found matching AI.\n\n\
         Compare the LOST post with FOUND posts and return matches in JSON.\n\n\
         LOST POST:\n{lost_json}\n\n\
         FOUND POSTS:\n{found_json}\n\n\
         Return ONLY valid JSON in this format:\n{RESPONSE_TEMPLATE}"
    )
}

const RESPONSE_TEMPLATE: &str = r#"{
  "matches": [
    {
      "found_post_id": "string",
      "user_email": "string",
      "score": 0.85
    }
  ]
}"#;

/// Parse the oracle's reply into candidates, tolerating markdown fencing
/// and surrounding prose.
fn parse_matches(raw: &str) -> Result<Vec<MatchCandidate>, OracleError> {
    let json = extract_json_object(raw).ok_or(OracleError::MissingJson)?;
    let envelope: MatchesEnvelope = serde_json::from_str(&json)?;
    Ok(envelope.matches)
}

/// Pull the first JSON object out of a model reply that may wrap it in a
/// ``` fence or prose.
fn extract_json_object(raw: &str) -> Option<String> {
    if raw.trim_start().starts_with('{') {
        return Some(raw.trim().to_string());
    }

    let fence = "```";
    if let Some(start) = raw.find(fence) {
        let after_fence = &raw[start + fence.len()..];
        let after_lang = after_fence.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
        if let Some(end) = after_lang.find(fence) {
            let block = &after_lang[..end];
            if block.contains('{') {
                return Some(block.trim().to_string());
            }
        }
    }

    // Last resort: balanced-brace scan for an inline object.
    let rest = raw.split('{').nth(1)?;
    let mut depth = 1i32;
    for (idx, ch) in rest.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let mut candidate = String::from("{");
                    candidate.push_str(&rest[..=idx]);
                    return Some(candidate);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Deserialize)]
struct ResponseCandidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct MatchesEnvelope {
    matches: Vec<MatchCandidate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_json() {
        let raw = r#"{"matches":[{"found_post_id":"f-1","user_email":"a@b.c","score":0.9}]}"#;
        let matches = parse_matches(raw).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].found_post_id, "f-1");
    }

    #[test]
    fn strips_markdown_fencing() {
        let raw = "```json\n{\"matches\":[{\"found_post_id\":\"f-2\",\"user_email\":\"a@b.c\",\"score\":0.7}]}\n```";
        let matches = parse_matches(raw).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].score, 0.7);
    }

    #[test]
    fn finds_object_inside_prose() {
        let raw = "Sure! Here are the matches: {\"matches\":[]} Hope that helps.";
        assert!(parse_matches(raw).unwrap().is_empty());
    }

    #[test]
    fn rejects_reply_without_json() {
        assert!(parse_matches("no matches to report").is_err());
    }

    #[test]
    fn rejects_schema_mismatch() {
        assert!(parse_matches(r#"{"results": []}"#).is_err());
    }
}
