use std::fs;
use std::io;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};

use super::types::{AiOpinion, Cli, PageSnapshot, Rating};

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const CONTENT_SAMPLE_CHARS: usize = 2500;

// Disabled yields a neutral opinion; any Gemini failure degrades to an
// Error opinion instead of failing the row.
pub enum AiCritic {
    Disabled,
    Gemini(GeminiCritic),
}

pub struct GeminiCritic {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl AiCritic {
    pub fn gemini(api_key: String, model: String, timeout: Duration) -> io::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| io::Error::other(format!("failed to create AI client: {err}")))?;
        Ok(AiCritic::Gemini(GeminiCritic {
            client,
            api_key,
            model,
        }))
    }

    pub async fn review(&self, snapshot: &PageSnapshot, schema_types: &[String]) -> AiOpinion {
        match self {
            AiCritic::Disabled => AiOpinion::skipped(),
            AiCritic::Gemini(critic) => critic.review(snapshot, schema_types).await,
        }
    }
}

impl GeminiCritic {
    async fn review(&self, snapshot: &PageSnapshot, schema_types: &[String]) -> AiOpinion {
        match self.request_opinion(snapshot, schema_types).await {
            Ok(opinion) => opinion,
            Err(err) => AiOpinion::error(err),
        }
    }

    async fn request_opinion(
        &self,
        snapshot: &PageSnapshot,
        schema_types: &[String],
    ) -> Result<AiOpinion, String> {
        let prompt = build_prompt(snapshot, schema_types);
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {"responseMimeType": "application/json"}
        });

        let response = self
            .client
            .post(format!(
                "{GEMINI_ENDPOINT}/{}:generateContent",
                self.model
            ))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|err| format!("AI request failed: {err}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("AI request returned http {status}"));
        }

        let payload = response
            .json::<Value>()
            .await
            .map_err(|err| format!("unreadable AI response: {err}"))?;
        let text = payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| "AI response carried no text candidate".to_string())?;

        parse_opinion(text)
    }
}

fn build_prompt(snapshot: &PageSnapshot, schema_types: &[String]) -> String {
    let sample = snapshot
        .body_text
        .chars()
        .take(CONTENT_SAMPLE_CHARS)
        .collect::<String>();
    let types = if schema_types.is_empty() {
        "(none)".to_string()
    } else {
        schema_types.join(", ")
    };

    format!(
        "Act as a strict technical SEO validator. Accuracy is critical.\n\n\
         1. PAGE CONTENT (sample):\n\"{sample}\"\n\n\
         2. CURRENT METADATA:\nTitle: {title}\nDesc: {desc}\n\n\
         3. CURRENT SCHEMA (@type found):\n{types}\n\n\
         TASK:\n\
         1. rating: rate the title/content alignment (High/Medium/Low).\n\
         2. writing_quality: rate the meta description prose (Good/Poor).\n\
         3. google_rewrite_risk: will search engines rewrite this description (\"Likely Rewrite\"/\"Unlikely\")?\n\
         4. schema_suggestion: identify 1 specific Schema.org type missing based on content. \
         ONLY suggest official types from Schema.org (e.g. MedicalWebPage, FAQPage, Physician). \
         Do NOT invent types. Answer \"None\" if the markup is already optimal.\n\
         5. meta_critique: write 1 short sentence improving the meta description.\n\n\
         OUTPUT JSON ONLY: {{\"rating\": \"...\", \"writing_quality\": \"...\", \
         \"google_rewrite_risk\": \"...\", \"schema_suggestion\": \"...\", \"meta_critique\": \"...\"}}",
        title = snapshot.title,
        desc = snapshot.meta_description,
    )
}

// Accepts the deprecated field aliases older prompt profiles produced and
// substitutes a dash for anything absent.
pub fn parse_opinion(reply: &str) -> Result<AiOpinion, String> {
    let cleaned = strip_code_fences(reply);
    let value = serde_json::from_str::<Value>(cleaned)
        .map_err(|err| format!("malformed AI reply: {err}"))?;

    let field = |names: &[&str]| -> String {
        names
            .iter()
            .find_map(|name| value.get(*name).and_then(Value::as_str))
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .unwrap_or("-")
            .to_string()
    };

    Ok(AiOpinion {
        rating: Rating::parse(&field(&["rating"])),
        writing_quality: field(&["writing_quality"]),
        rewrite_risk: field(&["google_rewrite_risk"]),
        schema_suggestion: field(&["schema_suggestion", "schema_prescription"]),
        critique: field(&["meta_critique", "suggested_desc"]),
    })
}

fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

#[derive(Debug, Deserialize)]
struct CredentialFile {
    api_key: String,
}

// Flag, then environment, then credential file.
pub fn resolve_api_key(cli: &Cli) -> Result<String, String> {
    if let Some(key) = cli.api_key.as_deref().map(str::trim)
        && !key.is_empty()
    {
        return Ok(key.to_string());
    }

    if let Ok(key) = std::env::var("GEMINI_API_KEY")
        && !key.trim().is_empty()
    {
        return Ok(key.trim().to_string());
    }

    if let Some(path) = &cli.api_key_file {
        let content = fs::read_to_string(path)
            .map_err(|err| format!("failed to read credential file {path}: {err}"))?;
        let credential = serde_json::from_str::<CredentialFile>(&content)
            .map_err(|err| format!("credential file {path} is not usable: {err}"))?;
        let key = credential.api_key.trim();
        if key.is_empty() {
            return Err(format!("credential file {path} has an empty \"api_key\" field"));
        }
        return Ok(key.to_string());
    }

    Err(
        "no Gemini API key found; pass --api-key, set GEMINI_API_KEY, point --api-key-file \
         at a credential file, or rerun with --no-ai"
            .to_string(),
    )
}
