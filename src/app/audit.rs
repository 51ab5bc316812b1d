use std::time::Duration;

use chrono::Utc;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

use super::critic::AiCritic;
use super::data_io::InputRow;
use super::extract::{ContentStrategy, extract_snapshot, schema_type_set};
use super::score::compute_score;
use super::types::{AiOpinion, AuditEvent, AuditRecord, MISSING};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; sc0ut-auditor)";
const RICH_RESULTS_TEST: &str = "https://search.google.com/test/rich-results?url=";

// Path slashes stay bare in the verification link.
const VERIFY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub url_key: String,
    pub title_key: Option<String>,
    pub staging_domain: Option<String>,
    pub delay_ms: u64,
    pub timeout_secs: u64,
    pub user_agent: Option<String>,
    pub content_selector: String,
}

fn send_status(tx: &UnboundedSender<AuditEvent>, message: impl Into<String>) {
    let _ = tx.send(AuditEvent::Status(message.into()));
}

// A failing row becomes a score-0 error record; nothing a single page does
// can abort the batch.
pub async fn run_audit(
    rows: Vec<InputRow>,
    config: AuditConfig,
    critic: AiCritic,
    tx: UnboundedSender<AuditEvent>,
) {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .user_agent(
            config
                .user_agent
                .as_deref()
                .unwrap_or(DEFAULT_USER_AGENT),
        )
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            let _ = tx.send(AuditEvent::Error(format!(
                "failed to create fetch client: {err}"
            )));
            let _ = tx.send(AuditEvent::Finished);
            return;
        }
    };

    let strategy = ContentStrategy {
        primary_selector: config.content_selector.clone(),
    };
    let total = rows.len();
    let mut audited = 0usize;

    for (idx, row) in rows.iter().enumerate() {
        let raw_url = row.get(&config.url_key);
        if raw_url.trim().is_empty() {
            send_status(&tx, format!("row {}/{total}: blank URL, skipped", idx + 1));
            continue;
        }
        let csv_title = config
            .title_key
            .as_deref()
            .map(|key| row.get(key).trim())
            .unwrap_or("");
        let progress_name = if csv_title.is_empty() { raw_url } else { csv_title };
        send_status(
            &tx,
            format!("analyzing {progress_name} ({}/{total})", idx + 1),
        );

        // Courtesy throttle.
        tokio::time::sleep(Duration::from_millis(config.delay_ms)).await;

        let url = match resolve_audit_url(raw_url, config.staging_domain.as_deref()) {
            Ok(url) => url,
            Err(err) => {
                audited += 1;
                let _ = tx.send(AuditEvent::Record(Box::new(error_record(
                    display_name(csv_title, MISSING, raw_url),
                    raw_url.trim().to_string(),
                    err,
                ))));
                continue;
            }
        };

        let html = match fetch_page(&client, &url).await {
            Ok(html) => html,
            Err(err) => {
                audited += 1;
                let _ = tx.send(AuditEvent::Record(Box::new(error_record(
                    display_name(csv_title, MISSING, &url),
                    url,
                    err,
                ))));
                continue;
            }
        };

        let snapshot = extract_snapshot(&html, &strategy);
        let schema_types = schema_type_set(&snapshot.raw_schema_blocks);
        let opinion = critic.review(&snapshot, &schema_types).await;
        let result = compute_score(&snapshot, &opinion);

        audited += 1;
        let record = AuditRecord {
            page_title: display_name(csv_title, &snapshot.title, &url),
            verify_url: verify_link(&url),
            url,
            score: result.score,
            log: result.log,
            title: snapshot.title,
            h1: snapshot.h1,
            meta_description: snapshot.meta_description,
            json_valid: snapshot.json_valid,
            schema_types,
            echo_score: snapshot.echo_score,
            opinion,
            error: None,
            audit_timestamp: Utc::now().to_rfc3339(),
        };
        let _ = tx.send(AuditEvent::Record(Box::new(record)));
    }

    if audited == 0 {
        let _ = tx.send(AuditEvent::Error(
            "no valid URLs in input; nothing was audited".to_string(),
        ));
    }
    let _ = tx.send(AuditEvent::Finished);
}

// Single GET, no retries.
async fn fetch_page(client: &reqwest::Client, url: &str) -> Result<String, String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|err| format!("request failed: {err}"))?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("http status {status}"));
    }
    response
        .text()
        .await
        .map_err(|err| format!("failed to read body: {err}"))
}

// Staging substitution keeps the path, drops query and fragment.
pub fn resolve_audit_url(raw: &str, staging_domain: Option<&str>) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("blank URL".to_string());
    }
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    match staging_domain.map(str::trim).filter(|host| !host.is_empty()) {
        None => Ok(with_scheme),
        Some(host) => {
            let parsed = Url::parse(&with_scheme)
                .map_err(|err| format!("cannot rewrite unparseable URL {trimmed}: {err}"))?;
            Ok(format!("https://{host}{}", parsed.path()))
        }
    }
}

pub fn verify_link(url: &str) -> String {
    format!(
        "{RICH_RESULTS_TEST}{}",
        utf8_percent_encode(url, VERIFY_ENCODE_SET)
    )
}

fn display_name(csv_title: &str, extracted_title: &str, url: &str) -> String {
    if !csv_title.trim().is_empty() {
        csv_title.trim().to_string()
    } else if !extracted_title.is_empty() && extracted_title != MISSING {
        extracted_title.to_string()
    } else {
        url.to_string()
    }
}

fn error_record(page_title: String, url: String, error: String) -> AuditRecord {
    AuditRecord {
        page_title,
        url,
        score: 0,
        log: Vec::new(),
        title: String::new(),
        h1: String::new(),
        meta_description: String::new(),
        json_valid: true,
        schema_types: Vec::new(),
        echo_score: 0.0,
        opinion: AiOpinion::skipped(),
        verify_url: String::new(),
        error: Some(error),
        audit_timestamp: Utc::now().to_rfc3339(),
    }
}

// Ascending by score; ties keep processing order.
pub fn sort_records(records: &mut [AuditRecord]) {
    records.sort_by_key(|record| record.score);
}
