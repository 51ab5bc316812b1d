use std::io;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;

use super::audit::{AuditConfig, run_audit, sort_records};
use super::critic::{AiCritic, resolve_api_key};
use super::data_io::{CsvSink, default_output_path, detect_columns, load_input_batch};
use super::types::{AuditEvent, AuditRecord, Cli};

pub async fn run() -> io::Result<()> {
    let cli = Cli::parse();

    let batch = load_input_batch(&cli.input)?;
    if batch.rows.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "empty input: the CSV has no data rows",
        ));
    }

    let mapping = detect_columns(&batch.headers);
    let url_key = mapping
        .url_column()
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?
        .to_string();

    let critic = if cli.no_ai {
        AiCritic::Disabled
    } else {
        let api_key =
            resolve_api_key(&cli).map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        AiCritic::gemini(
            api_key,
            cli.model.clone(),
            Duration::from_secs(cli.timeout_secs.max(1)),
        )?
    };

    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.input));
    let config = AuditConfig {
        url_key,
        title_key: mapping.title_key.clone(),
        staging_domain: cli.staging_domain.clone(),
        delay_ms: cli.delay_ms,
        timeout_secs: cli.timeout_secs,
        user_agent: cli.user_agent.clone(),
        content_selector: cli.content_selector.clone(),
    };
    let rows = match cli.limit {
        Some(limit) => batch.rows.into_iter().take(limit).collect(),
        None => batch.rows,
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<AuditEvent>();
    let audit_handle = tokio::spawn(run_audit(rows, config, critic, tx));

    let mut records = Vec::<AuditRecord>::new();
    let mut done = false;
    loop {
        while let Ok(event) = rx.try_recv() {
            match event {
                AuditEvent::Status(message) => eprintln!("{message}"),
                AuditEvent::Error(err) => eprintln!("{err}"),
                AuditEvent::Record(record) => records.push(*record),
                AuditEvent::Finished => done = true,
            }
        }
        if done {
            break;
        }
        tokio::time::sleep(Duration::from_millis(120)).await;
    }
    if let Err(err) = audit_handle.await {
        eprintln!("audit task join error: {err}");
    }

    sort_records(&mut records);
    print_report(&records);

    let mut sink = CsvSink::new(&output_path)?;
    for record in &records {
        sink.write_row(record)?;
    }
    sink.flush()?;

    let failed = records.iter().filter(|r| r.error.is_some()).count();
    eprintln!(
        "finished audit: audited={} errors={} avg_score={} output={}",
        records.len(),
        failed,
        average_score(&records),
        output_path
    );
    Ok(())
}

fn print_report(records: &[AuditRecord]) {
    if records.is_empty() {
        return;
    }

    println!(
        "{:>5}  {:<38}  {:<7}  {:<26}  {}",
        "score", "page", "rating", "schema types", "notes"
    );
    for record in records {
        let notes = match &record.error {
            Some(err) => format!("error: {err}"),
            None => record
                .log
                .iter()
                .map(|deduction| deduction.render())
                .collect::<Vec<_>>()
                .join("; "),
        };
        println!(
            "{:>5}  {:<38}  {:<7}  {:<26}  {}",
            record.score,
            truncate_cell(&record.page_title, 38),
            truncate_cell(record.opinion.rating.as_str(), 7),
            truncate_cell(&record.schema_types.join(", "), 26),
            truncate_cell(&notes, 60),
        );
    }
}

fn average_score(records: &[AuditRecord]) -> u8 {
    let mut sum = 0u64;
    let mut count = 0u64;
    for record in records {
        if record.error.is_none() {
            sum += record.score as u64;
            count += 1;
        }
    }
    if count == 0 { 0 } else { (sum / count) as u8 }
}

fn truncate_cell(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let kept = text
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    format!("{kept}\u{2026}")
}
