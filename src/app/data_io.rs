use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::Path;

use chrono::Utc;

use super::types::{AuditRecord, ColumnMapping};

const URL_COLUMN_CANDIDATES: [&str; 6] = ["url", "page url", "page_url", "loc", "link", "address"];
const TITLE_COLUMN_CANDIDATES: [&str; 4] = ["page title", "title", "page", "name"];

pub const REPORT_HEADERS: [&str; 18] = [
    "page_title",
    "url",
    "score",
    "deductions",
    "title",
    "h1",
    "meta_description",
    "schema_syntax",
    "schema_types",
    "echo_score",
    "ai_rating",
    "ai_writing_quality",
    "ai_rewrite_risk",
    "ai_schema_suggestion",
    "ai_critique",
    "verify_url",
    "error",
    "audit_timestamp",
];

#[derive(Debug, Clone)]
pub struct InputRow {
    values: HashMap<String, String>,
}

impl InputRow {
    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or("")
    }
}

#[cfg(test)]
impl InputRow {
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            values: pairs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        }
    }
}

#[derive(Debug)]
pub struct InputBatch {
    pub headers: Vec<String>,
    pub rows: Vec<InputRow>,
}

pub fn load_input_batch(path: &str) -> io::Result<InputBatch> {
    let content = fs::read_to_string(path)?;
    parse_input_csv(content.strip_prefix('\u{feff}').unwrap_or(&content))
}

fn parse_input_csv(content: &str) -> io::Result<InputBatch> {
    let mut reader = csv::Reader::from_reader(content.as_bytes());
    let raw_headers = reader
        .headers()
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?
        .iter()
        .map(|header| header.trim().to_string())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
        let mut values = HashMap::new();
        for (idx, header) in raw_headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            values.insert(header.clone(), record.get(idx).unwrap_or("").to_string());
        }
        rows.push(InputRow { values });
    }

    let headers = raw_headers
        .into_iter()
        .filter(|header| !header.is_empty())
        .collect();
    Ok(InputBatch { headers, rows })
}

// First match in candidate order wins; a sole unrecognized column is
// assumed to be the URL.
pub fn detect_columns(headers: &[String]) -> ColumnMapping {
    let mut lookup = HashMap::new();
    for header in headers {
        lookup
            .entry(header.trim().to_ascii_lowercase())
            .or_insert_with(|| header.clone());
    }

    let url_key = URL_COLUMN_CANDIDATES
        .iter()
        .find_map(|candidate| lookup.get(*candidate).cloned())
        .or_else(|| {
            if headers.len() == 1 {
                headers.first().cloned()
            } else {
                None
            }
        });
    let title_key = TITLE_COLUMN_CANDIDATES
        .iter()
        .find_map(|candidate| lookup.get(*candidate).cloned());

    ColumnMapping {
        url_key,
        title_key,
        headers: headers.to_vec(),
    }
}

pub fn default_output_path(input: &str) -> String {
    let stem = Path::new(input)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("audit");
    let stem = stem
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect::<String>();
    let ts = Utc::now().format("%Y%m%d_%H%M%S");
    format!("{stem}_audit_{ts}.csv")
}

pub fn record_to_fields(record: &AuditRecord) -> Vec<String> {
    let failed = record.error.is_some();
    // Failed rows keep only the name, URL, score and error text.
    let unless_failed = |value: &str| {
        if failed {
            String::new()
        } else {
            value.to_string()
        }
    };

    vec![
        record.page_title.clone(),
        record.url.clone(),
        record.score.to_string(),
        record
            .log
            .iter()
            .map(|deduction| deduction.render())
            .collect::<Vec<_>>()
            .join("|"),
        unless_failed(&record.title),
        unless_failed(&record.h1),
        unless_failed(&record.meta_description),
        if failed {
            String::new()
        } else if record.json_valid {
            "Valid".to_string()
        } else {
            "Syntax Error".to_string()
        },
        unless_failed(&record.schema_types.join(", ")),
        if failed {
            String::new()
        } else {
            format!("{:.1}", record.echo_score)
        },
        unless_failed(record.opinion.rating.as_str()),
        unless_failed(&record.opinion.writing_quality),
        unless_failed(&record.opinion.rewrite_risk),
        unless_failed(&record.opinion.schema_suggestion),
        unless_failed(&record.opinion.critique),
        record.verify_url.clone(),
        record.error.clone().unwrap_or_default(),
        record.audit_timestamp.clone(),
    ]
}

pub struct CsvSink {
    writer: csv::Writer<File>,
}

impl CsvSink {
    pub fn new(output_path: &str) -> io::Result<Self> {
        let file = File::create(output_path)?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(REPORT_HEADERS)?;
        Ok(Self { writer })
    }

    pub fn write_row(&mut self, record: &AuditRecord) -> io::Result<()> {
        self.writer.write_record(record_to_fields(record))?;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
