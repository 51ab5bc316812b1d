use clap::Parser;

pub const MISSING: &str = "MISSING";

#[derive(Debug, Parser, Clone)]
#[command(
    name = "sc0ut",
    version,
    about = "Batch SEO auditing with AI second opinions and CSV reports"
)]
pub struct Cli {
    /// CSV file listing the pages to audit (one URL column required)
    #[arg(value_name = "CSV")]
    pub input: String,

    #[arg(short, long, value_name = "FILE")]
    pub output: Option<String>,

    /// Skip the generative-AI critique; only deterministic checks apply
    #[arg(long, default_value_t = false)]
    pub no_ai: bool,

    /// Audit against this host instead of the one in the CSV, keeping paths
    #[arg(long, value_name = "HOST")]
    pub staging_domain: Option<String>,

    #[arg(long, value_name = "MS", default_value_t = 250)]
    pub delay_ms: u64,

    #[arg(long, value_name = "SECS", default_value_t = 15)]
    pub timeout_secs: u64,

    #[arg(long, value_name = "UA")]
    pub user_agent: Option<String>,

    /// CSS selector for the main content container
    #[arg(long, value_name = "SELECTOR", default_value = ".page-content-area")]
    pub content_selector: String,

    #[arg(long, value_name = "MODEL", default_value = "gemini-2.5-flash")]
    pub model: String,

    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// JSON credential file with an "api_key" field
    #[arg(long, value_name = "FILE")]
    pub api_key_file: Option<String>,

    /// Audit only the first N data rows
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ColumnMapping {
    pub url_key: Option<String>,
    pub title_key: Option<String>,
    pub headers: Vec<String>,
}

impl ColumnMapping {
    pub fn url_column(&self) -> Result<&str, String> {
        self.url_key.as_deref().ok_or_else(|| {
            format!(
                "no URL column found among headers [{}]; expected one of: url, page url, page_url, loc, link, address",
                self.headers.join(", ")
            )
        })
    }
}

#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub title: String,
    pub h1: String,
    pub meta_description: String,
    pub raw_schema_blocks: Vec<String>,
    // False if any ld+json block on the page failed strict parsing.
    pub json_valid: bool,
    pub body_text: String,
    pub echo_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rating {
    High,
    Medium,
    Low,
    Error,
    Unrated,
}

impl Rating {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Rating::High,
            "medium" => Rating::Medium,
            "low" => Rating::Low,
            "error" => Rating::Error,
            _ => Rating::Unrated,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Rating::High => "High",
            Rating::Medium => "Medium",
            Rating::Low => "Low",
            Rating::Error => "Error",
            Rating::Unrated => "-",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AiOpinion {
    pub rating: Rating,
    pub writing_quality: String,
    pub rewrite_risk: String,
    pub schema_suggestion: String,
    pub critique: String,
}

impl AiOpinion {
    pub fn skipped() -> Self {
        Self {
            rating: Rating::Unrated,
            writing_quality: "-".to_string(),
            rewrite_risk: "-".to_string(),
            schema_suggestion: "-".to_string(),
            critique: "-".to_string(),
        }
    }

    // The failure text rides in the suggestion field.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            rating: Rating::Error,
            writing_quality: "Error".to_string(),
            rewrite_risk: "Error".to_string(),
            schema_suggestion: message.into(),
            critique: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deduction {
    pub label: String,
    pub penalty: u8,
}

impl Deduction {
    pub fn render(&self) -> String {
        format!("{} (-{})", self.label, self.penalty)
    }
}

#[derive(Debug, Clone)]
pub struct ScoreResult {
    pub score: u8,
    pub log: Vec<Deduction>,
}

#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub page_title: String,
    pub url: String,
    pub score: u8,
    pub log: Vec<Deduction>,
    pub title: String,
    pub h1: String,
    pub meta_description: String,
    pub json_valid: bool,
    pub schema_types: Vec<String>,
    pub echo_score: f64,
    pub opinion: AiOpinion,
    pub verify_url: String,
    pub error: Option<String>,
    pub audit_timestamp: String,
}

#[derive(Debug)]
pub enum AuditEvent {
    Record(Box<AuditRecord>),
    Status(String),
    Error(String),
    Finished,
}
