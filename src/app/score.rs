use super::types::{AiOpinion, Deduction, MISSING, PageSnapshot, Rating, ScoreResult};

const LOW_RELEVANCE_PENALTY: u8 = 25;
const ECHO_PENALTY_THRESHOLD: f64 = 85.0;
const TITLE_MIN_CHARS: usize = 10;
const TITLE_MAX_CHARS: usize = 70;

pub fn compute_score(snapshot: &PageSnapshot, opinion: &AiOpinion) -> ScoreResult {
    let mut log = Vec::new();

    if !snapshot.json_valid {
        log.push(Deduction {
            label: "Broken Schema Syntax".to_string(),
            penalty: 30,
        });
    }
    if snapshot.title == MISSING {
        log.push(Deduction {
            label: "Missing Title".to_string(),
            penalty: 20,
        });
    }
    if snapshot.meta_description == MISSING {
        log.push(Deduction {
            label: "Missing Meta Desc".to_string(),
            penalty: 20,
        });
    }
    if snapshot.h1 == MISSING {
        log.push(Deduction {
            label: "Missing H1".to_string(),
            penalty: 10,
        });
    }
    if snapshot.echo_score > ECHO_PENALTY_THRESHOLD {
        log.push(Deduction {
            label: "Auto-Generated Desc".to_string(),
            penalty: 15,
        });
    }
    if snapshot.title != MISSING {
        let title_len = snapshot.title.chars().count();
        if title_len < TITLE_MIN_CHARS || title_len > TITLE_MAX_CHARS {
            log.push(Deduction {
                label: format!("Bad Title Length ({title_len})"),
                penalty: 5,
            });
        }
    }

    // Error opinions are score-neutral: no AI-derived deduction may fire.
    if opinion.rating == Rating::Low {
        log.push(Deduction {
            label: "Low Content Relevance".to_string(),
            penalty: LOW_RELEVANCE_PENALTY,
        });
    }
    if opinion.rewrite_risk == "Likely Rewrite" {
        log.push(Deduction {
            label: "Vague Desc".to_string(),
            penalty: 10,
        });
    }
    if opinion.writing_quality == "Poor" {
        log.push(Deduction {
            label: "Poor Grammar".to_string(),
            penalty: 15,
        });
    }
    if suggestion_is_actionable(opinion) {
        log.push(Deduction {
            label: "Missing Specific Schema".to_string(),
            penalty: 10,
        });
    }

    let total = log.iter().map(|d| d.penalty as u16).sum::<u16>();
    ScoreResult {
        score: 100u16.saturating_sub(total) as u8,
        log,
    }
}

// Placeholders, "already optimal" answers and upstream error text (rating
// Error carries the failure message here) cost nothing.
fn suggestion_is_actionable(opinion: &AiOpinion) -> bool {
    if opinion.rating == Rating::Error {
        return false;
    }
    let suggestion = opinion.schema_suggestion.trim();
    if suggestion.is_empty() || suggestion == "-" || suggestion.eq_ignore_ascii_case("none") {
        return false;
    }
    let lowered = suggestion.to_ascii_lowercase();
    !(lowered.contains("optimal") || lowered.contains("already"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::extract::{ContentStrategy, extract_snapshot};

    fn clean_snapshot() -> PageSnapshot {
        PageSnapshot {
            title: "A perfectly sized page title".to_string(),
            h1: "A heading".to_string(),
            meta_description: "A handwritten description of the page.".to_string(),
            raw_schema_blocks: vec![r#"{"@type":"WebPage"}"#.to_string()],
            json_valid: true,
            body_text: "Completely different body content about something else.".to_string(),
            echo_score: 12.0,
        }
    }

    #[test]
    fn clean_page_with_ai_disabled_scores_100() {
        let result = compute_score(&clean_snapshot(), &AiOpinion::skipped());
        assert_eq!(result.score, 100);
        assert!(result.log.is_empty());
    }

    #[test]
    fn missing_title_page_scores_exactly_80() {
        let html = r#"<html><head>
<meta name="description" content="Answers to common cardiology questions, written by clinicians.">
<script type="application/ld+json">{"@type":"FAQPage"}</script>
</head><body>
<h1>Frequently Asked Questions</h1>
<div class="page-content-area">What does a cardiologist do? A cardiologist diagnoses and treats heart conditions.</div>
</body></html>"#;
        let snapshot = extract_snapshot(html, &ContentStrategy::default());
        let result = compute_score(&snapshot, &AiOpinion::skipped());
        assert_eq!(result.score, 80);
        assert_eq!(result.log.len(), 1);
        assert_eq!(result.log[0].render(), "Missing Title (-20)");
    }

    #[test]
    fn deductions_accumulate_and_clamp_at_zero() {
        let snapshot = PageSnapshot {
            title: MISSING.to_string(),
            h1: MISSING.to_string(),
            meta_description: MISSING.to_string(),
            raw_schema_blocks: Vec::new(),
            json_valid: false,
            body_text: String::new(),
            echo_score: 0.0,
        };
        let opinion = AiOpinion {
            rating: Rating::Low,
            writing_quality: "Poor".to_string(),
            rewrite_risk: "Likely Rewrite".to_string(),
            schema_suggestion: "MedicalWebPage".to_string(),
            critique: "Rewrite it.".to_string(),
        };
        let result = compute_score(&snapshot, &opinion);
        assert_eq!(result.score, 0);
        let total = result.log.iter().map(|d| d.penalty as u16).sum::<u16>();
        assert!(total > 100);
    }

    #[test]
    fn score_is_monotonic_as_triggers_are_added() {
        let mut snapshot = clean_snapshot();
        let baseline = compute_score(&snapshot, &AiOpinion::skipped()).score;

        snapshot.json_valid = false;
        let broken_schema = compute_score(&snapshot, &AiOpinion::skipped()).score;
        assert!(broken_schema < baseline);

        snapshot.meta_description = MISSING.to_string();
        let also_missing_meta = compute_score(&snapshot, &AiOpinion::skipped()).score;
        assert!(also_missing_meta < broken_schema);
    }

    #[test]
    fn error_rating_never_triggers_low_relevance() {
        let opinion = AiOpinion::error("upstream timeout");
        let result = compute_score(&clean_snapshot(), &opinion);
        assert_eq!(result.score, 100);
        assert!(
            !result
                .log
                .iter()
                .any(|d| d.label == "Low Content Relevance")
        );
    }

    #[test]
    fn error_suggestion_text_does_not_cost_schema_points() {
        // The failure message lands in schema_suggestion; it must not look
        // like a real suggestion to the scorer.
        let opinion = AiOpinion::error("403 from the model endpoint");
        let result = compute_score(&clean_snapshot(), &opinion);
        assert!(
            !result
                .log
                .iter()
                .any(|d| d.label == "Missing Specific Schema")
        );
    }

    #[test]
    fn optimal_or_placeholder_suggestions_are_free() {
        let mut opinion = AiOpinion::skipped();
        for suggestion in ["-", "", "None", "Schema already optimal"] {
            opinion.schema_suggestion = suggestion.to_string();
            let result = compute_score(&clean_snapshot(), &opinion);
            assert_eq!(result.score, 100, "suggestion {suggestion:?}");
        }
        opinion.schema_suggestion = "FAQPage".to_string();
        let result = compute_score(&clean_snapshot(), &opinion);
        assert_eq!(result.score, 90);
    }

    #[test]
    fn bad_title_length_logs_the_measured_length() {
        let mut snapshot = clean_snapshot();
        snapshot.title = "Short".to_string();
        let result = compute_score(&snapshot, &AiOpinion::skipped());
        assert_eq!(result.score, 95);
        assert_eq!(result.log[0].render(), "Bad Title Length (5) (-5)");
    }

    #[test]
    fn high_echo_flags_auto_generated_description() {
        let mut snapshot = clean_snapshot();
        snapshot.echo_score = 91.3;
        let result = compute_score(&snapshot, &AiOpinion::skipped());
        assert_eq!(result.score, 85);
        assert_eq!(result.log[0].label, "Auto-Generated Desc");
    }
}
