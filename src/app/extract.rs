use std::collections::BTreeSet;

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use super::types::{MISSING, PageSnapshot};

// Body characters beyond the description length the echo comparison sees.
const ECHO_PREFIX_SLACK: usize = 50;
// Bounds the quadratic LCS table against pathological descriptions.
const ECHO_MAX_DESCRIPTION_CHARS: usize = 4096;

#[derive(Debug, Clone)]
pub struct ContentStrategy {
    pub primary_selector: String,
}

impl Default for ContentStrategy {
    fn default() -> Self {
        Self {
            primary_selector: ".page-content-area".to_string(),
        }
    }
}

pub fn extract_snapshot(html: &str, strategy: &ContentStrategy) -> PageSnapshot {
    let doc = Html::parse_document(html);

    let title = first_element_text(&doc, "title");
    let h1 = first_element_text(&doc, "h1");
    let meta_description = extract_meta_description(&doc);
    let (raw_schema_blocks, json_valid) = extract_schema_blocks(&doc);
    let body_text = extract_body_text(&doc, strategy);
    let echo_score = echo_score(&meta_description, &body_text);

    PageSnapshot {
        title,
        h1,
        meta_description,
        raw_schema_blocks,
        json_valid,
        body_text,
        echo_score,
    }
}

fn first_element_text(doc: &Html, selector: &str) -> String {
    let selector = match Selector::parse(selector) {
        Ok(s) => s,
        Err(_) => return MISSING.to_string(),
    };

    match doc.select(&selector).next() {
        Some(el) => normalize_text(&el.text().collect::<Vec<_>>().join(" ")),
        None => MISSING.to_string(),
    }
}

fn extract_meta_description(doc: &Html) -> String {
    let selector = match Selector::parse("meta[name=\"description\"]") {
        Ok(s) => s,
        Err(_) => return MISSING.to_string(),
    };

    doc.select(&selector)
        .find_map(|el| el.value().attr("content"))
        .map(normalize_text)
        .filter(|content| !content.is_empty())
        .unwrap_or_else(|| MISSING.to_string())
}

// One unparseable block flips json_valid for the whole page without
// stopping extraction of the rest.
fn extract_schema_blocks(doc: &Html) -> (Vec<String>, bool) {
    let selector = match Selector::parse("script[type=\"application/ld+json\"]") {
        Ok(s) => s,
        Err(_) => return (Vec::new(), true),
    };

    let mut blocks = Vec::new();
    let mut json_valid = true;
    for el in doc.select(&selector) {
        let source = el.text().collect::<String>();
        if source.trim().is_empty() {
            continue;
        }
        if serde_json::from_str::<Value>(&source).is_ok() {
            blocks.push(source);
        } else {
            json_valid = false;
        }
    }

    (blocks, json_valid)
}

fn extract_body_text(doc: &Html, strategy: &ContentStrategy) -> String {
    if let Ok(selector) = Selector::parse(&strategy.primary_selector)
        && let Some(container) = doc.select(&selector).next()
    {
        return visible_text(container);
    }

    visible_text(doc.root_element())
}

fn visible_text(root: ElementRef) -> String {
    let mut out = String::new();
    collect_visible_text(root, &mut out);
    normalize_text(&out)
}

fn collect_visible_text(el: ElementRef, out: &mut String) {
    if matches!(el.value().name(), "script" | "style" | "nav" | "footer") {
        return;
    }
    for child in el.children() {
        match child.value() {
            scraper::Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            scraper::Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_visible_text(child_el, out);
                }
            }
            _ => {}
        }
    }
}

fn normalize_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

// Absent @type defaults to "Unknown"; non-object graph entries contribute
// nothing.
pub fn flatten_schema_types(blocks: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for block in blocks {
        let Ok(value) = serde_json::from_str::<Value>(block) else {
            continue;
        };
        let Some(obj) = value.as_object() else {
            continue;
        };
        if let Some(graph) = obj.get("@graph").and_then(Value::as_array) {
            for item in graph {
                if item.is_object() {
                    push_type_names(item.get("@type"), &mut out);
                }
            }
        } else {
            push_type_names(obj.get("@type"), &mut out);
        }
    }
    out
}

fn push_type_names(value: Option<&Value>, out: &mut Vec<String>) {
    match value {
        Some(Value::String(name)) => out.push(name.clone()),
        Some(Value::Array(items)) => {
            for item in items {
                match item {
                    Value::String(name) => out.push(name.clone()),
                    _ => out.push("Unknown".to_string()),
                }
            }
        }
        _ => out.push("Unknown".to_string()),
    }
}

pub fn schema_type_set(blocks: &[String]) -> Vec<String> {
    flatten_schema_types(blocks)
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// difflib-style ratio 2m/(a+b) over the leading body slice, scaled to 0..=100.
pub fn echo_score(meta_description: &str, body_text: &str) -> f64 {
    if meta_description == MISSING || body_text.trim().is_empty() {
        return 0.0;
    }

    let desc = meta_description
        .chars()
        .take(ECHO_MAX_DESCRIPTION_CHARS)
        .collect::<Vec<_>>();
    if desc.is_empty() {
        return 0.0;
    }
    let prefix = body_text
        .chars()
        .take(desc.len() + ECHO_PREFIX_SLACK)
        .collect::<Vec<_>>();

    let lcs = lcs_len(&desc, &prefix);
    let ratio = 2.0 * lcs as f64 / (desc.len() + prefix.len()) as f64;
    (ratio * 100.0).clamp(0.0, 100.0)
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
        curr[0] = 0;
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!doctype html>
<html>
<head>
  <title> Cardiology Department | Example Clinic </title>
  <meta name="description" content="Expert heart care for the whole family.">
  <script type="application/ld+json">{"@context":"https://schema.org","@type":"FAQPage"}</script>
  <script type="application/ld+json">{"@graph":[{"@type":"Physician"},{"@type":["MedicalWebPage","WebPage"]},{"name":"untyped"}]}</script>
</head>
<body>
  <nav>Home About Contact</nav>
  <h1>Cardiology Department</h1>
  <div class="page-content-area">Our cardiologists treat arrhythmia and heart failure.</div>
  <script>var tracked = true;</script>
  <footer>© Example Clinic</footer>
</body>
</html>"#;

    #[test]
    fn extracts_title_h1_and_meta() {
        let snapshot = extract_snapshot(PAGE, &ContentStrategy::default());
        assert_eq!(snapshot.title, "Cardiology Department | Example Clinic");
        assert_eq!(snapshot.h1, "Cardiology Department");
        assert_eq!(
            snapshot.meta_description,
            "Expert heart care for the whole family."
        );
        assert!(snapshot.json_valid);
        assert_eq!(snapshot.raw_schema_blocks.len(), 2);
    }

    #[test]
    fn missing_elements_use_sentinel() {
        let snapshot = extract_snapshot("<html><body><p>bare</p></body></html>", &ContentStrategy::default());
        assert_eq!(snapshot.title, MISSING);
        assert_eq!(snapshot.h1, MISSING);
        assert_eq!(snapshot.meta_description, MISSING);
        assert!(snapshot.raw_schema_blocks.is_empty());
        assert!(snapshot.json_valid);
    }

    #[test]
    fn empty_meta_content_counts_as_missing() {
        let html = r#"<html><head><meta name="description" content="  "></head><body></body></html>"#;
        let snapshot = extract_snapshot(html, &ContentStrategy::default());
        assert_eq!(snapshot.meta_description, MISSING);
    }

    #[test]
    fn one_bad_block_poisons_json_valid_but_keeps_the_rest() {
        let html = r#"<html><head>
<script type="application/ld+json">{"@type":"WebSite"}</script>
<script type="application/ld+json">{not json}</script>
</head><body></body></html>"#;
        let snapshot = extract_snapshot(html, &ContentStrategy::default());
        assert!(!snapshot.json_valid);
        assert_eq!(snapshot.raw_schema_blocks.len(), 1);
    }

    #[test]
    fn content_container_takes_priority_over_fallback() {
        let snapshot = extract_snapshot(PAGE, &ContentStrategy::default());
        assert_eq!(
            snapshot.body_text,
            "Our cardiologists treat arrhythmia and heart failure."
        );
    }

    #[test]
    fn fallback_strips_script_style_nav_footer() {
        let html = r#"<html><body>
<nav>menu items</nav>
<p>Actual content here.</p>
<script>ignored()</script>
<style>.x{}</style>
<footer>legal</footer>
</body></html>"#;
        let snapshot = extract_snapshot(html, &ContentStrategy::default());
        assert_eq!(snapshot.body_text, "Actual content here.");
    }

    #[test]
    fn flattens_graph_and_type_lists() {
        let snapshot = extract_snapshot(PAGE, &ContentStrategy::default());
        let flat = flatten_schema_types(&snapshot.raw_schema_blocks);
        assert_eq!(
            flat,
            vec!["FAQPage", "Physician", "MedicalWebPage", "WebPage", "Unknown"]
        );
        let set = schema_type_set(&snapshot.raw_schema_blocks);
        assert_eq!(
            set,
            vec!["FAQPage", "MedicalWebPage", "Physician", "Unknown", "WebPage"]
        );
    }

    #[test]
    fn set_ification_is_idempotent() {
        let blocks = vec![
            r#"{"@type":["WebPage","WebPage"]}"#.to_string(),
            r#"{"@type":"WebPage"}"#.to_string(),
        ];
        let once = schema_type_set(&blocks);
        let again = once
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        assert_eq!(once, again);
        assert_eq!(once, vec!["WebPage"]);
    }

    #[test]
    fn echo_is_zero_for_missing_description_or_empty_body() {
        assert_eq!(echo_score(MISSING, "plenty of body text"), 0.0);
        assert_eq!(echo_score("a real description", ""), 0.0);
        assert_eq!(echo_score("a real description", "   "), 0.0);
    }

    #[test]
    fn echo_is_bounded_and_rises_with_duplication() {
        let body = "Expert heart care for the whole family. And much more follows here.";
        let copied = echo_score("Expert heart care for the whole family.", body);
        let unrelated = echo_score("Completely different wording about topic X.", body);
        assert!(copied > unrelated);
        assert!((0.0..=100.0).contains(&copied));
        assert!((0.0..=100.0).contains(&unrelated));
    }

    #[test]
    fn overlong_descriptions_compare_through_the_cap() {
        let desc = "x".repeat(ECHO_MAX_DESCRIPTION_CHARS + 1000);
        let body = "x".repeat(ECHO_MAX_DESCRIPTION_CHARS + 2000);
        let capped = ECHO_MAX_DESCRIPTION_CHARS as f64;
        let expected = 2.0 * capped / (capped + capped + ECHO_PREFIX_SLACK as f64) * 100.0;
        let got = echo_score(&desc, &body);
        assert!((got - expected).abs() < 1e-9);
    }

    #[test]
    fn echo_tracks_verbatim_boilerplate_closely() {
        // Description equal to the body start: lcs == desc length, ratio is
        // 2d / (2d + slack).
        let desc = "x".repeat(200);
        let body = "x".repeat(400);
        let expected = 2.0 * 200.0 / (200.0 + 250.0) * 100.0;
        let got = echo_score(&desc, &body);
        assert!((got - expected).abs() < 1e-9);
    }
}
