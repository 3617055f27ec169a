//! Deterministic rule engine (spec §4.3).
//!
//! Rules are evaluated in declaration order; the first rule whose full
//! predicate matches wins. A pure, side-effect-free evaluator operating on
//! a lightweight view of the file keeps this independently testable, the
//! same discipline the teacher's expression evaluator follows even though
//! the predicate shape here is much simpler (glob + size bounds + keyword
//! hit, not a boolean expression DSL).

use regex::Regex;

use crate::config::RuleDef;
use crate::model::{Classification, ClassificationSource, FileRecord};

/// The subset of a FileRecord the rule engine actually needs, so the
/// matching logic can be unit tested without constructing a full
/// FileRecord.
pub struct RuleView<'a> {
    pub base_name: &'a str,
    pub excerpt: Option<&'a str>,
    pub size_bytes: u64,
}

impl<'a> From<&'a FileRecord> for RuleView<'a> {
    fn from(record: &'a FileRecord) -> Self {
        RuleView {
            base_name: record
                .path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(""),
            excerpt: record.excerpt.as_deref(),
            size_bytes: record.size_bytes,
        }
    }
}

/// Translates a brace-expandable glob (`*.{jpg,jpeg,png}`) into a
/// case-insensitive regex. Supports `*` (any run of characters) and a
/// single top-level `{a,b,c}` alternation; both are all §4.3 requires.
fn glob_to_regex(glob: &str) -> Option<Regex> {
    let expanded = expand_braces(glob);
    let alternatives: Vec<String> = expanded
        .iter()
        .map(|pattern| {
            let mut out = String::from("(?i)^");
            for ch in pattern.chars() {
                match ch {
                    '*' => out.push_str(".*"),
                    '?' => out.push('.'),
                    c if is_regex_meta(c) => {
                        out.push('\\');
                        out.push(c);
                    }
                    c => out.push(c),
                }
            }
            out.push('$');
            out
        })
        .collect();

    let combined = format!("(?:{})", alternatives.join(")|(?:"));
    Regex::new(&combined).ok()
}

fn is_regex_meta(c: char) -> bool {
    matches!(
        c,
        '.' | '^' | '$' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\'
    )
}

fn expand_braces(glob: &str) -> Vec<String> {
    if let (Some(start), Some(end)) = (glob.find('{'), glob.find('}')) {
        if start < end {
            let prefix = &glob[..start];
            let suffix = &glob[end + 1..];
            return glob[start + 1..end]
                .split(',')
                .map(|alt| format!("{prefix}{alt}{suffix}"))
                .collect();
        }
    }
    vec![glob.to_string()]
}

fn size_in_bounds(size: u64, min: Option<u64>, max: Option<u64>) -> bool {
    if let Some(min) = min {
        if size < min {
            return false;
        }
    }
    if let Some(max) = max {
        if size > max {
            return false;
        }
    }
    true
}

fn keyword_hit(keywords: &[String], base_name: &str, excerpt: Option<&str>) -> bool {
    if keywords.is_empty() {
        return true;
    }
    let haystack = match excerpt {
        Some(e) => format!("{base_name} {e}").to_lowercase(),
        None => base_name.to_lowercase(),
    };
    keywords
        .iter()
        .any(|kw| haystack.contains(&kw.to_lowercase()))
}

/// Attempts to match `rules` in order against `view`, returning the first
/// full match as a Classification, or `None` if no rule matches.
pub fn classify(rules: &[RuleDef], view: &RuleView<'_>) -> Option<Classification> {
    for rule in rules {
        let Some(glob_re) = glob_to_regex(&rule.glob) else {
            continue;
        };
        if !glob_re.is_match(view.base_name) {
            continue;
        }
        if !size_in_bounds(view.size_bytes, rule.min_size_bytes, rule.max_size_bytes) {
            continue;
        }
        if !keyword_hit(&rule.keywords, view.base_name, view.excerpt) {
            continue;
        }

        let category = crate::model::Category::parse(&rule.category)?;
        let subject = sanitized_subject(view.base_name);
        let year = year_token(view.base_name).unwrap_or(0);
        let suggested_name = format!(
            "{}-00-00__{}__{}",
            if year != 0 { year.to_string() } else { "0000".to_string() },
            rule.category,
            subject
        );

        return Some(Classification {
            category,
            subcategory: rule.subcategory.clone(),
            subject,
            year,
            suggested_name,
            confidence: rule.confidence,
            rationale: format!("matched rule `{}`", rule.id),
            source: ClassificationSource::Rule(rule.id.clone()),
        });
    }
    None
}

fn sanitized_subject(base_name: &str) -> String {
    let stem = base_name.rsplit_once('.').map(|(s, _)| s).unwrap_or(base_name);
    stem.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Looks for a four-digit year token (1900-2100-ish range) in a base name.
fn year_token(base_name: &str) -> Option<i32> {
    let digits: Vec<char> = base_name.chars().collect();
    for window in digits.windows(4) {
        if window.iter().all(|c| c.is_ascii_digit()) {
            let value: i32 = window.iter().collect::<String>().parse().ok()?;
            if (1900..=2100).contains(&value) {
                return Some(value);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str, glob: &str, keywords: &[&str], category: &str, confidence: u8) -> RuleDef {
        RuleDef {
            id: id.to_string(),
            glob: glob.to_string(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            min_size_bytes: None,
            max_size_bytes: None,
            category: category.to_string(),
            subcategory: String::new(),
            confidence,
        }
    }

    #[test]
    fn glob_brace_expansion_matches_any_listed_extension() {
        let rules = vec![rule("images", "*.{jpg,jpeg,png}", &[], "05_Pessoal", 95)];
        let view = RuleView {
            base_name: "IMG_0001.jpg",
            excerpt: None,
            size_bytes: 2 * 1024 * 1024,
        };
        let result = classify(&rules, &view).expect("rule should match");
        assert_eq!(result.category, crate::model::Category::Pessoal);
        assert_eq!(result.confidence, 95);
    }

    #[test]
    fn keyword_match_is_case_insensitive_and_checks_excerpt() {
        let rules = vec![rule("finance_invoices", "*.pdf", &["fatura"], "02_Financas", 90)];
        let view = RuleView {
            base_name: "invoice_2024.pdf",
            excerpt: Some("Numero da FATURA: 123"),
            size_bytes: 5000,
        };
        let result = classify(&rules, &view).expect("rule should match");
        assert_eq!(result.category, crate::model::Category::Financas);
    }

    #[test]
    fn first_matching_rule_wins_over_later_ones() {
        let rules = vec![
            rule("a", "*.txt", &[], "01_Trabalho", 80),
            rule("b", "*.txt", &[], "03_Estudos", 99),
        ];
        let view = RuleView {
            base_name: "notes.txt",
            excerpt: None,
            size_bytes: 100,
        };
        let result = classify(&rules, &view).unwrap();
        assert_eq!(result.source, ClassificationSource::Rule("a".into()));
    }

    #[test]
    fn no_rule_matches_yields_none() {
        let rules = vec![rule("images", "*.jpg", &[], "05_Pessoal", 95)];
        let view = RuleView {
            base_name: "document.pdf",
            excerpt: None,
            size_bytes: 100,
        };
        assert!(classify(&rules, &view).is_none());
    }

    #[test]
    fn year_token_extracted_from_base_name() {
        assert_eq!(year_token("invoice_2024.pdf"), Some(2024));
        assert_eq!(year_token("notes.txt"), None);
    }

    #[test]
    fn size_bounds_reject_out_of_range_files() {
        let mut r = rule("small_logs", "*.log", &[], "01_Trabalho", 60);
        r.max_size_bytes = Some(1000);
        let view = RuleView {
            base_name: "big.log",
            excerpt: None,
            size_bytes: 5000,
        };
        assert!(classify(&[r], &view).is_none());
    }
}
