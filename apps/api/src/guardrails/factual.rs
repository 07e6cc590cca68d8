//! Factual-integrity guardrail: generated content may not introduce facts the
//! vetted text does not contain.
//!
//! Claims are extracted from the generated text and checked against the ground truth:
//! - numeric claims (years, dates, metrics, money, percentages, multipliers),
//!   supported when the same value with the same unit class appears in the
//!   ground truth, so "40x" is not backed by "40%";
//! - technical terms and acronyms (`AWS`, `C++`, `Node.js`);
//! - capitalized phrases (employers, certifications, products), e.g.
//!   "Certified Solutions Architect". The first word of a line or sentence is
//!   a claim too, unless the ground truth contains it or it is a common
//!   sentence starter ("Led", "Built", "The").
//!
//! Term and phrase claims are supported when every token they contain occurs
//! in the ground truth (or is on the allowlist of website chrome words).

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::guardrails::text::{token_set, visible_text_from_html, word_tokens};
use crate::guardrails::{Guardrail, GuardrailSettings, ValidationContext, ValidationOutcome, Violation};
use crate::models::{GenerationResult, Stage};

static NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[$€£]?\d[\d,]*(?:\.\d+)?(?:\s?%|[kKmMbBx]\b|\+)?").expect("numeric regex is valid")
});
static TERM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:[A-Za-z][A-Za-z0-9]*(?:\+\+|#|(?:\.[A-Za-z][A-Za-z0-9]*)+)|[A-Z][A-Z0-9]+\b)")
        .expect("term regex is valid")
});
static SEGMENT_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[\n.!?;:|•·()\[\]{}"]+|\s[-–—/]+\s"#).expect("segment regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    Numeric,
    Term,
    Phrase,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    pub text: String,
    pub kind: ClaimKind,
}

/// What a number measures. Plain counts and years only match plain numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NumericUnit {
    Plain,
    Percent,
    Multiplier,
    /// k, m or b suffix, lowercased.
    Magnitude(char),
}

/// A numeric claim's identity: currency symbol, digits and unit class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NumericKey {
    currency: Option<char>,
    value: String,
    unit: NumericUnit,
}

pub struct FactualIntegrityGuardrail;

impl Guardrail for FactualIntegrityGuardrail {
    fn name(&self) -> &'static str {
        "factual_integrity"
    }

    fn applies_to(&self, _stage: Stage) -> bool {
        true
    }

    fn validate(&self, result: &GenerationResult, ctx: &ValidationContext<'_>) -> ValidationOutcome {
        let checked = match result.stage {
            Stage::Document => result.str_field("final_resume_text").unwrap_or_default().to_string(),
            Stage::Site => {
                let title = result.str_field("title").unwrap_or_default();
                let visible = visible_text_from_html(result.str_field("html").unwrap_or_default());
                format!("{title}\n{visible}")
            }
        };

        let violations = unsupported_claims(&checked, ctx.ground_truth, ctx.settings)
            .into_iter()
            .map(|claim| Violation::FactualDrift {
                claim: claim.text,
                claim_kind: claim.kind,
            })
            .collect();

        ValidationOutcome::from_violations(self.name(), violations)
    }
}

/// Claims in `generated` that `ground_truth` does not support, in order of first appearance.
pub fn unsupported_claims(generated: &str, ground_truth: &str, settings: &GuardrailSettings) -> Vec<Claim> {
    let source_tokens = token_set(ground_truth);
    let mut known = source_tokens.clone();
    known.extend(settings.allowed_terms.iter().map(|t| t.to_lowercase()));
    let starters: HashSet<String> = settings.sentence_starters.iter().map(|t| t.to_lowercase()).collect();
    let known_numbers: HashSet<NumericKey> = NUMERIC
        .find_iter(ground_truth)
        .map(|m| numeric_key(m.as_str()))
        .collect();

    let opener_is_claim = |word: &str| {
        let lower = word.to_lowercase();
        !known.contains(&lower) && !starters.contains(&lower)
    };

    let mut seen = HashSet::new();
    extract_claims(generated, opener_is_claim)
        .into_iter()
        .filter(|claim| seen.insert(claim.text.to_lowercase()))
        .filter(|claim| match claim.kind {
            ClaimKind::Numeric => !known_numbers.contains(&numeric_key(&claim.text)),
            ClaimKind::Term | ClaimKind::Phrase => {
                !word_tokens(&claim.text).iter().all(|t| known.contains(t))
            }
        })
        .collect()
}

/// Every claim in `text`. `opener_is_claim` decides whether a capitalized
/// first word of a line or sentence starts a phrase claim.
pub fn extract_claims(text: &str, opener_is_claim: impl Fn(&str) -> bool) -> Vec<Claim> {
    let mut claims: Vec<Claim> = NUMERIC
        .find_iter(text)
        .map(|m| Claim {
            text: m.as_str().trim().to_string(),
            kind: ClaimKind::Numeric,
        })
        .collect();

    claims.extend(TERM.find_iter(text).map(|m| Claim {
        text: m.as_str().to_string(),
        kind: ClaimKind::Term,
    }));

    for segment in SEGMENT_BREAK.split(text) {
        claims.extend(capitalized_runs(segment, &opener_is_claim).into_iter().map(|run| Claim {
            text: run,
            kind: ClaimKind::Phrase,
        }));
    }

    claims
}

/// "$5M" → ($, "5", m), "40 %" → (none, "40", percent), "$50,000" → ($, "50000", plain).
/// A trailing "+" ("5+ years") counts as plain.
fn numeric_key(raw: &str) -> NumericKey {
    let raw = raw.trim();
    let currency = raw.chars().next().filter(|c| matches!(c, '$' | '€' | '£'));
    let unit = match raw.chars().last() {
        Some('%') => NumericUnit::Percent,
        Some('x') => NumericUnit::Multiplier,
        Some(c @ ('k' | 'K' | 'm' | 'M' | 'b' | 'B')) => NumericUnit::Magnitude(c.to_ascii_lowercase()),
        _ => NumericUnit::Plain,
    };
    let value = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect::<String>()
        .trim_end_matches('.')
        .to_string();
    NumericKey { currency, value, unit }
}

/// Runs of capitalized words. The segment's first word joins a run only when
/// `opener_is_claim` says so, since sentence case capitalizes it anyway.
fn capitalized_runs(segment: &str, opener_is_claim: &impl Fn(&str) -> bool) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    let words = segment
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '+' && c != '#'))
        .filter(|w| !w.is_empty());

    for (position, word) in words.enumerate() {
        let capitalized = word.chars().next().is_some_and(|c| c.is_uppercase()) && word.len() > 1;
        if capitalized && (position > 0 || opener_is_claim(word)) {
            current.push(word);
        } else if !current.is_empty() {
            runs.push(current.join(" "));
            current.clear();
        }
    }
    if !current.is_empty() {
        runs.push(current.join(" "));
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrails::test_support::{result, SOURCE_RESUME};
    use serde_json::json;

    fn drift_claims(generated: &str) -> Vec<String> {
        unsupported_claims(generated, SOURCE_RESUME, &GuardrailSettings::default())
            .into_iter()
            .map(|c| c.text)
            .collect()
    }

    #[test]
    fn test_rephrased_content_is_supported() {
        let revised = "Led the Kubernetes migration for billing at Acme Corp, \
            reducing deploy time 40%. Built a Rust pipeline on AWS handling 2M events daily.";
        assert!(drift_claims(revised).is_empty(), "{:?}", drift_claims(revised));
    }

    #[test]
    fn test_sentence_initial_verbs_are_not_claims() {
        let revised = "Mentored 5 engineers. Introduced code review guidelines.\n- Built services";
        assert!(drift_claims(revised).is_empty());
    }

    #[test]
    fn test_new_certification_is_flagged() {
        let revised = "Skills: Rust, Go\n- Earned AWS Certified Solutions Architect credential";
        let claims = drift_claims(revised);
        assert_eq!(claims, vec!["AWS Certified Solutions Architect"]);
    }

    #[test]
    fn test_new_employer_and_metric_are_flagged() {
        let revised = "Staff engineer at Globex Industries, grew revenue by 300%.";
        let claims = drift_claims(revised);
        assert!(claims.contains(&"Globex Industries".to_string()));
        assert!(claims.contains(&"300%".to_string()));
    }

    #[test]
    fn test_new_technical_terms_are_flagged() {
        let claims = drift_claims("Wrote services in Rust and Node.js with GCP");
        assert!(claims.contains(&"Node.js".to_string()));
        assert!(claims.contains(&"GCP".to_string()));
        assert!(!claims.contains(&"Rust".to_string()));
    }

    #[test]
    fn test_invented_employer_opening_a_line_is_flagged() {
        let revised = "Senior Software Engineer\nGlobex (2019 - 2024)\n- Microsoft certified engineer";
        assert_eq!(drift_claims(revised), vec!["Globex", "Microsoft"]);
    }

    #[test]
    fn test_unknown_opener_can_be_allowed_as_starter() {
        let mut settings = GuardrailSettings::default();
        settings.sentence_starters.push("globex".into());
        let claims = unsupported_claims("Globex (2019 - 2024)", SOURCE_RESUME, &settings);
        assert!(claims.is_empty(), "{claims:?}");
    }

    #[test]
    fn test_numbers_with_a_different_unit_are_flagged() {
        let revised = "- Cut deploy time by 40x and served 2B users, $5M revenue.";
        assert_eq!(drift_claims(revised), vec!["40x", "2B", "$5M"]);
    }

    #[test]
    fn test_numbers_with_the_source_unit_are_supported() {
        let revised = "Mentored 5 engineers, cut deploy time by 40 % and processed 2m events.";
        assert!(drift_claims(revised).is_empty(), "{:?}", drift_claims(revised));
    }

    #[test]
    fn test_numeric_key_separates_unit_classes() {
        let money = numeric_key("$50,000");
        assert_eq!(money.currency, Some('$'));
        assert_eq!(money.value, "50000");
        assert_eq!(money.unit, NumericUnit::Plain);

        assert_eq!(numeric_key("40 %").unit, NumericUnit::Percent);
        assert_eq!(numeric_key("3.5x").unit, NumericUnit::Multiplier);
        assert_eq!(numeric_key("2M").unit, NumericUnit::Magnitude('m'));
        assert_eq!(numeric_key("5+"), numeric_key("5"));
        assert_ne!(numeric_key("40%"), numeric_key("40"));
        assert_ne!(numeric_key("$5M"), numeric_key("5M"));
    }

    #[test]
    fn test_site_chrome_words_are_allowed() {
        let settings = GuardrailSettings::default();
        let ctx = ValidationContext {
            ground_truth: SOURCE_RESUME,
            settings: &settings,
        };
        let site = result(
            Stage::Site,
            json!({
                "title": "Jane Doe",
                "html": "<nav><a>About</a> <a>Contact</a></nav><main><h2>Jane Doe</h2>\
                         <p>Engineer at Acme Corp building Rust services on Kubernetes</p></main>",
                "css": "",
                "js": ""
            }),
        );
        let outcome = FactualIntegrityGuardrail.validate(&site, &ctx);
        assert!(outcome.passed, "{:?}", outcome.violations);
    }

    #[test]
    fn test_site_invented_award_fails() {
        let settings = GuardrailSettings::default();
        let ctx = ValidationContext {
            ground_truth: SOURCE_RESUME,
            settings: &settings,
        };
        let site = result(
            Stage::Site,
            json!({
                "title": "Jane Doe",
                "html": "<p>Jane won the Turing Award in 2023</p><script>var Hidden = 'X';</script>",
                "css": "",
                "js": ""
            }),
        );
        let outcome = FactualIntegrityGuardrail.validate(&site, &ctx);
        assert!(!outcome.passed);
        let claims: Vec<_> = outcome
            .violations
            .iter()
            .filter_map(|v| match v {
                Violation::FactualDrift { claim, .. } => Some(claim.as_str()),
                _ => None,
            })
            .collect();
        assert!(claims.contains(&"Turing Award"));
        assert!(claims.contains(&"2023"));
        assert!(!claims.iter().any(|c| c.contains("Hidden")));
    }
}
