//! Guardrails: independent checks a stage's output must pass before it is trusted.
//!
//! Every guardrail registered for a stage runs, even after one has failed, so a
//! rejected run reports every violation at once. A stage is accepted only when
//! all outcomes pass; `accept` is the single place that turns a
//! `GenerationResult` into an `AcceptedResult`.

pub mod factual;
pub mod overlap;
pub mod schema;
pub mod text;

use serde::{Deserialize, Serialize};

use crate::models::{
    AcceptedPayload, AcceptedResult, GenerationResult, ResumeRevision, SiteBundle, Stage,
    ValidationStatus,
};

pub use factual::{ClaimKind, FactualIntegrityGuardrail};
pub use overlap::ContentOverlapGuardrail;
pub use schema::SchemaGuardrail;

/// Website chrome that may appear on a generated site without being a claim.
const DEFAULT_ALLOWED_TERMS: &[&str] = &[
    "about", "contact", "experience", "education", "skills", "projects", "project", "summary",
    "profile", "certifications", "certification", "home", "resume", "portfolio", "email",
    "phone", "linkedin", "github", "download", "menu", "skip", "content", "main", "navigation",
    "toggle", "theme", "dark", "light", "work", "highlights", "languages", "interests",
    "present", "current", "back", "top", "view", "more", "open", "close", "professional",
];

/// Words that commonly open a resume line or sentence without naming anything.
/// Any other capitalized opener missing from the ground truth is a claim.
const DEFAULT_SENTENCE_STARTERS: &[&str] = &[
    "a", "an", "the", "i", "my", "we", "our", "he", "she", "they", "this", "that", "these",
    "in", "on", "at", "for", "with", "by", "from", "to", "and", "but", "or", "as", "also",
    "over", "under", "during", "while", "when", "after", "before", "since", "including",
    "currently", "previously", "led", "built", "earned", "wrote", "designed", "developed",
    "created", "managed", "delivered", "launched", "implemented", "improved", "increased",
    "reduced", "drove", "owned", "shipped", "architected", "spearheaded", "mentored",
    "introduced", "migrated", "automated", "optimized", "collaborated", "coordinated",
    "established", "maintained", "partnered", "streamlined", "scaled", "grew", "cut",
    "achieved", "completed", "supported", "contributed", "worked", "served", "responsible",
    "received", "used", "applied", "tightened", "highlights", "summary",
];

// ────────────────────────────────────────────────────────────────────────────
// Outcome types
// ────────────────────────────────────────────────────────────────────────────

/// A single guardrail finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    SchemaViolation { field: String, reason: String },
    FactualDrift { claim: String, claim_kind: ClaimKind },
    InsufficientOverlap { ratio: f64, threshold: f64 },
}

impl Violation {
    pub fn describe(&self) -> String {
        match self {
            Violation::SchemaViolation { field, reason } => {
                format!("schema violation at `{field}`: {reason}")
            }
            Violation::FactualDrift { claim, .. } => {
                format!("unsupported claim not found in source: \"{claim}\"")
            }
            Violation::InsufficientOverlap { ratio, threshold } => format!(
                "generated content overlaps the reviewed resume by {:.0}% (minimum {:.0}%)",
                ratio * 100.0,
                threshold * 100.0
            ),
        }
    }
}

/// Result of one guardrail on one stage output. Never persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub validator: String,
    pub passed: bool,
    pub violations: Vec<Violation>,
}

impl ValidationOutcome {
    pub fn from_violations(validator: &str, violations: Vec<Violation>) -> Self {
        Self {
            validator: validator.to_string(),
            passed: violations.is_empty(),
            violations,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Settings and context
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct GuardrailSettings {
    /// Minimum share of site tokens that must come from the accepted resume.
    pub min_content_overlap: f64,
    /// Minimum length of the revised resume text, in characters.
    pub min_resume_chars: usize,
    /// Minimum share of alphabetic characters in the revised resume text.
    pub min_alpha_ratio: f64,
    /// Lowercase tokens never treated as factual claims.
    pub allowed_terms: Vec<String>,
    /// Lowercase words that may open a line or sentence without being a claim.
    pub sentence_starters: Vec<String>,
}

impl Default for GuardrailSettings {
    fn default() -> Self {
        Self {
            min_content_overlap: 0.7,
            min_resume_chars: 200,
            min_alpha_ratio: 0.4,
            allowed_terms: DEFAULT_ALLOWED_TERMS.iter().map(|s| s.to_string()).collect(),
            sentence_starters: DEFAULT_SENTENCE_STARTERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// What a guardrail checks a result against.
pub struct ValidationContext<'a> {
    /// The vetted text every fact must come from: the source document for the
    /// document stage, the accepted revision for the site stage.
    pub ground_truth: &'a str,
    pub settings: &'a GuardrailSettings,
}

/// The capability every guardrail exposes.
pub trait Guardrail: Send + Sync {
    fn name(&self) -> &'static str;

    fn applies_to(&self, stage: Stage) -> bool;

    fn validate(&self, result: &GenerationResult, ctx: &ValidationContext<'_>) -> ValidationOutcome;
}

/// The guardrails registered per stage.
pub struct GuardrailSet {
    guardrails: Vec<Box<dyn Guardrail>>,
}

impl GuardrailSet {
    pub fn new(guardrails: Vec<Box<dyn Guardrail>>) -> Self {
        Self { guardrails }
    }

    /// Schema + factual integrity on both stages, content overlap on the site stage.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(SchemaGuardrail),
            Box::new(FactualIntegrityGuardrail),
            Box::new(ContentOverlapGuardrail),
        ])
    }

    pub fn names_for(&self, stage: Stage) -> Vec<&'static str> {
        self.guardrails
            .iter()
            .filter(|g| g.applies_to(stage))
            .map(|g| g.name())
            .collect()
    }

    /// Runs every guardrail for the result's stage. Never short-circuits.
    pub fn run(&self, result: &GenerationResult, ctx: &ValidationContext<'_>) -> Vec<ValidationOutcome> {
        self.guardrails
            .iter()
            .filter(|g| g.applies_to(result.stage))
            .map(|g| g.validate(result, ctx))
            .collect()
    }
}

/// Promotes a result to `AcceptedResult` when every outcome passed.
/// Otherwise returns the failed outcomes.
pub fn accept(
    mut result: GenerationResult,
    outcomes: Vec<ValidationOutcome>,
) -> Result<AcceptedResult, Vec<ValidationOutcome>> {
    if outcomes.iter().any(|o| !o.passed) {
        result.status = ValidationStatus::Rejected;
        return Err(outcomes.into_iter().filter(|o| !o.passed).collect());
    }

    let typed = match result.stage {
        Stage::Document => {
            serde_json::from_value::<ResumeRevision>(result.payload.clone()).map(AcceptedPayload::Document)
        }
        Stage::Site => serde_json::from_value::<SiteBundle>(result.payload.clone()).map(AcceptedPayload::Site),
    };

    match typed {
        Ok(payload) => {
            result.status = ValidationStatus::Passed;
            Ok(AcceptedResult::from_validated(payload, result.provenance))
        }
        Err(e) => Err(vec![ValidationOutcome::from_violations(
            SchemaGuardrail.name(),
            vec![Violation::SchemaViolation {
                field: "$".to_string(),
                reason: format!("payload does not match the {} shape: {e}", result.stage),
            }],
        )]),
    }
}
