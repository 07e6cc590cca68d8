//! Generation results as they move through a run.
//!
//! A `GenerationResult` is the raw, untrusted payload a stage produced. It only
//! becomes an `AcceptedResult` once every guardrail registered for its stage has
//! passed (see `guardrails::accept`). The site stage input, the cache and the
//! artifact sink all take `AcceptedResult`, so unvalidated content cannot
//! reach them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::pipeline::StepId;

/// One of the two top-level pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Resume review and revision.
    Document,
    /// Static personal website generated from the accepted resume.
    Site,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Document => f.write_str("document"),
            Stage::Site => f.write_str("site"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    Passed,
    Rejected,
}

/// Which run and which step produced a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub run_id: Uuid,
    pub stage: Stage,
    pub step: StepId,
    pub produced_at: DateTime<Utc>,
}

/// A stage's raw output, owned by the stage until it is validated.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub stage: Stage,
    pub payload: Value,
    pub provenance: Provenance,
    pub status: ValidationStatus,
}

impl GenerationResult {
    pub fn new(payload: Value, provenance: Provenance) -> Self {
        Self {
            stage: provenance.stage,
            payload,
            provenance,
            status: ValidationStatus::Pending,
        }
    }

    /// String field of the payload, if present and a string.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(Value::as_str)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Typed payloads
// ────────────────────────────────────────────────────────────────────────────

/// Document stage payload after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResumeRevision {
    pub final_resume_text: String,
    pub feedback_items: Vec<Value>,
    #[serde(default)]
    pub applied_user_updates: Vec<String>,
    #[serde(default)]
    pub skipped_user_updates: Vec<String>,
}

/// Site stage payload after validation. `html` references `styles.css` and `script.js`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteBundle {
    pub title: String,
    pub html: String,
    pub css: String,
    pub js: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "payload", rename_all = "snake_case")]
pub enum AcceptedPayload {
    Document(ResumeRevision),
    Site(SiteBundle),
}

/// A result that passed every guardrail for its stage.
///
/// Only `guardrails::accept` constructs one from fresh output; the cache
/// deserializes them back because it only ever stores accepted results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedResult {
    payload: AcceptedPayload,
    provenance: Provenance,
}

impl AcceptedResult {
    pub(crate) fn from_validated(payload: AcceptedPayload, provenance: Provenance) -> Self {
        Self {
            payload,
            provenance,
        }
    }

    pub fn stage(&self) -> Stage {
        match self.payload {
            AcceptedPayload::Document(_) => Stage::Document,
            AcceptedPayload::Site(_) => Stage::Site,
        }
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn payload(&self) -> &AcceptedPayload {
        &self.payload
    }

    pub fn as_revision(&self) -> Option<&ResumeRevision> {
        match &self.payload {
            AcceptedPayload::Document(revision) => Some(revision),
            AcceptedPayload::Site(_) => None,
        }
    }

    pub fn as_site(&self) -> Option<&SiteBundle> {
        match &self.payload {
            AcceptedPayload::Site(site) => Some(site),
            AcceptedPayload::Document(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provenance(stage: Stage) -> Provenance {
        Provenance {
            run_id: Uuid::new_v4(),
            stage,
            step: StepId::from("revise_resume"),
            produced_at: Utc::now(),
        }
    }

    #[test]
    fn test_new_result_is_pending() {
        let result = GenerationResult::new(json!({"title": "x"}), provenance(Stage::Site));
        assert_eq!(result.status, ValidationStatus::Pending);
        assert_eq!(result.stage, Stage::Site);
        assert_eq!(result.str_field("title"), Some("x"));
        assert_eq!(result.str_field("missing"), None);
    }

    #[test]
    fn test_revision_rejects_unknown_fields() {
        let raw = json!({
            "final_resume_text": "text",
            "feedback_items": [],
            "updated_pdf_path": "/tmp/x.pdf"
        });
        assert!(serde_json::from_value::<ResumeRevision>(raw).is_err());
    }

    #[test]
    fn test_accepted_result_survives_cache_serialization() {
        let accepted = AcceptedResult::from_validated(
            AcceptedPayload::Site(SiteBundle {
                title: "Jane Doe".to_string(),
                html: "<html></html>".to_string(),
                css: "body{}".to_string(),
                js: "void 0;".to_string(),
            }),
            provenance(Stage::Site),
        );
        let text = serde_json::to_string(&accepted).unwrap();
        let back: AcceptedResult = serde_json::from_str(&text).unwrap();
        assert_eq!(back, accepted);
        assert_eq!(back.stage(), Stage::Site);
        assert!(back.as_revision().is_none());
    }
}
