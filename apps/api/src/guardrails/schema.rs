//! Schema guardrail: structural shape of each stage's payload.

use serde_json::{Map, Value};

use crate::guardrails::{Guardrail, ValidationContext, ValidationOutcome, Violation};
use crate::models::{GenerationResult, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    NonEmptyString,
    NonEmptyObjectArray,
    StringArray,
}

struct FieldSpec {
    name: &'static str,
    kind: FieldKind,
    required: bool,
}

const DOCUMENT_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "final_resume_text",
        kind: FieldKind::NonEmptyString,
        required: true,
    },
    FieldSpec {
        name: "feedback_items",
        kind: FieldKind::NonEmptyObjectArray,
        required: true,
    },
    FieldSpec {
        name: "applied_user_updates",
        kind: FieldKind::StringArray,
        required: false,
    },
    FieldSpec {
        name: "skipped_user_updates",
        kind: FieldKind::StringArray,
        required: false,
    },
];

const SITE_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "title",
        kind: FieldKind::NonEmptyString,
        required: true,
    },
    FieldSpec {
        name: "html",
        kind: FieldKind::NonEmptyString,
        required: true,
    },
    FieldSpec {
        name: "css",
        kind: FieldKind::NonEmptyString,
        required: true,
    },
    FieldSpec {
        name: "js",
        kind: FieldKind::NonEmptyString,
        required: true,
    },
];

pub struct SchemaGuardrail;

impl Guardrail for SchemaGuardrail {
    fn name(&self) -> &'static str {
        "schema"
    }

    fn applies_to(&self, _stage: Stage) -> bool {
        true
    }

    fn validate(&self, result: &GenerationResult, ctx: &ValidationContext<'_>) -> ValidationOutcome {
        let Some(object) = result.payload.as_object() else {
            return ValidationOutcome::from_violations(
                self.name(),
                vec![violation("$", "payload must be a JSON object")],
            );
        };

        let specs = match result.stage {
            Stage::Document => DOCUMENT_FIELDS,
            Stage::Site => SITE_FIELDS,
        };

        let mut violations = check_fields(object, specs);
        match result.stage {
            Stage::Document => violations.extend(check_resume_text(object, ctx)),
            Stage::Site => violations.extend(check_site_references(object)),
        }

        ValidationOutcome::from_violations(self.name(), violations)
    }
}

fn violation(field: &str, reason: impl Into<String>) -> Violation {
    Violation::SchemaViolation {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn check_fields(object: &Map<String, Value>, specs: &[FieldSpec]) -> Vec<Violation> {
    let mut violations = Vec::new();

    for spec in specs {
        match object.get(spec.name) {
            None if spec.required => violations.push(violation(spec.name, "required field is missing")),
            None => {}
            Some(value) => {
                if let Some(reason) = kind_mismatch(value, spec.kind) {
                    violations.push(violation(spec.name, reason));
                }
            }
        }
    }

    // Map iteration is key-sorted, so extraneous keys are reported deterministically.
    for key in object.keys() {
        if !specs.iter().any(|s| s.name == key) {
            violations.push(violation(key, "unexpected top-level field"));
        }
    }

    violations
}

fn kind_mismatch(value: &Value, kind: FieldKind) -> Option<String> {
    match kind {
        FieldKind::NonEmptyString => match value.as_str() {
            Some(s) if !s.trim().is_empty() => None,
            Some(_) => Some("must not be empty".to_string()),
            None => Some(format!("expected string, found {}", type_name(value))),
        },
        FieldKind::NonEmptyObjectArray => match value.as_array() {
            None => Some(format!("expected array, found {}", type_name(value))),
            Some(items) if items.is_empty() => Some("must be a non-empty array".to_string()),
            Some(items) => items
                .iter()
                .position(|item| !item.is_object())
                .map(|i| format!("item {i} is not an object")),
        },
        FieldKind::StringArray => match value.as_array() {
            None => Some(format!("expected array, found {}", type_name(value))),
            Some(items) => items
                .iter()
                .position(|item| !item.is_string())
                .map(|i| format!("item {i} is not a string")),
        },
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Rejects revised text that is too short or mostly non-letters (e.g. a scanned PDF that extracted to noise).
fn check_resume_text(object: &Map<String, Value>, ctx: &ValidationContext<'_>) -> Vec<Violation> {
    let Some(text) = object.get("final_resume_text").and_then(Value::as_str) else {
        return Vec::new();
    };
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let chars = text.chars().count();
    if chars < ctx.settings.min_resume_chars {
        return vec![violation(
            "final_resume_text",
            format!(
                "resume text is {chars} characters, minimum is {}",
                ctx.settings.min_resume_chars
            ),
        )];
    }

    let letters = text.chars().filter(|c| c.is_alphabetic()).count();
    let ratio = letters as f64 / chars as f64;
    if ratio <= ctx.settings.min_alpha_ratio {
        return vec![violation(
            "final_resume_text",
            format!("resume text is {:.0}% letters; looks like extraction noise", ratio * 100.0),
        )];
    }

    Vec::new()
}

fn check_site_references(object: &Map<String, Value>) -> Vec<Violation> {
    let Some(html) = object.get("html").and_then(Value::as_str) else {
        return Vec::new();
    };
    let html = html.to_lowercase();
    ["styles.css", "script.js"]
        .into_iter()
        .filter(|asset| !html.contains(asset))
        .map(|asset| violation("html", format!("generated HTML must reference `{asset}`")))
        .collect()
}
