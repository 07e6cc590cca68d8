//! Content-overlap guardrail: a generated site must mostly say what the reviewed resume says.

use crate::guardrails::text::{content_overlap_ratio, visible_text_from_html};
use crate::guardrails::{Guardrail, ValidationContext, ValidationOutcome, Violation};
use crate::models::{GenerationResult, Stage};

pub struct ContentOverlapGuardrail;

impl Guardrail for ContentOverlapGuardrail {
    fn name(&self) -> &'static str {
        "content_overlap"
    }

    fn applies_to(&self, stage: Stage) -> bool {
        stage == Stage::Site
    }

    fn validate(&self, result: &GenerationResult, ctx: &ValidationContext<'_>) -> ValidationOutcome {
        let visible = visible_text_from_html(result.str_field("html").unwrap_or_default());
        let ratio = content_overlap_ratio(ctx.ground_truth, &visible);
        let threshold = ctx.settings.min_content_overlap;

        let violations = if ratio < threshold {
            vec![Violation::InsufficientOverlap { ratio, threshold }]
        } else {
            Vec::new()
        };
        ValidationOutcome::from_violations(self.name(), violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrails::test_support::{result, SOURCE_RESUME};
    use crate::guardrails::GuardrailSettings;
    use serde_json::json;

    fn validate(html: &str) -> ValidationOutcome {
        let settings = GuardrailSettings::default();
        let ctx = ValidationContext {
            ground_truth: SOURCE_RESUME,
            settings: &settings,
        };
        let site = result(
            Stage::Site,
            json!({"title": "Jane Doe", "html": html, "css": "body{}", "js": "x"}),
        );
        ContentOverlapGuardrail.validate(&site, &ctx)
    }

    #[test]
    fn test_faithful_site_passes() {
        let outcome = validate(
            "<h1>Jane Doe</h1><p>Senior Software Engineer at Acme Corp.</p>\
             <ul><li>Built Rust ingestion pipeline on AWS</li></ul>",
        );
        assert!(outcome.passed);
    }

    #[test]
    fn test_diverged_site_fails_with_ratio() {
        let outcome = validate(
            "<h1>Jane Doe</h1><p>Visionary thought leader passionate about synergy, \
             blockchain futures and disruptive wellness brands.</p>",
        );
        assert!(!outcome.passed);
        match &outcome.violations[0] {
            Violation::InsufficientOverlap { ratio, threshold } => {
                assert!(*ratio < 0.7);
                assert_eq!(*threshold, 0.7);
            }
            other => panic!("unexpected violation {other:?}"),
        }
    }

    #[test]
    fn test_empty_page_fails() {
        assert!(!validate("<script>render()</script>").passed);
    }

    #[test]
    fn test_not_registered_for_document_stage() {
        assert!(!ContentOverlapGuardrail.applies_to(Stage::Document));
    }
}
