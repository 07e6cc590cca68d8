//! The two stage pipelines and the inputs each stage receives.

use serde_json::{json, Value};

use crate::models::{ResumeRevision, Stage};
use crate::pipeline::graph::{GraphError, StepSpec, TaskGraph};

pub const REVIEW_RESUME: &str = "review_resume";
pub const REVISE_RESUME: &str = "revise_resume";

pub const CRAFT_CONTENT_OUTLINE: &str = "craft_content_outline";
pub const DEFINE_VISUAL_DIRECTION: &str = "define_visual_direction";
pub const AUDIT_ACCESSIBILITY: &str = "audit_accessibility";
pub const GENERATE_RESUME_SITE: &str = "generate_resume_site";

/// review_resume → revise_resume
pub fn document_graph() -> Result<TaskGraph, GraphError> {
    TaskGraph::new(
        Stage::Document,
        vec![
            StepSpec::new(REVIEW_RESUME),
            StepSpec::new(REVISE_RESUME).after(&[REVIEW_RESUME]),
        ],
        REVISE_RESUME,
    )
}

/// Outline and visual direction run side by side; the audit needs both; the
/// site engineer consumes all three.
pub fn site_graph() -> Result<TaskGraph, GraphError> {
    TaskGraph::new(
        Stage::Site,
        vec![
            StepSpec::new(CRAFT_CONTENT_OUTLINE).concurrent(),
            StepSpec::new(DEFINE_VISUAL_DIRECTION).concurrent(),
            StepSpec::new(AUDIT_ACCESSIBILITY).after(&[CRAFT_CONTENT_OUTLINE, DEFINE_VISUAL_DIRECTION]),
            StepSpec::new(GENERATE_RESUME_SITE).after(&[
                CRAFT_CONTENT_OUTLINE,
                DEFINE_VISUAL_DIRECTION,
                AUDIT_ACCESSIBILITY,
            ]),
        ],
        GENERATE_RESUME_SITE,
    )
}

pub fn graph_for(stage: Stage) -> Result<TaskGraph, GraphError> {
    match stage {
        Stage::Document => document_graph(),
        Stage::Site => site_graph(),
    }
}

/// Document stage input: the source document text.
pub fn document_stage_input(source_text: &str, user_request: &str) -> Value {
    json!({
        "resume_text": source_text,
        "user_request": user_request,
    })
}

/// Site stage input: built only from an accepted revision.
pub fn site_stage_input(revision: &ResumeRevision, user_request: &str) -> Value {
    json!({
        "resume_text": revision.final_resume_text,
        "user_request": user_request,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_graphs_are_valid() {
        let document = document_graph().unwrap();
        assert_eq!(document.output_step().as_str(), REVISE_RESUME);
        assert_eq!(document.len(), 2);

        let site = site_graph().unwrap();
        assert_eq!(site.output_step().as_str(), GENERATE_RESUME_SITE);
        let last = site.order()[site.len() - 1];
        assert_eq!(site.step(last).id.as_str(), GENERATE_RESUME_SITE);

        let concurrent: Vec<_> = site
            .steps()
            .iter()
            .filter(|s| s.concurrent)
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(concurrent, vec![CRAFT_CONTENT_OUTLINE, DEFINE_VISUAL_DIRECTION]);
    }
}
