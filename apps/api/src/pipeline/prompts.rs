// Prompt templates for the pipeline steps.
// Reuses cross-cutting fragments from llm_client::prompts.

use serde_json::Value;

use crate::llm_client::prompts::{GROUNDING_INSTRUCTION, JSON_ONLY_SYSTEM};
use crate::pipeline::definitions::{
    AUDIT_ACCESSIBILITY, CRAFT_CONTENT_OUTLINE, DEFINE_VISUAL_DIRECTION, GENERATE_RESUME_SITE,
    REVIEW_RESUME, REVISE_RESUME,
};
use crate::pipeline::executor::StepInput;

/// Persona for the document stage steps.
pub const HIRING_MANAGER_SYSTEM: &str =
    "You are an experienced hiring manager who reviews and edits resumes. \
    You improve clarity and impact without ever adding experience, employers, \
    dates, skills, certifications or metrics the candidate did not list.";

/// Persona for the site stage steps.
pub const WEB_TEAM_SYSTEM: &str =
    "You are a small web team (content strategist, visual designer, accessibility \
    reviewer and front-end engineer) building a single-page personal resume site. \
    The site may only present facts contained in the reviewed resume.";

/// Replace `{resume_text}`, `{user_request}`.
pub const REVIEW_RESUME_TEMPLATE: &str = r#"Review the resume below and list concrete improvements.

USER REQUEST:
{user_request}

RESUME:
{resume_text}

{grounding_instruction}

Return a JSON object with this EXACT schema:
{
  "feedback_items": [
    {"area": "impact", "issue": "bullets lack outcomes", "suggestion": "lead with the measurable result"}
  ]
}"#;

/// Replace `{resume_text}`, `{user_request}`, `{feedback_json}`.
pub const REVISE_RESUME_TEMPLATE: &str = r#"Revise the resume below using the review feedback and the user's request.

USER REQUEST:
{user_request}

REVIEW FEEDBACK:
{feedback_json}

RESUME:
{resume_text}

{grounding_instruction}

If part of the user's request would require inventing information, skip it and list it in
"skipped_user_updates". Return plain text for the resume (no markdown).

Return a JSON object with this EXACT schema (no extra fields):
{
  "final_resume_text": "full revised resume text",
  "feedback_items": [ ...the review feedback items you applied or considered... ],
  "applied_user_updates": ["what you changed for the user"],
  "skipped_user_updates": ["what you could not change without inventing facts"]
}"#;

/// Replace `{resume_text}`, `{user_request}`.
pub const CONTENT_OUTLINE_TEMPLATE: &str = r#"Plan the content of a one-page personal website for this resume.

USER REQUEST:
{user_request}

RESUME:
{resume_text}

{grounding_instruction}

Return a JSON object:
{
  "sections": [
    {"id": "experience", "heading": "Experience", "items": ["text taken from the resume"]}
  ]
}"#;

/// Replace `{resume_text}`, `{user_request}`.
pub const VISUAL_DIRECTION_TEMPLATE: &str = r##"Define a visual direction for a personal resume website.

USER REQUEST:
{user_request}

RESUME:
{resume_text}

Return a JSON object:
{
  "palette": {"background": "#ffffff", "text": "#1a1a1a", "accent": "#0b5fff"},
  "typography": {"heading": "system-ui", "body": "system-ui"},
  "layout": "single column, max width 72ch"
}"##;

/// Replace `{outline_json}`, `{visual_json}`.
pub const ACCESSIBILITY_AUDIT_TEMPLATE: &str = r#"Audit this site plan for accessibility (WCAG 2.1 AA).

CONTENT OUTLINE:
{outline_json}

VISUAL DIRECTION:
{visual_json}

Return a JSON object:
{
  "requirements": ["landmarks for header/main/footer", "contrast ratio >= 4.5:1 for body text"]
}"#;

/// Replace `{resume_text}`, `{outline_json}`, `{visual_json}`, `{audit_json}`.
pub const GENERATE_SITE_TEMPLATE: &str = r#"Build the website from the plan below.

RESUME (the only allowed source of facts):
{resume_text}

CONTENT OUTLINE:
{outline_json}

VISUAL DIRECTION:
{visual_json}

ACCESSIBILITY REQUIREMENTS:
{audit_json}

{grounding_instruction}

The HTML must link "styles.css" and load "script.js". Keep visible text close to the resume wording.

Return a JSON object with this EXACT schema (no extra fields):
{
  "title": "page title",
  "html": "<!doctype html>...",
  "css": "...",
  "js": "..."
}"#;

/// A rendered prompt: system prompt plus user message.
#[derive(Debug, Clone, PartialEq)]
pub struct StepPrompt {
    pub system: String,
    pub prompt: String,
}

/// Builds the prompt for a step from its stage input and upstream outputs.
/// Unknown steps get a generic prompt carrying the raw inputs.
pub fn build_step_prompt(input: &StepInput) -> StepPrompt {
    let resume_text = stage_field(&input.stage_input, "resume_text");
    let user_request = match stage_field(&input.stage_input, "user_request") {
        "" => "(none)",
        text => text,
    };

    let (persona, prompt) = match input.step.as_str() {
        REVIEW_RESUME => (
            HIRING_MANAGER_SYSTEM,
            REVIEW_RESUME_TEMPLATE
                .replace("{grounding_instruction}", GROUNDING_INSTRUCTION)
                .replace("{user_request}", user_request)
                .replace("{resume_text}", resume_text),
        ),
        REVISE_RESUME => (
            HIRING_MANAGER_SYSTEM,
            REVISE_RESUME_TEMPLATE
                .replace("{grounding_instruction}", GROUNDING_INSTRUCTION)
                .replace("{feedback_json}", &upstream_json(input, REVIEW_RESUME))
                .replace("{user_request}", user_request)
                .replace("{resume_text}", resume_text),
        ),
        CRAFT_CONTENT_OUTLINE => (
            WEB_TEAM_SYSTEM,
            CONTENT_OUTLINE_TEMPLATE
                .replace("{grounding_instruction}", GROUNDING_INSTRUCTION)
                .replace("{user_request}", user_request)
                .replace("{resume_text}", resume_text),
        ),
        DEFINE_VISUAL_DIRECTION => (
            WEB_TEAM_SYSTEM,
            VISUAL_DIRECTION_TEMPLATE
                .replace("{user_request}", user_request)
                .replace("{resume_text}", resume_text),
        ),
        AUDIT_ACCESSIBILITY => (
            WEB_TEAM_SYSTEM,
            ACCESSIBILITY_AUDIT_TEMPLATE
                .replace("{outline_json}", &upstream_json(input, CRAFT_CONTENT_OUTLINE))
                .replace("{visual_json}", &upstream_json(input, DEFINE_VISUAL_DIRECTION)),
        ),
        GENERATE_RESUME_SITE => (
            WEB_TEAM_SYSTEM,
            GENERATE_SITE_TEMPLATE
                .replace("{grounding_instruction}", GROUNDING_INSTRUCTION)
                .replace("{outline_json}", &upstream_json(input, CRAFT_CONTENT_OUTLINE))
                .replace("{visual_json}", &upstream_json(input, DEFINE_VISUAL_DIRECTION))
                .replace("{audit_json}", &upstream_json(input, AUDIT_ACCESSIBILITY))
                .replace("{resume_text}", resume_text),
        ),
        other => (
            JSON_ONLY_SYSTEM,
            format!(
                "Step `{other}`.\n\nINPUT:\n{}\n\nUPSTREAM:\n{}",
                input.stage_input,
                serde_json::to_string_pretty(&input.upstream).unwrap_or_default()
            ),
        ),
    };

    StepPrompt {
        system: format!("{persona} {JSON_ONLY_SYSTEM}"),
        prompt,
    }
}

fn stage_field<'a>(stage_input: &'a Value, key: &str) -> &'a str {
    stage_input.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn upstream_json(input: &StepInput, step: &str) -> String {
    input
        .upstream
        .iter()
        .find(|(id, _)| id.as_str() == step)
        .and_then(|(_, v)| serde_json::to_string_pretty(v).ok())
        .unwrap_or_else(|| "{}".to_string())
}
