// Cross-cutting prompt fragments shared by every pipeline step.
// Step-specific templates live in pipeline::prompts.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Appended to every step that writes resume or site content.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Every fact you write (employer, title, date, metric, skill, \
    certification, degree) must already appear in the resume text provided. \
    You may rephrase, reorder and tighten. You may NOT infer, embellish or invent. \
    If the user asks for something the resume does not support, leave it out.";
