//! Text helpers shared by the guardrails: normalization, HTML visible text, tokenization.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static HORIZONTAL_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("horizontal space regex is valid"));
static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("newline regex is valid"));
static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script.*?>.*?</script>").expect("script regex is valid"));
static STYLE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style.*?>.*?</style>").expect("style regex is valid"));
static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").expect("tag regex is valid"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n+").expect("blank line regex is valid"));
static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9]+").expect("word regex is valid"));

/// Collapses spaces/tabs, limits blank runs to one empty line, trims.
pub fn normalize_text(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let text = HORIZONTAL_SPACE.replace_all(&text, " ");
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Text a visitor would read: scripts, styles and tags stripped, entities for
/// the common cases decoded.
pub fn visible_text_from_html(html: &str) -> String {
    let text = SCRIPT_BLOCK.replace_all(html, " ");
    let text = STYLE_BLOCK.replace_all(&text, " ");
    let text = HTML_TAG.replace_all(&text, " ");
    let text = text
        .replace("&amp;", "&")
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&#39;", "'")
        .replace("&quot;", "\"");
    let text = HORIZONTAL_SPACE.replace_all(&text, " ");
    let text = BLANK_LINES.replace_all(&text, "\n");
    text.trim().to_string()
}

/// Lowercase alphanumeric runs, in order.
pub fn word_tokens(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    WORD.find_iter(&lower).map(|m| m.as_str().to_string()).collect()
}

pub fn token_set(text: &str) -> HashSet<String> {
    word_tokens(text).into_iter().collect()
}

/// Fraction of `generated` tokens that also occur in `source`. No tokens → 0.0.
pub fn content_overlap_ratio(source: &str, generated: &str) -> f64 {
    let source_tokens = token_set(source);
    let generated_tokens = word_tokens(generated);
    if generated_tokens.is_empty() {
        return 0.0;
    }
    let overlap = generated_tokens
        .iter()
        .filter(|t| source_tokens.contains(*t))
        .count();
    overlap as f64 / generated_tokens.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text_collapses_spacing() {
        let raw = "  Jane   Doe\t\tEngineer\r\n\n\n\n- Built things  \n";
        assert_eq!(normalize_text(raw), "Jane Doe Engineer\n\n- Built things");
    }

    #[test]
    fn test_visible_text_drops_script_and_style() {
        let html = r#"<html><head><style>.a{color:red}</style>
            <script src="script.js">var secret = 1;</script></head>
            <body><h1>Jane&nbsp;Doe</h1><p>Rust &amp; Go</p></body></html>"#;
        let visible = visible_text_from_html(html);
        assert!(visible.contains("Jane Doe"));
        assert!(visible.contains("Rust & Go"));
        assert!(!visible.contains("secret"));
        assert!(!visible.contains("color"));
    }

    #[test]
    fn test_word_tokens_lowercases() {
        assert_eq!(word_tokens("Node.js, AWS-2024!"), vec!["node", "js", "aws", "2024"]);
    }

    #[test]
    fn test_overlap_ratio() {
        let source = "Senior engineer at Acme building Rust services";
        assert_eq!(content_overlap_ratio(source, "rust services at acme"), 1.0);
        assert_eq!(content_overlap_ratio(source, "rust unicorn"), 0.5);
        assert_eq!(content_overlap_ratio(source, ""), 0.0);
    }
}
