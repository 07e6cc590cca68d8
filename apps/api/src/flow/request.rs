//! Request intake: normalizes trigger payloads and interactive answers into one `Request` shape.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::FlowError;

/// Which pipeline(s) a request runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSelector {
    /// Document stage only.
    Revise,
    /// Document stage, then site stage on the accepted document.
    ReviseAndPublish,
}

impl PathSelector {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathSelector::Revise => "revise",
            PathSelector::ReviseAndPublish => "revise_and_publish",
        }
    }
}

impl fmt::Display for PathSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PathSelector {
    type Err = FlowError;

    /// Exact selector names only (canonical or legacy alias), ignoring case and punctuation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_lowercase() || *c == '_')
            .collect();
        match token.as_str() {
            "revise" | "update_resume" | "updateresume" => Ok(PathSelector::Revise),
            "revise_and_publish" | "reviseandpublish" | "create_website" | "createwebsite" => {
                Ok(PathSelector::ReviseAndPublish)
            }
            _ => Err(FlowError::InvalidRequest(format!(
                "unknown path selector '{}'",
                s.trim()
            ))),
        }
    }
}

const WEBSITE_PHRASES: &[&str] = &[
    "create website",
    "build website",
    "portfolio website",
    "portfolio site",
    "resume website",
    "website",
];

const RESUME_PHRASES: &[&str] = &[
    "update resume",
    "edit resume",
    "improve resume",
    "resume update",
    "resume",
    "cv",
];

/// Classifies a route signal: an explicit selector first, then keyword intent.
/// Website intent wins over resume intent since publishing implies revising.
pub fn classify_path(text: &str) -> Option<PathSelector> {
    let raw = text.trim().to_lowercase();
    if raw.is_empty() {
        return None;
    }
    if let Ok(selector) = raw.parse::<PathSelector>() {
        return Some(selector);
    }
    if WEBSITE_PHRASES.iter().any(|p| raw.contains(p)) {
        return Some(PathSelector::ReviseAndPublish);
    }
    if RESUME_PHRASES.iter().any(|p| raw.contains(p)) {
        return Some(PathSelector::Revise);
    }
    None
}

/// Opaque handle to the source document, resolved by the `DocumentStore`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRef(String);

impl SourceRef {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An accepted request. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub path: PathSelector,
    pub user_request: String,
    pub source_ref: SourceRef,
}

/// Structured trigger payload. Legacy key names are accepted as fallbacks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerPayload {
    #[serde(default)]
    pub user_path: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub user_request: Option<String>,
    #[serde(default)]
    pub user_action: Option<String>,
}

fn first_non_empty(candidates: &[&Option<String>]) -> Option<String> {
    candidates
        .iter()
        .filter_map(|c| c.as_deref())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

impl Request {
    pub fn new(path: PathSelector, user_request: impl Into<String>, source_ref: SourceRef) -> Self {
        Self {
            path,
            user_request: user_request.into().trim().to_string(),
            source_ref,
        }
    }

    /// Builds a request from a trigger payload. With no explicit path, the
    /// request text itself is classified.
    pub fn from_trigger(payload: &TriggerPayload, source_ref: SourceRef) -> Result<Self, FlowError> {
        let path_signal = first_non_empty(&[&payload.user_path, &payload.path, &payload.action]);
        let user_request =
            first_non_empty(&[&payload.user_request, &payload.user_action]).unwrap_or_default();

        let route_signal = path_signal.as_deref().unwrap_or(user_request.as_str());
        let path = classify_path(route_signal).ok_or_else(|| {
            FlowError::InvalidRequest(
                "could not classify route; provide a clear intent like 'update my resume' \
                 or 'create website'"
                    .to_string(),
            )
        })?;

        Ok(Self::new(path, user_request, source_ref))
    }

    /// Builds a request from interactive answers.
    pub fn from_prompt(
        path_answer: &str,
        user_request: &str,
        source_ref: SourceRef,
    ) -> Result<Self, FlowError> {
        let path = classify_path(path_answer).ok_or_else(|| {
            FlowError::InvalidRequest(format!("could not classify route '{}'", path_answer.trim()))
        })?;
        Ok(Self::new(path, user_request, source_ref))
    }
}
