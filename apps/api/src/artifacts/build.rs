//! Builds the artifact batch for a run from its accepted results.
//!
//! The output depends only on the accepted results, the rendered document
//! and the `BuildContext` (including `created_at`), so a cache hit can
//! rebuild byte-identical files for artifacts that went missing.

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::artifacts::{Artifact, ArtifactKind};
use crate::flow::fingerprint::{Fingerprint, SourceDigest};
use crate::flow::request::PathSelector;
use crate::models::AcceptedResult;

pub struct BuildContext<'a> {
    pub fingerprint: &'a Fingerprint,
    pub flow_version: &'a str,
    pub selector: PathSelector,
    pub source_digest: &'a SourceDigest,
    pub created_at: DateTime<Utc>,
}

/// Artifacts for every accepted stage, in a fixed order. `rendered_document`
/// is the updated document as produced by the document collaborator.
pub fn build_artifacts(
    results: &[AcceptedResult],
    rendered_document: Bytes,
    ctx: &BuildContext<'_>,
) -> Vec<Artifact> {
    let mut artifacts = Vec::new();
    let generated_at = ctx.created_at.to_rfc3339_opts(SecondsFormat::Secs, true);
    let site = results.iter().find_map(AcceptedResult::as_site);

    if let Some(revision) = results.iter().find_map(AcceptedResult::as_revision) {
        artifacts.push(Artifact::new(ArtifactKind::UpdatedDocument, rendered_document));
        artifacts.push(Artifact::new(
            ArtifactKind::ReviewRecord,
            pretty(&json!({
                "feedback_items": revision.feedback_items,
                "applied_user_updates": revision.applied_user_updates,
                "skipped_user_updates": revision.skipped_user_updates,
                "cache_key": ctx.fingerprint.as_str(),
                "flow_version": ctx.flow_version,
            })),
        ));
        artifacts.push(Artifact::new(
            ArtifactKind::FeedbackText,
            pretty(&json!(revision.feedback_items)),
        ));
    }

    let site_files: Vec<&str> = if site.is_some() {
        vec!["index.html", "styles.css", "script.js"]
    } else {
        Vec::new()
    };

    artifacts.push(Artifact::new(
        ArtifactKind::BuildMetadata,
        pretty(&json!({
            "flow_path": ctx.selector.as_str(),
            "flow_version": ctx.flow_version,
            "cache_key": ctx.fingerprint.as_str(),
            "cache_hit": false,
            "source_digest": ctx.source_digest.as_str(),
            "generated_at": generated_at,
            "site_files": site_files,
        })),
    ));

    if let Some(site) = site {
        artifacts.push(Artifact::new(ArtifactKind::SiteHtml, site.html.clone()));
        artifacts.push(Artifact::new(ArtifactKind::SiteStylesheet, site.css.clone()));
        artifacts.push(Artifact::new(ArtifactKind::SiteScript, site.js.clone()));
        artifacts.push(Artifact::new(
            ArtifactKind::SiteBuildMetadata,
            pretty(&json!({
                "title": site.title,
                "flow_version": ctx.flow_version,
                "cache_key": ctx.fingerprint.as_str(),
                "source_digest": ctx.source_digest.as_str(),
                "generated_at": generated_at,
            })),
        ));
    }

    artifacts
}

fn pretty(value: &Value) -> String {
    let mut text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    text.push('\n');
    text
}
