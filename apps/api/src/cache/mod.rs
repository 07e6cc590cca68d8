//! Cache Layer: maps a fingerprint to the accepted results of an earlier run.
//!
//! Only accepted results are ever stored: `CacheEntry` holds
//! `AcceptedResult`s, which only the guardrails can produce. Entries are
//! replaced wholesale, never edited in place.

pub mod file;
pub mod locks;
pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifacts::ArtifactRef;
use crate::flow::fingerprint::{Fingerprint, SourceDigest};
use crate::flow::request::{PathSelector, SourceRef};
use crate::models::{AcceptedResult, Stage};

pub use self::file::FileCache;
pub use self::locks::FingerprintLocks;
pub use self::memory::MemoryCache;
pub use self::redis_store::RedisCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cache task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub flow_version: String,
    pub selector: PathSelector,
    pub source_ref: SourceRef,
    pub source_digest: SourceDigest,
    /// One accepted result per executed stage, in stage order.
    pub results: Vec<AcceptedResult>,
    pub artifacts: Vec<ArtifactRef>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn result_for(&self, stage: Stage) -> Option<&AcceptedResult> {
        self.results.iter().find(|r| r.stage() == stage)
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Backend name for log lines.
    fn backend(&self) -> &'static str;

    /// Pure read. A stored entry that cannot be decoded is reported as a miss.
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, CacheError>;

    /// Stores or supersedes the entry for `entry.fingerprint`.
    async fn store(&self, entry: CacheEntry) -> Result<(), CacheError>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::TimeZone;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::flow::fingerprint::FingerprintEngine;
    use crate::models::{AcceptedPayload, Provenance, ResumeRevision};
    use crate::pipeline::StepId;

    pub fn entry(instruction: &str) -> CacheEntry {
        let digest = SourceDigest::of(b"resume bytes");
        let fingerprint = FingerprintEngine::new("test").compute(&digest, instruction, PathSelector::Revise);
        let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        CacheEntry {
            fingerprint,
            flow_version: "test".to_string(),
            selector: PathSelector::Revise,
            source_ref: SourceRef::new("Resume.pdf"),
            source_digest: digest,
            results: vec![AcceptedResult::from_validated(
                AcceptedPayload::Document(ResumeRevision {
                    final_resume_text: "Jane Doe".to_string(),
                    feedback_items: vec![json!({"note": "ok"})],
                    applied_user_updates: Vec::new(),
                    skipped_user_updates: Vec::new(),
                }),
                Provenance {
                    run_id: Uuid::nil(),
                    stage: Stage::Document,
                    step: StepId::from("revise_resume"),
                    produced_at: created_at,
                },
            )],
            artifacts: Vec::new(),
            created_at,
        }
    }
}
