//! Fingerprint Engine: stable identity for a (source document, instruction, selector) triple.
//!
//! `Fingerprint = sha256(flow_version | source_digest | normalized_instruction | selector)`.
//! The instruction is lowercased and whitespace-collapsed first, so casing and
//! spacing differences never produce distinct cache keys.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::flow::request::PathSelector;

/// SHA-256 hex digest of a source document's raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceDigest(String);

impl SourceDigest {
    pub fn of(bytes: &[u8]) -> Self {
        Self(sha256_hex(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cache key for a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct FingerprintEngine {
    flow_version: String,
}

impl FingerprintEngine {
    pub fn new(flow_version: impl Into<String>) -> Self {
        Self {
            flow_version: flow_version.into(),
        }
    }

    pub fn flow_version(&self) -> &str {
        &self.flow_version
    }

    pub fn compute(
        &self,
        source: &SourceDigest,
        request_text: &str,
        selector: PathSelector,
    ) -> Fingerprint {
        let signature = [
            self.flow_version.as_str(),
            source.as_str(),
            &normalize_instruction(request_text),
            selector.as_str(),
        ]
        .join("|");
        Fingerprint(sha256_hex(signature.as_bytes()))
    }
}

/// Lowercases and collapses all whitespace runs to a single space.
pub fn normalize_instruction(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
