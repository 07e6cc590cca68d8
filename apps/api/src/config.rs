use anyhow::{bail, Context, Result};

use crate::flow::controller::{FlowSettings, DEFAULT_FLOW_VERSION};
use crate::guardrails::GuardrailSettings;

/// Where accepted results are cached between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    /// One JSON file per fingerprint under `cache_dir`.
    File,
    /// Process lifetime only.
    Memory,
    Redis(String),
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub source_document_path: String,
    pub artifacts_dir: String,
    pub site_output_dir: String,
    pub cache_dir: String,
    pub cache_backend: CacheBackend,
    pub max_parallel_steps: usize,
    pub min_content_overlap: f64,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let min_content_overlap: f64 = parse_env("MIN_CONTENT_OVERLAP", 0.7)?;
        anyhow::ensure!(
            (0.0..=1.0).contains(&min_content_overlap),
            "MIN_CONTENT_OVERLAP must be between 0 and 1"
        );

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            source_document_path: env_or("SOURCE_DOCUMENT_PATH", "Resume.pdf"),
            artifacts_dir: env_or("ARTIFACTS_DIR", "artifacts"),
            site_output_dir: env_or("SITE_OUTPUT_DIR", "docs"),
            cache_dir: env_or("CACHE_DIR", ".cache/resume_pipeline"),
            cache_backend: cache_backend()?,
            max_parallel_steps: parse_env("MAX_PARALLEL_STEPS", 4)?,
            min_content_overlap,
            port: parse_env("PORT", 8080)?,
            rust_log: env_or("RUST_LOG", "info"),
        })
    }

    pub fn flow_settings(&self) -> FlowSettings {
        FlowSettings {
            flow_version: DEFAULT_FLOW_VERSION.to_string(),
            guardrails: GuardrailSettings {
                min_content_overlap: self.min_content_overlap,
                ..GuardrailSettings::default()
            },
            max_parallel_steps: self.max_parallel_steps.max(1),
        }
    }
}

/// `CACHE_BACKEND` = file | memory | redis. Without it, a set `REDIS_URL`
/// selects Redis and anything else the file cache.
fn cache_backend() -> Result<CacheBackend> {
    let redis_url = std::env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty());
    let requested = std::env::var("CACHE_BACKEND").unwrap_or_default().to_lowercase();

    match (requested.trim(), redis_url) {
        ("" | "redis", Some(url)) => Ok(CacheBackend::Redis(url)),
        ("redis", None) => bail!("CACHE_BACKEND=redis requires REDIS_URL"),
        ("" | "file", _) => Ok(CacheBackend::File),
        ("memory", _) => Ok(CacheBackend::Memory),
        (other, _) => bail!("unknown CACHE_BACKEND '{other}' (expected file, memory or redis)"),
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_settings_carry_overrides() {
        let config = Config {
            anthropic_api_key: "key".into(),
            source_document_path: "Resume.pdf".into(),
            artifacts_dir: "artifacts".into(),
            site_output_dir: "docs".into(),
            cache_dir: ".cache".into(),
            cache_backend: CacheBackend::File,
            max_parallel_steps: 0,
            min_content_overlap: 0.5,
            port: 8080,
            rust_log: "info".into(),
        };
        let settings = config.flow_settings();
        assert_eq!(settings.max_parallel_steps, 1);
        assert_eq!(settings.guardrails.min_content_overlap, 0.5);
        assert_eq!(settings.guardrails.min_resume_chars, 200);
        assert_eq!(settings.flow_version, DEFAULT_FLOW_VERSION);
    }
}
