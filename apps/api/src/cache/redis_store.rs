//! Redis-backed cache: one JSON value per fingerprint.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{info, warn};

use crate::cache::{CacheEntry, CacheError, CacheStore};
use crate::flow::fingerprint::Fingerprint;

const KEY_PREFIX: &str = "resume-flow:cache:";

#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Redis cache connected");
        Ok(Self { conn })
    }

    pub fn key(fingerprint: &Fingerprint) -> String {
        format!("{KEY_PREFIX}{}", fingerprint.as_str())
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(Self::key(fingerprint)).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!(fingerprint = %fingerprint.short(), error = %e, "corrupt cache entry; treating as miss");
                Ok(None)
            }
        }
    }

    async fn store(&self, entry: CacheEntry) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(&entry)?;
        conn.set::<_, _, ()>(Self::key(&entry.fingerprint), raw).await?;
        Ok(())
    }
}
