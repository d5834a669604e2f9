use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::Backend;
use super::Id;
use super::MembershipStore;
use super::StoreError;

/// Default prefix of the per-window set keys.
pub const DEFAULT_REDIS_PREFIX: &str = "unique-requests";

/// Name of the Redis set holding window `window`.
pub(crate) fn window_key(prefix: &str, window: u64) -> String {
    format!("{prefix}:{window}")
}

/// Marker set by the one process that reports a window.
pub(crate) fn report_key(window_key: &str) -> String {
    format!("{window_key}:reported")
}

/// A membership set stored in Redis.
///
/// Each window uses its own key, so a rollover never clears a set that other
/// processes may still be writing to. Keys are never deleted on retire; every insert
/// refreshes a TTL on the key and the set expires once the window is over.
pub struct RedisStore {
    conn: ConnectionManager,
    key: String,
    ttl: Duration,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MembershipStore for RedisStore {
    async fn try_add(&self, id: Id) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let (added, _): (u64, bool) = redis::pipe()
            .atomic()
            .sadd(&self.key, id)
            .expire(&self.key, self.ttl.as_secs().max(1) as i64)
            .query_async(&mut conn)
            .await?;

        // SADD answers with the number of members actually added
        Ok(added == 1)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.scard(&self.key).await?)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: u64 = conn.del(&self.key).await?;
        Ok(())
    }

    async fn claim_report(&self) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        // SET NX answers OK for the first caller and nil for everyone after
        let claimed: Option<String> = redis::cmd("SET")
            .arg(report_key(&self.key))
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;

        Ok(claimed.is_some())
    }
}

/// Opens one [`RedisStore`] per window over a shared connection.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
    prefix: String,
    ttl: Duration,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("prefix", &self.prefix)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Connects to `url` and checks the server answers a `PING`.
    ///
    /// # Arguments
    ///
    /// * `url` - A Redis connection URL, e.g. `redis://127.0.0.1:6379`.
    /// * `prefix` - Prefix of the per-window set keys.
    /// * `ttl` - Expiry refreshed on a window's key by every insert.
    pub async fn connect(url: &str, prefix: &str, ttl: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        tracing::info!(prefix, ?ttl, "connected to redis");

        Ok(Self {
            conn,
            prefix: prefix.to_string(),
            ttl,
        })
    }
}

impl Backend for RedisBackend {
    fn open(&self, window: u64) -> Arc<dyn MembershipStore> {
        Arc::new(RedisStore {
            conn: self.conn.clone(),
            key: window_key(&self.prefix, window),
            ttl: self.ttl,
        })
    }
}
