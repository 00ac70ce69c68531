//! Redis connection management.

use redis::Client;
use redis::aio::ConnectionManager;
use tracing::info;

use cadence_core::error::{AppError, ErrorKind};
use cadence_core::result::AppResult;

/// Reconnecting Redis connection shared by publishers and subscriptions.
#[derive(Clone)]
pub struct RedisClient {
    conn: ConnectionManager,
    url: String,
}

impl std::fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClient")
            .field("url", &mask_redis_url(&self.url))
            .finish()
    }
}

impl RedisClient {
    /// Connect to the Redis server at `url`.
    pub async fn connect(url: &str) -> AppResult<Self> {
        info!(url = %mask_redis_url(url), "Connecting to Redis");

        let client = Client::open(url).map_err(|e| {
            AppError::with_source(ErrorKind::Bus, "Failed to create Redis client", e)
        })?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            AppError::with_source(ErrorKind::Bus, "Failed to connect to Redis", e)
        })?;

        info!("Connected to Redis");
        Ok(Self {
            conn,
            url: url.to_string(),
        })
    }

    /// A handle to the shared connection. Cheap to clone.
    pub fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// Send `PING` and expect `PONG`.
    pub async fn health_check(&self) -> AppResult<bool> {
        let mut conn = self.conn();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Bus, "Redis health check failed", e))?;
        Ok(pong == "PONG")
    }
}

/// Mask password in Redis URL for safe logging.
pub(crate) fn mask_redis_url(url: &str) -> String {
    let Some(at_pos) = url.find('@') else {
        return url.to_string();
    };
    let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
    match url[..at_pos].rfind(':') {
        Some(colon_pos) if colon_pos >= scheme_end => {
            format!("{}:****@{}", &url[..colon_pos], &url[at_pos + 1..])
        }
        _ => url.to_string(),
    }
}
