//! Redis-backed waiting pool
//!
//! Players live in one sorted set; the score is the Unix timestamp at enqueue
//! time so range reads return the longest-waiting players first. The take
//! operation runs as a server-side Lua script: the cardinality check, the
//! range read, and the removal execute in one atomic step, so concurrent
//! formation loops can never claim the same player.

use crate::config::PoolSettings;
use crate::error::{MatchmakingError, Result};
use crate::pool::WaitingPool;
use crate::types::PlayerId;
use crate::utils::unix_seconds;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::{debug, error, info};

/// Takes the first N members of the sorted set and removes them, atomically.
/// Returns an empty table when fewer than N members are present.
const TAKE_SCRIPT: &str = r#"
local required = tonumber(ARGV[1])
if redis.call('ZCARD', KEYS[1]) < required then
    return {}
end
local members = redis.call('ZRANGE', KEYS[1], 0, required - 1)
redis.call('ZREM', KEYS[1], unpack(members))
return members
"#;

/// Waiting pool stored in a Redis sorted set
pub struct RedisPool {
    conn: ConnectionManager,
    pool_key: String,
    take_script: Script,
}

impl RedisPool {
    /// Connect to Redis and ping it to verify connectivity
    pub async fn connect(settings: &PoolSettings) -> Result<Self> {
        let client = redis::Client::open(connection_info(settings)).map_err(|e| {
            MatchmakingError::PoolStoreError {
                message: format!("Invalid Redis connection settings: {}", e),
            }
        })?;

        let mut conn = ConnectionManager::new(client).await.map_err(|e| {
            MatchmakingError::PoolStoreError {
                message: format!("Failed to connect to Redis: {}", e),
            }
        })?;

        redis::cmd("PING")
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| MatchmakingError::PoolStoreError {
                message: format!("Redis ping failed: {}", e),
            })?;

        info!("Connected to Redis pool store at {}", settings.addr);

        Ok(Self {
            conn,
            pool_key: settings.pool_key.clone(),
            take_script: Script::new(TAKE_SCRIPT),
        })
    }
}

/// Build Redis connection info from pool settings
pub(crate) fn connection_info(settings: &PoolSettings) -> redis::ConnectionInfo {
    let (host, port) = match settings.addr.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.parse().unwrap_or(6379)),
        None => (settings.addr.clone(), 6379),
    };

    redis::ConnectionInfo {
        addr: redis::ConnectionAddr::Tcp(host, port),
        redis: redis::RedisConnectionInfo {
            db: settings.db,
            username: None,
            password: if settings.password.is_empty() {
                None
            } else {
                Some(settings.password.clone())
            },
        },
    }
}

#[async_trait]
impl WaitingPool for RedisPool {
    async fn add(&self, player_id: &str) -> Result<()> {
        let score = unix_seconds();
        let mut conn = self.conn.clone();

        conn.zadd::<_, _, _, ()>(&self.pool_key, player_id, score)
            .await
            .map_err(|e| {
                error!(player_id, error = %e, "Failed to add player to Redis pool");
                MatchmakingError::PoolStoreError {
                    message: format!("ZADD failed: {}", e),
                }
            })?;

        info!(player_id, "Player added to matchmaking pool");
        Ok(())
    }

    async fn remove(&self, player_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();

        conn.zrem::<_, _, ()>(&self.pool_key, player_id)
            .await
            .map_err(|e| {
                error!(player_id, error = %e, "Failed to remove player from Redis pool");
                MatchmakingError::PoolStoreError {
                    message: format!("ZREM failed: {}", e),
                }
            })?;

        info!(player_id, "Player removed from matchmaking pool");
        Ok(())
    }

    async fn try_form_match(&self, required_players: usize) -> Result<Option<Vec<PlayerId>>> {
        let mut conn = self.conn.clone();

        let players: Vec<PlayerId> = self
            .take_script
            .key(&self.pool_key)
            .arg(required_players)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                error!(error = %e, "Pool take script failed");
                MatchmakingError::PoolStoreError {
                    message: format!("Take script failed: {}", e),
                }
            })?;

        if players.is_empty() {
            debug!(required_players, "Not enough players waiting");
            return Ok(None);
        }

        info!(player_count = players.len(), players = ?players, "Match candidates taken from pool");
        Ok(Some(players))
    }

    async fn count(&self) -> Result<usize> {
        let mut conn = self.conn.clone();

        let count: usize =
            conn.zcard(&self.pool_key)
                .await
                .map_err(|e| MatchmakingError::PoolStoreError {
                    message: format!("ZCARD failed: {}", e),
                })?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_info_parses_addr() {
        let settings = PoolSettings {
            addr: "redis.internal:6380".to_string(),
            password: "secret".to_string(),
            db: 3,
            pool_key: "matchmaking:pool".to_string(),
        };

        let info = connection_info(&settings);
        match info.addr {
            redis::ConnectionAddr::Tcp(host, port) => {
                assert_eq!(host, "redis.internal");
                assert_eq!(port, 6380);
            }
            other => panic!("unexpected addr: {:?}", other),
        }
        assert_eq!(info.redis.db, 3);
        assert_eq!(info.redis.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_connection_info_defaults_port() {
        let settings = PoolSettings {
            addr: "localhost".to_string(),
            password: String::new(),
            db: 0,
            pool_key: "matchmaking:pool".to_string(),
        };

        let info = connection_info(&settings);
        match info.addr {
            redis::ConnectionAddr::Tcp(host, port) => {
                assert_eq!(host, "localhost");
                assert_eq!(port, 6379);
            }
            other => panic!("unexpected addr: {:?}", other),
        }
        assert!(info.redis.password.is_none());
    }

    // Behavior against a live Redis (atomicity, ordering) is covered by the
    // integration suite through the in-memory pool, which implements the
    // same contract.
}
