use crate::store::{duration_millis, StateStore, StoreError, StoreResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, pipe, Client, RedisError};
use std::time::Duration;

/// [`StateStore`] backed by Redis
///
/// Mutations that also refresh an expiry run as one `MULTI`/`EXEC`
/// pipeline, so every call is atomic on the server.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = Client::open(url).map_err(unavailable)?;
        let conn = ConnectionManager::new(client).await.map_err(unavailable)?;
        Ok(Self { conn })
    }
}

fn unavailable(err: RedisError) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn map_err(key: &str) -> impl FnOnce(RedisError) -> StoreError + '_ {
    move |err| {
        if err.code() == Some("WRONGTYPE") {
            StoreError::WrongType {
                key: key.to_string(),
            }
        } else {
            unavailable(err)
        }
    }
}

#[async_trait]
impl StateStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(map_err(key))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(duration_millis(ttl).max(1))
            .query_async(&mut conn)
            .await
            .map_err(map_err(key))
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: i64 = cmd("DEL")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        let (value,): (i64,) = pipe()
            .atomic()
            .cmd("INCR")
            .arg(key)
            .cmd("PEXPIRE")
            .arg(key)
            .arg(duration_millis(ttl).max(1))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(map_err(key))?;
        Ok(value)
    }

    async fn sadd(&self, key: &str, member: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let (added,): (i64,) = pipe()
            .atomic()
            .cmd("SADD")
            .arg(key)
            .arg(member)
            .cmd("PEXPIRE")
            .arg(key)
            .arg(duration_millis(ttl).max(1))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(map_err(key))?;
        Ok(added > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = cmd("SREM")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(map_err(key))?;
        Ok(())
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut members: Vec<String> = cmd("SMEMBERS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(map_err(key))?;
        members.sort();
        Ok(members)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        pipe()
            .atomic()
            .cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .ignore()
            .cmd("PEXPIRE")
            .arg(key)
            .arg(duration_millis(ttl).max(1))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(map_err(key))
    }

    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let bound = |v: f64| {
            if v == f64::NEG_INFINITY {
                "-inf".to_string()
            } else if v == f64::INFINITY {
                "+inf".to_string()
            } else {
                v.to_string()
            }
        };
        cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg(bound(min))
            .arg(bound(max))
            .query_async(&mut conn)
            .await
            .map_err(map_err(key))
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        cmd("ZCARD")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(map_err(key))
    }
}
