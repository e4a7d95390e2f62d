//! Redis-backed implementation of the `Cache` trait used by the Event
//! Store and the content cache (spec §4.A). This is the concrete
//! adapter; the rest of the core only ever depends on `Cache`.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::traits::Cache;

pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn lpush(&self, key: &str, value: String) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.lpush(key, value).await?;
        Ok(())
    }

    async fn ltrim(&self, key: &str, len: usize) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        if len == 0 {
            let _: () = conn.del(key).await?;
        } else {
            let _: () = conn.ltrim(key, 0, (len as isize) - 1).await?;
        }
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: bool = conn.expire(key, ttl_secs as i64).await?;
        Ok(())
    }

    async fn lrange(&self, key: &str) -> anyhow::Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let values: Vec<String> = conn.lrange(key, 0, -1).await?;
        Ok(values)
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }
}
