// src/services/redis_service.rs
use crate::errors::StudioError;
use crate::models::{DesignDna, NewDesignDna};
use async_trait::async_trait;
use log::{info, warn};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

const NEXT_ID_KEY: &str = "artboard:design:next_id";

fn design_key(id: u64) -> String {
    format!("artboard:design:{}", id)
}

fn author_key(author: &str) -> String {
    format!("artboard:designs:author:{}", author)
}

/// Persistent history of saved designs.
#[async_trait]
pub trait DesignStore: Send + Sync {
    /// Stores the record and returns it with its assigned id.
    async fn save(&self, design: NewDesignDna) -> Result<DesignDna, StudioError>;

    /// Newest first.
    async fn list_by_author(&self, author: &str) -> Result<Vec<DesignDna>, StudioError>;

    /// Removes one of `author`'s designs. Records of other authors are
    /// reported as missing.
    async fn delete(&self, id: u64, author: &str) -> Result<(), StudioError>;

    /// Returns how many records were removed.
    async fn delete_by_author(&self, author: &str) -> Result<usize, StudioError>;
}

pub struct RedisDesignStore {
    conn: ConnectionManager,
}

impl RedisDesignStore {
    pub async fn new(redis_url: &str) -> Result<Self, StudioError> {
        let client = Client::open(redis_url)?;
        let mut conn = ConnectionManager::new(client).await?;

        // Test connection
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await?;

        info!("Connected to Redis at {}", redis_url);
        Ok(Self { conn })
    }

    async fn fetch(&self, ids: &[u64]) -> Result<Vec<DesignDna>, StudioError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let keys: Vec<String> = ids.iter().map(|id| design_key(*id)).collect();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;

        let mut designs = Vec::with_capacity(values.len());
        for (id, value) in ids.iter().zip(values) {
            match value {
                Some(json) => designs.push(serde_json::from_str(&json)?),
                None => warn!("Design {} is indexed but missing", id),
            }
        }
        Ok(designs)
    }
}

#[async_trait]
impl DesignStore for RedisDesignStore {
    async fn save(&self, design: NewDesignDna) -> Result<DesignDna, StudioError> {
        let mut conn = self.conn.clone();
        let id: u64 = conn.incr(NEXT_ID_KEY, 1).await?;
        let record = design.with_id(id);
        let value = serde_json::to_string(&record)?;
        let score = record.created_at.timestamp_millis();

        redis::pipe()
            .atomic()
            .set(design_key(id), value)
            .ignore()
            .zadd(author_key(&record.author), id, score)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(record)
    }

    async fn list_by_author(&self, author: &str) -> Result<Vec<DesignDna>, StudioError> {
        let mut conn = self.conn.clone();
        let ids: Vec<u64> = conn.zrevrange(author_key(author), 0, -1).await?;
        self.fetch(&ids).await
    }

    async fn delete(&self, id: u64, author: &str) -> Result<(), StudioError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(design_key(id)).await?;
        let record: DesignDna = match value {
            Some(json) => serde_json::from_str(&json)?,
            None => return Err(StudioError::NotFound(format!("Design {}", id))),
        };
        if record.author != author {
            warn!("{} tried to delete design {} of another author", author, id);
            return Err(StudioError::NotFound(format!("Design {}", id)));
        }

        redis::pipe()
            .atomic()
            .del(design_key(id))
            .ignore()
            .zrem(author_key(&record.author), id)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete_by_author(&self, author: &str) -> Result<usize, StudioError> {
        let mut conn = self.conn.clone();
        let ids: Vec<u64> = conn.zrange(author_key(author), 0, -1).await?;
        if ids.is_empty() {
            return Ok(0);
        }
        let keys: Vec<String> = ids.iter().map(|id| design_key(*id)).collect();

        redis::pipe()
            .atomic()
            .del(keys)
            .ignore()
            .del(author_key(author))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(ids.len())
    }
}
