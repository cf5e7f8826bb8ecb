// src/services/memory_store.rs

use super::redis_service::DesignStore;
use crate::errors::StudioError;
use crate::models::{DesignDna, NewDesignDna};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MemoryDesignStore {
    records: Mutex<(u64, Vec<DesignDna>)>,
    failing: AtomicBool,
}

impl MemoryDesignStore {
    /// Makes every following call fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StudioError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StudioError::Redis("store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DesignStore for MemoryDesignStore {
    async fn save(&self, design: NewDesignDna) -> Result<DesignDna, StudioError> {
        self.check()?;
        let mut guard = self.records.lock().await;
        guard.0 += 1;
        let record = design.with_id(guard.0);
        guard.1.push(record.clone());
        Ok(record)
    }

    async fn list_by_author(&self, author: &str) -> Result<Vec<DesignDna>, StudioError> {
        self.check()?;
        let guard = self.records.lock().await;
        let mut designs: Vec<DesignDna> = guard
            .1
            .iter()
            .filter(|d| d.author == author)
            .cloned()
            .collect();
        designs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(designs)
    }

    async fn delete(&self, id: u64, author: &str) -> Result<(), StudioError> {
        self.check()?;
        let mut guard = self.records.lock().await;
        let before = guard.1.len();
        guard.1.retain(|d| d.id != id || d.author != author);
        if guard.1.len() == before {
            return Err(StudioError::NotFound(format!("Design {}", id)));
        }
        Ok(())
    }

    async fn delete_by_author(&self, author: &str) -> Result<usize, StudioError> {
        self.check()?;
        let mut guard = self.records.lock().await;
        let before = guard.1.len();
        guard.1.retain(|d| d.author != author);
        Ok(before - guard.1.len())
    }
}
