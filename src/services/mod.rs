// src/services/mod.rs
pub mod image_processor;
pub mod llm_service;
#[cfg(test)]
pub mod memory_store;
pub mod redis_service;

pub use image_processor::ImageProcessor;
pub use llm_service::{GeminiClient, GenerationJob, GenerativeClient};
pub use redis_service::{DesignStore, RedisDesignStore};
