// src/config.rs
use crate::layout::mask::DEFAULT_MASK_WIDTH;
use log::warn;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model names used for each AI call.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub analysis: String,
    pub analysis_pro: String,
    pub image: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            analysis: "gemini-2.5-flash".to_string(),
            analysis_pro: "gemini-2.5-pro".to_string(),
            image: "gemini-3-pro-image-preview".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub redis_url: String,
    pub gemini_base_url: String,
    /// Credential used when a login does not bring its own.
    pub default_api_key: Option<String>,
    pub models: ModelConfig,
    pub session_idle_timeout: Duration,
    pub mask_width: u32,
    pub history_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND.to_string(),
            redis_url: DEFAULT_REDIS_URL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            default_api_key: None,
            models: ModelConfig::default(),
            session_idle_timeout: Duration::from_secs(30 * 60),
            mask_width: DEFAULT_MASK_WIDTH,
            history_limit: 100,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str, fallback: String| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
        };

        Self {
            bind_addr: text("ARTBOARD_BIND", defaults.bind_addr),
            redis_url: text("REDIS_URL", defaults.redis_url),
            gemini_base_url: text("GEMINI_BASE_URL", defaults.gemini_base_url),
            default_api_key: lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()),
            models: ModelConfig {
                analysis: text("ARTBOARD_ANALYSIS_MODEL", defaults.models.analysis),
                analysis_pro: text("ARTBOARD_ANALYSIS_MODEL_PRO", defaults.models.analysis_pro),
                image: text("ARTBOARD_IMAGE_MODEL", defaults.models.image),
            },
            session_idle_timeout: Duration::from_secs(parse_or(
                &lookup,
                "ARTBOARD_SESSION_IDLE_SECS",
                defaults.session_idle_timeout.as_secs(),
            )),
            mask_width: parse_or(&lookup, "ARTBOARD_MASK_WIDTH", defaults.mask_width),
            history_limit: parse_or(&lookup, "ARTBOARD_HISTORY_LIMIT", defaults.history_limit),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, fallback: T) -> T
where
    T: FromStr + Copy + PartialOrd + Default + std::fmt::Display,
{
    match lookup(key) {
        None => fallback,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) if value > T::default() => value,
            _ => {
                warn!("Ignoring invalid {}={:?}, using {}", key, raw, fallback);
                fallback
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.bind_addr, DEFAULT_BIND);
        assert_eq!(config.mask_width, 1024);
        assert_eq!(config.session_idle_timeout, Duration::from_secs(1800));
        assert!(config.default_api_key.is_none());
    }

    #[test]
    fn overrides_are_read() {
        let config = config_from(&[
            ("ARTBOARD_MASK_WIDTH", "2048"),
            ("GEMINI_API_KEY", "secret"),
            ("ARTBOARD_IMAGE_MODEL", "imagen"),
        ]);
        assert_eq!(config.mask_width, 2048);
        assert_eq!(config.default_api_key.as_deref(), Some("secret"));
        assert_eq!(config.models.image, "imagen");
    }

    #[test]
    fn malformed_numbers_fall_back() {
        let config = config_from(&[
            ("ARTBOARD_MASK_WIDTH", "wide"),
            ("ARTBOARD_HISTORY_LIMIT", "0"),
        ]);
        assert_eq!(config.mask_width, 1024);
        assert_eq!(config.history_limit, 100);
    }
}
