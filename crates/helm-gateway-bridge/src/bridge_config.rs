//! Bridge configuration and environment resolution.

use std::time::Duration;

use anyhow::Result;

const STORE_API_BASE_ENV: &str = "HELM_CHAT_API_BASE";
const STORE_API_BASE_FALLBACK_ENV: &str = "HELM_API_BASE";
const DEFAULT_STORE_API_BASE: &str = "http://127.0.0.1:3311";

pub const DEFAULT_SESSION_NAMESPACE: &str = "helm";
pub const DEFAULT_ASSISTANT_AUTHOR: &str = "agent";
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_COOLDOWN_WAIT_MS: u64 = 60_000;

#[derive(Debug, Clone)]
/// Tunables for the delivery bridge. Every duration has a production default;
/// tests shrink them freely.
pub struct DeliveryBridgeConfig {
    pub store_api_base: String,
    pub http_timeout: Duration,
    pub session_namespace: String,
    pub assistant_author: String,
    pub max_retry_attempts: u32,
    pub default_cooldown_wait_ms: u64,
    pub sweep_interval: Duration,
    pub stuck_scan_age: Duration,
    pub stuck_scan_limit: usize,
    pub processing_timeout: Duration,
    pub delivered_timeout: Duration,
    pub sent_retry_age: Duration,
    pub startup_recovery_delay: Duration,
    pub startup_recovery_age: Duration,
}

impl Default for DeliveryBridgeConfig {
    fn default() -> Self {
        Self {
            store_api_base: resolve_store_api_base(),
            http_timeout: Duration::from_secs(10),
            session_namespace: DEFAULT_SESSION_NAMESPACE.to_string(),
            assistant_author: DEFAULT_ASSISTANT_AUTHOR.to_string(),
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            default_cooldown_wait_ms: DEFAULT_COOLDOWN_WAIT_MS,
            sweep_interval: Duration::from_secs(30),
            stuck_scan_age: Duration::from_secs(60),
            stuck_scan_limit: 50,
            processing_timeout: Duration::from_secs(180),
            delivered_timeout: Duration::from_secs(30),
            sent_retry_age: Duration::from_secs(300),
            startup_recovery_delay: Duration::from_secs(5),
            startup_recovery_age: Duration::from_secs(300),
        }
    }
}

impl DeliveryBridgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.store_api_base.trim().is_empty() {
            anyhow::bail!("delivery bridge store api base must be non-empty");
        }
        if self.session_namespace.trim().is_empty() {
            anyhow::bail!("delivery bridge session namespace must be non-empty");
        }
        if self.sweep_interval.is_zero() {
            anyhow::bail!("delivery bridge sweep interval must be greater than zero");
        }
        if self.stuck_scan_limit == 0 {
            anyhow::bail!("delivery bridge stuck scan limit must be greater than zero");
        }
        Ok(())
    }
}

fn non_empty_env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Resolves the chat store base URL: first non-empty of `HELM_CHAT_API_BASE`
/// and `HELM_API_BASE`, else the local default.
pub fn resolve_store_api_base() -> String {
    non_empty_env_var(STORE_API_BASE_ENV)
        .or_else(|| non_empty_env_var(STORE_API_BASE_FALLBACK_ENV))
        .unwrap_or_else(|| DEFAULT_STORE_API_BASE.to_string())
}
