// src/services/rate_limit.rs
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub per_ip_limit: u32,
    pub window_seconds: u32,
    pub whitelist_ips: Vec<String>,
    /// Key on `X-Forwarded-For` / `X-Real-IP` instead of the peer address.
    /// Only safe behind a proxy that overwrites those headers.
    pub trust_proxy_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_ip_limit: 10,   // reset requests, confirmations and form posts per window
            window_seconds: 60,
            whitelist_ips: vec!["127.0.0.1".to_string(), "::1".to_string()],
            trust_proxy_headers: false,
        }
    }
}

impl RateLimitConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // RATE_LIMIT_ENABLED - set to "false" to disable rate limiting
        if let Ok(enabled) = env::var("RATE_LIMIT_ENABLED") {
            config.enabled = enabled.to_lowercase() != "false";
        }

        // RATE_LIMIT_PER_IP - requests per window per IP address
        if let Ok(limit) = env::var("RATE_LIMIT_PER_IP") {
            if let Ok(val) = limit.parse::<u32>() {
                config.per_ip_limit = val;
            }
        }

        // RATE_LIMIT_WINDOW_SECONDS - time window in seconds
        if let Ok(window) = env::var("RATE_LIMIT_WINDOW_SECONDS") {
            if let Ok(val) = window.parse::<u32>() {
                config.window_seconds = val;
            }
        }

        // RATE_LIMIT_WHITELIST_IPS - comma-separated list of whitelisted IPs
        if let Ok(whitelist) = env::var("RATE_LIMIT_WHITELIST_IPS") {
            config.whitelist_ips = whitelist
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // RATE_LIMIT_TRUST_PROXY - set to "true" when a reverse proxy sets X-Forwarded-For
        if let Ok(trust) = env::var("RATE_LIMIT_TRUST_PROXY") {
            config.trust_proxy_headers = trust.to_lowercase() == "true";
        }

        config
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds as u64)
    }
}

#[derive(Debug, Clone)]
struct WindowState {
    count: u32,
    window_start: Instant,
}

impl WindowState {
    fn new() -> Self {
        Self {
            count: 0,
            window_start: Instant::now(),
        }
    }

    fn reset(&mut self) {
        self.count = 1;
        self.window_start = Instant::now();
    }

    fn is_expired(&self, window_duration: Duration) -> bool {
        self.window_start.elapsed() > window_duration
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed,
    Limited { retry_after: u32 },
}

/// Fixed-window counter keyed by client IP.
#[derive(Debug, Clone)]
pub struct RateLimitService {
    config: RateLimitConfig,
    windows: Arc<RwLock<HashMap<String, WindowState>>>,
}

impl RateLimitService {
    pub fn new(config: RateLimitConfig) -> Self {
        info!(
            enabled = config.enabled,
            per_ip_limit = config.per_ip_limit,
            window_seconds = config.window_seconds,
            whitelist_ips = ?config.whitelist_ips,
            "Initializing RateLimitService"
        );
        Self {
            config,
            windows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub async fn check(&self, ip_address: Option<&str>) -> RateLimitResult {
        if !self.config.enabled {
            return RateLimitResult::Allowed;
        }

        let key = match ip_address {
            Some(ip) if self.config.whitelist_ips.iter().any(|w| w == ip) => {
                return RateLimitResult::Allowed;
            }
            Some(ip) => format!("ip:{}", ip),
            None => "ip:unknown".to_string(),
        };

        let window_duration = self.config.window();
        let mut windows = self.windows.write().await;

        let state = windows.entry(key).or_insert_with(WindowState::new);

        if state.is_expired(window_duration) {
            state.reset();
            return RateLimitResult::Allowed;
        }

        if state.count >= self.config.per_ip_limit {
            let elapsed = state.window_start.elapsed().as_secs() as u32;
            let retry_after = self.config.window_seconds.saturating_sub(elapsed).max(1);
            warn!(ip_address = ?ip_address, retry_after, "Rate limit exceeded");
            return RateLimitResult::Limited { retry_after };
        }

        state.count += 1;
        RateLimitResult::Allowed
    }

    /// Clean up expired entries (called periodically from main)
    pub async fn cleanup_expired(&self) {
        let window_duration = self.config.window();
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, state| !state.is_expired(window_duration));
        let removed = before - windows.len();
        if removed > 0 {
            info!(removed, "Cleaned up expired rate limit entries");
        }
    }
}
