//! Environment-driven configuration.
//!
//! Every integration the portal talks to must be configured before the server
//! starts; a missing credential is reported once, at startup, as a
//! [`ConfigError`] rather than failing individual requests later.

use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("Environment variable {name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub database_url: String,
    pub cors_origins: Vec<String>,
    pub jwt_secret: String,
}

#[derive(Debug, Clone)]
pub struct ResetConfig {
    /// Base URL of the portal front end; reset links point at `{base}/reset-password`.
    pub portal_base_url: String,
    pub token_ttl_minutes: i64,
    pub min_password_length: usize,
    /// Send the reset email on a spawned task so response time does not depend
    /// on mail latency.
    pub background_dispatch: bool,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            portal_base_url: "http://localhost:3000".to_string(),
            token_ttl_minutes: 30,
            min_password_length: 8,
            background_dispatch: true,
        }
    }
}

impl ResetConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = optional("PORTAL_BASE_URL") {
            config.portal_base_url = url.trim_end_matches('/').to_string();
        }

        config.token_ttl_minutes = parse_or("RESET_TOKEN_TTL_MINUTES", config.token_ttl_minutes)?;
        if config.token_ttl_minutes <= 0 {
            return Err(ConfigError::Invalid {
                name: "RESET_TOKEN_TTL_MINUTES",
                reason: "must be positive".to_string(),
            });
        }

        config.min_password_length =
            parse_or("RESET_MIN_PASSWORD_LENGTH", config.min_password_length)?;
        // 8 is the floor; configuration may only make the policy stricter
        if config.min_password_length < 8 {
            return Err(ConfigError::Invalid {
                name: "RESET_MIN_PASSWORD_LENGTH",
                reason: "must be at least 8".to_string(),
            });
        }

        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct JiraConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: String,
    pub auth_base_url: String,
    pub api_base_url: String,
    pub session_ttl_minutes: i64,
}

impl JiraConfig {
    pub const DEFAULT_SCOPES: &'static str =
        "read:jira-work write:jira-work read:jira-user offline_access";

    pub fn from_env() -> Result<Self, ConfigError> {
        let session_ttl_minutes = parse_or("OAUTH_SESSION_TTL_MINUTES", 10i64)?;
        if session_ttl_minutes <= 0 {
            return Err(ConfigError::Invalid {
                name: "OAUTH_SESSION_TTL_MINUTES",
                reason: "must be positive".to_string(),
            });
        }

        Ok(Self {
            client_id: required("JIRA_CLIENT_ID")?,
            client_secret: required("JIRA_CLIENT_SECRET")?,
            redirect_uri: required("JIRA_REDIRECT_URI")?,
            scopes: optional("JIRA_SCOPES").unwrap_or_else(|| Self::DEFAULT_SCOPES.to_string()),
            auth_base_url: optional("JIRA_AUTH_BASE_URL")
                .unwrap_or_else(|| "https://auth.atlassian.com".to_string()),
            api_base_url: optional("JIRA_API_BASE_URL")
                .unwrap_or_else(|| "https://api.atlassian.com".to_string()),
            session_ttl_minutes,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub api_base_url: String,
}

impl StripeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret_key = required("STRIPE_SECRET_KEY")?;
        if !secret_key.starts_with("sk_") && !secret_key.starts_with("rk_") {
            return Err(ConfigError::Invalid {
                name: "STRIPE_SECRET_KEY",
                reason: "expected a secret (sk_) or restricted (rk_) key".to_string(),
            });
        }

        Ok(Self {
            secret_key,
            api_base_url: optional("STRIPE_API_BASE_URL")
                .unwrap_or_else(|| "https://api.stripe.com".to_string()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub api_url: String,
    pub service_key: String,
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: required("IDENTITY_API_URL")?
                .trim_end_matches('/')
                .to_string(),
            service_key: required("IDENTITY_SERVICE_KEY")?,
        })
    }
}

/// SES is optional; without it reset emails are logged as skipped.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub from_email: String,
    pub region: String,
}

impl MailConfig {
    pub fn from_env() -> Option<Self> {
        let from_email = optional("AWS_SES_FROM_EMAIL")?;
        let region = optional("AWS_SES_REGION")
            .or_else(|| optional("AWS_REGION"))
            .unwrap_or_else(|| "us-east-1".to_string());
        Some(Self { from_email, region })
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub reset: ResetConfig,
    pub jira: JiraConfig,
    pub stripe: StripeConfig,
    pub identity: IdentityConfig,
    pub mail: Option<MailConfig>,
    pub encryption_key: String,
    pub provider_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let cors_origins = optional("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000,http://localhost:5173".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let server = ServerConfig {
            port: parse_or("PORT", 8080u16)?,
            database_url: optional("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://portal.db".to_string()),
            cors_origins,
            jwt_secret: required("JWT_SECRET")?,
        };

        let timeout_secs = parse_or("PROVIDER_TIMEOUT_SECS", 20u64)?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "PROVIDER_TIMEOUT_SECS",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            server,
            reset: ResetConfig::from_env()?,
            jira: JiraConfig::from_env()?,
            stripe: StripeConfig::from_env()?,
            identity: IdentityConfig::from_env()?,
            mail: MailConfig::from_env(),
            encryption_key: required("TOKEN_ENCRYPTION_KEY")?,
            provider_timeout: Duration::from_secs(timeout_secs),
        })
    }
}
