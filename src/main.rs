// src/main.rs
use axum::{extract::Extension, middleware, Router};
use dotenv::dotenv;
use reqwest::Client;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::PathBuf;
use std::time::Duration;
use std::{net::SocketAddr, str::FromStr, sync::Arc};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// MODULE IMPORTS
// ============================================================================

mod accounts;
mod auth;
mod billing;
mod common;
mod forms;
mod linking;
mod logging_middleware;
mod password_reset;
mod rate_limit_middleware;
mod services;

#[cfg(test)]
mod test_support;

// ============================================================================
// COMMON IMPORTS
// ============================================================================

use accounts::{CredentialStore, SqliteCredentialStore};
use billing::BillingService;
use common::config::AppConfig;
use common::{AppState, Clock, SystemClock};
use linking::JiraLinkService;
use password_reset::PasswordResetService;
use services::email::{DisabledNotificationSender, SesNotificationSender};
use services::identity::HostedIdentityProvider;
use services::jira::HttpJiraClient;
use services::rate_limit::RateLimitConfig;
use services::stripe::StripeClient;
use services::{NotificationSender, RateLimitService, TokenCipher};

/// Scheme and host of a URL, as used for `postMessage` target origins.
fn origin_of(url: &str) -> String {
    match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            let host_end = rest.find('/').unwrap_or(rest.len());
            format!("{}{}", &url[..scheme_end + 3], &rest[..host_end])
        }
        None => url.trim_end_matches('/').to_string(),
    }
}

// ============================================================================
// MAIN APPLICATION ENTRY POINT
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // ========================================================================
    // ENVIRONMENT CONFIGURATION
    // ========================================================================

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration, refusing to start");
            return Err(e.into());
        }
    };

    // ========================================================================
    // DATABASE SETUP
    // ========================================================================

    let database_url = &config.server.database_url;
    if let Some(path_part) = database_url.strip_prefix("sqlite://") {
        let path_without_params = path_part.split('?').next().unwrap_or("");
        if !path_without_params.is_empty() && !path_without_params.starts_with(':') {
            let db_path = PathBuf::from(path_without_params);
            if let Some(parent) = db_path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }
    }

    let connect_options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new()
        .connect_with(connect_options)
        .await?;

    common::migrations::run_migrations(&pool).await?;

    // ========================================================================
    // SERVICE INITIALIZATION
    // ========================================================================

    let http_client = Client::builder()
        .timeout(config.provider_timeout)
        .connect_timeout(Duration::from_secs(5))
        .build()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn CredentialStore> = Arc::new(SqliteCredentialStore::new(pool.clone()));

    let cipher = Arc::new(TokenCipher::from_key(&config.encryption_key)?);
    info!("TokenCipher initialized");

    let notifier: Arc<dyn NotificationSender> = match &config.mail {
        Some(mail) => {
            info!(region = %mail.region, "SES notification sender initialized");
            Arc::new(SesNotificationSender::new(mail, config.provider_timeout).await)
        }
        None => {
            warn!("AWS_SES_FROM_EMAIL not set, outgoing email is disabled");
            Arc::new(DisabledNotificationSender)
        }
    };

    let identity = Arc::new(HostedIdentityProvider::new(
        http_client.clone(),
        config.identity.clone(),
    ));
    let jira_client = Arc::new(HttpJiraClient::new(http_client.clone(), config.jira.clone()));
    let stripe_client = Arc::new(StripeClient::new(http_client, config.stripe.clone()));

    let password_reset = Arc::new(PasswordResetService::new(
        store.clone(),
        notifier,
        identity,
        clock.clone(),
        config.reset.clone(),
    ));
    info!("PasswordResetService initialized");

    let jira_link = Arc::new(JiraLinkService::new(
        store.clone(),
        jira_client,
        cipher,
        clock.clone(),
        config.jira.clone(),
    ));
    JiraLinkService::start_session_purge_task(jira_link.clone());
    info!("JiraLinkService initialized, session purge task started");

    let billing = Arc::new(BillingService::new(store.clone(), stripe_client, clock.clone()));
    info!("BillingService initialized");

    let rate_limit_service = Arc::new(RateLimitService::new(RateLimitConfig::from_env()));
    {
        let limiter = rate_limit_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            loop {
                interval.tick().await;
                limiter.cleanup_expired().await;
            }
        });
    }
    info!("RateLimitService initialized");

    // ========================================================================
    // APPLICATION STATE
    // ========================================================================

    let app_state = AppState {
        db: pool,
        jwt_secret: config.server.jwt_secret.clone(),
        portal_origin: origin_of(&config.reset.portal_base_url),
        clock,
        store,
        password_reset,
        jira_link,
        billing,
        rate_limit_service: rate_limit_service.clone(),
    };

    let shared = Arc::new(RwLock::new(app_state));

    // ========================================================================
    // ROUTER COMPOSITION
    // ========================================================================

    let origins: Vec<axum::http::HeaderValue> = config
        .server
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let app = Router::new()
        // ====================================================================
        // AUTHENTICATION ROUTES (me, health)
        // ====================================================================
        .merge(auth::auth_routes())
        // ====================================================================
        // PASSWORD RESET ROUTES (public, rate limited)
        // ====================================================================
        .merge(password_reset::password_reset_routes())
        // ====================================================================
        // JIRA LINKING ROUTES
        // ====================================================================
        .merge(linking::linking_routes())
        // ====================================================================
        // BILLING ROUTES (including admin assignment)
        // ====================================================================
        .merge(billing::billing_routes())
        // ====================================================================
        // FORM ROUTES (public, rate limited)
        // ====================================================================
        .merge(forms::form_routes())
        // ====================================================================
        // MIDDLEWARE AND LAYERS
        // ====================================================================
        .layer(middleware::from_fn(logging_middleware::log_request_response))
        .layer(Extension(rate_limit_service))
        .layer(Extension(shared))
        .layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::AUTHORIZATION,
                    axum::http::HeaderName::from_static("x-request-id"),
                ])
                .allow_credentials(true),
        )
        .layer(TraceLayer::new_for_http());

    // ========================================================================
    // SERVER STARTUP
    // ========================================================================

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::origin_of;

    #[test]
    fn test_origin_strips_path() {
        assert_eq!(origin_of("https://portal.example.com/app/"), "https://portal.example.com");
        assert_eq!(origin_of("http://localhost:3000"), "http://localhost:3000");
    }
}
