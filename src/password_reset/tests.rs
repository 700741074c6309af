//! Tests for password reset module
//!
//! These tests drive the reset flow against an in-memory store with a manual
//! clock, a recording mail sender and a fake identity provider.

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::accounts::{CredentialStore, Role, SqliteCredentialStore};
    use crate::common::clock::ManualClock;
    use crate::common::{ApiError, Validator};
    use crate::services::token_codec::hash_secret;
    use crate::test_support::{
        seed_account, start_time, test_pool, test_reset_config, test_store,
        CountingCredentialStore, MockIdentityProvider, RecordingNotificationSender,
    };
    use chrono::Duration;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    struct Fixture {
        store: Arc<SqliteCredentialStore>,
        notifier: Arc<RecordingNotificationSender>,
        identity: Arc<MockIdentityProvider>,
        clock: Arc<ManualClock>,
        service: Arc<PasswordResetService>,
    }

    async fn fixture() -> Fixture {
        let store = test_store().await;
        let notifier = Arc::new(RecordingNotificationSender::default());
        let identity = Arc::new(MockIdentityProvider::default());
        let clock = Arc::new(ManualClock::new(start_time()));
        let service = Arc::new(PasswordResetService::new(
            store.clone(),
            notifier.clone(),
            identity.clone(),
            clock.clone(),
            test_reset_config(),
        ));
        Fixture {
            store,
            notifier,
            identity,
            clock,
            service,
        }
    }

    /// Pulls the raw secret out of the most recent reset email.
    fn last_secret(notifier: &RecordingNotificationSender) -> String {
        let sent = notifier.sent();
        let email = sent
            .iter()
            .rev()
            .find(|e| e.text_body.contains("token="))
            .expect("no reset email sent");
        let start = email.text_body.find("token=").unwrap() + "token=".len();
        email.text_body[start..start + 64].to_string()
    }

    async fn pending_token_count(store: &SqliteCredentialStore) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE reset_token_hash IS NOT NULL")
            .fetch_one(store.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_email_succeeds_silently() {
        let fx = fixture().await;
        seed_account(fx.store.as_ref(), "known@example.com", Role::Client).await;

        fx.service
            .request_reset("nobody@example.com")
            .await
            .expect("unknown email must not error");

        assert!(fx.notifier.sent().is_empty());
        assert_eq!(pending_token_count(&fx.store).await, 0);
    }

    #[tokio::test]
    async fn test_known_and_unknown_email_write_alike() {
        let store = Arc::new(CountingCredentialStore::new(SqliteCredentialStore::new(
            test_pool().await,
        )));
        let notifier = Arc::new(RecordingNotificationSender::default());
        let service = PasswordResetService::new(
            store.clone(),
            notifier.clone(),
            Arc::new(MockIdentityProvider::default()),
            Arc::new(ManualClock::new(start_time())),
            test_reset_config(),
        );
        seed_account(store.as_ref(), "known@example.com", Role::Client).await;

        service.request_reset("nobody@example.com").await.unwrap();
        assert_eq!(store.reset_token_writes.load(Ordering::SeqCst), 1);
        assert_eq!(pending_token_count(&store.inner).await, 0);
        assert!(notifier.sent().is_empty());

        service.request_reset("known@example.com").await.unwrap();
        assert_eq!(store.reset_token_writes.load(Ordering::SeqCst), 2);
        assert_eq!(pending_token_count(&store.inner).await, 1);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_email_is_rejected() {
        let fx = fixture().await;
        let result = fx.service.request_reset("not-an-email").await;
        assert!(matches!(result, Err(ResetError::InvalidEmail)));
    }

    #[tokio::test]
    async fn test_request_stores_hash_and_emails_link() {
        let fx = fixture().await;
        let account = seed_account(fx.store.as_ref(), "ada@example.com", Role::Client).await;

        fx.service.request_reset("  ADA@Example.com ").await.unwrap();

        let sent = fx.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ada@example.com");
        assert!(sent[0]
            .text_body
            .contains("https://portal.example.com/reset-password?token="));

        let secret = last_secret(&fx.notifier);
        let (stored_hash, expires_at): (String, i64) = sqlx::query_as(
            "SELECT reset_token_hash, reset_token_expires_at FROM accounts WHERE id = ?",
        )
        .bind(&account.id)
        .fetch_one(fx.store.pool())
        .await
        .unwrap();

        assert_ne!(stored_hash, secret);
        assert_eq!(stored_hash, hash_secret(&secret));
        assert_eq!(
            expires_at,
            (start_time() + Duration::minutes(30)).timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_token_is_single_use() {
        let fx = fixture().await;
        let account = seed_account(fx.store.as_ref(), "ada@example.com", Role::Client).await;
        fx.service.request_reset("ada@example.com").await.unwrap();
        let secret = last_secret(&fx.notifier);

        fx.service
            .confirm_reset(&secret, "correct horse battery")
            .await
            .unwrap();
        assert_eq!(
            fx.identity.credential_for(&account.id).as_deref(),
            Some("correct horse battery")
        );

        let second = fx.service.confirm_reset(&secret, "another password").await;
        assert!(matches!(second, Err(ResetError::InvalidOrExpiredToken)));
        assert_eq!(fx.identity.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_token_valid_just_before_ttl() {
        let fx = fixture().await;
        seed_account(fx.store.as_ref(), "ada@example.com", Role::Client).await;
        fx.service.request_reset("ada@example.com").await.unwrap();
        let secret = last_secret(&fx.notifier);

        fx.clock.advance(Duration::minutes(29));
        assert!(fx
            .service
            .confirm_reset(&secret, "longenoughpassword")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_token_expires_after_ttl() {
        let fx = fixture().await;
        seed_account(fx.store.as_ref(), "ada@example.com", Role::Client).await;
        fx.service.request_reset("ada@example.com").await.unwrap();
        let secret = last_secret(&fx.notifier);

        fx.clock.advance(Duration::minutes(31));
        let result = fx.service.confirm_reset(&secret, "longenoughpassword").await;
        assert!(matches!(result, Err(ResetError::InvalidOrExpiredToken)));
        assert_eq!(fx.identity.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_new_request_supersedes_previous_token() {
        let fx = fixture().await;
        seed_account(fx.store.as_ref(), "ada@example.com", Role::Client).await;

        fx.service.request_reset("ada@example.com").await.unwrap();
        let first = last_secret(&fx.notifier);
        fx.service.request_reset("ada@example.com").await.unwrap();
        let second = last_secret(&fx.notifier);
        assert_ne!(first, second);

        let stale = fx.service.confirm_reset(&first, "longenoughpassword").await;
        assert!(matches!(stale, Err(ResetError::InvalidOrExpiredToken)));

        assert!(fx
            .service
            .confirm_reset(&second, "longenoughpassword")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_wrong_then_weak_then_valid_password() {
        let fx = fixture().await;
        let account = seed_account(fx.store.as_ref(), "ada@example.com", Role::Client).await;
        fx.service.request_reset("ada@example.com").await.unwrap();
        let secret = last_secret(&fx.notifier);

        let wrong = fx
            .service
            .confirm_reset(&"0".repeat(64), "longenoughpassword")
            .await;
        assert!(matches!(wrong, Err(ResetError::InvalidOrExpiredToken)));

        let weak = fx.service.confirm_reset(&secret, "short").await;
        assert!(matches!(weak, Err(ResetError::WeakPassword(8))));

        fx.service
            .confirm_reset(&secret, "longenoughpassword")
            .await
            .expect("valid secret and strong password should succeed");
        assert_eq!(
            fx.identity.credential_for(&account.id).as_deref(),
            Some("longenoughpassword")
        );
    }

    #[tokio::test]
    async fn test_identity_failure_leaves_token_usable() {
        let fx = fixture().await;
        let account = seed_account(fx.store.as_ref(), "ada@example.com", Role::Client).await;
        fx.service.request_reset("ada@example.com").await.unwrap();
        let secret = last_secret(&fx.notifier);

        fx.identity.fail.store(true, Ordering::SeqCst);
        let failed = fx.service.confirm_reset(&secret, "longenoughpassword").await;
        assert!(matches!(failed, Err(ResetError::CredentialUpdateFailed(_))));

        fx.identity.fail.store(false, Ordering::SeqCst);
        fx.service
            .confirm_reset(&secret, "longenoughpassword")
            .await
            .expect("released token should be redeemable");
        assert_eq!(
            fx.identity.credential_for(&account.id).as_deref(),
            Some("longenoughpassword")
        );
    }

    #[tokio::test]
    async fn test_completed_reset_clears_hash_and_notifies() {
        let fx = fixture().await;
        seed_account(fx.store.as_ref(), "ada@example.com", Role::Client).await;
        fx.service.request_reset("ada@example.com").await.unwrap();
        let secret = last_secret(&fx.notifier);

        fx.service
            .confirm_reset(&secret, "longenoughpassword")
            .await
            .unwrap();

        assert_eq!(pending_token_count(&fx.store).await, 0);
        let sent = fx.notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].subject, "Your portal password was changed");
    }

    #[tokio::test]
    async fn test_mail_failure_is_not_surfaced() {
        let fx = fixture().await;
        seed_account(fx.store.as_ref(), "ada@example.com", Role::Client).await;
        fx.notifier.fail.store(true, Ordering::SeqCst);

        assert!(fx.service.request_reset("ada@example.com").await.is_ok());
        assert_eq!(pending_token_count(&fx.store).await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_confirmations_have_one_winner() {
        let fx = fixture().await;
        seed_account(fx.store.as_ref(), "ada@example.com", Role::Client).await;
        fx.service.request_reset("ada@example.com").await.unwrap();
        let secret = last_secret(&fx.notifier);

        let mut handles = Vec::new();
        for _ in 0..50 {
            let service = fx.service.clone();
            let secret = secret.clone();
            handles.push(tokio::spawn(async move {
                service.confirm_reset(&secret, "longenoughpassword").await
            }));
        }

        let mut successes = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => successes += 1,
                Err(ResetError::InvalidOrExpiredToken) => rejected += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(rejected, 49);
        assert_eq!(fx.identity.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_store_is_reachable_through_trait_object() {
        let fx = fixture().await;
        let store: Arc<dyn CredentialStore> = fx.store.clone();
        let account = seed_account(store.as_ref(), "ada@example.com", Role::Client).await;
        let found = store.find_account_by_email("ADA@example.com").await.unwrap();
        assert_eq!(found.map(|a| a.id), Some(account.id));
    }

    #[test]
    fn test_reset_errors_map_to_api_codes() {
        assert_eq!(
            ApiError::from(ResetError::InvalidOrExpiredToken).code(),
            "INVALID_OR_EXPIRED_TOKEN"
        );
        assert_eq!(ApiError::from(ResetError::WeakPassword(8)).code(), "WEAK_PASSWORD");
        assert_eq!(ApiError::from(ResetError::InvalidEmail).code(), "BAD_REQUEST");
    }

    #[test]
    fn test_request_payload_validation() {
        let empty = models::RequestResetPayload {
            email: "  ".to_string(),
        };
        assert!(!empty.validate(&empty).is_valid);

        let ok = models::RequestResetPayload {
            email: "user@example.com".to_string(),
        };
        assert!(ok.validate(&ok).is_valid);
    }

    #[test]
    fn test_confirm_payload_uses_camel_case() {
        let payload: models::ConfirmResetPayload =
            serde_json::from_str(r#"{"token": "abc", "newPassword": "longenoughpassword"}"#)
                .unwrap();
        assert_eq!(payload.new_password, "longenoughpassword");
        assert!(!format!("{:?}", payload).contains("longenoughpassword"));
    }
}
