//! Sealed proof that a `state` was issued in fallback mode.
//!
//! When the session row cannot be written at initiate, the verifier goes back
//! to the client together with a ticket sealed under the token cipher. The
//! ticket binds the state, the account and a digest of the verifier, so the
//! authenticated callback only accepts a client-held verifier for a handshake
//! this server actually started without a session.

use chrono::{DateTime, Utc};

use crate::accounts::models::{from_millis, to_millis};
use crate::services::encryption::CipherError;
use crate::services::token_codec::{constant_time_equals, hash_secret};
use crate::services::TokenCipher;

const TICKET_CONTEXT: &str = "jira-oauth-fallback";

#[derive(Debug, Clone, PartialEq)]
pub struct FallbackTicket {
    pub state: String,
    pub account_id: String,
    pub verifier_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl FallbackTicket {
    pub fn issue(
        cipher: &TokenCipher,
        state: &str,
        account_id: &str,
        code_verifier: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, CipherError> {
        let body = format!(
            "{}|{}|{}|{}",
            state,
            account_id,
            hash_secret(code_verifier),
            to_millis(expires_at)
        );
        cipher.seal(&body, TICKET_CONTEXT)
    }

    /// `None` for anything this cipher did not seal.
    pub fn open(cipher: &TokenCipher, ticket: &str) -> Option<Self> {
        let body = cipher.open(ticket, TICKET_CONTEXT).ok()?;
        let mut parts = body.splitn(4, '|');
        let state = parts.next()?.to_string();
        let account_id = parts.next()?.to_string();
        let verifier_hash = parts.next()?.to_string();
        let expires_at = from_millis(parts.next()?.parse().ok()?);
        Some(Self {
            state,
            account_id,
            verifier_hash,
            expires_at,
        })
    }

    pub fn vouches_for(
        &self,
        state: &str,
        account_id: &str,
        code_verifier: &str,
        now: DateTime<Utc>,
    ) -> bool {
        constant_time_equals(&self.state, state)
            && self.account_id == account_id
            && constant_time_equals(&self.verifier_hash, &hash_secret(code_verifier))
            && now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{start_time, test_cipher};
    use chrono::Duration;

    #[test]
    fn test_ticket_opens_with_issuing_cipher_only() {
        let cipher = test_cipher();
        let expires = start_time() + Duration::minutes(10);
        let sealed = FallbackTicket::issue(&cipher, "state-1", "acct-1", "verifier", expires).unwrap();

        let ticket = FallbackTicket::open(&cipher, &sealed).unwrap();
        assert_eq!(ticket.state, "state-1");
        assert_eq!(ticket.account_id, "acct-1");
        assert_eq!(ticket.expires_at, expires);
        assert!(!sealed.contains("verifier"));

        let other = TokenCipher::from_key(&TokenCipher::generate_key()).unwrap();
        assert!(FallbackTicket::open(&other, &sealed).is_none());
        assert!(FallbackTicket::open(&cipher, "state-1|acct-1|x|0").is_none());
    }

    #[test]
    fn test_linkage_token_is_not_a_ticket() {
        let cipher = test_cipher();
        let sealed = cipher.seal("state-1|acct-1|x|9999999999999", "acct-1:jira").unwrap();
        assert!(FallbackTicket::open(&cipher, &sealed).is_none());
    }

    #[test]
    fn test_ticket_vouches_only_for_its_binding() {
        let cipher = test_cipher();
        let expires = start_time() + Duration::minutes(10);
        let sealed = FallbackTicket::issue(&cipher, "state-1", "acct-1", "verifier", expires).unwrap();
        let ticket = FallbackTicket::open(&cipher, &sealed).unwrap();
        let now = start_time();

        assert!(ticket.vouches_for("state-1", "acct-1", "verifier", now));
        assert!(!ticket.vouches_for("state-2", "acct-1", "verifier", now));
        assert!(!ticket.vouches_for("state-1", "acct-2", "verifier", now));
        assert!(!ticket.vouches_for("state-1", "acct-1", "guessed", now));
        assert!(!ticket.vouches_for("state-1", "acct-1", "verifier", expires));
    }
}
