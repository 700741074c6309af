//! OAuth authorization code + PKCE (RFC 7636) helpers for the Atlassian flow.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::common::config::JiraConfig;

fn random_urlsafe() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// 32 random bytes, base64url without padding (43 chars).
pub fn generate_code_verifier() -> String {
    random_urlsafe()
}

/// code_challenge = base64url_nopad(sha256(verifier)).
pub fn compute_code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Anti-CSRF `state`, same shape as the verifier.
pub fn generate_state() -> String {
    random_urlsafe()
}

/// Atlassian consent-screen URL for this handshake.
pub fn build_authorization_url(config: &JiraConfig, state: &str, code_challenge: &str) -> String {
    format!(
        "{base}/authorize?audience=api.atlassian.com\
         &client_id={client_id}\
         &scope={scope}\
         &redirect_uri={redirect_uri}\
         &state={state}\
         &response_type=code\
         &prompt=consent\
         &code_challenge={code_challenge}\
         &code_challenge_method=S256",
        base = config.auth_base_url.trim_end_matches('/'),
        client_id = urlencoding::encode(&config.client_id),
        scope = urlencoding::encode(&config.scopes),
        redirect_uri = urlencoding::encode(&config.redirect_uri),
        state = urlencoding::encode(state),
        code_challenge = urlencoding::encode(code_challenge),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_jira_config;

    #[test]
    fn test_code_verifier_length_and_alphabet() {
        let v = generate_code_verifier();
        assert_eq!(v.len(), 43);
        assert!(v
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_code_challenge_matches_rfc7636_vector() {
        // RFC 7636 appendix B
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            compute_code_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_state_is_unique() {
        assert_ne!(generate_state(), generate_state());
    }

    #[test]
    fn test_authorization_url_carries_pkce_params() {
        let url = build_authorization_url(&test_jira_config(), "state-xyz", "challenge-abc");

        assert!(url.starts_with("https://auth.atlassian.com/authorize?audience=api.atlassian.com&"));
        assert!(url.contains("client_id=jira-client-id"));
        assert!(url.contains("state=state-xyz"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("code_challenge=challenge-abc"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains(
            "redirect_uri=https%3A%2F%2Fapi.example.com%2Fapi%2Fintegrations%2Fjira%2Fcallback"
        ));
        assert!(url.contains("scope=read%3Ajira-work%20write%3Ajira-work"));
    }
}
