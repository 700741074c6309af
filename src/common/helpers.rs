// Helper functions for safe logging and input normalization

/// Masks email addresses for safe logging
/// Prevents sensitive data exposure while preserving debugging utility
///
/// # Example
/// ```ignore
/// let masked = safe_email_log("user@example.com");
/// // Returns: "u***@example.com"
/// ```
pub fn safe_email_log(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {
            let first: String = local.chars().take(1).collect();
            format!("{}***@{}", first, domain)
        }
        _ => "***@***.***".to_string(),
    }
}

/// Masks identifiers (OAuth state, customer ids) for safe logging.
/// Shows only the first and last 4 characters. Never use on raw secrets.
pub fn safe_token_log(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() > 12 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "***".to_string()
    }
}

/// Canonical form used as the account lookup key.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
