// generate_key.rs
// Utility to generate a new token encryption key

#[path = "services/encryption.rs"]
#[allow(dead_code)]
mod encryption;

use encryption::TokenCipher;

fn main() {
    println!("Generating new AES-256 token encryption key...\n");

    let key = TokenCipher::generate_key();

    println!("Add this to your .env file:");
    println!("-------------------------------------------------");
    println!("TOKEN_ENCRYPTION_KEY={}", key);
    println!("-------------------------------------------------");
    println!("\nIMPORTANT:");
    println!("  - Never commit this key to version control");
    println!("  - Linked Jira accounts must reconnect if the key is lost or rotated");
}
