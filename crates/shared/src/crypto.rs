//! Random share tokens.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};

/// Number of random bytes in a share token (256 bits).
pub const SHARE_TOKEN_BYTES: usize = 32;

/// Generates a URL-safe random token from `bytes` bytes of OS randomness.
///
/// The token is unpadded base64url, so 32 bytes become 43 characters.
pub fn generate_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Generates a share token with the default entropy.
pub fn generate_share_token() -> String {
    generate_token(SHARE_TOKEN_BYTES)
}

/// Returns the first characters of a token, safe to put in logs.
pub fn token_prefix(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(8)
        .map(|(idx, _)| idx)
        .unwrap_or(token.len());
    &token[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_share_token_length_and_alphabet() {
        let token = generate_share_token();
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_share_tokens_are_unique() {
        let tokens: HashSet<String> = (0..200).map(|_| generate_share_token()).collect();
        assert_eq!(tokens.len(), 200);
    }

    #[test]
    fn test_token_prefix() {
        assert_eq!(token_prefix("abcdefghijkl"), "abcdefgh");
        assert_eq!(token_prefix("abc"), "abc");
        assert_eq!(token_prefix(""), "");
    }
}
