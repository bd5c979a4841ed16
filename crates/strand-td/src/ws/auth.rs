//! Session authentication.
//!
//! The service authenticates a connection with an HMAC-SHA256 signature of a
//! fresh nonce, keyed with the API secret. A new nonce is generated for every
//! connection attempt so a reconnect never replays an old handshake.

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute an HMAC-SHA256 signature and return it as a lowercase hex string.
///
/// # Arguments
///
/// * `secret` — the API secret key (UTF-8 string).
/// * `message` — the data to sign (the nonce).
pub fn hmac_sha256_sign(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(message.as_bytes());
    let result = mac.finalize();
    hex::encode(result.into_bytes())
}

/// Millisecond timestamp used as the auth nonce.
pub fn nonce() -> String {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    ms.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_sha256_known_vector() {
        // RFC 4231 test case 2.
        let sig = hmac_sha256_sign("Jefe", "what do ya want for nothing?");
        assert_eq!(sig, "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843");
    }

    #[test]
    fn nonce_is_numeric_and_monotonic_enough() {
        let a: u128 = nonce().parse().unwrap();
        let b: u128 = nonce().parse().unwrap();
        assert!(b >= a);
    }
}
