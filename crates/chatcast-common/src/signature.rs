//! Webhook signature verification
//!
//! The messaging gateway signs every webhook delivery with HMAC-SHA256 over
//! the raw request body, sent as `X-Hub-Signature-256: sha256=<hex>`. The
//! check runs before any payload parsing and uses a constant-time compare.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the gateway's payload signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Verify a signed webhook payload.
///
/// Returns `true` only when the header is well-formed (`sha256=<hex>`) and
/// the HMAC over `body` with `secret` matches. Comparison is constant-time
/// via `Mac::verify_slice`.
pub fn verify_signature(secret: &str, body: &[u8], signature_header: &str) -> bool {
    let Some(hex_sig) = signature_header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Compute the signature header value for a payload.
///
/// Used by tests and by integrations that need to re-sign a payload.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_roundtrip() {
        let secret = "channel-app-secret";
        let body = br#"{"entry":[]}"#;

        let header = sign(secret, body);
        assert!(header.starts_with("sha256="));
        assert!(verify_signature(secret, body, &header));
    }

    #[test]
    fn test_rejects_wrong_secret() {
        let body = b"payload";
        let header = sign("right-secret", body);
        assert!(!verify_signature("wrong-secret", body, &header));
    }

    #[test]
    fn test_rejects_tampered_body() {
        let secret = "secret";
        let header = sign(secret, b"original");
        assert!(!verify_signature(secret, b"tampered", &header));
    }

    #[test]
    fn test_rejects_malformed_header() {
        let secret = "secret";
        let body = b"payload";
        assert!(!verify_signature(secret, body, ""));
        assert!(!verify_signature(secret, body, "sha1=abcd"));
        assert!(!verify_signature(secret, body, "sha256=not-hex"));
    }
}
