//! HMAC verification for inbound gateway webhooks.
//!
//! The gateway signs the exact raw bytes of the request body with a shared secret. Verification must therefore
//! operate on those raw bytes as received; re-serializing a parsed structure changes the byte layout and causes
//! false rejections. The comparison is constant-time via [`Mac::verify_slice`].

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the HMAC-SHA256 of `payload` under `secret`. Used by test fixtures and outbound tooling to produce
/// signatures the gateway would.
pub fn calculate_webhook_hmac(secret: &str, payload: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Verify `signature` (raw MAC bytes) against the HMAC-SHA256 of `payload` under `secret`, in constant time.
/// Any mismatch must prevent all downstream mutation; callers reject the request outright.
pub fn verify_webhook_signature(secret: &str, payload: &[u8], signature: &[u8]) -> bool {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(payload);
    mac.verify_slice(signature).is_ok()
}

#[cfg(test)]
mod test {
    use super::*;

    const SECRET: &str = "spg-test-hmac-secret";

    #[test]
    fn valid_signature_verifies() {
        let payload = br#"{"event_type":"payment.captured","gateway_order_id":"gw_1"}"#;
        let sig = calculate_webhook_hmac(SECRET, payload);
        assert!(verify_webhook_signature(SECRET, payload, &sig));
    }

    #[test]
    fn one_byte_mutation_fails_verification() {
        let payload = br#"{"event_type":"payment.captured","gateway_order_id":"gw_1"}"#.to_vec();
        let sig = calculate_webhook_hmac(SECRET, &payload);
        let mut tampered = payload.clone();
        tampered[10] ^= 0x01;
        assert!(!verify_webhook_signature(SECRET, &tampered, &sig));
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let payload = b"payload bytes";
        let sig = calculate_webhook_hmac(SECRET, payload);
        assert!(!verify_webhook_signature("some-other-secret", payload, &sig));
    }

    #[test]
    fn truncated_signature_fails_verification() {
        let payload = b"payload bytes";
        let sig = calculate_webhook_hmac(SECRET, payload);
        assert!(!verify_webhook_signature(SECRET, payload, &sig[..16]));
        assert!(!verify_webhook_signature(SECRET, payload, b""));
    }
}
