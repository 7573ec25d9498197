use std::{net::IpAddr, str::FromStr};

use actix_web::HttpRequest;
use log::{debug, trace};
use regex::Regex;
use storefront_payment_engine::helpers::{calculate_webhook_hmac, verify_webhook_signature};

/// Verify a gateway signature header (base64-encoded HMAC-SHA256 over the raw payload bytes). The comparison is
/// constant-time; a malformed header simply fails verification.
pub fn verify_gateway_signature(secret: &str, payload: &[u8], header_value: &str) -> bool {
    match base64::decode(header_value.trim()) {
        Ok(signature) => verify_webhook_signature(secret, payload, &signature),
        Err(_) => false,
    }
}

/// Produce the signature header value the gateway would send for `payload`. Used by tooling and tests.
pub fn sign_gateway_payload(secret: &str, payload: &[u8]) -> String {
    base64::encode(calculate_webhook_hmac(secret, payload))
}

/// Get the remote IP address from the request. It uses 3 sources to determine the IP address, in decreasing order
/// of preference:
/// 1. The `X-Forwarded-For` header, iif `use_x_forwarded_for` is set to true in the configuration.
/// 2. The `Forwarded` header, iif `use_forwarded` is set to true in the configuration.
/// 3. The peer address from the connection info.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> Option<IpAddr> {
    let mut result = None;
    if use_x_forwarded_for {
        trace!("Checking X-Forwarded-For header");
        result =
            req.headers().get("X-Forwarded-For").and_then(|v| v.to_str().ok()).and_then(|s| IpAddr::from_str(s).ok());
        if let Some(ip) = result {
            debug!("Using X-Forwarded-For header for remote address: {ip}");
        }
    }
    if use_forwarded && result.is_none() {
        trace!("Checking Forwarded header");
        let re = Regex::new(r#"for=(?P<ip>[^;]+)"#).unwrap();
        result = req
            .headers()
            .get("Forwarded")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| re.captures(v))
            .and_then(|caps| caps.name("ip"))
            .map(|m| m.as_str())
            .and_then(|s| IpAddr::from_str(s).ok());
        if let Some(ip) = result {
            debug!("Using Forwarded header for remote address: {ip}");
        }
    }
    result.or_else(|| {
        let peer_addr = req.connection_info().peer_addr().map(|a| a.to_string());
        trace!("Using Peer address for remote address: {:?}", peer_addr);
        peer_addr.and_then(|s| IpAddr::from_str(&s).ok())
    })
}

#[cfg(test)]
mod test {
    use super::*;

    const SECRET: &str = "gateway-secret";

    #[test]
    fn signed_payload_round_trips() {
        let payload = br#"{"event_type":"payment.captured"}"#;
        let header = sign_gateway_payload(SECRET, payload);
        assert!(verify_gateway_signature(SECRET, payload, &header));
    }

    #[test]
    fn tampered_payload_fails() {
        let payload = br#"{"event_type":"payment.captured"}"#.to_vec();
        let header = sign_gateway_payload(SECRET, &payload);
        let mut tampered = payload.clone();
        tampered[5] ^= 0x01;
        assert!(!verify_gateway_signature(SECRET, &tampered, &header));
    }

    #[test]
    fn garbage_header_fails() {
        assert!(!verify_gateway_signature(SECRET, b"payload", "not-base64!!!"));
        assert!(!verify_gateway_signature(SECRET, b"payload", ""));
    }
}
