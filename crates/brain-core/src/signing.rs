//! HMAC-SHA256 request signing shared by the ingress API and the egress
//! execution/wallet clients.
//!
//! The signed message is `timestamp_ms|nonce|payload_json` where payload_json
//! is the serde serialization of the business fields in declaration order.

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use crate::types::IntentSignal;
use crate::BrainError;

type HmacSha256 = Hmac<Sha256>;

/// Canonical business payload of an intent signal (signature excluded).
#[derive(Serialize)]
struct SignalPayload<'a> {
    signal_id: &'a str,
    phase_id: &'a str,
    symbol: &'a str,
    side: &'a str,
    requested_notional: String,
    hedge: bool,
}

/// Serialize the fields an intent signature covers.
pub fn canonical_signal_payload(signal: &IntentSignal) -> String {
    let payload = SignalPayload {
        signal_id: &signal.signal_id,
        phase_id: signal.phase_id.as_str(),
        symbol: &signal.symbol,
        side: signal.side.as_str(),
        requested_notional: signal.requested_notional.normalize().to_string(),
        hedge: signal.hedge,
    };
    // Struct serialization is deterministic (declaration order).
    serde_json::to_string(&payload).unwrap_or_default()
}

/// Build the message an HMAC covers.
pub fn message(timestamp_ms: i64, nonce: &str, payload_json: &str) -> String {
    format!("{timestamp_ms}|{nonce}|{payload_json}")
}

/// Hex-encoded HMAC-SHA256 of `message` under `secret`.
pub fn sign(secret: &[u8], message: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time verification of a hex signature.
pub fn verify(secret: &[u8], message: &str, signature_hex: &str) -> Result<(), BrainError> {
    let expected = hex::decode(signature_hex)
        .map_err(|_| BrainError::AuthFailure("signature is not hex".to_string()))?;
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(message.as_bytes());
    mac.verify_slice(&expected)
        .map_err(|_| BrainError::AuthFailure("signature mismatch".to_string()))
}

/// Sign an intent signal in place, returning the hex signature.
pub fn sign_signal(secret: &[u8], signal: &IntentSignal) -> String {
    let payload = canonical_signal_payload(signal);
    sign(secret, &message(signal.timestamp_ms, &signal.nonce, &payload))
}

/// Verify the signature carried by an intent signal.
pub fn verify_signal(secret: &[u8], signal: &IntentSignal) -> Result<(), BrainError> {
    let payload = canonical_signal_payload(signal);
    verify(
        secret,
        &message(signal.timestamp_ms, &signal.nonce, &payload),
        &signal.signature,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PhaseId, Side};
    use rust_decimal_macros::dec;

    fn sample_signal() -> IntentSignal {
        IntentSignal {
            signal_id: "sig-42".to_string(),
            phase_id: PhaseId::P2,
            symbol: "ETH".to_string(),
            side: Side::Buy,
            requested_notional: dec!(4000),
            hedge: false,
            timestamp_ms: 1_700_000_000_000,
            nonce: "nonce-1".to_string(),
            signature: String::new(),
        }
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let secret = b"shared-secret";
        let mut signal = sample_signal();
        signal.signature = sign_signal(secret, &signal);
        assert!(verify_signal(secret, &signal).is_ok());
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let secret = b"shared-secret";
        let mut signal = sample_signal();
        signal.signature = sign_signal(secret, &signal);
        signal.requested_notional = dec!(9000);
        assert!(verify_signal(secret, &signal).is_err());
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let mut signal = sample_signal();
        signal.signature = sign_signal(b"secret-a", &signal);
        assert!(verify_signal(b"secret-b", &signal).is_err());
    }

    #[test]
    fn non_hex_signature_is_rejected() {
        let mut signal = sample_signal();
        signal.signature = "not-hex!".to_string();
        assert!(verify_signal(b"secret", &signal).is_err());
    }
}
