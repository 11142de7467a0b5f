//! Payment signature verification.
//!
//! The gateway signs a completed checkout with HMAC-SHA256 over
//! `order_id|payment_id`, keyed by the merchant key secret, hex-encoded.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::domain::foundation::ValidationError;

type HmacSha256 = Hmac<Sha256>;

/// Length of a hex-encoded SHA-256 MAC.
const SIGNATURE_HEX_LEN: usize = 64;

/// Computes the hex signature the gateway would send for this pair.
pub fn compute_signature(order_id: &str, payment_id: &str, secret: &str) -> String {
    hex::encode(mac_bytes(order_id, payment_id, secret.as_bytes()))
}

/// Checks a checkout signature in constant time.
///
/// Returns `false` for any mismatch, including empty inputs and malformed hex.
pub fn verify(order_id: &str, payment_id: &str, signature: &str, secret: &str) -> bool {
    if order_id.is_empty() || payment_id.is_empty() || secret.is_empty() {
        return false;
    }
    if signature.len() != SIGNATURE_HEX_LEN {
        return false;
    }
    let Ok(provided) = hex::decode(signature) else {
        return false;
    };

    let expected = mac_bytes(order_id, payment_id, secret.as_bytes());
    expected.as_slice().ct_eq(provided.as_slice()).into()
}

fn mac_bytes(order_id: &str, payment_id: &str, key: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so new_from_slice cannot fail here.
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Holds the merchant key secret and verifies checkout signatures with it.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: SecretString,
}

impl SignatureVerifier {
    /// Creates a verifier.
    ///
    /// # Errors
    ///
    /// A missing secret is a configuration error and is reported here, once,
    /// rather than on every request.
    pub fn new(secret: SecretString) -> Result<Self, ValidationError> {
        if secret.expose_secret().trim().is_empty() {
            return Err(ValidationError::empty_field("payment.key_secret"));
        }
        Ok(Self { secret })
    }

    pub fn verify(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify(order_id, payment_id, signature, self.secret.expose_secret())
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}
