use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Header carrying the body signature on outbound requests.
///
/// Only present when the webhook has a non-empty secret.
pub const SIGNATURE_HEADER: &str = "X-Hook-Signature";

/// Compute the HMAC-SHA256 signature attached to outbound requests.
///
/// The secret is the key, the rendered request body the message; the
/// result is lowercase hex so receivers can recompute it with any
/// standard HMAC implementation. Deterministic for a given
/// `(body, secret)` pair.
///
/// Callers must not invoke this with an empty secret; unsigned
/// webhooks send no signature header at all.
pub fn generate_signature(body: &[u8], secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("hmac accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a received signature against a body and secret.
///
/// Receiver-side convenience; uses a constant-time comparison.
pub fn verify_signature(body: &[u8], secret: &str, signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("hmac accepts keys of any length");
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}
