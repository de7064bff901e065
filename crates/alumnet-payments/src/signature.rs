use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `"{order_id}|{payment_id}"` — what the gateway signs
/// on checkout completion.
pub fn payment_signature(order_id: &str, payment_id: &str, secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a checkout callback signature. Malformed hex counts as invalid.
/// The comparison is constant-time via `Mac::verify_slice`. There is no
/// lenient mode: a mismatch always fails, sandbox or not.
pub fn verify_payment_signature(
    order_id: &str,
    payment_id: &str,
    signature: &str,
    secret: &str,
) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Verify the webhook header signature, computed over the raw JSON body
/// with the (possibly distinct) webhook secret.
pub fn verify_webhook_signature(body: &[u8], signature: &str, secret: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
