// HMAC-SHA256 webhook signature verification, plus a constant-time
// comparison so a mismatching signature can't be timed byte-by-byte.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compare two byte slices in constant time.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Verify `header_value` (the raw `X-TradingView-Signature` header, e.g.
/// `sha256=<64 hex>`) against an HMAC-SHA256 of `body` keyed with `secret`.
pub fn verify(secret: &str, body: &[u8], header_value: &str) -> bool {
    let provided_hex = header_value
        .strip_prefix("sha256=")
        .unwrap_or(header_value);

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(body);
    let expected_hex = hex::encode(mac.finalize().into_bytes());

    constant_time_eq(expected_hex.as_bytes(), provided_hex.to_ascii_lowercase().as_bytes())
}
