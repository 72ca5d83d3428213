//! `X-Hub-Signature-256` verification.
//!
//! GitHub signs each delivery body with HMAC-SHA256 keyed by the webhook
//! secret and sends `sha256=<hex>`. Deliveries are verified before their body
//! is parsed.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Decodes a `sha256=<hex>` header into the raw digest.
///
/// # Examples
///
/// ```
/// use ant_watcher::webhooks::parse_signature_header;
///
/// assert_eq!(parse_signature_header("sha256=00ff"), Some(vec![0x00, 0xff]));
/// assert!(parse_signature_header("sha1=00ff").is_none());
/// assert!(parse_signature_header("sha256=zz").is_none());
/// ```
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    hex::decode(header.trim().strip_prefix("sha256=")?).ok()
}

/// Checks `signature_header` against the HMAC of `payload` under `secret`.
///
/// The digest comparison is constant-time. Malformed headers fail.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let Some(expected) = parse_signature_header(signature_header) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Signs `payload` the way GitHub does. Test deliveries only.
#[cfg(test)]
pub(crate) fn sign(payload: &[u8], secret: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
