//! Webhook signature verification using HMAC-SHA256.
//!
//! The signing service signs each delivery with a shared secret and puts the
//! hex digest in the signature header, optionally prefixed with `sha256=`.
//! Verification runs before parsing. When no secret is configured the server
//! skips verification entirely, which is the documented development-mode
//! behavior, not a fallback on error.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "x-signature";

/// Decodes a signature header value into raw bytes.
///
/// Accepts a bare hex digest or one prefixed with `sha256=`. Returns `None`
/// for invalid hex. Never panics.
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_sig = header.strip_prefix("sha256=").unwrap_or(header);
    hex::decode(hex_sig).ok()
}

/// Computes the HMAC-SHA256 digest of a payload under the given secret.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Formats a digest the way the signing service sends it.
pub fn format_signature_header(signature: &[u8]) -> String {
    hex::encode(signature)
}

/// Verifies a delivery signature. Constant-time comparison via the HMAC
/// library; malformed headers simply fail verification.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let claimed = match parse_signature_header(signature_header) {
        Some(sig) => sig,
        None => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);
    mac.verify_slice(&claimed).is_ok()
}
