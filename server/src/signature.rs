use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Checks `x-hub-signature-256` against HMAC-SHA256(secret, body).
///
/// With no secret configured every request is accepted. Otherwise the header
/// must be `sha256=<hex>`; the digest comparison is constant-time and a
/// digest of the wrong length never matches.
pub fn verify_signature(app_secret: Option<&str>, signature_header: Option<&str>, body: &[u8]) -> bool {
    let Some(secret) = app_secret.filter(|s| !s.is_empty()) else {
        return true;
    };
    let Some(header) = signature_header else {
        return false;
    };
    let Some((scheme, digest)) = header.trim().split_once('=') else {
        return false;
    };
    if scheme != "sha256" || digest.is_empty() {
        return false;
    }
    let Ok(signature_bytes) = hex::decode(digest) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature_bytes).is_ok()
}

/// Lowercase hex HMAC-SHA256, as Meta sends it.
pub fn sign(app_secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}
