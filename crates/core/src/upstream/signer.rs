//! Request signing for the mobile API.
//!
//! The signature is `base64(HMAC-SHA1(secret, "{METHOD}&{encoded path}&{ts}"))`.
//! Upstream rejects percent escapes in lowercase hex, so the path encoding
//! is forced to uppercase.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Computes per-request signatures with a fixed shared secret.
#[derive(Clone)]
pub struct Signer {
    secret: Vec<u8>,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").field("secret", &"<redacted>").finish()
    }
}

impl Signer {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into().into_bytes(),
        }
    }

    /// Sign a request. `path` is the URL path without host or query.
    pub fn sign(&self, method: &str, path: &str, timestamp: i64) -> String {
        let message = format!(
            "{}&{}&{}",
            method.to_ascii_uppercase(),
            url_encode_upper(path),
            timestamp
        );

        let mut mac = HmacSha1::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
        mac.update(message.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }
}

/// Percent-encode `input` with uppercase hex escapes.
pub fn url_encode_upper(input: &str) -> String {
    let encoded = urlencoding::encode(input);
    let mut out = String::with_capacity(encoded.len());
    let mut chars = encoded.chars();
    while let Some(c) = chars.next() {
        out.push(c);
        if c == '%' {
            for hex in chars.by_ref().take(2) {
                out.push(hex.to_ascii_uppercase());
            }
        }
    }
    out
}

/// Current Unix time in seconds.
pub fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
