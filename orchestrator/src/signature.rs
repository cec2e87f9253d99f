use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

/// HMAC-SHA256/SHA1 constant-time verification of a raw request body
/// against a per-tenant secret (spec.md §4.1). The header is expected in
/// `algo=hex` form (e.g. `sha256=abcdef...`, the GitHub convention also
/// used for Slack's `v0=` form once the envelope has been stripped by the
/// caller — see `api::receivers::slack`).
pub fn verify(body: &[u8], header_value: &str, secret: &str) -> bool {
    if header_value.is_empty() || secret.is_empty() {
        return false;
    }

    let Some((algo, hex_digest)) = header_value.split_once('=') else {
        return false;
    };

    match algo {
        "sha256" => verify_with::<HmacSha256>(body, hex_digest, secret.as_bytes()),
        "sha1" => verify_with::<HmacSha1>(body, hex_digest, secret.as_bytes()),
        _ => false,
    }
}

fn verify_with<M>(body: &[u8], hex_digest: &str, key: &[u8]) -> bool
where
    M: Mac + hmac::digest::KeyInit,
{
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = M::new_from_slice(key) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Static-token comparison fallback: constant-time byte equality of the
/// header value against the secret, with no algorithm prefix.
pub fn verify_static_token(header_value: &str, secret: &str) -> bool {
    if header_value.is_empty() || secret.is_empty() {
        return false;
    }
    constant_time_eq(header_value.as_bytes(), secret.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Slack's signing envelope: `v0:<timestamp>:<body>`, HMAC-SHA256'd and
/// compared against `X-Slack-Signature` (spec.md §4.7). `now` is injected
/// so callers can exercise the ±5 minute window deterministically.
pub fn verify_slack(
    body: &[u8],
    timestamp: &str,
    signature_header: &str,
    secret: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> bool {
    let Ok(ts) = timestamp.parse::<i64>() else {
        return false;
    };
    let delta = (now.timestamp() - ts).abs();
    if delta > 60 * 5 {
        return false;
    }

    let Some(hex_digest) = signature_header.strip_prefix("v0=") else {
        return false;
    };
    let mut base = format!("v0:{}:", timestamp).into_bytes();
    base.extend_from_slice(body);

    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(&base);
    mac.verify_slice(&expected).is_ok()
}
