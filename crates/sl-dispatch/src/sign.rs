use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Secondlayer-Signature";
/// Receivers reject timestamps further than this from their clock.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Compute the signature header value: `t=<unix-seconds>,v1=<hex hmac>`,
/// where the MAC covers `"<t>.<body>"`, binding the timestamp to the body
/// so neither can be replayed independently.
pub fn sign_payload(secret: &str, timestamp: i64, body: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take any key length");
    mac.update(format!("{timestamp}.{body}").as_bytes());
    let digest = hex::encode(mac.finalize().into_bytes());
    format!("t={timestamp},v1={digest}")
}

/// Receiver-side validation. The digest comparison runs in constant time
/// (`Mac::verify_slice`); the timestamp must be within `tolerance_secs` of
/// `now_unix` in either direction.
pub fn verify_signature(
    secret: &str,
    header: &str,
    body: &str,
    tolerance_secs: i64,
    now_unix: i64,
) -> bool {
    let Some((timestamp, digest_hex)) = parse_header(header) else {
        return false;
    };
    if (now_unix - timestamp).abs() > tolerance_secs {
        return false;
    }
    let Ok(digest) = hex::decode(digest_hex) else {
        return false;
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take any key length");
    mac.update(format!("{timestamp}.{body}").as_bytes());
    mac.verify_slice(&digest).is_ok()
}

fn parse_header(header: &str) -> Option<(i64, &str)> {
    let mut timestamp = None;
    let mut digest = None;
    for part in header.split(',') {
        match part.split_once('=') {
            Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("v1", v)) => digest = Some(v),
            _ => {}
        }
    }
    Some((timestamp?, digest?))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &str = r#"{"streamId":"s1","matches":{}}"#;

    #[test]
    fn round_trip_verifies_inside_tolerance() {
        let now = 1_700_000_000;
        let header = sign_payload(SECRET, now, BODY);
        assert!(verify_signature(SECRET, &header, BODY, SIGNATURE_TOLERANCE_SECS, now));
        // Skewed but inside the window.
        assert!(verify_signature(SECRET, &header, BODY, SIGNATURE_TOLERANCE_SECS, now + 299));
        assert!(verify_signature(SECRET, &header, BODY, SIGNATURE_TOLERANCE_SECS, now - 299));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let now = 1_700_000_000;
        let header = sign_payload(SECRET, now, BODY);
        assert!(!verify_signature(SECRET, &header, BODY, SIGNATURE_TOLERANCE_SECS, now + 301));
        assert!(!verify_signature(SECRET, &header, BODY, SIGNATURE_TOLERANCE_SECS, now - 301));
    }

    #[test]
    fn tampered_body_or_secret_fails() {
        let now = 1_700_000_000;
        let header = sign_payload(SECRET, now, BODY);
        assert!(!verify_signature(SECRET, &header, "{}", SIGNATURE_TOLERANCE_SECS, now));
        assert!(!verify_signature("other", &header, BODY, SIGNATURE_TOLERANCE_SECS, now));
    }

    #[test]
    fn malformed_headers_fail_closed() {
        let now = 1_700_000_000;
        for header in ["", "t=abc,v1=00", "v1=00", "t=100", "t=100,v1=zz"] {
            assert!(
                !verify_signature(SECRET, header, BODY, SIGNATURE_TOLERANCE_SECS, now),
                "header {header:?} must not verify"
            );
        }
    }
}
