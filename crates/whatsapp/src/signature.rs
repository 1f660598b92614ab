use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::payload::WebhookError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Checks an `X-Hub-Signature-256: sha256=<hex>` header against the raw body.
pub fn verify_signature(
    app_secret: &[u8],
    body: &[u8],
    header: Option<&str>,
) -> Result<(), WebhookError> {
    let header = header.ok_or(WebhookError::MissingSignature)?;
    let provided = header
        .trim()
        .strip_prefix("sha256=")
        .and_then(decode_hex)
        .ok_or(WebhookError::InvalidSignature)?;

    let mut mac =
        HmacSha256::new_from_slice(app_secret).map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(body);
    mac.verify_slice(&provided).map_err(|_| WebhookError::InvalidSignature)
}

/// Answers the subscription handshake: the challenge is echoed back only for
/// `hub.mode=subscribe` with a matching verify token.
pub fn verify_handshake(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    expected_token: &str,
) -> Option<String> {
    if expected_token.is_empty() || mode != Some("subscribe") || token != Some(expected_token) {
        return None;
    }
    Some(challenge.unwrap_or_default().to_string())
}

fn decode_hex(value: &str) -> Option<Vec<u8>> {
    if value.len() % 2 != 0 {
        return None;
    }
    (0..value.len())
        .step_by(2)
        .map(|index| value.get(index..index + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

#[cfg(test)]
pub(crate) fn sign(app_secret: &[u8], body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(app_secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    let mut output = String::from("sha256=");
    for byte in mac.finalize().into_bytes() {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::{sign, verify_handshake, verify_signature};
    use crate::payload::WebhookError;

    #[test]
    fn accepts_matching_signature_and_rejects_tampering() {
        let body = br#"{"object":"whatsapp_business_account"}"#;
        let header = sign(b"app-secret", body);

        assert_eq!(verify_signature(b"app-secret", body, Some(&header)), Ok(()));
        assert_eq!(
            verify_signature(b"app-secret", b"{\"object\":\"other\"}", Some(&header)),
            Err(WebhookError::InvalidSignature)
        );
        assert_eq!(
            verify_signature(b"other-secret", body, Some(&header)),
            Err(WebhookError::InvalidSignature)
        );
        assert_eq!(
            verify_signature(b"app-secret", body, Some("sha256=zz")),
            Err(WebhookError::InvalidSignature)
        );
        assert_eq!(verify_signature(b"app-secret", body, None), Err(WebhookError::MissingSignature));
    }

    #[test]
    fn handshake_echoes_challenge_only_for_matching_token() {
        assert_eq!(
            verify_handshake(Some("subscribe"), Some("verify-me"), Some("1158201444"), "verify-me"),
            Some("1158201444".to_string())
        );
        assert_eq!(verify_handshake(Some("subscribe"), Some("wrong"), Some("1"), "verify-me"), None);
        assert_eq!(verify_handshake(Some("unsubscribe"), Some("verify-me"), Some("1"), "verify-me"), None);
        assert_eq!(verify_handshake(Some("subscribe"), Some(""), Some("1"), ""), None);
    }
}
