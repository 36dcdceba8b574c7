//! Ad-network callback authentication.
//!
//! The network signs the exact raw request body with HMAC-SHA256 and sends
//! the lowercase hex digest. Verification runs over the raw bytes as
//! received; re-serialising the payload first would change the digest.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::EconomyError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct CallbackValidator {
    mac: HmacSha256,
}

impl CallbackValidator {
    /// Rejects an empty secret: an unconfigured deployment must not accept
    /// callbacks signed with the empty key.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, EconomyError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(EconomyError::validation("ad network secret not configured"));
        }
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|_| EconomyError::validation("invalid ad network secret"))?;
        Ok(Self { mac })
    }

    /// Constant-time check of a hex signature over `raw`
    pub fn verify(&self, raw: &[u8], signature_hex: &str) -> bool {
        let Ok(expected) = hex::decode(signature_hex.trim()) else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(raw);
        mac.verify_slice(&expected).is_ok()
    }

    pub fn sign(&self, raw: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(raw);
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for CallbackValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CallbackValidator(..)")
    }
}

/// One-shot form of [`CallbackValidator::verify`]
pub fn verify_hmac_sha256(raw: &[u8], signature_hex: &str, secret: &[u8]) -> bool {
    CallbackValidator::new(secret).is_ok_and(|v| v.verify(raw, signature_hex))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let v = CallbackValidator::new("Jefe").unwrap();
        let sig = v.sign(b"what do ya want for nothing?");
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
        assert!(v.verify(b"what do ya want for nothing?", &sig));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let v = CallbackValidator::new("s3cret").unwrap();
        let raw = br#"{"user_id":"u1","event_id":"e1"}"#;
        let sig = v.sign(raw);
        assert!(v.verify(raw, &sig));
        // whitespace change alone breaks the signature
        assert!(!v.verify(br#"{"user_id": "u1","event_id":"e1"}"#, &sig));
    }

    #[test]
    fn test_bad_signature_encoding() {
        let v = CallbackValidator::new("s3cret").unwrap();
        assert!(!v.verify(b"x", "not-hex"));
        assert!(!v.verify(b"x", ""));
        assert!(!v.verify(b"x", &"00".repeat(32)));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(CallbackValidator::new("").is_err());
        assert!(!verify_hmac_sha256(b"x", "00", b""));
    }

    #[test]
    fn test_one_shot_matches_validator() {
        let v = CallbackValidator::new("k").unwrap();
        let sig = v.sign(b"payload");
        assert!(verify_hmac_sha256(b"payload", &sig, b"k"));
        assert!(!verify_hmac_sha256(b"payload", &sig, b"other"));
    }
}
