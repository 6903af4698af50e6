use std::fmt;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::contract::SignupRequest;

const KEY_DOMAIN: &[u8] = b"signup-request/v1";
const SEAL_DOMAIN: &[u8] = b"signup-idempotency-seal/v1";

type HmacSha256 = Hmac<Sha256>;

/// Server-held key under which idempotency keys are sealed before they are
/// written to a store or handed to a channel.
#[derive(Clone)]
pub struct IdempotencySecret(HmacSha256);

impl IdempotencySecret {
    pub fn new(secret: &[u8]) -> Result<Self, hmac::digest::InvalidLength> {
        HmacSha256::new_from_slice(secret).map(Self)
    }
}

impl fmt::Debug for IdempotencySecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdempotencySecret(<redacted>)")
    }
}

/// Deterministic key used by side-effecting stages to suppress duplicate
/// effects when the same logical request is invoked more than once.
///
/// A derived key is a digest of the password and stays in process memory;
/// only [`IdempotencyKey::seal`] output is persisted or dispatched.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Uses the caller-supplied key when present, otherwise fingerprints the
    /// request contents.
    pub fn for_request(request: &SignupRequest) -> Self {
        match request.idempotency_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Self(key.to_string()),
            _ => Self(request_fingerprint(&request.email, &request.password)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// HMAC-SHA256 of the key under `secret`, hex encoded. Fixed length, so
    /// it also fits channels that cap deduplication ids.
    pub fn seal(&self, secret: &IdempotencySecret) -> String {
        let mut mac = secret.0.clone();
        mac.update(SEAL_DOMAIN);
        mac.update(&[0u8]);
        mac.update(self.0.as_bytes());
        format!("{:x}", mac.finalize().into_bytes())
    }
}

impl fmt::Debug for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdempotencyKey(<redacted>)")
    }
}

impl AsRef<str> for IdempotencyKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Hex SHA-256 over the normalized email and the password.
pub fn request_fingerprint(email: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(KEY_DOMAIN);
    hasher.update([0u8]);
    hasher.update(normalize_email(email).as_bytes());
    hasher.update([0u8]);
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hex SHA-256 of the normalized email, used where the raw address must not
/// appear (object keys, log fields).
pub fn email_fingerprint(email: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_email(email).as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_key_is_stable_across_email_case_and_padding() {
        let a = IdempotencyKey::for_request(&SignupRequest::new("A@B.com", "secret1"));
        let b = IdempotencyKey::for_request(&SignupRequest::new(" a@b.com ", "secret1"));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn derived_key_changes_with_password() {
        let a = IdempotencyKey::for_request(&SignupRequest::new("a@b.com", "secret1"));
        let b = IdempotencyKey::for_request(&SignupRequest::new("a@b.com", "secret2"));
        assert_ne!(a, b);
    }

    #[test]
    fn caller_key_takes_precedence_unless_blank() {
        let keyed = SignupRequest::new("a@b.com", "secret1").with_idempotency_key(" req-7 ");
        assert_eq!(IdempotencyKey::for_request(&keyed).as_str(), "req-7");

        let blank = SignupRequest::new("a@b.com", "secret1").with_idempotency_key("  ");
        assert_eq!(
            IdempotencyKey::for_request(&blank).as_str(),
            request_fingerprint("a@b.com", "secret1")
        );
    }

    fn secret(bytes: &[u8]) -> IdempotencySecret {
        IdempotencySecret::new(bytes).expect("hmac accepts any key length")
    }

    #[test]
    fn sealed_key_depends_on_the_server_secret() {
        let key = IdempotencyKey::for_request(&SignupRequest::new("a@b.com", "secret1"));

        let sealed = key.seal(&secret(b"server-secret"));

        assert_eq!(sealed.len(), 64);
        assert_eq!(sealed, key.seal(&secret(b"server-secret")));
        assert_ne!(sealed, key.seal(&secret(b"other-secret")));
        assert_ne!(sealed, key.as_str());
    }

    #[test]
    fn sealed_key_cannot_be_recomputed_from_email_and_password() {
        let key = IdempotencyKey::for_request(&SignupRequest::new("a@b.com", "secret1"));
        let sealed = key.seal(&secret(b"server-secret"));

        let unkeyed = |bytes: &[&[u8]]| {
            let mut hasher = Sha256::new();
            for part in bytes {
                hasher.update(part);
            }
            format!("{:x}", hasher.finalize())
        };
        let fingerprint = request_fingerprint("a@b.com", "secret1");
        let guesses = [
            fingerprint.clone(),
            unkeyed(&[fingerprint.as_bytes()]),
            unkeyed(&[KEY_DOMAIN, &[0], b"a@b.com", &[0], b"secret1"]),
            unkeyed(&[SEAL_DOMAIN, &[0], fingerprint.as_bytes()]),
        ];

        assert!(guesses.iter().all(|guess| guess != &sealed));
    }

    #[test]
    fn debug_output_hides_key_material() {
        let key = IdempotencyKey::for_request(&SignupRequest::new("a@b.com", "secret1"));

        assert!(!format!("{key:?}").contains(key.as_str()));
        assert_eq!(format!("{:?}", secret(b"server-secret")), "IdempotencySecret(<redacted>)");
    }

    #[test]
    fn email_fingerprint_ignores_case() {
        assert_eq!(email_fingerprint("User@Example.com"), email_fingerprint("user@example.com"));
    }
}
