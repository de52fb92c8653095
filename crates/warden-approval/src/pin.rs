//! PIN credential hashing and the lockout-enforcing verifier.
//!
//! Credentials are stored as `blake3$<salt hex>$<hash hex>`. The hash is a
//! domain-separated BLAKE3 key derivation over `salt || pin`, iterated
//! [`PIN_HASH_ROUNDS`] times. Comparison is constant-time.
//!
//! After `max_failures` consecutive failures every attempt is rejected for
//! the lockout window without touching the hash, whatever the request.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use subtle::ConstantTimeEq;
use tokio::time::Instant;
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{ApprovalError, ApprovalResult};

/// Domain separation context for PIN hashing.
const PIN_CONTEXT: &str = "warden 2024-06 approval pin credential v1";

/// Key-stretching rounds.
pub const PIN_HASH_ROUNDS: u32 = 10_000;

/// Salt length for newly derived credentials.
const SALT_LEN: usize = 16;

/// Default consecutive failures before lockout.
pub const DEFAULT_MAX_FAILURES: u32 = 5;

/// Default lockout window (5 minutes).
pub const DEFAULT_LOCKOUT: Duration = Duration::from_secs(5 * 60);

/// A salted, stretched PIN hash.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PinCredential {
    salt: Vec<u8>,
    hash: [u8; 32],
}

impl PinCredential {
    /// Derive a credential for `pin` with a fresh random salt.
    #[must_use]
    pub fn derive(pin: &str) -> Self {
        let salt: [u8; SALT_LEN] = rand::random();
        Self::with_salt(pin, &salt)
    }

    /// Derive a credential for `pin` with a given salt.
    #[must_use]
    pub fn with_salt(pin: &str, salt: &[u8]) -> Self {
        Self {
            salt: salt.to_vec(),
            hash: stretch(salt, pin),
        }
    }

    /// Decode `blake3$<salt hex>$<hash hex>`.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::InvalidCredential`] if the string is not in
    /// that format.
    pub fn parse(encoded: &str) -> ApprovalResult<Self> {
        let mut parts = encoded.trim().split('$');
        let (Some("blake3"), Some(salt_hex), Some(hash_hex), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ApprovalError::InvalidCredential(
                "expected 'blake3$<salt hex>$<hash hex>'".to_string(),
            ));
        };
        let salt = hex::decode(salt_hex)
            .map_err(|e| ApprovalError::InvalidCredential(format!("salt: {e}")))?;
        if salt.is_empty() {
            return Err(ApprovalError::InvalidCredential(
                "salt must not be empty".to_string(),
            ));
        }
        let mut hash = [0u8; 32];
        hex::decode_to_slice(hash_hex, &mut hash)
            .map_err(|e| ApprovalError::InvalidCredential(format!("hash: {e}")))?;
        Ok(Self { salt, hash })
    }

    /// Encode for storage in configuration.
    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "blake3${}${}",
            hex::encode(&self.salt),
            hex::encode(self.hash)
        )
    }

    /// Constant-time comparison against a candidate PIN.
    #[must_use]
    pub fn matches(&self, pin: &str) -> bool {
        let candidate = stretch(&self.salt, pin);
        candidate.ct_eq(&self.hash).into()
    }
}

impl std::fmt::Debug for PinCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PinCredential(<redacted>)")
    }
}

fn stretch(salt: &[u8], pin: &str) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(PIN_CONTEXT);
    hasher.update(salt);
    hasher.update(pin.as_bytes());
    let mut out: [u8; 32] = *hasher.finalize().as_bytes();
    for _ in 1..PIN_HASH_ROUNDS {
        let mut round = blake3::Hasher::new_derive_key(PIN_CONTEXT);
        round.update(&out);
        round.update(salt);
        out = *round.finalize().as_bytes();
    }
    out
}

#[derive(Debug, Default)]
struct LockoutState {
    consecutive_failures: u32,
    locked_until: Option<Instant>,
}

/// Verifies PINs against the configured credential and enforces lockout.
///
/// Lockout is global: it covers every request, not only the one whose
/// PIN failed.
#[derive(Debug)]
pub struct PinVerifier {
    credential: Option<PinCredential>,
    max_failures: u32,
    lockout: Duration,
    state: Mutex<LockoutState>,
}

impl PinVerifier {
    /// Build a verifier. `None` means no PIN is configured and every
    /// verification fails.
    #[must_use]
    pub fn new(credential: Option<PinCredential>, max_failures: u32, lockout: Duration) -> Self {
        Self {
            credential,
            max_failures: max_failures.max(1),
            lockout,
            state: Mutex::new(LockoutState::default()),
        }
    }

    /// A verifier with no credential.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(None, DEFAULT_MAX_FAILURES, DEFAULT_LOCKOUT)
    }

    /// Whether a credential is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.credential.is_some()
    }

    /// Remaining lockout time, if locked.
    #[must_use]
    pub fn lockout_remaining(&self) -> Option<Duration> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        state
            .locked_until
            .filter(|until| *until > now)
            .map(|until| until.saturating_duration_since(now))
    }

    /// Check `pin`.
    ///
    /// # Errors
    ///
    /// - [`ApprovalError::PinLockout`] while locked, without checking the hash
    /// - [`ApprovalError::PinNotConfigured`] if no credential exists
    /// - [`ApprovalError::PinInvalid`] on mismatch
    pub fn verify(&self, pin: &str) -> ApprovalResult<()> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(until) = state.locked_until {
                let now = Instant::now();
                if now < until {
                    return Err(ApprovalError::PinLockout {
                        retry_after: until.saturating_duration_since(now),
                    });
                }
                state.locked_until = None;
                state.consecutive_failures = 0;
            }
        }

        let Some(credential) = &self.credential else {
            return Err(ApprovalError::PinNotConfigured);
        };

        let ok = credential.matches(pin);

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if ok {
            state.consecutive_failures = 0;
            debug!("PIN verified");
            return Ok(());
        }

        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        if state.consecutive_failures >= self.max_failures {
            state.consecutive_failures = 0;
            let now = Instant::now();
            state.locked_until = Some(now.checked_add(self.lockout).unwrap_or(now));
            warn!(
                lockout_secs = self.lockout.as_secs(),
                "PIN failure limit reached, locking verification"
            );
            return Err(ApprovalError::PinLockout {
                retry_after: self.lockout,
            });
        }
        Err(ApprovalError::PinInvalid {
            remaining: self.max_failures.saturating_sub(state.consecutive_failures),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> PinVerifier {
        PinVerifier::new(
            Some(PinCredential::derive("4821")),
            DEFAULT_MAX_FAILURES,
            DEFAULT_LOCKOUT,
        )
    }

    #[test]
    fn encode_parse_preserves_match() {
        let cred = PinCredential::with_salt("4821", b"0123456789abcdef");
        let parsed = PinCredential::parse(&cred.encode()).unwrap();
        assert!(parsed.matches("4821"));
        assert!(!parsed.matches("4822"));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(PinCredential::parse("4821").is_err());
        assert!(PinCredential::parse("blake3$$00").is_err());
        assert!(PinCredential::parse("blake3$00$zz").is_err());
        assert!(PinCredential::parse("sha256$00$00").is_err());
    }

    #[test]
    fn salt_changes_hash() {
        let a = PinCredential::with_salt("4821", b"aaaa");
        let b = PinCredential::with_salt("4821", b"bbbb");
        assert_ne!(a.encode(), b.encode());
    }

    #[test]
    fn debug_is_redacted() {
        let cred = PinCredential::derive("4821");
        assert!(!format!("{cred:?}").contains(&hex::encode(cred.hash)));
    }

    #[tokio::test(start_paused = true)]
    async fn correct_pin_rejected_during_lockout() {
        let v = verifier();
        for _ in 0..4 {
            assert!(matches!(
                v.verify("0000"),
                Err(ApprovalError::PinInvalid { .. })
            ));
        }
        assert!(matches!(
            v.verify("0000"),
            Err(ApprovalError::PinLockout { .. })
        ));

        // Sixth attempt, correct PIN: still locked.
        assert!(matches!(
            v.verify("4821"),
            Err(ApprovalError::PinLockout { .. })
        ));
        assert!(v.lockout_remaining().is_some());

        tokio::time::advance(DEFAULT_LOCKOUT + Duration::from_secs(1)).await;
        assert!(v.verify("4821").is_ok());
        assert!(v.lockout_remaining().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_failure_count() {
        let v = verifier();
        for _ in 0..4 {
            let _ = v.verify("0000");
        }
        assert!(v.verify("4821").is_ok());
        // Counter restarted: four more failures do not lock.
        for _ in 0..4 {
            assert!(matches!(
                v.verify("0000"),
                Err(ApprovalError::PinInvalid { .. })
            ));
        }
        assert!(v.verify("4821").is_ok());
    }

    #[test]
    fn remaining_counts_down() {
        let v = verifier();
        match v.verify("1111") {
            Err(ApprovalError::PinInvalid { remaining }) => assert_eq!(remaining, 4),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unconfigured_never_verifies() {
        let v = PinVerifier::disabled();
        assert!(!v.is_configured());
        assert!(matches!(
            v.verify(""),
            Err(ApprovalError::PinNotConfigured)
        ));
    }
}
