//! Challenge-response wallet login.
//!
//! A wallet asks for a challenge, signs the canonical message off-line, and
//! presents the signature back. Each challenge is keyed by
//! (wallet, nonce), lives for five minutes, and is consumed by the first
//! successful verification.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use tipjar_crypto::{WalletAddress, challenge_message, decode_signature, generate_nonce, verify_wallet_signature};

pub const CHALLENGE_TTL: Duration = Duration::from_secs(5 * 60);
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A freshly issued challenge. `message` is what the wallet must sign.
#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    pub nonce: String,
    pub timestamp: i64,
    pub message: String,
}

#[derive(Clone)]
pub struct NonceAuthenticator {
    inner: Arc<AuthenticatorInner>,
}

struct AuthenticatorInner {
    /// (wallet, nonce) -> issue time in unix millis
    pending: Mutex<HashMap<(WalletAddress, String), i64>>,
    ttl_ms: i64,
}

impl Default for NonceAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl NonceAuthenticator {
    pub fn new() -> Self {
        Self::with_ttl(CHALLENGE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(AuthenticatorInner {
                pending: Mutex::new(HashMap::new()),
                ttl_ms: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
            }),
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<(WalletAddress, String), i64>> {
        self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn issue_challenge(&self, wallet: &WalletAddress) -> IssuedChallenge {
        self.issue_challenge_at(wallet, now_ms())
    }

    fn issue_challenge_at(&self, wallet: &WalletAddress, now_ms: i64) -> IssuedChallenge {
        let nonce = generate_nonce();
        let message = challenge_message(wallet, &nonce, now_ms);
        self.pending().insert((*wallet, nonce.clone()), now_ms);

        debug!("Issued challenge for {}", wallet);
        IssuedChallenge {
            nonce,
            timestamp: now_ms,
            message,
        }
    }

    /// True only if `(wallet, nonce)` is pending, unexpired, was issued at
    /// `timestamp`, and `signature` signs the canonical message. A success
    /// consumes the challenge; an expired challenge is discarded on sight.
    pub fn verify(&self, wallet: &WalletAddress, signature: &str, nonce: &str, timestamp: i64) -> bool {
        self.verify_at(wallet, signature, nonce, timestamp, now_ms())
    }

    fn verify_at(&self, wallet: &WalletAddress, signature: &str, nonce: &str, timestamp: i64, now_ms: i64) -> bool {
        // The lock is held across the signature check so that two
        // presentations of the same challenge cannot both succeed.
        let mut pending = self.pending();
        let key = (*wallet, nonce.to_string());

        let Some(&issued_at) = pending.get(&key) else {
            debug!("No pending challenge for {}", wallet);
            return false;
        };
        if now_ms - issued_at > self.inner.ttl_ms {
            pending.remove(&key);
            debug!("Challenge for {} expired", wallet);
            return false;
        }
        if issued_at != timestamp {
            return false;
        }

        let Ok(raw) = decode_signature(signature) else {
            return false;
        };
        let message = challenge_message(wallet, nonce, issued_at);
        if verify_wallet_signature(wallet, message.as_bytes(), &raw).is_err() {
            return false;
        }

        pending.remove(&key);
        true
    }

    /// Drop every expired challenge. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(now_ms())
    }

    fn sweep_at(&self, now_ms: i64) -> usize {
        let ttl_ms = self.inner.ttl_ms;
        let mut pending = self.pending();
        let before = pending.len();
        pending.retain(|_, issued_at| now_ms - *issued_at <= ttl_ms);
        before - pending.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    /// Sweep every `every` until `shutdown` fires.
    pub fn spawn_sweeper(&self, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let authenticator = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Challenge sweeper stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        let purged = authenticator.sweep();
                        if purged > 0 {
                            info!("Challenge sweep: purged {} expired challenges", purged);
                        }
                    }
                }
            }
        })
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    const T0: i64 = 1_700_000_000_000;

    fn keypair(seed: u8) -> (SigningKey, WalletAddress) {
        let key = SigningKey::from_bytes(&[seed; 32]);
        let wallet = WalletAddress::new(key.verifying_key().to_bytes());
        (key, wallet)
    }

    fn sign(key: &SigningKey, message: &str) -> String {
        hex::encode(key.sign(message.as_bytes()).to_bytes())
    }

    #[test]
    fn challenge_is_single_use() {
        let auth = NonceAuthenticator::new();
        let (key, wallet) = keypair(1);
        let issued = auth.issue_challenge_at(&wallet, T0);
        let sig = sign(&key, &issued.message);

        assert!(auth.verify_at(&wallet, &sig, &issued.nonce, issued.timestamp, T0 + 1_000));
        assert!(!auth.verify_at(&wallet, &sig, &issued.nonce, issued.timestamp, T0 + 2_000));
        assert_eq!(auth.pending_count(), 0);
    }

    #[test]
    fn base58_signatures_are_accepted() {
        let auth = NonceAuthenticator::new();
        let (key, wallet) = keypair(2);
        let issued = auth.issue_challenge_at(&wallet, T0);
        let sig = bs58::encode(key.sign(issued.message.as_bytes()).to_bytes()).into_string();

        assert!(auth.verify_at(&wallet, &sig, &issued.nonce, issued.timestamp, T0));
    }

    #[test]
    fn expired_challenge_fails_even_with_valid_signature() {
        let auth = NonceAuthenticator::new();
        let (key, wallet) = keypair(1);
        let issued = auth.issue_challenge_at(&wallet, T0);
        let sig = sign(&key, &issued.message);

        let late = T0 + CHALLENGE_TTL.as_millis() as i64 + 1;
        assert!(!auth.verify_at(&wallet, &sig, &issued.nonce, issued.timestamp, late));
        assert_eq!(auth.pending_count(), 0, "expired challenge is discarded");
    }

    #[test]
    fn failed_attempts_leave_challenge_pending() {
        let auth = NonceAuthenticator::new();
        let (key, wallet) = keypair(1);
        let (other_key, other_wallet) = keypair(2);
        let issued = auth.issue_challenge_at(&wallet, T0);
        let sig = sign(&key, &issued.message);

        // Wrong signer, wrong timestamp, wrong wallet, garbage signature
        assert!(!auth.verify_at(&wallet, &sign(&other_key, &issued.message), &issued.nonce, T0, T0));
        assert!(!auth.verify_at(&wallet, &sig, &issued.nonce, T0 + 1, T0));
        assert!(!auth.verify_at(&other_wallet, &sig, &issued.nonce, T0, T0));
        assert!(!auth.verify_at(&wallet, "zz", &issued.nonce, T0, T0));
        assert_eq!(auth.pending_count(), 1);

        assert!(auth.verify_at(&wallet, &sig, &issued.nonce, T0, T0));
    }

    #[test]
    fn concurrent_presentations_accept_exactly_one() {
        let auth = NonceAuthenticator::new();
        let (key, wallet) = keypair(3);
        let issued = auth.issue_challenge_at(&wallet, T0);
        let sig = sign(&key, &issued.message);

        let accepted = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| auth.verify_at(&wallet, &sig, &issued.nonce, T0, T0)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });
        assert_eq!(accepted, 1);
    }

    #[test]
    fn sweep_removes_only_expired() {
        let auth = NonceAuthenticator::new();
        let (_, wallet) = keypair(1);
        auth.issue_challenge_at(&wallet, T0);
        auth.issue_challenge_at(&wallet, T0 + 60_000);

        let ttl = CHALLENGE_TTL.as_millis() as i64;
        assert_eq!(auth.sweep_at(T0 + ttl + 1), 1);
        assert_eq!(auth.pending_count(), 1);
    }

    #[tokio::test]
    async fn sweeper_runs_until_cancelled() {
        let auth = NonceAuthenticator::with_ttl(Duration::ZERO);
        let (_, wallet) = keypair(1);
        auth.issue_challenge_at(&wallet, now_ms() - 10);

        let shutdown = CancellationToken::new();
        let handle = auth.spawn_sweeper(Duration::from_millis(10), shutdown.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(auth.pending_count(), 0);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
