//! Outstanding sign-in challenges, one per wallet.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::RngCore;

use crate::error::AuthError;
use crate::identity::WalletAddress;

/// Bytes of randomness in a challenge nonce (hex-encoded to 64 chars).
pub const NONCE_BYTES: usize = 32;

#[derive(Debug, Clone)]
struct Challenge {
    nonce: String,
    issued_at: DateTime<Utc>,
}

/// Concurrent registry of the single live nonce for each wallet.
///
/// Entries are replaced on re-issue and removed when taken, so a nonce can be
/// consumed at most once. Entries older than the TTL behave as absent.
pub struct ChallengeStore {
    entries: DashMap<WalletAddress, Challenge>,
    ttl: Duration,
}

impl ChallengeStore {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::days(365)),
        }
    }

    /// Create or replace the nonce for `identity`.
    pub fn issue(&self, identity: &WalletAddress) -> String {
        self.issue_at(identity, Utc::now())
    }

    pub fn issue_at(&self, identity: &WalletAddress, now: DateTime<Utc>) -> String {
        let nonce = random_nonce();
        self.entries.insert(
            identity.clone(),
            Challenge {
                nonce: nonce.clone(),
                issued_at: now,
            },
        );
        nonce
    }

    /// Remove and return the live nonce for `identity`.
    ///
    /// The entry is gone after this call whatever the caller does with the
    /// nonce, which is what makes a challenge single-use.
    pub fn take(&self, identity: &WalletAddress) -> Result<String, AuthError> {
        self.take_at(identity, Utc::now())
    }

    pub fn take_at(
        &self,
        identity: &WalletAddress,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let not_found = || AuthError::ChallengeNotFound {
            identity: identity.to_string(),
        };
        let (_, challenge) = self.entries.remove(identity).ok_or_else(not_found)?;
        if now - challenge.issued_at > self.ttl {
            tracing::debug!(wallet = %identity, "Discarded expired challenge");
            return Err(not_found());
        }
        Ok(challenge.nonce)
    }

    /// Drop every challenge older than the TTL. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, challenge| now - challenge.issued_at <= self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn random_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(last: char) -> WalletAddress {
        WalletAddress::parse(&format!("0x{}{}", "1".repeat(39), last)).unwrap()
    }

    fn store() -> ChallengeStore {
        ChallengeStore::new(std::time::Duration::from_secs(600))
    }

    #[test]
    fn nonce_is_64_hex_chars() {
        let store = store();
        let nonce = store.issue(&wallet('a'));
        assert_eq!(nonce.len(), 64);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn reissue_replaces_previous_nonce() {
        let store = store();
        let id = wallet('a');
        let first = store.issue(&id);
        let second = store.issue(&id);

        assert_ne!(first, second);
        assert_eq!(store.len(), 1);
        assert_eq!(store.take(&id).unwrap(), second);
    }

    #[test]
    fn take_is_single_use() {
        let store = store();
        let id = wallet('b');
        store.issue(&id);

        assert!(store.take(&id).is_ok());
        assert!(matches!(
            store.take(&id),
            Err(AuthError::ChallengeNotFound { .. })
        ));
    }

    #[test]
    fn identities_are_independent() {
        let store = store();
        let a = store.issue(&wallet('a'));
        let b = store.issue(&wallet('b'));

        assert_eq!(store.take(&wallet('b')).unwrap(), b);
        assert_eq!(store.take(&wallet('a')).unwrap(), a);
    }

    #[test]
    fn expired_challenge_is_not_found() {
        let store = store();
        let id = wallet('c');
        let issued = Utc::now();
        store.issue_at(&id, issued);

        let later = issued + Duration::seconds(601);
        assert!(matches!(
            store.take_at(&id, later),
            Err(AuthError::ChallengeNotFound { .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn purge_removes_only_stale_entries() {
        let store = store();
        let now = Utc::now();
        store.issue_at(&wallet('a'), now - Duration::seconds(1200));
        store.issue_at(&wallet('b'), now);

        assert_eq!(store.purge_expired(now), 1);
        assert_eq!(store.len(), 1);
        assert!(store.take_at(&wallet('b'), now).is_ok());
    }

    #[tokio::test]
    async fn concurrent_issues_leave_one_consistent_nonce() {
        let store = std::sync::Arc::new(store());
        let id = wallet('d');
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move { store.issue(&id) }));
        }
        let mut issued = Vec::new();
        for handle in handles {
            issued.push(handle.await.unwrap());
        }

        let live = store.take(&id).unwrap();
        assert!(issued.contains(&live));
        assert!(store.is_empty());
    }
}
