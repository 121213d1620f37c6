use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant, SystemTime},
};

use {
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info},
};

#[cfg(feature = "metrics")]
use tgdrive_metrics::{counter, gauge, sessions as session_metrics};

use crate::token::{generate_token, token_prefix};

/// How long an upload link stays usable.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Authorization to upload one file on behalf of a chat user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub token: String,
    /// Chat user the upload is delivered to.
    pub owner: String,
    /// Suggested name taken from the chat announcement.
    pub filename_hint: Option<String>,
    pub created_at: SystemTime,
    pub consumed: bool,
}

struct Entry {
    session: UploadSession,
    minted: Instant,
    /// A browser upload against this token is in flight.
    claimed: bool,
}

impl Entry {
    fn is_live(&self, now: Instant, ttl: Duration) -> bool {
        !self.session.consumed && now.saturating_duration_since(self.minted) < ttl
    }
}

/// Token-keyed session registry shared by the chat loop and the web
/// handlers.
///
/// All operations run under one `std::sync::Mutex`; none of them await while
/// holding it, so each call is linearizable.
pub struct UploadSessionStore {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl Default for UploadSessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}

impl UploadSessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a session for `owner` and return its token.
    pub fn mint(&self, owner: &str, filename_hint: Option<String>) -> String {
        let mut entries = self.lock();
        let token = loop {
            let candidate = generate_token();
            if !entries.contains_key(&candidate) {
                break candidate;
            }
        };

        entries.insert(token.clone(), Entry {
            session: UploadSession {
                token: token.clone(),
                owner: owner.to_string(),
                filename_hint,
                created_at: SystemTime::now(),
                consumed: false,
            },
            minted: Instant::now(),
            claimed: false,
        });

        #[cfg(feature = "metrics")]
        {
            counter!(session_metrics::MINTED_TOTAL).increment(1);
            gauge!(session_metrics::ACTIVE).set(entries.len() as f64);
        }

        debug!(owner, token = token_prefix(&token), "minted upload session");
        token
    }

    /// Look up a usable session.
    ///
    /// Unknown, expired and consumed tokens all yield `None`; callers must
    /// answer them identically.
    pub fn resolve(&self, token: &str) -> Option<UploadSession> {
        let entries = self.lock();
        let found = entries
            .get(token)
            .filter(|entry| entry.is_live(Instant::now(), self.ttl))
            .map(|entry| entry.session.clone());

        #[cfg(feature = "metrics")]
        if found.is_none() {
            counter!(session_metrics::REJECTED_TOTAL).increment(1);
        }

        found
    }

    /// Retire a session. Returns `true` for exactly one caller per live
    /// token; `false` when it was already consumed, expired or never
    /// existed.
    pub fn consume(&self, token: &str) -> bool {
        let mut entries = self.lock();
        let now = Instant::now();
        let Some(entry) = entries
            .get_mut(token)
            .filter(|entry| entry.is_live(now, self.ttl))
        else {
            return false;
        };

        entry.session.consumed = true;
        entry.claimed = false;

        #[cfg(feature = "metrics")]
        counter!(session_metrics::CONSUMED_TOTAL).increment(1);

        debug!(
            owner = %entry.session.owner,
            token = token_prefix(token),
            "upload session consumed"
        );
        true
    }

    /// Reserve a live session for one in-flight browser upload.
    ///
    /// A second claim on the same token fails until the first one is
    /// consumed (session retired) or dropped (session usable again), so a
    /// concurrent duplicate submission is turned away before it touches
    /// storage.
    pub fn claim(self: &Arc<Self>, token: &str) -> Option<SessionClaim> {
        let mut entries = self.lock();
        let now = Instant::now();
        let entry = entries
            .get_mut(token)
            .filter(|entry| entry.is_live(now, self.ttl) && !entry.claimed)?;
        entry.claimed = true;

        Some(SessionClaim {
            store: Arc::clone(self),
            session: entry.session.clone(),
            settled: false,
        })
    }

    fn release(&self, token: &str) {
        if let Some(entry) = self.lock().get_mut(token) {
            entry.claimed = false;
        }
    }

    /// Drop consumed and expired sessions. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.lock();
        let now = Instant::now();
        let before = entries.len();
        // An in-flight claim keeps its entry until it settles.
        entries.retain(|_, entry| entry.claimed || entry.is_live(now, self.ttl));
        let removed = before - entries.len();

        #[cfg(feature = "metrics")]
        {
            counter!(session_metrics::EXPIRED_TOTAL).increment(removed as u64);
            gauge!(session_metrics::ACTIVE).set(entries.len() as f64);
        }

        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Periodically purge dead sessions until `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = store.purge_expired();
                        if removed > 0 {
                            info!(removed, remaining = store.len(), "purged upload sessions");
                        }
                    },
                }
            }
            debug!("upload session sweeper stopped");
        })
    }
}

/// Exclusive hold on a session while one browser upload runs.
///
/// Dropping the claim without [`SessionClaim::consume`] (handler error,
/// cancelled request) makes the token usable again.
pub struct SessionClaim {
    store: Arc<UploadSessionStore>,
    session: UploadSession,
    settled: bool,
}

impl SessionClaim {
    #[must_use]
    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    /// Retire the session; see [`UploadSessionStore::consume`].
    pub fn consume(mut self) -> bool {
        self.settled = true;
        self.store.consume(&self.session.token)
    }
}

impl Drop for SessionClaim {
    fn drop(&mut self) {
        if !self.settled {
            self.store.release(&self.session.token);
        }
    }
}

impl std::fmt::Debug for SessionClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClaim")
            .field("owner", &self.session.owner)
            .field("token", &token_prefix(&self.session.token))
            .finish_non_exhaustive()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    #[test]
    fn resolve_returns_minted_session() {
        let store = UploadSessionStore::default();
        let token = store.mint("1001", Some("report.pdf".into()));

        let session = store.resolve(&token).unwrap();
        assert_eq!(session.token, token);
        assert_eq!(session.owner, "1001");
        assert_eq!(session.filename_hint.as_deref(), Some("report.pdf"));
        assert!(!session.consumed);
    }

    #[test]
    fn consume_once_then_not_found() {
        let store = UploadSessionStore::default();
        let token = store.mint("1001", None);

        assert!(store.consume(&token));
        assert!(store.resolve(&token).is_none());
        assert!(!store.consume(&token));
    }

    #[test]
    fn unknown_token_is_not_found() {
        let store = UploadSessionStore::default();
        assert!(store.resolve("does-not-exist").is_none());
        assert!(!store.consume("does-not-exist"));
    }

    #[test]
    fn expired_session_is_unusable() {
        let store = UploadSessionStore::new(Duration::ZERO);
        let token = store.mint("1001", None);

        assert!(store.resolve(&token).is_none());
        assert!(!store.consume(&token));
        assert_eq!(store.purge_expired(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_consume_has_one_winner() {
        let store = Arc::new(UploadSessionStore::default());
        let token = store.mint("1001", None);
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                let token = token.clone();
                let winners = Arc::clone(&winners);
                std::thread::spawn(move || {
                    if store.consume(&token) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn claim_excludes_second_claim_until_released() {
        let store = Arc::new(UploadSessionStore::default());
        let token = store.mint("1001", None);

        let first = store.claim(&token).unwrap();
        assert!(store.claim(&token).is_none());
        // a claimed session still resolves (the form can be shown)
        assert!(store.resolve(&token).is_some());

        drop(first);
        let second = store.claim(&token).unwrap();
        assert!(second.consume());
        assert!(store.claim(&token).is_none());
        assert!(store.resolve(&token).is_none());
    }

    #[test]
    fn claim_loses_to_direct_consume() {
        let store = Arc::new(UploadSessionStore::default());
        let token = store.mint("1001", None);

        let claim = store.claim(&token).unwrap();
        assert!(store.consume(&token));
        assert!(!claim.consume());
    }

    #[test]
    fn purge_keeps_live_and_claimed_sessions() {
        let store = Arc::new(UploadSessionStore::default());
        let live = store.mint("1", None);
        let consumed = store.mint("2", None);
        assert!(store.consume(&consumed));

        assert_eq!(store.purge_expired(), 1);
        assert!(store.resolve(&live).is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn tokens_do_not_repeat() {
        let store = UploadSessionStore::default();
        let tokens: std::collections::HashSet<_> =
            (0..200).map(|i| store.mint(&i.to_string(), None)).collect();
        assert_eq!(tokens.len(), 200);
        assert_eq!(store.len(), 200);
    }

    #[tokio::test]
    async fn sweeper_purges_and_stops_on_cancel() {
        let store = Arc::new(UploadSessionStore::new(Duration::ZERO));
        store.mint("1001", None);
        let cancel = CancellationToken::new();

        let handle = store.spawn_sweeper(Duration::from_millis(10), cancel.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }
}
