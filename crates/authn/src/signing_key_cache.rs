//! Issuer-keyed signing key cache for token validation.
//!
//! This module provides [`SigningKeyCache`], which wraps a
//! [`SigningKeySetResolver`] with in-memory caching so that only the first
//! validation for an issuer (and the first after a flush) pays for discovery
//! and key set retrieval.
//!
//! # Architecture
//!
//! ```text
//! get_key(issuer, kid)
//!   → cached entry for issuer containing kid?  → hit
//!   → otherwise join (or start) the issuer's in-flight resolution
//!       → SigningKeySetResolver::resolve(issuer)
//!       → replace the issuer's entry
//!   → scan the fresh key list; still absent → KeyIdentifierNotFound
//! ```
//!
//! # Concurrency
//!
//! Resolution is single-flight per issuer: concurrent misses share one
//! resolver call and all observe the same keys or the same error. The map is
//! guarded by a synchronous mutex that is never held across an `.await`.
//!
//! [`flush`](SigningKeyCache::flush) detaches any in-flight resolution. Callers
//! already waiting on it still receive its outcome, but the result is not
//! written back, and the next lookup starts a fresh resolution.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use openid_authn::{DiscoveryKeySetResolver, SigningKeyCache};
//! use openid_authn::http::ReqwestGetter;
//!
//! # async fn example() -> openid_authn::Result<()> {
//! let getter = Arc::new(ReqwestGetter::new(&Default::default())?);
//! let cache = SigningKeyCache::new(Arc::new(DiscoveryKeySetResolver::new(getter)));
//!
//! let key = cache.get_key("https://accounts.example.com", "2024-key-1").await?;
//! println!("verifying with a {} key", key.key_type);
//! # Ok(())
//! # }
//! ```

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use fail::fail_point;
use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::error::{AuthError, Result};
use crate::key_set::{SigningKey, SigningKeySetResolver};

type KeyList = Arc<[SigningKey]>;

/// One shared resolution. The first caller to reach the cell runs the
/// resolver; everyone else awaits the stored outcome.
type Flight = Arc<OnceCell<Result<KeyList>>>;

/// A resolved key list and the instant it was stored.
struct CacheEntry {
    keys: KeyList,
    resolved_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    in_flight: HashMap<String, Flight>,
}

impl CacheState {
    fn cached_key(&self, issuer: &str, kid: &str, max_age: Option<Duration>) -> Option<SigningKey> {
        let entry = self.entries.get(issuer)?;
        if max_age.is_some_and(|max_age| entry.resolved_at.elapsed() > max_age) {
            return None;
        }
        find_key(&entry.keys, kid).cloned()
    }
}

/// Outcome of the synchronous part of a lookup.
enum Lookup {
    Hit(SigningKey),
    Wait(Flight),
}

/// Point-in-time snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    /// Lookups served from a cached entry.
    pub hits: u64,
    /// Lookups that had to wait for a resolution.
    pub misses: u64,
    /// Resolver invocations.
    pub resolutions: u64,
    /// Calls to [`SigningKeyCache::flush`].
    pub flushes: u64,
}

/// Cache of signing keys keyed by issuer.
///
/// Entries are created on the first successful resolution for an issuer,
/// replaced wholesale on refresh and deleted on flush. They are never
/// partially mutated. Failed resolutions are not cached.
pub struct SigningKeyCache {
    resolver: Arc<dyn SigningKeySetResolver>,
    state: Mutex<CacheState>,
    /// Entries older than this are treated as misses. `None` keeps entries
    /// until they are flushed.
    max_age: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
    resolutions: AtomicU64,
    flushes: AtomicU64,
}

impl SigningKeyCache {
    /// Creates an empty cache that never expires entries on its own.
    #[must_use]
    pub fn new(resolver: Arc<dyn SigningKeySetResolver>) -> Self {
        Self {
            resolver,
            state: Mutex::new(CacheState::default()),
            max_age: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            resolutions: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        }
    }

    /// Treats entries older than `max_age` as misses, so keys are refreshed
    /// periodically even without signature failures.
    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Returns the configured maximum entry age.
    #[must_use]
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    /// Returns the signing key `kid` published by `issuer`.
    ///
    /// An empty `kid` selects the first published key.
    ///
    /// # Errors
    ///
    /// Returns the resolver's error unmodified if a needed resolution fails,
    /// or [`AuthError::KeyIdentifierNotFound`] if `kid` is absent from a
    /// freshly resolved key list.
    #[tracing::instrument(skip(self))]
    pub async fn get_key(&self, issuer: &str, kid: &str) -> Result<SigningKey> {
        let flight = match self.begin_lookup(issuer, kid) {
            Lookup::Hit(key) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("cache hit");
                return Ok(key);
            },
            Lookup::Wait(flight) => flight,
        };
        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("cache miss");

        let keys = flight.get_or_init(|| self.resolve_flight(issuer, &flight)).await.clone()?;

        find_key(&keys, kid).cloned().ok_or_else(|| {
            tracing::warn!(available = keys.len(), "key identifier not found after refresh");
            AuthError::key_identifier_not_found(issuer, kid)
        })
    }

    /// Removes the cached entry for `issuer` and detaches any in-flight
    /// resolution. The next [`get_key`](Self::get_key) re-resolves.
    ///
    /// An audit event is emitted at INFO level.
    #[tracing::instrument(skip(self))]
    pub fn flush(&self, issuer: &str) {
        let (entry_removed, flight_detached) = {
            let mut state = self.state.lock();
            (state.entries.remove(issuer).is_some(), state.in_flight.remove(issuer).is_some())
        };
        self.flushes.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            audit.action = "flush_signing_keys",
            audit.resource = %issuer,
            audit.result = "success",
            audit.entry_removed = entry_removed,
            audit.flight_detached = flight_detached,
            "audit_event"
        );
    }

    /// Removes every cached entry and detaches every in-flight resolution.
    ///
    /// An audit event is emitted at INFO level.
    #[tracing::instrument(skip(self))]
    pub fn clear_all(&self) {
        let (evicted, detached) = {
            let mut state = self.state.lock();
            let counts = (state.entries.len(), state.in_flight.len());
            state.entries.clear();
            state.in_flight.clear();
            counts
        };
        tracing::info!(
            audit.action = "clear_signing_keys",
            audit.resource = "all_issuers",
            audit.result = "success",
            audit.evicted = evicted,
            audit.detached = detached,
            "audit_event"
        );
    }

    /// Returns the number of issuers with a cached entry.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns the key identifiers cached for `issuer`, in published order.
    #[must_use]
    pub fn cached_key_ids(&self, issuer: &str) -> Option<Vec<String>> {
        self.state
            .lock()
            .entries
            .get(issuer)
            .map(|entry| entry.keys.iter().map(|key| key.key_id.clone()).collect())
    }

    /// Returns a snapshot of the cache counters.
    #[must_use]
    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            resolutions: self.resolutions.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }

    /// Serves a hit, or returns the flight to wait on, under one lock so a
    /// completing resolution is never missed between the two checks.
    fn begin_lookup(&self, issuer: &str, kid: &str) -> Lookup {
        let mut state = self.state.lock();
        if let Some(key) = state.cached_key(issuer, kid, self.max_age) {
            return Lookup::Hit(key);
        }
        let flight = state
            .in_flight
            .entry(issuer.to_owned())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        Lookup::Wait(flight)
    }

    /// Runs the resolver for `flight` and publishes the result if the flight
    /// is still the issuer's current one.
    async fn resolve_flight(&self, issuer: &str, flight: &Flight) -> Result<KeyList> {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        let result: Result<KeyList> = self.fetch_keys(issuer).await.map(Arc::from);

        let mut state = self.state.lock();
        let is_current = state.in_flight.get(issuer).is_some_and(|current| Arc::ptr_eq(current, flight));
        if !is_current {
            tracing::debug!(issuer, "discarding key set: issuer was flushed during resolution");
            return result;
        }
        state.in_flight.remove(issuer);
        match &result {
            Ok(keys) => {
                state
                    .entries
                    .insert(issuer.to_owned(), CacheEntry { keys: Arc::clone(keys), resolved_at: Instant::now() });
                tracing::debug!(issuer, keys = keys.len(), "cached signing keys");
            },
            Err(err) => tracing::warn!(issuer, error = %err, "signing key resolution failed"),
        }
        result
    }

    async fn fetch_keys(&self, issuer: &str) -> Result<Vec<SigningKey>> {
        fail_point!("cache-before-resolve", |_| {
            Err(AuthError::key_set_fetch_failure(
                issuer,
                Arc::new(std::io::Error::other("injected failure before key set resolution")),
            ))
        });
        self.resolver.resolve(issuer).await
    }
}

impl std::fmt::Debug for SigningKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyCache")
            .field("max_age", &self.max_age)
            .field("metrics", &self.metrics())
            .finish_non_exhaustive()
    }
}

/// Empty `kid` selects the first key; otherwise the match must be exact.
fn find_key<'a>(keys: &'a [SigningKey], kid: &str) -> Option<&'a SigningKey> {
    if kid.is_empty() {
        keys.first()
    } else {
        keys.iter().find(|key| key.key_id == kid)
    }
}
