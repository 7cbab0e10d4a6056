//! A shared cache holding the current credential

use std::{error, fmt, sync::Arc};

use aliri_clock::{Clock, DurationSecs, System, UnixTime};
use arc_swap::ArcSwapOption;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::{
    events::{EventSink, LifecycleEvent, TracingEventSink},
    sources::TokenFetcher,
    Credential, IdentityRequest, RefreshPolicy, UnusableToken,
};

/// A credential could not be refreshed
///
/// The cached credential is left exactly as it was before the attempt.
#[derive(Debug, Error)]
pub enum CredentialFetchError {
    /// The identity provider call failed
    #[error("identity provider could not issue a token")]
    Provider(#[source] Box<dyn error::Error + Send + Sync + 'static>),
    /// The identity provider issued a token that cannot be cached
    #[error("identity provider issued an unusable token")]
    Unusable(#[from] UnusableToken),
}

/// A process-wide cache for a single credential
///
/// Construct one cache per identity, share it behind an [`Arc`], and call
/// [`ensure_fresh()`][Self::ensure_fresh()] before every use of the credential.
/// Readers of a fresh credential never wait on a refresh. Refreshes are
/// serialized, so callers that observe the same stale credential share a single
/// request to the identity provider.
pub struct TokenCache<F, C = System> {
    credential: ArcSwapOption<Credential>,
    refresh: Mutex<()>,
    fetcher: F,
    events: Arc<dyn EventSink>,
    clock: C,
}

impl<F> TokenCache<F, System> {
    /// Constructs a new, empty cache that refreshes using `fetcher`
    pub fn new(fetcher: F) -> Self {
        Self {
            credential: ArcSwapOption::empty(),
            refresh: Mutex::new(()),
            fetcher,
            events: Arc::new(TracingEventSink),
            clock: System,
        }
    }
}

impl<F, C> TokenCache<F, C> {
    /// Sets the sink that receives lifecycle events
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets a custom clock to be used
    ///
    /// Useful for testing purposes
    pub fn with_clock<D>(self, clock: D) -> TokenCache<F, D> {
        TokenCache {
            credential: self.credential,
            refresh: self.refresh,
            fetcher: self.fetcher,
            events: self.events,
            clock,
        }
    }

    /// Seeds the cache with a previously obtained credential
    pub fn with_credential(self, credential: Credential) -> Self {
        self.credential.store(Some(Arc::new(credential)));
        self
    }

    /// Gets a snapshot of the currently cached credential, if any
    ///
    /// The snapshot is not checked for freshness.
    pub fn current(&self) -> Option<Arc<Credential>> {
        self.credential.load_full()
    }

    fn fresh_credential(&self, now: UnixTime, margin: DurationSecs) -> Option<Arc<Credential>> {
        self.credential
            .load_full()
            .filter(|credential| credential.is_fresh_at(now, margin))
    }
}

impl<F, C: Clock> TokenCache<F, C> {
    /// Gets the current time according to the cache's clock
    #[inline]
    pub fn now(&self) -> UnixTime {
        self.clock.now()
    }
}

impl<F: TokenFetcher, C: Clock> TokenCache<F, C> {
    /// Ensures the cached credential is fresh, refreshing it if required
    ///
    /// See [`ensure_fresh_at()`][Self::ensure_fresh_at()].
    pub async fn ensure_fresh(
        &self,
        identity: &IdentityRequest,
        policy: &RefreshPolicy,
    ) -> Result<Arc<Credential>, CredentialFetchError> {
        self.ensure_fresh_at(identity, policy, self.clock.now())
            .await
    }
}

impl<F: TokenFetcher, C> TokenCache<F, C> {
    /// Ensures the cached credential is fresh as of `now`, refreshing it if required
    ///
    /// A credential is served from the cache when it remains valid for at least the
    /// policy's safety margin past `now`. Otherwise a new token is fetched and
    /// replaces the cached credential as a whole. If the fetch fails, or the
    /// returned future is dropped before it completes, the cache is left untouched.
    #[tracing::instrument(
        skip_all,
        fields(
            credentials.tenant_id = %identity.tenant_id(),
            credentials.client_id = %identity.client_id(),
        ),
    )]
    pub async fn ensure_fresh_at(
        &self,
        identity: &IdentityRequest,
        policy: &RefreshPolicy,
        now: UnixTime,
    ) -> Result<Arc<Credential>, CredentialFetchError> {
        let margin = policy.safety_margin();

        if let Some(credential) = self.fresh_credential(now, margin) {
            self.events.record(LifecycleEvent::ValidTokenPresent);
            return Ok(credential);
        }

        let _refresh = self.refresh.lock().await;

        // Another caller may have refreshed while we waited on the lock.
        if let Some(credential) = self.fresh_credential(now, margin) {
            self.events.record(LifecycleEvent::ValidTokenPresent);
            return Ok(credential);
        }

        self.events.record(LifecycleEvent::NoValidToken);

        let credential = match self.refresh_credential(identity, policy).await {
            Ok(credential) => credential,
            Err(error) => {
                tracing::warn!(
                    error = (&error as &dyn error::Error),
                    "unable to refresh credential, cached state left unchanged"
                );
                return Err(error);
            }
        };

        if !credential.is_fresh_at(now, margin) {
            tracing::warn!(
                expiry = credential.expires_at().0,
                safety_margin = margin.0,
                "identity provider issued a token expiring within the safety margin"
            );
        }

        self.credential.store(Some(Arc::clone(&credential)));
        self.events.record(LifecycleEvent::TokenSet);

        Ok(credential)
    }

    async fn refresh_credential(
        &self,
        identity: &IdentityRequest,
        policy: &RefreshPolicy,
    ) -> Result<Arc<Credential>, CredentialFetchError> {
        let issued = self
            .fetcher
            .fetch_token(identity, policy.scope())
            .await
            .map_err(|error| CredentialFetchError::Provider(Box::new(error)))?;

        let credential = Credential::new(issued.access_token, issued.expires_at)?;
        Ok(Arc::new(credential))
    }
}

impl<F, C> fmt::Debug for TokenCache<F, C>
where
    F: fmt::Debug,
    C: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("credential", &self.credential.load_full())
            .field("fetcher", &self.fetcher)
            .field("clock", &self.clock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex as StdMutex,
        },
        time::Duration,
    };

    use aliri_clock::TestClock;
    use async_trait::async_trait;
    use tracing_test::traced_test;

    use super::*;
    use crate::{
        sources::IssuedToken, AccessToken, ClientId, ClientSecret, ScopeRef, TenantId,
    };

    const NOW: UnixTime = UnixTime(1_700_000_000);
    const MARGIN: u64 = 5 * 60;

    #[derive(Debug)]
    struct StubFetcher {
        token: &'static str,
        expires_at: UnixTime,
        failure: &'static str,
        failures_remaining: AtomicUsize,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl StubFetcher {
        fn issuing(token: &'static str, expires_at: UnixTime) -> Self {
            Self {
                token,
                expires_at,
                failure: "",
                failures_remaining: AtomicUsize::new(0),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(failure: &'static str) -> Self {
            Self::issuing("unused", at(3600)).failing_times(usize::MAX, failure)
        }

        fn failing_times(mut self, times: usize, failure: &'static str) -> Self {
            self.failure = failure;
            self.failures_remaining = AtomicUsize::new(times);
            self
        }

        fn slowly(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::Acquire)
        }
    }

    #[async_trait]
    impl TokenFetcher for StubFetcher {
        type Error = io::Error;

        async fn fetch_token(
            &self,
            _: &IdentityRequest,
            _: &ScopeRef,
        ) -> Result<IssuedToken, Self::Error> {
            self.calls.fetch_add(1, Ordering::AcqRel);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let failed = self
                .failures_remaining
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    self.failure,
                ));
            }

            Ok(IssuedToken {
                access_token: AccessToken::from_static(self.token),
                expires_at: self.expires_at,
            })
        }
    }

    #[derive(Debug, Default)]
    struct RecordingSink {
        events: StdMutex<Vec<LifecycleEvent>>,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<LifecycleEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventSink for RecordingSink {
        fn record(&self, event: LifecycleEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn identity() -> IdentityRequest {
        IdentityRequest::new(
            TenantId::from_static("tenant id"),
            ClientId::from_static("client id"),
            ClientSecret::from_static("client secret"),
        )
        .unwrap()
    }

    fn at(offset: i64) -> UnixTime {
        UnixTime((NOW.0 as i64 + offset) as u64)
    }

    fn credential(token: &'static str, expires_at: UnixTime) -> Credential {
        Credential::new(AccessToken::from_static(token), expires_at).unwrap()
    }

    fn cache(
        fetcher: &Arc<StubFetcher>,
    ) -> (TokenCache<Arc<StubFetcher>>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let cache = TokenCache::new(Arc::clone(fetcher)).with_event_sink(sink.clone());
        (cache, sink)
    }

    #[tokio::test]
    async fn cold_cache_fetches_and_stores_token() {
        let fetcher = Arc::new(StubFetcher::issuing("token1", at(10 * MARGIN as i64)));
        let (cache, sink) = cache(&fetcher);

        let issued = cache
            .ensure_fresh_at(&identity(), &RefreshPolicy::default(), NOW)
            .await
            .unwrap();

        assert_eq!(*issued, credential("token1", at(10 * MARGIN as i64)));
        assert_eq!(
            cache.current().as_deref(),
            Some(&credential("token1", at(10 * MARGIN as i64)))
        );
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(
            sink.events(),
            [LifecycleEvent::NoValidToken, LifecycleEvent::TokenSet]
        );
    }

    #[tokio::test]
    async fn expired_token_is_fully_replaced() {
        let fetcher = Arc::new(StubFetcher::issuing("token2", at(MARGIN as i64)));
        let (cache, _) = cache(&fetcher);
        let cache = cache.with_credential(credential("mytoken", at(-4 * MARGIN as i64)));

        cache
            .ensure_fresh_at(&identity(), &RefreshPolicy::default(), NOW)
            .await
            .unwrap();

        let current = cache.current().unwrap();
        assert_eq!(current.access_token().as_str(), "token2");
        assert_eq!(current.expires_at(), at(MARGIN as i64));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn fresh_token_is_served_without_fetch() {
        let fetcher = Arc::new(StubFetcher::issuing("unused", at(20 * MARGIN as i64)));
        let (cache, sink) = cache(&fetcher);
        let cache = cache.with_credential(credential("token", at(10 * MARGIN as i64)));

        let served = cache
            .ensure_fresh_at(&identity(), &RefreshPolicy::default(), NOW)
            .await
            .unwrap();

        assert_eq!(*served, credential("token", at(10 * MARGIN as i64)));
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(sink.events(), [LifecycleEvent::ValidTokenPresent]);
    }

    #[tokio::test]
    async fn token_expiring_exactly_at_margin_is_not_refreshed() {
        let fetcher = Arc::new(StubFetcher::issuing("unused", at(20 * MARGIN as i64)));
        let (cache, _) = cache(&fetcher);
        let cache = cache.with_credential(credential("token", at(MARGIN as i64)));

        cache
            .ensure_fresh_at(&identity(), &RefreshPolicy::default(), NOW)
            .await
            .unwrap();

        assert_eq!(fetcher.calls(), 0);
        assert_eq!(cache.current().unwrap().access_token().as_str(), "token");
    }

    #[tokio::test]
    async fn token_inside_margin_is_refreshed() {
        let fetcher = Arc::new(StubFetcher::issuing("renewed", at(3600)));
        let (cache, _) = cache(&fetcher);
        let cache = cache.with_credential(credential("token", at(MARGIN as i64 - 1)));

        cache
            .ensure_fresh_at(&identity(), &RefreshPolicy::default(), NOW)
            .await
            .unwrap();

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(cache.current().unwrap().access_token().as_str(), "renewed");
    }

    #[tokio::test]
    async fn failed_fetch_leaves_stale_credential_untouched() {
        let fetcher = Arc::new(StubFetcher::failing("connection refused"));
        let (cache, sink) = cache(&fetcher);
        let cache = cache.with_credential(credential("stale", at(-60)));
        let before = cache.current().unwrap();

        let err = cache
            .ensure_fresh_at(&identity(), &RefreshPolicy::default(), NOW)
            .await
            .unwrap_err();

        assert!(matches!(err, CredentialFetchError::Provider(_)));
        assert_eq!(err.to_string(), "identity provider could not issue a token");
        let cause = error::Error::source(&err).map(ToString::to_string);
        assert_eq!(cause.as_deref(), Some("connection refused"));
        let after = cache.current().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(sink.events(), [LifecycleEvent::NoValidToken]);
    }

    #[tokio::test]
    async fn failed_fetch_leaves_empty_cache_empty() {
        let fetcher = Arc::new(StubFetcher::failing("unauthorized_client"));
        let (cache, _) = cache(&fetcher);

        let result = cache
            .ensure_fresh_at(&identity(), &RefreshPolicy::default(), NOW)
            .await;

        assert!(result.is_err());
        assert!(cache.current().is_none());
    }

    #[tokio::test]
    async fn unusable_token_is_rejected() {
        let fetcher = Arc::new(StubFetcher::issuing("", at(3600)));
        let (cache, _) = cache(&fetcher);

        let err = cache
            .ensure_fresh_at(&identity(), &RefreshPolicy::default(), NOW)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CredentialFetchError::Unusable(UnusableToken::EmptyAccessToken)
        ));
        assert!(cache.current().is_none());
    }

    #[tokio::test]
    async fn failed_refresh_is_retried_on_next_call() {
        let fetcher = Arc::new(
            StubFetcher::issuing("recovered", at(3600)).failing_times(1, "timed out"),
        );
        let (cache, sink) = cache(&fetcher);
        let cache = cache.with_credential(credential("stale", at(-60)));

        assert!(cache
            .ensure_fresh_at(&identity(), &RefreshPolicy::default(), NOW)
            .await
            .is_err());
        assert_eq!(cache.current().unwrap().access_token().as_str(), "stale");

        cache
            .ensure_fresh_at(&identity(), &RefreshPolicy::default(), NOW)
            .await
            .unwrap();
        assert_eq!(cache.current().unwrap().access_token().as_str(), "recovered");
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(
            sink.events(),
            [
                LifecycleEvent::NoValidToken,
                LifecycleEvent::NoValidToken,
                LifecycleEvent::TokenSet
            ]
        );
    }

    #[tokio::test]
    async fn ensure_fresh_uses_the_configured_clock() {
        let fetcher = Arc::new(StubFetcher::issuing("token", at(3600)));
        let cache = TokenCache::new(Arc::clone(&fetcher))
            .with_credential(credential("cached", at(MARGIN as i64 + 60)))
            .with_clock(TestClock::new(NOW));

        cache
            .ensure_fresh(&identity(), &RefreshPolicy::default())
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), 0);

        let cache = cache.with_clock(TestClock::new(at(120)));
        cache
            .ensure_fresh(&identity(), &RefreshPolicy::default())
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(cache.current().unwrap().access_token().as_str(), "token");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_refresh() {
        let fetcher = Arc::new(
            StubFetcher::issuing("shared", at(3600)).slowly(Duration::from_millis(50)),
        );
        let (cache, _) = cache(&fetcher);
        let cache = Arc::new(cache);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move {
                    cache
                        .ensure_fresh_at(&identity(), &RefreshPolicy::default(), NOW)
                        .await
                        .map(|c| c.access_token().as_str().to_owned())
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "shared");
        }

        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn cancelled_refresh_leaves_cache_untouched() {
        let fetcher = Arc::new(
            StubFetcher::issuing("never", at(3600)).slowly(Duration::from_secs(60)),
        );
        let (cache, _) = cache(&fetcher);
        let cache = cache.with_credential(credential("stale", at(-60)));

        let attempt = tokio::time::timeout(
            Duration::from_millis(10),
            cache.ensure_fresh_at(&identity(), &RefreshPolicy::default(), NOW),
        )
        .await;

        assert!(attempt.is_err());
        assert_eq!(cache.current().unwrap().access_token().as_str(), "stale");
    }

    #[tokio::test]
    #[traced_test]
    async fn default_sink_logs_lifecycle_messages() {
        let fetcher = Arc::new(StubFetcher::issuing("token", at(3600)));
        let cache = TokenCache::new(Arc::clone(&fetcher));

        cache
            .ensure_fresh_at(&identity(), &RefreshPolicy::default(), NOW)
            .await
            .unwrap();
        cache
            .ensure_fresh_at(&identity(), &RefreshPolicy::default(), NOW)
            .await
            .unwrap();

        assert!(logs_contain("No valid token, token will be requested."));
        assert!(logs_contain("Token was set."));
        assert!(logs_contain("A valid token is present, no need to request it."));
        assert!(!logs_contain("client secret"));
    }
}
