//! Request rate limiting.
//!
//! Throttles count requests per `(scope, identity)` key in a sliding window.
//! Buckets live in a process-wide [`ThrottleStore`]; stale buckets are swept
//! every few thousand checks and, when the server enables it, by a background
//! task.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use faster_app_core::{AppError, AppResult, SETTINGS};
use faster_app_http::RequestContext;
use once_cell::sync::Lazy;
use serde_json::json;
use tokio::time::Instant;

use super::base::Resource;
use crate::short_type_name;

/// Message carried by throttle denials.
pub const THROTTLED: &str = "Request was throttled. Please try again later.";

const DEFAULT_SWEEP_EVERY: u64 = 4096;

// ── Rate ────────────────────────────────────────────────────────────

/// `count` requests per `period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    pub count: usize,
    pub period: Duration,
}

impl Rate {
    pub const fn new(count: usize, period: Duration) -> Self {
        Self { count, period }
    }

    pub const fn per_second(count: usize) -> Self {
        Self::new(count, Duration::from_secs(1))
    }

    pub const fn per_minute(count: usize) -> Self {
        Self::new(count, Duration::from_secs(60))
    }

    pub const fn per_hour(count: usize) -> Self {
        Self::new(count, Duration::from_secs(3600))
    }

    pub const fn per_day(count: usize) -> Self {
        Self::new(count, Duration::from_secs(86_400))
    }
}

impl FromStr for Rate {
    type Err = AppError;

    /// Parses `"100/hour"`; the period may be `second`, `minute`, `hour`,
    /// `day`, or their first letter.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AppError::improperly_configured(format!("Invalid throttle rate '{s}'"));
        let (count, period) = s.split_once('/').ok_or_else(invalid)?;
        let count = count.trim().parse::<usize>().map_err(|_| invalid())?;
        let secs = match period.trim().to_ascii_lowercase().as_str() {
            "s" | "sec" | "second" | "seconds" => 1,
            "m" | "min" | "minute" | "minutes" => 60,
            "h" | "hour" | "hours" => 3600,
            "d" | "day" | "days" => 86_400,
            _ => return Err(invalid()),
        };
        Ok(Self::new(count, Duration::from_secs(secs)))
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let period = match self.period.as_secs() {
            1 => "second",
            60 => "minute",
            3600 => "hour",
            86_400 => "day",
            other => return write!(f, "{}/{other}s", self.count),
        };
        write!(f, "{}/{period}", self.count)
    }
}

// ── ThrottleStore ───────────────────────────────────────────────────

static GLOBAL_STORE: Lazy<Arc<ThrottleStore>> = Lazy::new(|| Arc::new(ThrottleStore::new()));

/// Sliding-window hit timestamps keyed by throttle key.
#[derive(Debug)]
pub struct ThrottleStore {
    buckets: DashMap<String, VecDeque<Instant>>,
    longest_window_ms: AtomicU64,
    checks: AtomicU64,
    sweep_every: u64,
}

impl Default for ThrottleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ThrottleStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
            longest_window_ms: AtomicU64::new(0),
            checks: AtomicU64::new(0),
            sweep_every: DEFAULT_SWEEP_EVERY,
        }
    }

    /// Sweeps after every `n` checks; zero disables the amortized sweep.
    #[must_use]
    pub const fn with_sweep_every(mut self, n: u64) -> Self {
        self.sweep_every = n;
        self
    }

    /// The process-wide store.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_STORE)
    }

    /// Prunes `key`'s bucket and records a hit if fewer than `limit` remain.
    pub fn check_and_record(&self, key: &str, limit: usize, window: Duration) -> bool {
        self.note_window(window);
        let now = Instant::now();
        let allowed = {
            let mut bucket = self.buckets.entry(key.to_string()).or_default();
            prune(&mut bucket, now, window);
            if bucket.len() < limit {
                bucket.push_back(now);
                true
            } else {
                false
            }
        };
        let checks = self.checks.fetch_add(1, Ordering::Relaxed) + 1;
        if self.sweep_every > 0 && checks % self.sweep_every == 0 {
            self.sweep();
        }
        allowed
    }

    /// Time until the oldest hit of `key` leaves `window`.
    pub fn wait(&self, key: &str, window: Duration) -> Option<Duration> {
        let bucket = self.buckets.get(key)?;
        let oldest = *bucket.front()?;
        Some(window.saturating_sub(Instant::now().saturating_duration_since(oldest)))
    }

    /// Number of hits currently recorded for `key`.
    pub fn hits(&self, key: &str) -> usize {
        self.buckets.get(key).map_or(0, |b| b.len())
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Returns `true` if no bucket is tracked.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drops buckets whose newest hit is older than the longest window seen.
    ///
    /// Returns the number of buckets removed.
    pub fn sweep(&self) -> usize {
        let horizon = Duration::from_millis(self.longest_window_ms.load(Ordering::Relaxed));
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets.retain(|_, hits| {
            hits.back()
                .is_some_and(|newest| now.saturating_duration_since(*newest) < horizon)
        });
        let removed = before.saturating_sub(self.buckets.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.buckets.len(), "swept throttle buckets");
        }
        removed
    }

    /// Clears every bucket.
    pub fn clear(&self) {
        self.buckets.clear();
    }

    /// Spawns a task that sweeps every `interval`.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.sweep();
            }
        })
    }

    fn note_window(&self, window: Duration) {
        let ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self.longest_window_ms.fetch_max(ms, Ordering::Relaxed);
    }
}

fn prune(bucket: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = bucket.front() {
        if now.saturating_duration_since(*oldest) >= window {
            bucket.pop_front();
        } else {
            break;
        }
    }
}

// ── Throttle trait ──────────────────────────────────────────────────

/// A rate limit applied before authentication.
#[async_trait]
pub trait Throttle: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str {
        short_type_name::<Self>()
    }

    /// The bucket scope this throttle counts in.
    fn scope(&self, resource: &Resource) -> String;

    /// Returns `false` when the request must be refused.
    async fn allow_request(&self, ctx: &RequestContext, resource: &Resource) -> bool;

    /// Seconds the client should wait before retrying.
    fn wait(&self, _ctx: &RequestContext, _resource: &Resource) -> Option<u64> {
        None
    }
}

/// Runs a throttle chain; the first refusal becomes a `RateLimited` error.
pub async fn check_throttles(
    chain: &[Arc<dyn Throttle>],
    ctx: &RequestContext,
    resource: &Resource,
) -> AppResult<()> {
    for throttle in chain {
        if !throttle.allow_request(ctx, resource).await {
            let scope = throttle.scope(resource);
            let wait = throttle.wait(ctx, resource);
            tracing::info!(
                throttle = throttle.name(),
                scope = %scope,
                ident = %ctx.ident(),
                wait,
                "request throttled"
            );
            return Err(AppError::rate_limited(THROTTLED).with_data(json!({
                "scope": scope,
                "wait": wait,
            })));
        }
    }
    Ok(())
}

/// Never throttles.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoThrottle;

#[async_trait]
impl Throttle for NoThrottle {
    fn scope(&self, _resource: &Resource) -> String {
        "none".to_string()
    }

    async fn allow_request(&self, _ctx: &RequestContext, _resource: &Resource) -> bool {
        true
    }
}

// ── SimpleRateThrottle ──────────────────────────────────────────────

/// Counts every request under one scope.
///
/// The rate is resolved per request: an explicit rate, then the configured
/// rate for the scope, then the throttle's builtin fallback, then the
/// configured `default` rate. Without any rate the throttle allows everything.
#[derive(Debug, Clone)]
pub struct SimpleRateThrottle {
    rate: Option<Rate>,
    scope: Option<String>,
    fallback: Option<Rate>,
    rates: Option<HashMap<String, String>>,
    store: Arc<ThrottleStore>,
}

impl Default for SimpleRateThrottle {
    fn default() -> Self {
        Self {
            rate: None,
            scope: None,
            fallback: None,
            rates: None,
            store: ThrottleStore::global(),
        }
    }
}

impl SimpleRateThrottle {
    /// A throttle with a fixed rate, e.g. `("10/minute", "uploads")`.
    pub fn new(rate: &str, scope: impl Into<String>) -> AppResult<Self> {
        Ok(Self {
            rate: Some(rate.parse()?),
            scope: Some(scope.into()),
            ..Self::default()
        })
    }

    /// A throttle whose rate comes from configuration.
    pub fn for_scope(scope: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
            ..Self::default()
        }
    }

    /// Sets the rate.
    #[must_use]
    pub fn with_rate(mut self, rate: Rate) -> Self {
        self.rate = Some(rate);
        self
    }

    /// Uses `store` instead of the process-wide store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<ThrottleStore>) -> Self {
        self.store = store;
        self
    }

    /// Resolves scope rates from `rates` instead of the global settings.
    #[must_use]
    pub fn with_rates(mut self, rates: HashMap<String, String>) -> Self {
        self.rates = Some(rates);
        self
    }

    #[must_use]
    fn with_fallback(mut self, rate: Rate) -> Self {
        self.fallback = Some(rate);
        self
    }

    /// The store this throttle counts in.
    pub const fn store(&self) -> &Arc<ThrottleStore> {
        &self.store
    }

    /// Resolves the effective scope.
    pub fn resolve_scope(&self, resource: &Resource) -> String {
        self.scope
            .clone()
            .or_else(|| resource.throttle_scope.clone())
            .unwrap_or_else(|| "default".to_string())
    }

    /// Resolves the effective rate for `scope`.
    pub fn resolve_rate(&self, scope: &str) -> Option<Rate> {
        if let Some(rate) = self.rate {
            return Some(rate);
        }
        let configured = |key: &str| -> Option<Rate> {
            let raw = match &self.rates {
                Some(rates) => rates.get(key).cloned(),
                None => SETTINGS.get().throttle_rate(key).map(str::to_string),
            }?;
            match raw.parse() {
                Ok(rate) => Some(rate),
                Err(e) => {
                    tracing::warn!(scope = key, error = %e, "ignoring invalid throttle rate");
                    None
                }
            }
        };
        configured(scope)
            .or(self.fallback)
            .or_else(|| configured("default"))
    }

    /// The bucket key for a request.
    pub fn cache_key(scope: &str, ctx: &RequestContext) -> String {
        format!("throttle_{scope}_{}", ctx.ident())
    }
}

#[async_trait]
impl Throttle for SimpleRateThrottle {
    fn scope(&self, resource: &Resource) -> String {
        self.resolve_scope(resource)
    }

    async fn allow_request(&self, ctx: &RequestContext, resource: &Resource) -> bool {
        let scope = self.resolve_scope(resource);
        let Some(rate) = self.resolve_rate(&scope) else {
            return true;
        };
        self.store
            .check_and_record(&Self::cache_key(&scope, ctx), rate.count, rate.period)
    }

    fn wait(&self, ctx: &RequestContext, resource: &Resource) -> Option<u64> {
        let scope = self.resolve_scope(resource);
        let rate = self.resolve_rate(&scope)?;
        let remaining = self.store.wait(&Self::cache_key(&scope, ctx), rate.period)?;
        Some(ceil_secs(remaining))
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

// ── Identity-scoped variants ────────────────────────────────────────

/// Throttles authenticated requests under scope `user` (fallback 100/hour).
///
/// Throttles run before authentication, so this only sees identities that
/// were attached upstream of the pipeline.
#[derive(Debug, Clone)]
pub struct UserRateThrottle(SimpleRateThrottle);

impl Default for UserRateThrottle {
    fn default() -> Self {
        Self(SimpleRateThrottle::for_scope("user").with_fallback(Rate::per_hour(100)))
    }
}

impl UserRateThrottle {
    /// Overrides the rate.
    #[must_use]
    pub fn with_rate(self, rate: Rate) -> Self {
        Self(self.0.with_rate(rate))
    }

    /// Uses a private store.
    #[must_use]
    pub fn with_store(self, store: Arc<ThrottleStore>) -> Self {
        Self(self.0.with_store(store))
    }
}

#[async_trait]
impl Throttle for UserRateThrottle {
    fn scope(&self, resource: &Resource) -> String {
        self.0.resolve_scope(resource)
    }

    async fn allow_request(&self, ctx: &RequestContext, resource: &Resource) -> bool {
        if !ctx.is_authenticated() {
            return true;
        }
        self.0.allow_request(ctx, resource).await
    }

    fn wait(&self, ctx: &RequestContext, resource: &Resource) -> Option<u64> {
        self.0.wait(ctx, resource)
    }
}

/// Throttles anonymous requests by client address under scope `anon`
/// (fallback 20/hour).
#[derive(Debug, Clone)]
pub struct AnonRateThrottle(SimpleRateThrottle);

impl Default for AnonRateThrottle {
    fn default() -> Self {
        Self(SimpleRateThrottle::for_scope("anon").with_fallback(Rate::per_hour(20)))
    }
}

impl AnonRateThrottle {
    /// Overrides the rate.
    #[must_use]
    pub fn with_rate(self, rate: Rate) -> Self {
        Self(self.0.with_rate(rate))
    }

    /// Uses a private store.
    #[must_use]
    pub fn with_store(self, store: Arc<ThrottleStore>) -> Self {
        Self(self.0.with_store(store))
    }
}

#[async_trait]
impl Throttle for AnonRateThrottle {
    fn scope(&self, resource: &Resource) -> String {
        self.0.resolve_scope(resource)
    }

    async fn allow_request(&self, ctx: &RequestContext, resource: &Resource) -> bool {
        if ctx.is_authenticated() {
            return true;
        }
        self.0.allow_request(ctx, resource).await
    }

    fn wait(&self, ctx: &RequestContext, resource: &Resource) -> Option<u64> {
        self.0.wait(ctx, resource)
    }
}

/// Throttles under the resource's `throttle_scope`; a resource without one
/// is not throttled.
#[derive(Debug, Clone, Default)]
pub struct ScopedRateThrottle(SimpleRateThrottle);

impl ScopedRateThrottle {
    /// Resolves rates from `rates` instead of the global settings.
    #[must_use]
    pub fn with_rates(self, rates: HashMap<String, String>) -> Self {
        Self(self.0.with_rates(rates))
    }

    /// Uses a private store.
    #[must_use]
    pub fn with_store(self, store: Arc<ThrottleStore>) -> Self {
        Self(self.0.with_store(store))
    }
}

#[async_trait]
impl Throttle for ScopedRateThrottle {
    fn scope(&self, resource: &Resource) -> String {
        self.0.resolve_scope(resource)
    }

    async fn allow_request(&self, ctx: &RequestContext, resource: &Resource) -> bool {
        if resource.throttle_scope.is_none() {
            return true;
        }
        self.0.allow_request(ctx, resource).await
    }

    fn wait(&self, ctx: &RequestContext, resource: &Resource) -> Option<u64> {
        self.0.wait(ctx, resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faster_app_db::MemoryCollection;
    use faster_app_http::Identity;

    fn resource() -> Resource {
        Resource::new(Arc::new(MemoryCollection::new("notes")))
    }

    fn anon(addr: &str) -> RequestContext {
        RequestContext::builder()
            .client_addr(addr.parse().unwrap())
            .build()
    }

    fn user(id: &str) -> RequestContext {
        RequestContext::builder().identity(Identity::new(id)).build()
    }

    #[test]
    fn test_rate_parse() {
        assert_eq!("100/hour".parse::<Rate>().unwrap(), Rate::per_hour(100));
        assert_eq!("5/m".parse::<Rate>().unwrap(), Rate::per_minute(5));
        assert_eq!("1/Day".parse::<Rate>().unwrap(), Rate::per_day(1));
        assert!("x/hour".parse::<Rate>().is_err());
        assert!("10/fortnight".parse::<Rate>().is_err());
        assert!("10".parse::<Rate>().is_err());
        assert_eq!(Rate::per_second(3).to_string(), "3/second");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_window() {
        let store = ThrottleStore::new();
        let window = Duration::from_secs(3600);
        for _ in 0..3 {
            assert!(store.check_and_record("k", 3, window));
        }
        assert!(!store.check_and_record("k", 3, window));
        assert_eq!(store.hits("k"), 3);

        tokio::time::advance(Duration::from_secs(1800)).await;
        assert!(!store.check_and_record("k", 3, window));
        assert_eq!(store.wait("k", window), Some(Duration::from_secs(1800)));

        tokio::time::advance(Duration::from_secs(1800)).await;
        assert!(store.check_and_record("k", 3, window));
        assert_eq!(store.hits("k"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_stale_buckets() {
        let store = ThrottleStore::new();
        store.check_and_record("old", 5, Duration::from_secs(60));
        tokio::time::advance(Duration::from_secs(61)).await;
        store.check_and_record("fresh", 5, Duration::from_secs(60));
        assert_eq!(store.sweep(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.hits("fresh"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_amortized_sweep() {
        let store = ThrottleStore::new().with_sweep_every(2);
        store.check_and_record("a", 5, Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(2)).await;
        store.check_and_record("b", 5, Duration::from_secs(1));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simple_rate_denies_after_limit_with_wait() {
        let store = Arc::new(ThrottleStore::new());
        let throttle = SimpleRateThrottle::new("2/minute", "burst")
            .unwrap()
            .with_store(Arc::clone(&store));
        let res = resource();
        let ctx = anon("10.0.0.1");
        assert!(throttle.allow_request(&ctx, &res).await);
        assert!(throttle.allow_request(&ctx, &res).await);
        assert!(!throttle.allow_request(&ctx, &res).await);
        assert_eq!(throttle.wait(&ctx, &res), Some(60));
        assert!(throttle.allow_request(&anon("10.0.0.2"), &res).await);
        assert_eq!(store.hits("throttle_burst_10.0.0.1"), 2);

        let chain: Vec<Arc<dyn Throttle>> = vec![Arc::new(throttle)];
        let err = check_throttles(&chain, &ctx, &res).await.unwrap_err();
        assert_eq!(err.status_code(), 429);
        assert_eq!(err.data().unwrap()["scope"], "burst");
        assert_eq!(err.data().unwrap()["wait"], 60);
    }

    #[tokio::test]
    async fn test_user_and_anon_do_not_double_count() {
        let store = Arc::new(ThrottleStore::new());
        let users = UserRateThrottle::default()
            .with_rate(Rate::per_hour(1))
            .with_store(Arc::clone(&store));
        let anons = AnonRateThrottle::default()
            .with_rate(Rate::per_hour(1))
            .with_store(Arc::clone(&store));
        let res = resource();

        let a = anon("1.2.3.4");
        assert!(users.allow_request(&a, &res).await);
        assert!(users.allow_request(&a, &res).await);
        assert!(anons.allow_request(&a, &res).await);
        assert!(!anons.allow_request(&a, &res).await);

        let u = user("42");
        assert!(anons.allow_request(&u, &res).await);
        assert!(users.allow_request(&u, &res).await);
        assert!(!users.allow_request(&u, &res).await);
        assert_eq!(store.hits("throttle_user_42"), 1);
        assert_eq!(store.hits("throttle_anon_1.2.3.4"), 1);
    }

    #[tokio::test]
    async fn test_scoped_uses_resource_scope() {
        let rates: HashMap<String, String> = [("uploads".to_string(), "1/day".to_string())].into();
        let throttle = ScopedRateThrottle::default()
            .with_rates(rates)
            .with_store(Arc::new(ThrottleStore::new()));
        let ctx = anon("9.9.9.9");

        let unscoped = resource();
        assert!(throttle.allow_request(&ctx, &unscoped).await);
        assert!(throttle.allow_request(&ctx, &unscoped).await);

        let scoped = resource().throttle_scope("uploads");
        assert_eq!(throttle.scope(&scoped), "uploads");
        assert!(throttle.allow_request(&ctx, &scoped).await);
        assert!(!throttle.allow_request(&ctx, &scoped).await);
    }

    #[test]
    fn test_rate_resolution_order() {
        let rates: HashMap<String, String> = [
            ("user".to_string(), "7/minute".to_string()),
            ("default".to_string(), "9/hour".to_string()),
            ("broken".to_string(), "lots".to_string()),
        ]
        .into();
        let t = SimpleRateThrottle::for_scope("user").with_rates(rates.clone());
        assert_eq!(t.resolve_rate("user"), Some(Rate::per_minute(7)));
        assert_eq!(t.resolve_rate("other"), Some(Rate::per_hour(9)));
        assert_eq!(t.resolve_rate("broken"), Some(Rate::per_hour(9)));
        let explicit = t.with_rate(Rate::per_second(1));
        assert_eq!(explicit.resolve_rate("user"), Some(Rate::per_second(1)));
        let fallback = SimpleRateThrottle::default()
            .with_rates(HashMap::new())
            .with_fallback(Rate::per_day(2));
        assert_eq!(fallback.resolve_rate("x"), Some(Rate::per_day(2)));
    }

    #[tokio::test]
    async fn test_no_throttle() {
        assert!(NoThrottle.allow_request(&anon("1.1.1.1"), &resource()).await);
    }
}
