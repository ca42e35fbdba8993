//! Request-level rate limiting.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::classification::EndpointClassification;
use super::classifier::EndpointClassifier;
use super::decision::{Quota, RateLimitDecision};
use super::failover::FailoverRateLimitStore;
use super::key::RateLimitKey;
use super::request::RequestContext;
use super::resolver::KeyResolver;
use super::result::RateLimitResult;
use super::rule::RateLimitRule;
use super::rules::RateLimitConfigManager;
use super::store::{CounterStore, RateLimitStore};
use crate::backend::{MemoryBackend, RedisBackend};
use crate::clock::{Clock, SystemClock};
use crate::config::{FailurePolicy, TollgateConfig};
use crate::error::{Result, TollgateError};
use crate::metrics::{LogMetrics, MetricsSink};

/// Ties classification, key resolution, the store and metrics together.
///
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct RateLimiter {
    rules: Arc<RateLimitConfigManager>,
    classifier: EndpointClassifier,
    resolver: KeyResolver,
    store: Arc<dyn RateLimitStore>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    failure_policy: FailurePolicy,
}

impl RateLimiter {
    pub fn new(
        rules: Arc<RateLimitConfigManager>,
        store: Arc<dyn RateLimitStore>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let failure_policy = rules.settings().failure_policy;
        Self {
            classifier: EndpointClassifier::new(rules.clone()),
            rules,
            resolver: KeyResolver::new(),
            store,
            metrics,
            clock: Arc::new(SystemClock),
            failure_policy,
        }
    }

    /// Build the production wiring from configuration.
    ///
    /// The primary store is Redis when `store.redis_url` is set and
    /// in-process otherwise; the secondary store is always in-process.
    pub fn from_config(config: &TollgateConfig) -> Result<Self> {
        let rules = Arc::new(RateLimitConfigManager::new(config.rate_limiting.clone()));
        let metrics: Arc<dyn MetricsSink> = Arc::new(
            LogMetrics::new(config.rate_limiting.hash_key)
                .with_slow_latency_ms(config.rate_limiting.slow_latency_ms),
        );

        let primary: Arc<dyn RateLimitStore> = match &config.store.redis_url {
            Some(url) => {
                let timeout = Duration::from_millis(config.store.timeout_ms);
                info!(timeout_ms = config.store.timeout_ms, "Using redis as primary rate limit store");
                Arc::new(CounterStore::new(RedisBackend::new(url, timeout)?))
            }
            None => {
                info!("No redis configured, using in-process primary rate limit store");
                Arc::new(CounterStore::new(MemoryBackend::new()))
            }
        };
        let secondary: Arc<dyn RateLimitStore> = Arc::new(CounterStore::new(MemoryBackend::new()));

        let interval = chrono::Duration::from_std(Duration::from_secs(
            config.store.health_check_interval_secs,
        ))
        .map_err(|e| TollgateError::Config(format!("health_check_interval_secs: {}", e)))?;

        let store = FailoverRateLimitStore::new(primary, secondary, metrics.clone())
            .with_health_check_interval(interval)
            .with_relaxation_factor(config.store.relaxation_factor);

        Ok(Self::new(rules, Arc::new(store), metrics))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn rules(&self) -> &RateLimitConfigManager {
        &self.rules
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    pub fn classify<R: RequestContext + ?Sized>(&self, request: &R) -> EndpointClassification {
        self.classifier.classify(request)
    }

    pub fn resolve_key<R: RequestContext + ?Sized>(&self, request: &R, rule: &RateLimitRule) -> Result<RateLimitKey> {
        self.resolver.resolve(request, rule)
    }

    pub async fn check_limit(&self, key: &RateLimitKey, rule: &RateLimitRule) -> Result<RateLimitResult> {
        self.store.check_limit(key, rule).await
    }

    pub async fn reset_limit(&self, key: &RateLimitKey) -> Result<()> {
        self.store.reset_limit(key).await
    }

    pub async fn get_status(&self, key: &RateLimitKey, rule: &RateLimitRule) -> Result<RateLimitResult> {
        self.store.get_status(key, rule).await
    }

    /// Count a request and decide what the HTTP layer should do with it.
    ///
    /// Never fails. When no decision can be made the configured
    /// [`FailurePolicy`] picks between admitting and refusing the request.
    pub async fn evaluate<R: RequestContext + ?Sized>(&self, request: &R) -> RateLimitDecision {
        match self.try_evaluate(request).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(error = %e, policy = ?self.failure_policy, "Rate limit check failed");
                match self.failure_policy {
                    FailurePolicy::Open => RateLimitDecision::Bypassed,
                    FailurePolicy::Closed => RateLimitDecision::Unavailable,
                }
            }
        }
    }

    async fn try_evaluate<R: RequestContext + ?Sized>(&self, request: &R) -> Result<RateLimitDecision> {
        let classification = self.classify(request);
        let rule = classification.rule();
        let key = self.resolve_key(request, rule)?;

        let result = self.check_limit(&key, rule).await?;
        self.metrics
            .record_hit(&key, rule, result.is_allowed(), result.attempts());

        let quota = Quota {
            limit: rule.max_attempts(),
            remaining: result.remaining(),
            reset: result.reset_timestamp(),
            policy: classification.endpoint_type(),
            key_hash: key.hashed(),
        };

        if result.is_allowed() {
            return Ok(RateLimitDecision::Allowed(quota));
        }

        let retry_after_secs = result.retry_after_secs(self.clock.now());
        self.metrics
            .record_block(&key, rule, result.attempts(), retry_after_secs);
        debug!(
            key = %quota.key_hash,
            attempts = result.attempts(),
            retry_after = retry_after_secs,
            "Rate limit exceeded"
        );

        Ok(RateLimitDecision::Limited { quota, retry_after_secs })
    }
}
