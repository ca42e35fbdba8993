//! Rate limiting logic and state management.

mod classification;
mod classifier;
mod decision;
mod failover;
mod key;
mod limiter;
mod request;
mod resolver;
mod result;
mod rule;
mod rules;
mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use classification::{EndpointClassification, EndpointType};
pub use classifier::EndpointClassifier;
pub use decision::{Quota, RateLimitDecision};
pub use failover::{FailoverRateLimitStore, StoreState, HEALTH_CHECK_INTERVAL_SECS, RELAXATION_FACTOR};
pub use key::{RateLimitKey, KEY_NAMESPACE, MAX_KEY_LENGTH};
pub use limiter::RateLimiter;
pub use request::{Identity, RequestContext, RequestInfo};
pub use resolver::KeyResolver;
pub use result::RateLimitResult;
pub use rule::{RateLimitRule, MAX_ATTEMPTS, MAX_DECAY_MINUTES, MIN_ATTEMPTS, MIN_DECAY_MINUTES};
pub use rules::RateLimitConfigManager;
pub use store::{CounterStore, RateLimitStore};
