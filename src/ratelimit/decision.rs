//! What the HTTP layer does with a request after throttling.

use serde::Serialize;

use super::classification::EndpointType;

pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
pub const HEADER_RESET: &str = "X-RateLimit-Reset";
pub const HEADER_POLICY: &str = "X-RateLimit-Policy";
pub const HEADER_KEY: &str = "X-RateLimit-Key";
pub const HEADER_RETRY_AFTER: &str = "Retry-After";

/// Quota details reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quota {
    /// `max_attempts` of the classified rule, not the relaxed one
    pub limit: u32,
    pub remaining: u64,
    /// Epoch seconds
    pub reset: i64,
    pub policy: EndpointType,
    /// SHA-256 of the rate limit key
    pub key_hash: String,
}

/// Outcome of evaluating one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Within quota; forward the request and attach the quota headers.
    Allowed(Quota),
    /// Over quota; answer 429.
    Limited { quota: Quota, retry_after_secs: u64 },
    /// No decision could be made and the request is admitted unthrottled.
    Bypassed,
    /// No decision could be made and the request is refused.
    Unavailable,
}

#[derive(Serialize)]
struct LimitedBody<'a> {
    message: &'a str,
    retry_after: u64,
}

impl RateLimitDecision {
    /// Whether the request should reach the handler.
    pub fn is_admitted(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed(_) | RateLimitDecision::Bypassed)
    }

    pub fn status_code(&self) -> u16 {
        match self {
            RateLimitDecision::Allowed(_) | RateLimitDecision::Bypassed => 200,
            RateLimitDecision::Limited { .. } => 429,
            RateLimitDecision::Unavailable => 503,
        }
    }

    pub fn quota(&self) -> Option<&Quota> {
        match self {
            RateLimitDecision::Allowed(quota) | RateLimitDecision::Limited { quota, .. } => Some(quota),
            RateLimitDecision::Bypassed | RateLimitDecision::Unavailable => None,
        }
    }

    /// Response headers to attach. Bypassed and unavailable requests get none.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let Some(quota) = self.quota() else {
            return Vec::new();
        };

        let mut headers = vec![
            (HEADER_LIMIT, quota.limit.to_string()),
            (HEADER_REMAINING, quota.remaining.to_string()),
            (HEADER_RESET, quota.reset.to_string()),
            (HEADER_POLICY, quota.policy.as_str().to_string()),
            (HEADER_KEY, quota.key_hash.clone()),
        ];
        if let RateLimitDecision::Limited { retry_after_secs, .. } = self {
            headers.push((HEADER_RETRY_AFTER, retry_after_secs.to_string()));
        }
        headers
    }

    /// JSON body for a 429 response.
    pub fn body(&self) -> Option<String> {
        match self {
            RateLimitDecision::Limited { retry_after_secs, .. } => serde_json::to_string(&LimitedBody {
                message: "Too Many Requests",
                retry_after: *retry_after_secs,
            })
            .ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quota() -> Quota {
        Quota {
            limit: 60,
            remaining: 59,
            reset: 1_700_000_060,
            policy: EndpointType::PublicUnauthenticated,
            key_hash: "abc123".to_string(),
        }
    }

    fn header<'a>(headers: &'a [(&'static str, String)], name: &str) -> Option<&'a str> {
        headers.iter().find(|(n, _)| *n == name).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_allowed_headers() {
        let decision = RateLimitDecision::Allowed(quota());
        let headers = decision.headers();

        assert_eq!(decision.status_code(), 200);
        assert!(decision.is_admitted());
        assert_eq!(header(&headers, HEADER_LIMIT), Some("60"));
        assert_eq!(header(&headers, HEADER_REMAINING), Some("59"));
        assert_eq!(header(&headers, HEADER_RESET), Some("1700000060"));
        assert_eq!(header(&headers, HEADER_POLICY), Some("public_unauthenticated"));
        assert_eq!(header(&headers, HEADER_KEY), Some("abc123"));
        assert_eq!(header(&headers, HEADER_RETRY_AFTER), None);
        assert_eq!(decision.body(), None);
    }

    #[test]
    fn test_limited_response() {
        let decision = RateLimitDecision::Limited {
            quota: Quota {
                remaining: 0,
                ..quota()
            },
            retry_after_secs: 42,
        };

        assert_eq!(decision.status_code(), 429);
        assert!(!decision.is_admitted());
        assert_eq!(header(&decision.headers(), HEADER_RETRY_AFTER), Some("42"));
        assert_eq!(header(&decision.headers(), HEADER_REMAINING), Some("0"));

        let body: serde_json::Value = serde_json::from_str(&decision.body().unwrap()).unwrap();
        assert_eq!(body, serde_json::json!({"message": "Too Many Requests", "retry_after": 42}));
    }

    #[test]
    fn test_undecided_requests() {
        assert_eq!(RateLimitDecision::Bypassed.status_code(), 200);
        assert!(RateLimitDecision::Bypassed.is_admitted());
        assert!(RateLimitDecision::Bypassed.headers().is_empty());

        assert_eq!(RateLimitDecision::Unavailable.status_code(), 503);
        assert!(!RateLimitDecision::Unavailable.is_admitted());
        assert!(RateLimitDecision::Unavailable.headers().is_empty());
        assert_eq!(RateLimitDecision::Unavailable.body(), None);
    }
}
