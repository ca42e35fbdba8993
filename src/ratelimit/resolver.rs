//! Rate limit key resolution.
//!
//! The identifier part of a key depends on the quadrant:
//!
//! | quadrant                     | identifier                                  |
//! |------------------------------|---------------------------------------------|
//! | public_unauthenticated       | `ip_<ip>`                                   |
//! | protected_unauthenticated    | `ip_<ip>_email_<sha256(email or "unknown")>` |
//! | public/protected_authenticated | `user_<id>`, else `token_<id>`, else `ip_<ip>` |
//! | anything else                | `ip_<ip>`                                   |
//!
//! Emails are hashed because they are personal data taken from the request
//! body. IPs stay readable for abuse triage.

use sha2::{Digest, Sha256};

use super::classification::EndpointType;
use super::key::RateLimitKey;
use super::request::RequestContext;
use super::rule::RateLimitRule;
use crate::error::Result;

/// Placeholder for missing request attributes.
const UNKNOWN: &str = "unknown";

/// Derives the counter key for a request under a rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyResolver;

impl KeyResolver {
    pub fn new() -> Self {
        Self
    }

    /// Build `rate_limit:<rule endpoint type>:<identifier>` for a request.
    pub fn resolve<R: RequestContext + ?Sized>(&self, request: &R, rule: &RateLimitRule) -> Result<RateLimitKey> {
        let identifier = match rule.endpoint_type().parse::<EndpointType>() {
            Ok(EndpointType::PublicUnauthenticated) => ip_identifier(request),
            Ok(EndpointType::ProtectedUnauthenticated) => ip_and_email_identifier(request),
            Ok(EndpointType::PublicAuthenticated | EndpointType::ProtectedAuthenticated) => {
                caller_identifier(request)
            }
            Err(_) => ip_identifier(request),
        };

        RateLimitKey::compose(rule.endpoint_type(), &identifier)
    }
}

fn client_ip<R: RequestContext + ?Sized>(request: &R) -> String {
    request
        .client_ip()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn ip_identifier<R: RequestContext + ?Sized>(request: &R) -> String {
    format!("ip_{}", client_ip(request))
}

fn ip_and_email_identifier<R: RequestContext + ?Sized>(request: &R) -> String {
    let email = request.input("email").unwrap_or(UNKNOWN);
    let email_hash = hex::encode(Sha256::digest(email.as_bytes()));
    format!("ip_{}_email_{}", client_ip(request), email_hash)
}

/// User id first, then credential id, then the client IP.
fn caller_identifier<R: RequestContext + ?Sized>(request: &R) -> String {
    let identity = request.identity();

    if let Some(id) = identity.and_then(|i| i.id.as_deref()) {
        return format!("user_{}", id);
    }
    if let Some(credential_id) = identity.and_then(|i| i.credential_id.as_deref()) {
        return format!("token_{}", credential_id);
    }
    ip_identifier(request)
}
