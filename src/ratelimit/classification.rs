//! Endpoint classification quadrants.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::rule::RateLimitRule;

/// One of the four quadrants combining authentication state and route sensitivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointType {
    PublicUnauthenticated,
    ProtectedUnauthenticated,
    PublicAuthenticated,
    ProtectedAuthenticated,
}

impl EndpointType {
    /// Every quadrant, in a stable order.
    pub const ALL: [EndpointType; 4] = [
        EndpointType::PublicUnauthenticated,
        EndpointType::ProtectedUnauthenticated,
        EndpointType::PublicAuthenticated,
        EndpointType::ProtectedAuthenticated,
    ];

    /// Map the two request flags onto a quadrant.
    pub fn from_flags(authenticated: bool, protected: bool) -> Self {
        match (authenticated, protected) {
            (false, false) => EndpointType::PublicUnauthenticated,
            (false, true) => EndpointType::ProtectedUnauthenticated,
            (true, false) => EndpointType::PublicAuthenticated,
            (true, true) => EndpointType::ProtectedAuthenticated,
        }
    }

    /// The configuration label for this quadrant.
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointType::PublicUnauthenticated => "public_unauthenticated",
            EndpointType::ProtectedUnauthenticated => "protected_unauthenticated",
            EndpointType::PublicAuthenticated => "public_authenticated",
            EndpointType::ProtectedAuthenticated => "protected_authenticated",
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(
            self,
            EndpointType::PublicAuthenticated | EndpointType::ProtectedAuthenticated
        )
    }
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EndpointType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown endpoint type: {}", s))
    }
}

/// The quadrant a request falls into, together with the rule that governs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointClassification {
    endpoint_type: EndpointType,
    rule: RateLimitRule,
}

impl EndpointClassification {
    pub fn new(endpoint_type: EndpointType, rule: RateLimitRule) -> Self {
        Self {
            endpoint_type,
            rule,
        }
    }

    pub fn endpoint_type(&self) -> EndpointType {
        self.endpoint_type
    }

    pub fn rule(&self) -> &RateLimitRule {
        &self.rule
    }
}
