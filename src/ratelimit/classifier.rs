//! Request classification.

use std::sync::Arc;

use tracing::trace;

use super::classification::{EndpointClassification, EndpointType};
use super::request::RequestContext;
use super::rules::RateLimitConfigManager;

/// Places a request in one of the four quadrants and attaches its rule.
pub struct EndpointClassifier {
    config: Arc<RateLimitConfigManager>,
}

impl EndpointClassifier {
    pub fn new(config: Arc<RateLimitConfigManager>) -> Self {
        Self { config }
    }

    /// Classify a request. Always produces a classification.
    pub fn classify<R: RequestContext + ?Sized>(&self, request: &R) -> EndpointClassification {
        let authenticated = request.identity().is_some();
        // Requests without a resolved route are never protected.
        let protected = request
            .route_name()
            .is_some_and(|route| self.config.is_protected_route(route));

        let endpoint_type = EndpointType::from_flags(authenticated, protected);

        trace!(
            route = request.route_name().unwrap_or("-"),
            authenticated,
            protected,
            endpoint_type = %endpoint_type,
            "Classified request"
        );

        EndpointClassification::new(endpoint_type, self.config.get_rule(endpoint_type.as_str()))
    }
}
