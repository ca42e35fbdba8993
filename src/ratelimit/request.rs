//! The parts of an incoming request that throttling looks at.

use std::collections::HashMap;
use std::net::IpAddr;

/// The authenticated caller attached to a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    /// Stable user id, when the identity has one
    pub id: Option<String>,
    /// Id of the access credential (token) used for this request
    pub credential_id: Option<String>,
}

impl Identity {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            credential_id: None,
        }
    }

    pub fn credential(credential_id: impl Into<String>) -> Self {
        Self {
            id: None,
            credential_id: Some(credential_id.into()),
        }
    }
}

/// Read access to a request, implemented by the HTTP layer.
pub trait RequestContext {
    /// The authenticated identity, if any.
    fn identity(&self) -> Option<&Identity>;

    /// Name of the matched route, if the router resolved one.
    fn route_name(&self) -> Option<&str>;

    /// Address of the calling client.
    fn client_ip(&self) -> Option<IpAddr>;

    /// A field from the request input (query or body).
    fn input(&self, field: &str) -> Option<&str>;
}

/// Owned request snapshot.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    identity: Option<Identity>,
    route_name: Option<String>,
    client_ip: Option<IpAddr>,
    inputs: HashMap<String, String>,
}

impl RequestInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_route(mut self, route_name: impl Into<String>) -> Self {
        self.route_name = Some(route_name.into());
        self
    }

    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    pub fn with_input(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs.insert(field.into(), value.into());
        self
    }
}

impl RequestContext for RequestInfo {
    fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    fn route_name(&self) -> Option<&str> {
        self.route_name.as_deref()
    }

    fn client_ip(&self) -> Option<IpAddr> {
        self.client_ip
    }

    fn input(&self, field: &str) -> Option<&str> {
        self.inputs.get(field).map(String::as_str)
    }
}
