use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Authenticated portal user that owns persisted sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps an inbound request to the caller's identity. Verifying credentials
/// is the job of whatever sits in front of this service.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> Option<OwnerId>;
}

/// Trusts a single header set by the authenticating proxy.
#[derive(Debug, Clone)]
pub struct HeaderIdentity {
    header: String,
}

pub const DEFAULT_IDENTITY_HEADER: &str = "x-user-id";

impl HeaderIdentity {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into().to_ascii_lowercase(),
        }
    }
}

impl Default for HeaderIdentity {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTITY_HEADER)
    }
}

impl IdentityResolver for HeaderIdentity {
    fn resolve(&self, headers: &HeaderMap) -> Option<OwnerId> {
        headers
            .get(self.header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(OwnerId::new)
    }
}

/// Treats every caller as anonymous.
#[derive(Debug, Clone, Default)]
pub struct Anonymous;

impl IdentityResolver for Anonymous {
    fn resolve(&self, _headers: &HeaderMap) -> Option<OwnerId> {
        None
    }
}
