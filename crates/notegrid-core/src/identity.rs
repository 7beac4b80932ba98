//! Who a sync cycle acts on behalf of.

use std::fmt;

/// An authenticated user plus the bearer token that unlocks their private grid rows.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub access_token: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Source of the current identity, if any.
pub trait IdentityProvider: Send + Sync {
    fn current_identity(&self) -> Option<Identity>;
}

/// Fixed identity resolved once by the caller (CLI flags, a verified request).
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(Option<Identity>);

impl StaticIdentity {
    pub const fn anonymous() -> Self {
        Self(None)
    }

    pub const fn new(identity: Identity) -> Self {
        Self(Some(identity))
    }
}

impl From<Option<Identity>> for StaticIdentity {
    fn from(identity: Option<Identity>) -> Self {
        Self(identity)
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_identity(&self) -> Option<Identity> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_debug_redacts_token() {
        let identity = Identity::new("user-1", "secret-token");
        let debug = format!("{identity:?}");
        assert!(debug.contains("user-1"));
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn static_identity_returns_configured_value() {
        assert!(StaticIdentity::anonymous().current_identity().is_none());
        let provider = StaticIdentity::new(Identity::new("user-1", "token"));
        assert_eq!(
            provider.current_identity().map(|identity| identity.user_id),
            Some("user-1".to_string())
        );
    }
}
