//! Identity and profile lookup at the authentication boundary.

use std::collections::HashMap;

use async_trait::async_trait;
use luci_shared::{SessionIdentity, UserProfile};
use parking_lot::RwLock;

/// Source of the signed-in user and their profile document.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// The signed-in user, if any.
    async fn current_identity(&self) -> Option<SessionIdentity>;

    /// Profile document for `user_id`. `Ok(None)` when none exists.
    async fn profile(&self, user_id: &str) -> anyhow::Result<Option<UserProfile>>;
}

/// In-memory identity store.
#[derive(Debug, Default)]
pub struct StaticIdentityStore {
    identity: RwLock<Option<SessionIdentity>>,
    profiles: RwLock<HashMap<String, UserProfile>>,
    unavailable: RwLock<bool>,
}

impl StaticIdentityStore {
    pub fn new(identity: Option<SessionIdentity>) -> Self {
        Self {
            identity: RwLock::new(identity),
            ..Default::default()
        }
    }

    pub fn with_profile(self, user_id: impl Into<String>, profile: UserProfile) -> Self {
        self.profiles.write().insert(user_id.into(), profile);
        self
    }

    pub fn set_identity(&self, identity: Option<SessionIdentity>) {
        *self.identity.write() = identity;
    }

    /// Make profile lookups fail, as an unreachable profile database would.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write() = unavailable;
    }
}

#[async_trait]
impl IdentityStore for StaticIdentityStore {
    async fn current_identity(&self) -> Option<SessionIdentity> {
        self.identity.read().clone()
    }

    async fn profile(&self, user_id: &str) -> anyhow::Result<Option<UserProfile>> {
        if *self.unavailable.read() {
            anyhow::bail!("profile store unavailable");
        }
        Ok(self.profiles.read().get(user_id).cloned())
    }
}
