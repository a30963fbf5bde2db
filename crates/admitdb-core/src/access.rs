//! Access Gate
//!
//! Decides whether a visitor may enter a content area. Capabilities come
//! from the plans of the user's current subscriptions; visitors without an
//! account fall back to a time-boxed guest grant held in client-local state.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::PlanId;
use crate::user::User;

/// Default lifetime of a guest preview
pub const GUEST_GRANT_HOURS: i64 = 24;

/// A content area a plan can unlock
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Entry-level content, also granted by the legacy `paymentVerified` flag
    Basic,
    /// The applicant profile database
    Profiles,
    /// Application-writing material
    Application,
}

impl Capability {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Profiles => "profiles",
            Self::Application => "application",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "basic" => Some(Self::Basic),
            "profiles" => Some(Self::Profiles),
            "application" => Some(Self::Application),
            _ => None,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time-boxed preview for visitors without an account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestGrant {
    pub expires_at: DateTime<Utc>,
    pub capabilities: BTreeSet<Capability>,
}

impl GuestGrant {
    /// A grant covering `basic` for the default window
    pub fn preview(now: DateTime<Utc>) -> Self {
        Self {
            expires_at: now + Duration::hours(GUEST_GRANT_HOURS),
            capabilities: BTreeSet::from([Capability::Basic]),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Client-local slot holding the guest grant
pub trait GuestGrantStore: Send + Sync {
    fn load(&self) -> Option<GuestGrant>;

    fn save(&self, grant: GuestGrant);

    fn clear(&self);
}

/// In-process guest grant slot
#[derive(Default)]
pub struct MemoryGuestGrantStore {
    slot: Mutex<Option<GuestGrant>>,
}

impl MemoryGuestGrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_slot<R>(&self, f: impl FnOnce(&mut Option<GuestGrant>) -> R) -> R {
        let mut guard = self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }
}

impl GuestGrantStore for MemoryGuestGrantStore {
    fn load(&self) -> Option<GuestGrant> {
        self.with_slot(|slot| slot.clone())
    }

    fn save(&self, grant: GuestGrant) {
        self.with_slot(|slot| *slot = Some(grant));
    }

    fn clear(&self) {
        self.with_slot(|slot| *slot = None);
    }
}

/// Static plan -> capability table
#[derive(Clone, Debug, Default)]
pub struct AccessPolicy {
    plans: HashMap<PlanId, BTreeSet<Capability>>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration of a plan's capabilities
    pub fn with_plan(
        mut self,
        plan: PlanId,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Self {
        self.plans
            .entry(plan)
            .or_default()
            .extend(capabilities);
        self
    }

    pub fn plan_capabilities(&self, plan: &PlanId) -> Option<&BTreeSet<Capability>> {
        self.plans.get(plan)
    }

    /// Capabilities held by `user` at `now`.
    ///
    /// A subscription counts while it is active and before its end date.
    /// A user with no subscriptions at all but the legacy `paymentVerified`
    /// flag holds `basic`.
    pub fn capabilities(&self, user: &User, now: DateTime<Utc>) -> BTreeSet<Capability> {
        let mut caps: BTreeSet<Capability> = user
            .current_subscriptions(now)
            .filter_map(|sub| self.plans.get(&sub.plan))
            .flatten()
            .copied()
            .collect();

        if user.subscriptions.is_empty() && user.payment_verified {
            caps.insert(Capability::Basic);
        }
        caps
    }

    /// Evaluate the gate for a route requiring `required`.
    ///
    /// Without a user, the guest grant decides; an expired grant is cleared.
    pub fn has_access(
        &self,
        user: Option<&User>,
        required: Capability,
        guest: &dyn GuestGrantStore,
        now: DateTime<Utc>,
    ) -> bool {
        if let Some(user) = user {
            return self.capabilities(user, now).contains(&required);
        }

        match guest.load() {
            Some(grant) if grant.is_expired(now) => {
                tracing::debug!(expired_at = %grant.expires_at, "Clearing expired guest grant");
                guest.clear();
                false
            }
            Some(grant) => grant.capabilities.contains(&required),
            None => false,
        }
    }
}
