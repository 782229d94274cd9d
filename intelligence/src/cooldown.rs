//! Cooldown bookkeeping for repeated rebalance recommendations
//!
//! The engine never owns this state. Callers inject a [`CooldownStore`] (in
//! memory, or backed by their own account-scoped storage). Analysis only reads
//! it; a recommendation starts cooling once the executor has submitted it.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use crate::types::{AccountKey, ActionType, Priority, RebalanceAction};

/// Identity of a recommendation for cooldown purposes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CooldownKey {
    pub account: AccountKey,
    pub action_type: ActionType,
    pub to_protocol: String,
    pub asset: String,
}

impl From<&RebalanceAction> for CooldownKey {
    fn from(action: &RebalanceAction) -> Self {
        Self {
            account: action.account.clone(),
            action_type: action.action_type,
            to_protocol: action.to_protocol.to_lowercase(),
            asset: action.asset.to_uppercase(),
        }
    }
}

/// Where the last emission time of each recommendation is kept
pub trait CooldownStore: Send + Sync {
    fn last_fired(&self, key: &CooldownKey) -> Option<DateTime<Utc>>;

    fn record(&self, key: CooldownKey, at: DateTime<Utc>);
}

/// Process-local cooldown store
#[derive(Debug, Default)]
pub struct InMemoryCooldownStore {
    fired: RwLock<HashMap<CooldownKey, DateTime<Utc>>>,
}

impl InMemoryCooldownStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fired.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fired.read().is_empty()
    }

    /// Drop entries older than `window` relative to `now`
    pub fn prune(&self, window: Duration, now: DateTime<Utc>) {
        self.fired.write().retain(|_, at| now - *at < window);
    }
}

impl CooldownStore for InMemoryCooldownStore {
    fn last_fired(&self, key: &CooldownKey) -> Option<DateTime<Utc>> {
        self.fired.read().get(key).copied()
    }

    fn record(&self, key: CooldownKey, at: DateTime<Utc>) {
        self.fired.write().insert(key, at);
    }
}

/// Drop actions whose recommendation fired within `window` of `now`.
/// Critical actions are never suppressed.
pub fn apply_cooldown(
    actions: Vec<RebalanceAction>,
    store: &dyn CooldownStore,
    window: Duration,
    now: DateTime<Utc>,
) -> Vec<RebalanceAction> {
    actions
        .into_iter()
        .filter(|action| {
            let cooling = action.priority != Priority::Critical
                && store
                    .last_fired(&CooldownKey::from(action))
                    .map(|at| now - at < window)
                    .unwrap_or(false);
            if cooling {
                debug!(
                    account = %action.account,
                    action_type = action.action_type.as_str(),
                    to_protocol = %action.to_protocol,
                    "Suppressed by cooldown"
                );
            }
            !cooling
        })
        .collect()
}

/// Start the cooldown window of an executed action
pub fn record_fired(action: &RebalanceAction, store: &dyn CooldownStore, at: DateTime<Utc>) {
    store.record(CooldownKey::from(action), at);
}
