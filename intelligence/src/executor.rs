//! Per-account serialized execution of approved actions
//!
//! Signing and broadcasting live behind [`ExecutionSigner`]. This module only
//! guarantees that at most one submission per account is in flight, while
//! different accounts proceed concurrently. Successful submissions start the
//! action's cooldown when a [`CooldownStore`] is attached.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cooldown::{record_fired, CooldownStore};
use crate::error::Result;
use crate::types::{AccountKey, RebalanceAction};

/// Receipt of a submitted transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxHandle {
    /// Transaction hash or signer-specific id
    pub id: String,
    pub action_id: Uuid,
    pub submitted_at: DateTime<Utc>,
}

/// Signs and submits one approved action. Nonces and ordering are the
/// signer's concern.
#[async_trait]
pub trait ExecutionSigner: Send + Sync {
    async fn submit(&self, action: &RebalanceAction, account: &AccountKey) -> Result<TxHandle>;
}

/// One mutual-exclusion token per account
#[derive(Debug, Default)]
pub struct AccountLocks {
    locks: DashMap<AccountKey, Arc<Mutex<()>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, account: &AccountKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(account.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the account's lock once no submission holds or waits on it.
    /// Callers drop their own handle first.
    pub fn release(&self, account: &AccountKey) {
        self.locks
            .remove_if(account, |_, lock| Arc::strong_count(lock) == 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Submits actions through a signer, one at a time per account
pub struct SerializedExecutor {
    signer: Arc<dyn ExecutionSigner>,
    locks: AccountLocks,
    cooldown: Option<Arc<dyn CooldownStore>>,
}

impl SerializedExecutor {
    pub fn new(signer: Arc<dyn ExecutionSigner>) -> Self {
        Self {
            signer,
            locks: AccountLocks::new(),
            cooldown: None,
        }
    }

    /// Record submitted actions in `store`
    pub fn with_cooldown_store(mut self, store: Arc<dyn CooldownStore>) -> Self {
        self.cooldown = Some(store);
        self
    }

    /// Submit `action`, waiting for any in-flight submission on the same account
    pub async fn execute(&self, action: &RebalanceAction) -> Result<TxHandle> {
        let lock = self.locks.lock_for(&action.account);
        let result = {
            let _guard = lock.lock().await;
            self.submit(action).await
        };
        drop(lock);
        self.locks.release(&action.account);
        result
    }

    async fn submit(&self, action: &RebalanceAction) -> Result<TxHandle> {
        let started = Instant::now();
        let result = self.signer.submit(action, &action.account).await;
        metrics::histogram!(
            "yieldwise_execution_seconds",
            started.elapsed().as_secs_f64(),
            "action" => action.action_type.as_str()
        );

        match &result {
            Ok(handle) => {
                if let Some(store) = &self.cooldown {
                    record_fired(action, store.as_ref(), handle.submitted_at);
                }
                info!(
                    account = %action.account,
                    action_id = %action.id,
                    tx = %handle.id,
                    "✅ Action submitted"
                )
            }
            Err(e) => warn!(
                account = %action.account,
                action_id = %action.id,
                error = %e,
                "Action submission failed"
            ),
        }
        result
    }

    /// Submit every action concurrently. Actions of the same account run in
    /// the order given; results come back in input order.
    pub async fn execute_all(&self, actions: &[RebalanceAction]) -> Vec<(Uuid, Result<TxHandle>)> {
        join_all(
            actions
                .iter()
                .map(|action| async move { (action.id, self.execute(action).await) }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cooldown::{CooldownKey, InMemoryCooldownStore};
    use crate::error::IntelligenceError;
    use crate::types::{ActionType, Priority};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Tracks concurrent submissions per account and overall
    #[derive(Default)]
    struct RecordingSigner {
        in_flight: parking_lot::Mutex<HashMap<AccountKey, usize>>,
        max_per_account: AtomicUsize,
        total_in_flight: AtomicUsize,
        max_total: AtomicUsize,
        submitted: parking_lot::Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl ExecutionSigner for RecordingSigner {
        async fn submit(&self, action: &RebalanceAction, account: &AccountKey) -> Result<TxHandle> {
            {
                let mut in_flight = self.in_flight.lock();
                let count = in_flight.entry(account.clone()).or_insert(0);
                *count += 1;
                self.max_per_account.fetch_max(*count, Ordering::SeqCst);
            }
            let total = self.total_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_total.fetch_max(total, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(20)).await;

            self.total_in_flight.fetch_sub(1, Ordering::SeqCst);
            if let Some(count) = self.in_flight.lock().get_mut(account) {
                *count -= 1;
            }
            self.submitted.lock().push(action.id);

            if action.amount < 0.0 {
                return Err(IntelligenceError::execution("negative amount"));
            }
            Ok(TxHandle {
                id: format!("0x{}", action.id.simple()),
                action_id: action.id,
                submitted_at: Utc::now(),
            })
        }
    }

    fn action(account: &str, amount: f64) -> RebalanceAction {
        RebalanceAction {
            id: Uuid::new_v4(),
            account: AccountKey::new(account),
            action_type: ActionType::Repay,
            from_protocol: None,
            to_protocol: "aave_v3".into(),
            asset: "WETH".into(),
            amount,
            reason: "test".into(),
            expected_gain: 5.0,
            gas_estimate: 25.0,
            priority: Priority::Critical,
            slippage_tolerance: 0.5,
            auto_execute: true,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_one_in_flight_per_account() {
        let signer = Arc::new(RecordingSigner::default());
        let executor = SerializedExecutor::new(signer.clone());
        let actions = vec![
            action("0xabc", 1.0),
            action("0xABC", 2.0),
            action("0xdef", 3.0),
            action("0xabc", 4.0),
        ];

        let results = executor.execute_all(&actions).await;
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(signer.max_per_account.load(Ordering::SeqCst), 1);
        // Different accounts overlap
        assert_eq!(signer.max_total.load(Ordering::SeqCst), 2);
        // Idle accounts leave no lock behind
        assert!(executor.locks.is_empty());
    }

    #[test]
    fn test_lock_is_kept_while_another_submission_waits() {
        let locks = AccountLocks::new();
        let account = AccountKey::new("0xabc");
        let held = locks.lock_for(&account);
        let waiting = locks.lock_for(&account);

        drop(held);
        locks.release(&account);
        assert_eq!(locks.len(), 1);

        drop(waiting);
        locks.release(&account);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_only_submitted_actions_start_cooldown() {
        let store = Arc::new(InMemoryCooldownStore::new());
        let executor = SerializedExecutor::new(Arc::new(RecordingSigner::default()))
            .with_cooldown_store(store.clone());

        let failed = action("0xabc", -1.0);
        assert!(executor.execute(&failed).await.is_err());
        assert!(store.is_empty());

        let submitted = action("0xdef", 1.0);
        let handle = executor.execute(&submitted).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.last_fired(&CooldownKey::from(&submitted)),
            Some(handle.submitted_at)
        );
        assert_eq!(store.last_fired(&CooldownKey::from(&failed)), None);
    }

    #[tokio::test]
    async fn test_same_account_keeps_input_order() {
        let signer = Arc::new(RecordingSigner::default());
        let executor = SerializedExecutor::new(signer.clone());
        let actions = vec![action("0xabc", 1.0), action("0xabc", 2.0), action("0xabc", 3.0)];

        executor.execute_all(&actions).await;
        let submitted = signer.submitted.lock().clone();
        let expected: Vec<Uuid> = actions.iter().map(|a| a.id).collect();
        assert_eq!(submitted, expected);
    }

    #[tokio::test]
    async fn test_signer_errors_are_returned() {
        let executor = SerializedExecutor::new(Arc::new(RecordingSigner::default()));
        let result = executor.execute(&action("0xabc", -1.0)).await;
        assert!(matches!(result, Err(IntelligenceError::Execution { .. })));
    }
}
