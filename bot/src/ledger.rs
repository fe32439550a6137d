//! The jackpot ledger owns the pool balance. No other component
//! mutates it.
//!
//! Two storage policies, selected per deployment:
//!
//! - **Local ledger**: the persisted balance is authoritative. Entry
//!   fees are credited before any games resolve, winning games debit it
//!   synchronously so later games in the batch see the reduced pool,
//!   and a failed batch payment is compensated with a credit of the
//!   batch gross.
//! - **External mirror**: the balance is whatever the external account
//!   holds, re-read fresh before each game. Nothing is decremented
//!   locally and no rollback is possible; the pool drains only as a
//!   side effect of executed payments. Concurrent batches racing on the
//!   same external balance remain a known consistency gap.
//!
//! Pending payouts live in the same durable document under both
//! policies.

use std::sync::Arc;

use crate::errors::BotError;
use crate::events::BalanceQuery;
use crate::storage::StateStore;

pub struct JackpotLedger {
    store: StateStore,
    mirror: Option<(Arc<dyn BalanceQuery>, String)>,
}

impl JackpotLedger {
    pub fn local(store: StateStore) -> Self {
        JackpotLedger {
            store,
            mirror: None,
        }
    }

    pub fn external_mirror(
        store: StateStore,
        balances: Arc<dyn BalanceQuery>,
        account: String,
    ) -> Self {
        JackpotLedger {
            store,
            mirror: Some((balances, account)),
        }
    }

    /// Only the local policy can compensate a failed payment.
    pub fn supports_rollback(&self) -> bool {
        self.mirror.is_none()
    }

    pub fn current_balance(&self) -> Result<u64, BotError> {
        match &self.mirror {
            Some((balances, account)) => {
                balances
                    .balance(account)
                    .map_err(|source| BotError::BalanceQuery {
                        account: account.clone(),
                        source,
                    })
            }
            None => Ok(self.store.load()?.pool_balance),
        }
    }

    /// Credit the pool. Entry fees land here before games resolve;
    /// rollbacks land here after a failed payment. Under the mirror
    /// policy the external account already received the tip, so this is
    /// a read-through no-op.
    pub fn credit(&self, amount: u64) -> Result<u64, BotError> {
        if self.mirror.is_some() {
            return self.current_balance();
        }
        self.store.update(|doc| {
            doc.pool_balance = doc
                .pool_balance
                .checked_add(amount)
                .ok_or_else(|| anyhow::anyhow!("pool balance overflow crediting {amount}"))
                .map_err(BotError::Storage)?;
            Ok(doc.pool_balance)
        })
    }

    /// Debit a winning game's gross payout. The local policy persists
    /// the decrement; the mirror policy only guards the amount against
    /// the balance just read, since the real drain happens when the
    /// payment executes.
    pub fn debit(&self, amount: u64) -> Result<u64, BotError> {
        match &self.mirror {
            Some(_) => {
                let available = self.current_balance()?;
                if amount > available {
                    return Err(BotError::InsufficientPool {
                        requested: amount,
                        available,
                    });
                }
                Ok(available - amount)
            }
            None => self.store.update(|doc| {
                if amount > doc.pool_balance {
                    return Err(BotError::InsufficientPool {
                        requested: amount,
                        available: doc.pool_balance,
                    });
                }
                doc.pool_balance -= amount;
                Ok(doc.pool_balance)
            }),
        }
    }

    /// Add to a user's pending payout (deferred-claim delivery).
    /// Returns the user's new pending balance.
    pub fn add_pending(&self, user: &str, amount: u64) -> Result<u64, BotError> {
        self.store.update(|doc| {
            let entry = doc.pending_payouts.entry(user.to_string()).or_insert(0);
            *entry = entry
                .checked_add(amount)
                .ok_or_else(|| anyhow::anyhow!("pending payout overflow for {user}"))
                .map_err(BotError::Storage)?;
            Ok(*entry)
        })
    }

    /// Atomically take the user's entire pending balance, leaving zero.
    /// Taking an absent or zero balance returns 0, which callers report
    /// as "nothing to claim".
    pub fn take_pending(&self, user: &str) -> Result<u64, BotError> {
        self.store.update(|doc| {
            Ok(doc.pending_payouts.remove(user).unwrap_or(0))
        })
    }

    /// Put a pending balance back after a failed claim transfer.
    pub fn restore_pending(&self, user: &str, amount: u64) -> Result<u64, BotError> {
        self.add_pending(user, amount)
    }
}
