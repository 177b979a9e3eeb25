//! Application state management
//!
//! Contains shared state accessible across all handlers. Every component is
//! built from the same explicit repository handle.

use crate::expense::{BalanceAggregator, ExpenseService, Reconciler, SettlementLedger};
use crate::notify::Notifier;
use crate::store::ExpenseRepository;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Proposal lifecycle: create, approve, decline, finalize, delete
    pub expenses: ExpenseService,

    pub balances: BalanceAggregator,

    /// On-demand repair pass run when a group's activity is viewed
    pub reconciler: Reconciler,

    /// Shared secret for verifying bearer tokens
    pub jwt_secret: String,
}

impl AppState {
    pub fn new(
        repo: Arc<dyn ExpenseRepository>,
        notifier: Arc<dyn Notifier>,
        jwt_secret: String,
    ) -> Self {
        let ledger = SettlementLedger::new(repo.clone());
        let expenses = ExpenseService::new(repo.clone(), ledger.clone(), notifier);

        Self {
            balances: BalanceAggregator::new(repo.clone()),
            reconciler: Reconciler::new(repo, expenses.clone(), ledger),
            expenses,
            jwt_secret,
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
