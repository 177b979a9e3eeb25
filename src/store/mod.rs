//! Expense storage layer
//!
//! Every component receives an explicit `Arc<dyn ExpenseRepository>` handle.
//! Implementations must make the approval update, the finalize transition and
//! the ledger insert each atomic on their own: callers never hold a lock
//! across two repository calls.

pub mod memory;
pub mod postgres;

pub use memory::MemoryExpenseRepository;
pub use postgres::PgExpenseRepository;

use crate::error::AppError;
use crate::expense::{Expense, ExpenseShare, ExpenseState, LedgerEntry};
use async_trait::async_trait;
use uuid::Uuid;

/// Result of a conditional share approval update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareUpdate {
    /// The share was written while the expense was still proposed
    Updated(ExpenseShare),
    /// The expense has left the proposed state; nothing was written
    NotProposed(ExpenseState),
    /// The expense exists but the member holds no share in it
    MissingShare,
    MissingExpense,
}

#[async_trait]
pub trait ExpenseRepository: Send + Sync {
    // ==================== Proposals ====================

    /// Persist a new proposal together with all of its shares, atomically
    async fn insert_expense(&self, expense: &Expense, shares: &[ExpenseShare])
        -> Result<(), AppError>;

    async fn get_expense(&self, expense_id: Uuid) -> Result<Option<Expense>, AppError>;

    /// Expenses of a group, newest first
    async fn list_expenses(
        &self,
        group_id: Uuid,
        state: Option<ExpenseState>,
    ) -> Result<Vec<Expense>, AppError>;

    async fn list_shares(&self, expense_id: Uuid) -> Result<Vec<ExpenseShare>, AppError>;

    /// Set one member's approval flag, only while the expense is proposed
    async fn set_share_approval(
        &self,
        expense_id: Uuid,
        member_id: Uuid,
        approved: bool,
    ) -> Result<ShareUpdate, AppError>;

    /// Check-and-set Proposed -> Finalized against a consistent view of the shares.
    ///
    /// Returns the finalized expense only to the caller that performed the
    /// transition; every other caller gets `None`.
    async fn mark_finalized(&self, expense_id: Uuid) -> Result<Option<Expense>, AppError>;

    /// Remove the expense, cascading to its shares and ledger entries
    async fn delete_expense(&self, expense_id: Uuid) -> Result<Option<Expense>, AppError>;

    // ==================== Ledger ====================

    async fn has_ledger_entries(&self, expense_id: Uuid) -> Result<bool, AppError>;

    /// Insert all entries or none. A duplicate `(expense_id, ower_id)` fails
    /// with an error for which `AppError::is_unique_violation` is true.
    async fn insert_ledger_entries(&self, entries: &[LedgerEntry]) -> Result<usize, AppError>;

    async fn delete_ledger_entries(&self, expense_id: Uuid) -> Result<usize, AppError>;

    async fn ledger_for_expense(&self, expense_id: Uuid) -> Result<Vec<LedgerEntry>, AppError>;

    /// Entries whose payer and ower are exactly `user_a` and `user_b`, either direction
    async fn ledger_between(&self, user_a: Uuid, user_b: Uuid)
        -> Result<Vec<LedgerEntry>, AppError>;

    /// Entries where `user` is either payer or ower
    async fn ledger_for_user(&self, user: Uuid) -> Result<Vec<LedgerEntry>, AppError>;
}
