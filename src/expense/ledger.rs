//! Settlement ledger
//!
//! Materializes a finalized expense into directed debt entries, one per
//! non-payer share, exactly once.

use crate::error::{conflict_error, AppError};
use crate::expense::types::{shares_total, Expense, ExpenseShare, ExpenseState, LedgerEntry};
use crate::store::ExpenseRepository;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What a call to `materialize` did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "entries", rename_all = "snake_case")]
pub enum MaterializeOutcome {
    /// This call wrote the entries
    Created(usize),
    /// Entries already existed, possibly written by a concurrent call
    AlreadyMaterialized,
    /// Finalized without a payer: nobody can be owed, zero entries
    NoPayer,
    /// The payer holds the only share
    NothingOwed,
}

impl MaterializeOutcome {
    pub fn entries_created(&self) -> usize {
        match self {
            MaterializeOutcome::Created(n) => *n,
            _ => 0,
        }
    }
}

/// Entries a finalized expense should produce
pub fn ledger_entries_for(expense: &Expense, payer_id: Uuid, shares: &[ExpenseShare]) -> Vec<LedgerEntry> {
    shares
        .iter()
        .filter(|s| s.member_id != payer_id)
        .map(|s| LedgerEntry::new(expense.id, payer_id, s.member_id, s.individual_amount_cents))
        .collect()
}

#[derive(Clone)]
pub struct SettlementLedger {
    repo: Arc<dyn ExpenseRepository>,
}

impl SettlementLedger {
    pub fn new(repo: Arc<dyn ExpenseRepository>) -> Self {
        Self { repo }
    }

    /// Write ledger entries for a finalized expense. Safe to call repeatedly
    /// and concurrently; only one call ever creates entries.
    pub async fn materialize(&self, expense: &Expense) -> Result<MaterializeOutcome, AppError> {
        if expense.state != ExpenseState::Finalized {
            return Err(conflict_error(format!(
                "Expense {} is {}, only finalized expenses reach the ledger",
                expense.id, expense.state
            )));
        }

        let Some(payer_id) = expense.payer_id else {
            warn!(
                "Expense {} finalized without a payer; no ledger entries created",
                expense.id
            );
            return Ok(MaterializeOutcome::NoPayer);
        };

        if self.repo.has_ledger_entries(expense.id).await? {
            debug!("Ledger for expense {} already materialized", expense.id);
            return Ok(MaterializeOutcome::AlreadyMaterialized);
        }

        let shares = self.repo.list_shares(expense.id).await?;
        if shares_total(&shares) != expense.total_amount_cents as i128 {
            return Err(AppError::Internal(format!(
                "Shares of expense {} sum to {} but the total is {}",
                expense.id,
                shares_total(&shares),
                expense.total_amount_cents
            )));
        }

        let entries = ledger_entries_for(expense, payer_id, &shares);
        if entries.is_empty() {
            return Ok(MaterializeOutcome::NothingOwed);
        }

        match self.repo.insert_ledger_entries(&entries).await {
            Ok(created) => {
                info!(
                    "Materialized {} ledger entries for expense {}",
                    created, expense.id
                );
                Ok(MaterializeOutcome::Created(created))
            }
            Err(e) if e.is_unique_violation() => {
                debug!(
                    "Concurrent materialization of expense {} won the race",
                    expense.id
                );
                Ok(MaterializeOutcome::AlreadyMaterialized)
            }
            Err(e) => Err(e),
        }
    }

    /// Remove every ledger entry of an expense
    pub async fn delete(&self, expense_id: Uuid) -> Result<usize, AppError> {
        let removed = self.repo.delete_ledger_entries(expense_id).await?;
        if removed > 0 {
            info!("Removed {} ledger entries for expense {}", removed, expense_id);
        }
        Ok(removed)
    }

    pub async fn entries_for(&self, expense_id: Uuid) -> Result<Vec<LedgerEntry>, AppError> {
        self.repo.ledger_for_expense(expense_id).await
    }
}
