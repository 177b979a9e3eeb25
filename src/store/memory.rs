//! In-memory expense repository
//!
//! All tables live behind one lock so each trait method is a single atomic
//! step, matching the transactional guarantees of the Postgres repository.

use crate::error::{conflict_error, duplicate_error, AppError};
use crate::expense::{is_fully_approved, Expense, ExpenseShare, ExpenseState, LedgerEntry};
use crate::store::{ExpenseRepository, ShareUpdate};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    expenses: HashMap<Uuid, Expense>,
    /// expense_id -> shares in insertion order
    shares: HashMap<Uuid, Vec<ExpenseShare>>,
    /// expense_id -> ower_id -> entry; the inner key is the uniqueness constraint
    ledger: HashMap<Uuid, BTreeMap<Uuid, LedgerEntry>>,
}

/// Thread-safe in-memory repository
#[derive(Clone, Default)]
pub struct MemoryExpenseRepository {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryExpenseRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored ledger entries across all expenses
    #[cfg(test)]
    pub async fn ledger_len(&self) -> usize {
        let tables = self.tables.read().await;
        tables.ledger.values().map(|m| m.len()).sum()
    }
}

#[async_trait]
impl ExpenseRepository for MemoryExpenseRepository {
    async fn insert_expense(
        &self,
        expense: &Expense,
        shares: &[ExpenseShare],
    ) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if tables.expenses.contains_key(&expense.id) {
            return Err(conflict_error(format!("Expense {} already exists", expense.id)));
        }
        let mut members = HashSet::with_capacity(shares.len());
        if !shares.iter().all(|s| members.insert(s.member_id)) {
            return Err(conflict_error("Duplicate member share"));
        }
        tables.expenses.insert(expense.id, expense.clone());
        tables.shares.insert(expense.id, shares.to_vec());
        Ok(())
    }

    async fn get_expense(&self, expense_id: Uuid) -> Result<Option<Expense>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.expenses.get(&expense_id).cloned())
    }

    async fn list_expenses(
        &self,
        group_id: Uuid,
        state: Option<ExpenseState>,
    ) -> Result<Vec<Expense>, AppError> {
        let tables = self.tables.read().await;
        let mut expenses: Vec<Expense> = tables
            .expenses
            .values()
            .filter(|e| e.group_id == group_id)
            .filter(|e| state.map_or(true, |s| e.state == s))
            .cloned()
            .collect();
        expenses.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(expenses)
    }

    async fn list_shares(&self, expense_id: Uuid) -> Result<Vec<ExpenseShare>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.shares.get(&expense_id).cloned().unwrap_or_default())
    }

    async fn set_share_approval(
        &self,
        expense_id: Uuid,
        member_id: Uuid,
        approved: bool,
    ) -> Result<ShareUpdate, AppError> {
        let mut tables = self.tables.write().await;
        let state = match tables.expenses.get(&expense_id) {
            Some(expense) => expense.state,
            None => return Ok(ShareUpdate::MissingExpense),
        };

        let Some(share) = tables
            .shares
            .get_mut(&expense_id)
            .and_then(|shares| shares.iter_mut().find(|s| s.member_id == member_id))
        else {
            return Ok(ShareUpdate::MissingShare);
        };

        if state != ExpenseState::Proposed {
            return Ok(ShareUpdate::NotProposed(state));
        }

        share.approved = approved;
        Ok(ShareUpdate::Updated(share.clone()))
    }

    async fn mark_finalized(&self, expense_id: Uuid) -> Result<Option<Expense>, AppError> {
        let mut tables = self.tables.write().await;
        let ready = tables
            .shares
            .get(&expense_id)
            .is_some_and(|shares| is_fully_approved(shares));

        match tables.expenses.get_mut(&expense_id) {
            Some(expense) if expense.state == ExpenseState::Proposed && ready => {
                expense.state = ExpenseState::Finalized;
                expense.finalized_at = Some(Utc::now());
                Ok(Some(expense.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_expense(&self, expense_id: Uuid) -> Result<Option<Expense>, AppError> {
        let mut tables = self.tables.write().await;
        let removed = tables.expenses.remove(&expense_id);
        if removed.is_some() {
            tables.shares.remove(&expense_id);
            tables.ledger.remove(&expense_id);
        }
        Ok(removed)
    }

    async fn has_ledger_entries(&self, expense_id: Uuid) -> Result<bool, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .ledger
            .get(&expense_id)
            .is_some_and(|entries| !entries.is_empty()))
    }

    async fn insert_ledger_entries(&self, entries: &[LedgerEntry]) -> Result<usize, AppError> {
        let mut tables = self.tables.write().await;

        // Validate the whole batch before touching anything
        let mut batch = HashSet::with_capacity(entries.len());
        for entry in entries {
            if !tables.expenses.contains_key(&entry.expense_id) {
                return Err(AppError::NotFound(format!(
                    "Expense {} not found",
                    entry.expense_id
                )));
            }
            if entry.payer_id == entry.ower_id {
                return Err(AppError::Internal(
                    "Ledger entry payer and ower must differ".to_string(),
                ));
            }
            let exists = tables
                .ledger
                .get(&entry.expense_id)
                .is_some_and(|m| m.contains_key(&entry.ower_id));
            if exists || !batch.insert((entry.expense_id, entry.ower_id)) {
                return Err(duplicate_error(format!(
                    "Ledger entry for expense {} and ower {} already exists",
                    entry.expense_id, entry.ower_id
                )));
            }
        }

        for entry in entries {
            tables
                .ledger
                .entry(entry.expense_id)
                .or_default()
                .insert(entry.ower_id, entry.clone());
        }
        Ok(entries.len())
    }

    async fn delete_ledger_entries(&self, expense_id: Uuid) -> Result<usize, AppError> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .ledger
            .remove(&expense_id)
            .map_or(0, |entries| entries.len()))
    }

    async fn ledger_for_expense(&self, expense_id: Uuid) -> Result<Vec<LedgerEntry>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .ledger
            .get(&expense_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn ledger_between(
        &self,
        user_a: Uuid,
        user_b: Uuid,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .ledger
            .values()
            .flat_map(|m| m.values())
            .filter(|e| {
                (e.payer_id == user_a && e.ower_id == user_b)
                    || (e.payer_id == user_b && e.ower_id == user_a)
            })
            .cloned()
            .collect())
    }

    async fn ledger_for_user(&self, user: Uuid) -> Result<Vec<LedgerEntry>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .ledger
            .values()
            .flat_map(|m| m.values())
            .filter(|e| e.touches(user))
            .cloned()
            .collect())
    }
}
