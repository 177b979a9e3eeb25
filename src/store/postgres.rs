//! PostgreSQL expense repository
//!
//! Each method that decides on approval state runs in one transaction that
//! row-locks the expense first, so the decision reads a consistent snapshot.

use crate::db::queries;
use crate::error::AppError;
use crate::expense::{is_fully_approved, Expense, ExpenseShare, ExpenseState, LedgerEntry};
use crate::store::{ExpenseRepository, ShareUpdate};
use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use tracing::debug;
use uuid::Uuid;

pub struct PgExpenseRepository {
    pool: Pool,
}

impl PgExpenseRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn expense_from_row(row: &Row) -> Result<Expense, AppError> {
    let state: String = row.get("state");
    Ok(Expense {
        id: row.get("id"),
        group_id: row.get("group_id"),
        title: row.get("title"),
        total_amount_cents: row.get("total_amount_cents"),
        payer_id: row.get("payer_id"),
        due_date: row.get("due_date"),
        state: state.parse().map_err(AppError::Internal)?,
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        finalized_at: row.get("finalized_at"),
    })
}

fn share_from_row(row: &Row) -> ExpenseShare {
    ExpenseShare {
        expense_id: row.get("expense_id"),
        member_id: row.get("member_id"),
        individual_amount_cents: row.get("individual_amount_cents"),
        approved: row.get("approved"),
    }
}

fn ledger_from_row(row: &Row) -> LedgerEntry {
    LedgerEntry {
        id: row.get("id"),
        payer_id: row.get("payer_id"),
        ower_id: row.get("ower_id"),
        expense_id: row.get("expense_id"),
        amount_cents: row.get("amount_cents"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl ExpenseRepository for PgExpenseRepository {
    async fn insert_expense(
        &self,
        expense: &Expense,
        shares: &[ExpenseShare],
    ) -> Result<(), AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        tx.execute(
            queries::INSERT_EXPENSE,
            &[
                &expense.id,
                &expense.group_id,
                &expense.title,
                &expense.total_amount_cents,
                &expense.payer_id,
                &expense.due_date,
                &expense.state.as_str(),
                &expense.created_by,
                &expense.created_at,
            ],
        )
        .await?;

        let insert_share = tx.prepare(queries::INSERT_SHARE).await?;
        for (position, share) in shares.iter().enumerate() {
            let position = position as i32;
            tx.execute(
                &insert_share,
                &[
                    &share.expense_id,
                    &share.member_id,
                    &position,
                    &share.individual_amount_cents,
                    &share.approved,
                ],
            )
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_expense(&self, expense_id: Uuid) -> Result<Option<Expense>, AppError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(&queries::select_expense(), &[&expense_id])
            .await?;
        row.as_ref().map(expense_from_row).transpose()
    }

    async fn list_expenses(
        &self,
        group_id: Uuid,
        state: Option<ExpenseState>,
    ) -> Result<Vec<Expense>, AppError> {
        let client = self.pool.get().await?;
        let rows = match state {
            Some(state) => {
                client
                    .query(
                        &queries::list_group_expenses_by_state(),
                        &[&group_id, &state.as_str()],
                    )
                    .await?
            }
            None => {
                client
                    .query(&queries::list_group_expenses(), &[&group_id])
                    .await?
            }
        };
        rows.iter().map(expense_from_row).collect()
    }

    async fn list_shares(&self, expense_id: Uuid) -> Result<Vec<ExpenseShare>, AppError> {
        let client = self.pool.get().await?;
        let rows = client.query(queries::LIST_SHARES, &[&expense_id]).await?;
        Ok(rows.iter().map(share_from_row).collect())
    }

    async fn set_share_approval(
        &self,
        expense_id: Uuid,
        member_id: Uuid,
        approved: bool,
    ) -> Result<ShareUpdate, AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let Some(row) = tx
            .query_opt(queries::LOCK_EXPENSE_STATE, &[&expense_id])
            .await?
        else {
            return Ok(ShareUpdate::MissingExpense);
        };
        let state: String = row.get("state");
        let state: ExpenseState = state.parse().map_err(AppError::Internal)?;

        if state != ExpenseState::Proposed {
            let present: bool = tx
                .query_one(queries::SHARE_EXISTS, &[&expense_id, &member_id])
                .await?
                .get("present");
            return Ok(if present {
                ShareUpdate::NotProposed(state)
            } else {
                ShareUpdate::MissingShare
            });
        }

        let updated = tx
            .query_opt(
                queries::UPDATE_SHARE_APPROVAL,
                &[&expense_id, &member_id, &approved],
            )
            .await?;
        tx.commit().await?;

        Ok(match updated {
            Some(row) => ShareUpdate::Updated(share_from_row(&row)),
            None => ShareUpdate::MissingShare,
        })
    }

    async fn mark_finalized(&self, expense_id: Uuid) -> Result<Option<Expense>, AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        // Exclusive lock: waits for in-flight approval updates, blocks new ones
        let Some(row) = tx
            .query_opt(&queries::select_expense_for_update(), &[&expense_id])
            .await?
        else {
            return Ok(None);
        };
        if expense_from_row(&row)?.state != ExpenseState::Proposed {
            debug!("Expense {} already left the proposed state", expense_id);
            return Ok(None);
        }

        let shares: Vec<ExpenseShare> = tx
            .query(queries::LIST_SHARES, &[&expense_id])
            .await?
            .iter()
            .map(share_from_row)
            .collect();
        if !is_fully_approved(&shares) {
            return Ok(None);
        }

        let finalized = tx
            .query_opt(&queries::finalize_expense(), &[&expense_id])
            .await?;
        tx.commit().await?;
        finalized.as_ref().map(expense_from_row).transpose()
    }

    async fn delete_expense(&self, expense_id: Uuid) -> Result<Option<Expense>, AppError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(&queries::delete_expense(), &[&expense_id])
            .await?;
        row.as_ref().map(expense_from_row).transpose()
    }

    async fn has_ledger_entries(&self, expense_id: Uuid) -> Result<bool, AppError> {
        let client = self.pool.get().await?;
        let row = client.query_one(queries::LEDGER_EXISTS, &[&expense_id]).await?;
        Ok(row.get("present"))
    }

    async fn insert_ledger_entries(&self, entries: &[LedgerEntry]) -> Result<usize, AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let insert = tx.prepare(queries::INSERT_LEDGER_ENTRY).await?;

        let mut inserted = 0;
        for entry in entries {
            inserted += tx
                .execute(
                    &insert,
                    &[
                        &entry.id,
                        &entry.expense_id,
                        &entry.payer_id,
                        &entry.ower_id,
                        &entry.amount_cents,
                        &entry.created_at,
                    ],
                )
                .await? as usize;
        }

        // A unique violation above drops `tx` uncommitted, rolling back the batch
        tx.commit().await?;
        Ok(inserted)
    }

    async fn delete_ledger_entries(&self, expense_id: Uuid) -> Result<usize, AppError> {
        let client = self.pool.get().await?;
        let removed = client
            .execute(queries::DELETE_LEDGER_ENTRIES, &[&expense_id])
            .await?;
        Ok(removed as usize)
    }

    async fn ledger_for_expense(&self, expense_id: Uuid) -> Result<Vec<LedgerEntry>, AppError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(queries::LEDGER_FOR_EXPENSE, &[&expense_id])
            .await?;
        Ok(rows.iter().map(ledger_from_row).collect())
    }

    async fn ledger_between(
        &self,
        user_a: Uuid,
        user_b: Uuid,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(queries::LEDGER_BETWEEN, &[&user_a, &user_b])
            .await?;
        Ok(rows.iter().map(ledger_from_row).collect())
    }

    async fn ledger_for_user(&self, user: Uuid) -> Result<Vec<LedgerEntry>, AppError> {
        let client = self.pool.get().await?;
        let rows = client.query(queries::LEDGER_FOR_USER, &[&user]).await?;
        Ok(rows.iter().map(ledger_from_row).collect())
    }
}
