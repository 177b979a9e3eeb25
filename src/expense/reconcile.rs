//! Reconciliation sweep
//!
//! Re-derives finalization and ledger state for one group from the stored
//! approvals. Each expense is repaired on its own; a failure is recorded in
//! the report and the sweep moves on.

use crate::error::AppError;
use crate::expense::ledger::{MaterializeOutcome, SettlementLedger};
use crate::expense::service::{ExpenseService, FinalizeOutcome};
use crate::expense::types::{Expense, ExpenseState};
use crate::store::ExpenseRepository;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairFailure {
    pub expense_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub group_id: Uuid,
    pub examined: usize,
    /// `finalized + materialized`
    pub repaired: usize,
    pub finalized: usize,
    pub materialized: usize,
    pub failed: usize,
    pub failures: Vec<RepairFailure>,
}

impl ReconcileReport {
    fn new(group_id: Uuid) -> Self {
        Self {
            group_id,
            ..Default::default()
        }
    }

    fn fail(&mut self, expense_id: Uuid, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("Reconcile: expense {} not repaired: {}", expense_id, reason);
        self.failed += 1;
        self.failures.push(RepairFailure { expense_id, reason });
    }
}

enum Repair {
    Finalized,
    /// The transition stood but the ledger write did not
    FinalizedWithoutLedger,
    Materialized,
    Consistent,
}

#[derive(Clone)]
pub struct Reconciler {
    repo: Arc<dyn ExpenseRepository>,
    expenses: ExpenseService,
    ledger: SettlementLedger,
}

impl Reconciler {
    pub fn new(
        repo: Arc<dyn ExpenseRepository>,
        expenses: ExpenseService,
        ledger: SettlementLedger,
    ) -> Self {
        Self {
            repo,
            expenses,
            ledger,
        }
    }

    /// Finalize fully approved proposals and materialize finalized expenses
    /// that have no ledger. Safe to run any number of times.
    pub async fn scan(&self, group_id: Uuid) -> Result<ReconcileReport, AppError> {
        let expenses = self.repo.list_expenses(group_id, None).await?;
        let mut report = ReconcileReport::new(group_id);

        for expense in &expenses {
            report.examined += 1;
            match self.repair(expense).await {
                Ok(Repair::Finalized) => report.finalized += 1,
                Ok(Repair::FinalizedWithoutLedger) => {
                    report.finalized += 1;
                    report.fail(expense.id, "finalized but the ledger was not written");
                }
                Ok(Repair::Materialized) => report.materialized += 1,
                Ok(Repair::Consistent) => {}
                Err(reason) => report.fail(expense.id, reason),
            }
        }
        report.repaired = report.finalized + report.materialized;

        if report.repaired > 0 || report.failed > 0 {
            info!(
                "Reconciled group {}: {} examined, {} repaired, {} failed",
                group_id, report.examined, report.repaired, report.failed
            );
        } else {
            debug!("Group {} already consistent ({} expenses)", group_id, report.examined);
        }
        Ok(report)
    }

    async fn repair(&self, expense: &Expense) -> Result<Repair, String> {
        match expense.state {
            ExpenseState::Proposed => {
                match self.expenses.finalize(expense.id).await {
                    // A failed ledger write is retried by the next sweep
                    // through the finalized arm
                    Ok(FinalizeOutcome::Finalized { ledger, .. }) => match ledger {
                        Some(MaterializeOutcome::NoPayer) => Err("no payer".to_string()),
                        Some(_) => Ok(Repair::Finalized),
                        None => Ok(Repair::FinalizedWithoutLedger),
                    },
                    Ok(_) => Ok(Repair::Consistent),
                    // Deleted between the listing and the repair
                    Err(AppError::NotFound(_)) => Ok(Repair::Consistent),
                    Err(e) => Err(e.to_string()),
                }
            }
            ExpenseState::Finalized => match self.ledger.materialize(expense).await {
                Ok(MaterializeOutcome::Created(_)) => Ok(Repair::Materialized),
                Ok(MaterializeOutcome::NoPayer) => Err("no payer".to_string()),
                Ok(_) => Ok(Repair::Consistent),
                Err(e) => Err(e.to_string()),
            },
            ExpenseState::Cancelled => Ok(Repair::Consistent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expense::service::NewExpense;
    use crate::expense::types::{ExpenseShare, MemberWeight};
    use crate::notify::NullNotifier;
    use crate::store::MemoryExpenseRepository;
    use pretty_assertions::assert_eq;

    struct Harness {
        repo: Arc<MemoryExpenseRepository>,
        expenses: ExpenseService,
        reconciler: Reconciler,
        group: Uuid,
    }

    fn harness() -> Harness {
        let repo = Arc::new(MemoryExpenseRepository::new());
        let ledger = SettlementLedger::new(repo.clone());
        let expenses = ExpenseService::new(repo.clone(), ledger.clone(), Arc::new(NullNotifier));
        Harness {
            reconciler: Reconciler::new(repo.clone(), expenses.clone(), ledger),
            expenses,
            repo,
            group: Uuid::new_v4(),
        }
    }

    /// Store a proposal directly, bypassing the service's finalize trigger
    async fn stored(h: &Harness, payer: Option<Uuid>, shares: &[(Uuid, i64, bool)]) -> Expense {
        let total = shares.iter().map(|(_, a, _)| a).sum();
        let expense = Expense::new(h.group, "Groceries".into(), total, payer, None, shares[0].0);
        let rows: Vec<ExpenseShare> = shares
            .iter()
            .map(|(m, a, approved)| ExpenseShare {
                expense_id: expense.id,
                member_id: *m,
                individual_amount_cents: *a,
                approved: *approved,
            })
            .collect();
        h.repo.insert_expense(&expense, &rows).await.unwrap();
        expense
    }

    #[tokio::test]
    async fn test_consistent_group_reports_zero_repairs() {
        let h = harness();
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        let input = NewExpense {
            group_id: h.group,
            title: "Hotel".into(),
            total_cents: 20000,
            weights: vec![MemberWeight::new(u1, 50.0), MemberWeight::new(u2, 50.0)],
            payer_id: Some(u1),
            due_date: None,
        };
        let id = h.expenses.create(input.clone(), u1).await.unwrap().expense.id;
        h.expenses.approve(id, u2).await.unwrap();
        h.expenses.create(input, u1).await.unwrap();

        for _ in 0..2 {
            let report = h.reconciler.scan(h.group).await.unwrap();
            assert_eq!(report.examined, 2);
            assert_eq!(report.repaired, 0);
            assert_eq!(report.failed, 0);
        }
    }

    #[tokio::test]
    async fn test_repairs_missed_finalize() {
        let h = harness();
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        let expense = stored(&h, Some(u1), &[(u1, 500, true), (u2, 500, true)]).await;

        let report = h.reconciler.scan(h.group).await.unwrap();
        assert_eq!(report.finalized, 1);
        assert_eq!(report.repaired, 1);
        assert_eq!(h.repo.ledger_len().await, 1);

        let state = h.repo.get_expense(expense.id).await.unwrap().unwrap().state;
        assert_eq!(state, ExpenseState::Finalized);

        let again = h.reconciler.scan(h.group).await.unwrap();
        assert_eq!(again.repaired, 0);
        assert_eq!(h.repo.ledger_len().await, 1);
    }

    #[tokio::test]
    async fn test_repairs_missing_ledger() {
        let h = harness();
        let (u1, u2, u3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let expense = stored(&h, Some(u2), &[(u1, 100, true), (u2, 200, true), (u3, 300, true)]).await;
        // Transition without the ledger write, as after a crash
        h.repo.mark_finalized(expense.id).await.unwrap().unwrap();

        let report = h.reconciler.scan(h.group).await.unwrap();
        assert_eq!(report.materialized, 1);
        assert_eq!(report.repaired, 1);
        assert_eq!(h.repo.ledger_len().await, 2);
    }

    #[tokio::test]
    async fn test_finalize_without_ledger_counts_as_failure() {
        let h = harness();
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        // Shares that no longer add up to the stored total
        let expense = Expense::new(h.group, "Dinner".into(), 1000, Some(u1), None, u1);
        let rows: Vec<ExpenseShare> = [u1, u2]
            .iter()
            .map(|m| ExpenseShare {
                expense_id: expense.id,
                member_id: *m,
                individual_amount_cents: 450,
                approved: true,
            })
            .collect();
        h.repo.insert_expense(&expense, &rows).await.unwrap();

        let report = h.reconciler.scan(h.group).await.unwrap();
        assert_eq!(report.finalized, 1);
        assert_eq!(report.repaired, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].expense_id, expense.id);
        assert_eq!(h.repo.ledger_len().await, 0);

        let state = h.repo.get_expense(expense.id).await.unwrap().unwrap().state;
        assert_eq!(state, ExpenseState::Finalized);

        let again = h.reconciler.scan(h.group).await.unwrap();
        assert_eq!(again.repaired, 0);
        assert_eq!(again.failed, 1);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_sweep() {
        let h = harness();
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        let payerless = stored(&h, None, &[(u1, 300, true), (u2, 300, true)]).await;
        h.repo.mark_finalized(payerless.id).await.unwrap().unwrap();
        let pending = stored(&h, Some(u1), &[(u1, 50, true), (u2, 50, true)]).await;
        stored(&h, Some(u1), &[(u1, 50, true), (u2, 50, false)]).await;

        let report = h.reconciler.scan(h.group).await.unwrap();
        assert_eq!(report.examined, 3);
        assert_eq!(report.repaired, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(
            report.failures,
            vec![RepairFailure {
                expense_id: payerless.id,
                reason: "no payer".to_string()
            }]
        );
        assert_eq!(h.repo.ledger_for_expense(pending.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_sweeps_materialize_once() {
        let h = harness();
        let members: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        stored(
            &h,
            Some(members[0]),
            &[(members[0], 10, true), (members[1], 20, true), (members[2], 30, true)],
        )
        .await;

        let (a, b) = tokio::join!(h.reconciler.scan(h.group), h.reconciler.scan(h.group));
        let repaired = a.unwrap().repaired + b.unwrap().repaired;
        assert!(repaired >= 1);
        assert_eq!(h.repo.ledger_len().await, 2);
    }
}
