//! Expense proposal lifecycle
//!
//! Proposed -> Finalized once every share is approved, or removed outright by
//! its creator. Finalization is a single check-and-set in the repository, so
//! the last approval and a reconciliation sweep racing each other cannot both
//! reach the ledger.

use crate::error::{conflict_error, not_found_error, AppError};
use crate::expense::allocation::allocate;
use crate::expense::approval::{is_fully_approved, normalize_title, validate_allocation_input};
use crate::expense::ledger::{MaterializeOutcome, SettlementLedger};
use crate::expense::types::{
    shares_total, Expense, ExpenseShare, ExpenseState, LedgerEntry, MemberWeight,
};
use crate::notify::{ExpenseEvent, Notifier};
use crate::store::{ExpenseRepository, ShareUpdate};
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Input for a new proposal
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub group_id: Uuid,
    pub title: String,
    pub total_cents: i64,
    pub weights: Vec<MemberWeight>,
    pub payer_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
}

/// An expense with everything hanging off it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseDetail {
    pub expense: Expense,
    pub shares: Vec<ExpenseShare>,
    pub ledger: Vec<LedgerEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FinalizeOutcome {
    /// This call performed the transition
    Finalized {
        expense: Expense,
        /// `None` when writing the ledger failed; reconciliation picks it up
        ledger: Option<MaterializeOutcome>,
    },
    /// Already finalized (or cancelled) by someone else; nothing done
    AlreadyTerminal { state: ExpenseState },
    /// At least one share is still unapproved
    AwaitingApproval,
}

/// Result of an approve or decline call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResult {
    pub share: ExpenseShare,
    pub state: ExpenseState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalize: Option<FinalizeOutcome>,
}

#[derive(Clone)]
pub struct ExpenseService {
    repo: Arc<dyn ExpenseRepository>,
    ledger: SettlementLedger,
    notifier: Arc<dyn Notifier>,
}

impl ExpenseService {
    pub fn new(
        repo: Arc<dyn ExpenseRepository>,
        ledger: SettlementLedger,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            repo,
            ledger,
            notifier,
        }
    }

    /// Allocate shares and persist a new proposal. The creator's own share
    /// starts approved.
    pub async fn create(&self, input: NewExpense, creator: Uuid) -> Result<ExpenseDetail, AppError> {
        let title = normalize_title(&input.title)?;
        let total = validate_allocation_input(input.total_cents, &input.weights)?;

        let expense = Expense::new(
            input.group_id,
            title,
            input.total_cents,
            input.payer_id,
            input.due_date,
            creator,
        );

        let shares: Vec<ExpenseShare> = allocate(total, &input.weights)
            .into_iter()
            .map(|a| -> Result<ExpenseShare, AppError> {
                // Every share is bounded by the total, which came from an i64
                let amount = i64::try_from(a.amount_cents).map_err(|_| {
                    AppError::Internal(format!("Share of {} cents overflows", a.amount_cents))
                })?;
                Ok(ExpenseShare {
                    expense_id: expense.id,
                    member_id: a.member_id,
                    individual_amount_cents: amount,
                    approved: a.member_id == creator,
                })
            })
            .collect::<Result<_, _>>()?;

        if shares_total(&shares) != expense.total_amount_cents as i128 {
            return Err(AppError::Internal(format!(
                "Allocation for '{}' does not sum to its total",
                expense.title
            )));
        }

        self.repo.insert_expense(&expense, &shares).await?;
        info!(
            "Expense {} proposed in group {}: {} cents across {} members",
            expense.id,
            expense.group_id,
            expense.total_amount_cents,
            shares.len()
        );
        self.notifier.notify(ExpenseEvent::Proposed {
            expense_id: expense.id,
            group_id: expense.group_id,
            title: expense.title.clone(),
            created_by: creator,
        });

        // A creator splitting only with themselves is unanimous from the start
        if is_fully_approved(&shares) {
            self.finalize(expense.id).await?;
        }

        self.get(expense.id).await
    }

    /// Approve a member's share; finalizes when it completes unanimity
    pub async fn approve(&self, expense_id: Uuid, member_id: Uuid) -> Result<ApprovalResult, AppError> {
        match self.repo.set_share_approval(expense_id, member_id, true).await? {
            ShareUpdate::Updated(share) => {
                debug!("Member {} approved expense {}", member_id, expense_id);
                self.notifier.notify(ExpenseEvent::Approved {
                    expense_id,
                    member_id,
                });

                let outcome = self.finalize(expense_id).await?;
                let state = match &outcome {
                    FinalizeOutcome::Finalized { expense, .. } => expense.state,
                    FinalizeOutcome::AlreadyTerminal { state } => *state,
                    FinalizeOutcome::AwaitingApproval => ExpenseState::Proposed,
                };
                Ok(ApprovalResult {
                    share,
                    state,
                    finalize: Some(outcome),
                })
            }
            // Approving a finalized expense is a harmless retry
            ShareUpdate::NotProposed(ExpenseState::Finalized) => {
                let share = self.share_of(expense_id, member_id).await?;
                Ok(ApprovalResult {
                    share,
                    state: ExpenseState::Finalized,
                    finalize: None,
                })
            }
            ShareUpdate::NotProposed(state) => Err(conflict_error(format!(
                "Expense {} is {} and can no longer be approved",
                expense_id, state
            ))),
            ShareUpdate::MissingShare => Err(missing_share(expense_id, member_id)),
            ShareUpdate::MissingExpense => Err(missing_expense(expense_id)),
        }
    }

    /// Withdraw a member's approval. The proposal stays open and blocked
    /// until the member approves again or the creator deletes it.
    pub async fn decline(&self, expense_id: Uuid, member_id: Uuid) -> Result<ApprovalResult, AppError> {
        match self.repo.set_share_approval(expense_id, member_id, false).await? {
            ShareUpdate::Updated(share) => {
                info!(
                    "Member {} declined expense {}; it stays pending",
                    member_id, expense_id
                );
                self.notifier.notify(ExpenseEvent::Declined {
                    expense_id,
                    member_id,
                });
                Ok(ApprovalResult {
                    share,
                    state: ExpenseState::Proposed,
                    finalize: None,
                })
            }
            ShareUpdate::NotProposed(state) => Err(conflict_error(format!(
                "Expense {} is already {}; approvals can no longer be withdrawn",
                expense_id, state
            ))),
            ShareUpdate::MissingShare => Err(missing_share(expense_id, member_id)),
            ShareUpdate::MissingExpense => Err(missing_expense(expense_id)),
        }
    }

    /// Move a fully approved proposal to Finalized and write its ledger.
    /// A no-op for anything already terminal or still awaiting approval.
    pub async fn finalize(&self, expense_id: Uuid) -> Result<FinalizeOutcome, AppError> {
        let expense = self
            .repo
            .get_expense(expense_id)
            .await?
            .ok_or_else(|| missing_expense(expense_id))?;

        if expense.state.is_terminal() {
            debug!("Finalize skipped: expense {} is {}", expense_id, expense.state);
            return Ok(FinalizeOutcome::AlreadyTerminal {
                state: expense.state,
            });
        }

        let shares = self.repo.list_shares(expense_id).await?;
        if !is_fully_approved(&shares) {
            return Ok(FinalizeOutcome::AwaitingApproval);
        }

        let Some(finalized) = self.repo.mark_finalized(expense_id).await? else {
            // Lost the race, or a decline slipped in after our read
            return Ok(match self.repo.get_expense(expense_id).await? {
                Some(current) if current.state.is_terminal() => FinalizeOutcome::AlreadyTerminal {
                    state: current.state,
                },
                Some(_) => FinalizeOutcome::AwaitingApproval,
                None => FinalizeOutcome::AlreadyTerminal {
                    state: ExpenseState::Cancelled,
                },
            });
        };

        info!("Expense {} finalized", expense_id);

        let ledger = match self.ledger.materialize(&finalized).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(
                    "Ledger for expense {} not written, left for reconciliation: {}",
                    expense_id, e
                );
                None
            }
        };

        self.notifier.notify(ExpenseEvent::Finalized {
            expense_id,
            group_id: finalized.group_id,
            ledger_entries: ledger.map_or(0, |o| o.entries_created()),
            payerless: finalized.payer_id.is_none(),
        });

        Ok(FinalizeOutcome::Finalized {
            expense: finalized,
            ledger,
        })
    }

    /// Remove an expense with its shares and ledger entries. Only the
    /// creator may do this, in any state.
    pub async fn delete(&self, expense_id: Uuid, actor: Uuid) -> Result<Expense, AppError> {
        let expense = self
            .repo
            .get_expense(expense_id)
            .await?
            .ok_or_else(|| missing_expense(expense_id))?;

        if expense.created_by != actor {
            return Err(AppError::Forbidden(format!(
                "Only the creator can delete expense {}",
                expense_id
            )));
        }

        self.ledger.delete(expense_id).await?;
        let mut removed = self
            .repo
            .delete_expense(expense_id)
            .await?
            .ok_or_else(|| missing_expense(expense_id))?;
        removed.state = ExpenseState::Cancelled;

        info!("Expense {} deleted by {}", expense_id, actor);
        self.notifier.notify(ExpenseEvent::Deleted {
            expense_id,
            group_id: removed.group_id,
        });
        Ok(removed)
    }

    pub async fn get(&self, expense_id: Uuid) -> Result<ExpenseDetail, AppError> {
        let expense = self
            .repo
            .get_expense(expense_id)
            .await?
            .ok_or_else(|| missing_expense(expense_id))?;
        let shares = self.repo.list_shares(expense_id).await?;
        let ledger = self.ledger.entries_for(expense_id).await?;
        Ok(ExpenseDetail {
            expense,
            shares,
            ledger,
        })
    }

    pub async fn list(
        &self,
        group_id: Uuid,
        state: Option<ExpenseState>,
    ) -> Result<Vec<Expense>, AppError> {
        self.repo.list_expenses(group_id, state).await
    }

    async fn share_of(&self, expense_id: Uuid, member_id: Uuid) -> Result<ExpenseShare, AppError> {
        self.repo
            .list_shares(expense_id)
            .await?
            .into_iter()
            .find(|s| s.member_id == member_id)
            .ok_or_else(|| missing_share(expense_id, member_id))
    }
}

fn missing_expense(expense_id: Uuid) -> AppError {
    not_found_error(format!("Expense {} not found", expense_id))
}

fn missing_share(expense_id: Uuid, member_id: Uuid) -> AppError {
    not_found_error(format!(
        "Member {} has no share in expense {}",
        member_id, expense_id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{ChannelNotifier, NullNotifier};
    use crate::store::MemoryExpenseRepository;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};

    struct Harness {
        repo: Arc<MemoryExpenseRepository>,
        service: ExpenseService,
        group: Uuid,
    }

    fn harness_with(notifier: Arc<dyn Notifier>) -> Harness {
        let repo = Arc::new(MemoryExpenseRepository::new());
        let ledger = SettlementLedger::new(repo.clone());
        Harness {
            service: ExpenseService::new(repo.clone(), ledger, notifier),
            repo,
            group: Uuid::new_v4(),
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(NullNotifier))
    }

    fn even_split(h: &Harness, members: &[Uuid], total: i64, payer: Option<Uuid>) -> NewExpense {
        NewExpense {
            group_id: h.group,
            title: "Dinner".to_string(),
            total_cents: total,
            weights: crate::expense::allocation::even_weights(members),
            payer_id: payer,
            due_date: None,
        }
    }

    #[tokio::test]
    async fn test_create_auto_approves_creator_only() {
        let h = harness();
        let (u1, u2, u3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let detail = h
            .service
            .create(even_split(&h, &[u1, u2, u3], 1000, Some(u1)), u1)
            .await
            .unwrap();

        assert_eq!(detail.expense.state, ExpenseState::Proposed);
        let approvals: Vec<bool> = detail.shares.iter().map(|s| s.approved).collect();
        assert_eq!(approvals, vec![true, false, false]);
        let amounts: Vec<i64> = detail.shares.iter().map(|s| s.individual_amount_cents).collect();
        assert_eq!(amounts, vec![334, 333, 333]);
        assert!(detail.ledger.is_empty());
    }

    #[tokio::test]
    async fn test_last_approval_finalizes_and_writes_ledger() {
        let h = harness();
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        let detail = h
            .service
            .create(even_split(&h, &[u1, u2], 1000, Some(u1)), u1)
            .await
            .unwrap();

        let result = h.service.approve(detail.expense.id, u2).await.unwrap();
        assert_eq!(result.state, ExpenseState::Finalized);
        assert!(matches!(
            result.finalize,
            Some(FinalizeOutcome::Finalized {
                ledger: Some(MaterializeOutcome::Created(1)),
                ..
            })
        ));

        let ledger = h.service.get(detail.expense.id).await.unwrap().ledger;
        assert_eq!(ledger.len(), 1);
        assert_eq!(
            (ledger[0].payer_id, ledger[0].ower_id, ledger[0].amount_cents),
            (u1, u2, 500)
        );
    }

    #[tokio::test]
    async fn test_partial_approval_stays_proposed() {
        let h = harness();
        let (u1, u2, u3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let detail = h
            .service
            .create(even_split(&h, &[u1, u2, u3], 900, Some(u1)), u1)
            .await
            .unwrap();

        let result = h.service.approve(detail.expense.id, u2).await.unwrap();
        assert_eq!(result.state, ExpenseState::Proposed);
        assert_eq!(result.finalize, Some(FinalizeOutcome::AwaitingApproval));
        assert_eq!(h.repo.ledger_len().await, 0);
    }

    #[tokio::test]
    async fn test_finalize_twice_keeps_single_ledger() {
        let h = harness();
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        let id = h
            .service
            .create(even_split(&h, &[u1, u2], 1000, Some(u1)), u1)
            .await
            .unwrap()
            .expense
            .id;
        h.service.approve(id, u2).await.unwrap();

        let again = h.service.finalize(id).await.unwrap();
        assert_eq!(
            again,
            FinalizeOutcome::AlreadyTerminal {
                state: ExpenseState::Finalized
            }
        );
        assert_eq!(h.repo.ledger_len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_finalize_materializes_once() {
        let h = harness();
        let members: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let id = h
            .service
            .create(even_split(&h, &members, 1000, Some(members[0])), members[0])
            .await
            .unwrap()
            .expense
            .id;
        for m in &members[1..3] {
            h.service.approve(id, *m).await.unwrap();
        }

        let (approved, swept) = tokio::join!(
            h.service.approve(id, members[3]),
            h.service.finalize(id)
        );
        assert_ok!(approved);
        assert_ok!(swept);

        assert_eq!(h.repo.ledger_len().await, 3);
        let detail = h.service.get(id).await.unwrap();
        assert_eq!(detail.expense.state, ExpenseState::Finalized);
    }

    #[tokio::test]
    async fn test_approve_after_finalize_is_noop() {
        let h = harness();
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        let id = h
            .service
            .create(even_split(&h, &[u1, u2], 200, Some(u1)), u1)
            .await
            .unwrap()
            .expense
            .id;
        h.service.approve(id, u2).await.unwrap();

        let retry = h.service.approve(id, u2).await.unwrap();
        assert_eq!(retry.state, ExpenseState::Finalized);
        assert!(retry.finalize.is_none());
        assert_eq!(h.repo.ledger_len().await, 1);
    }

    #[tokio::test]
    async fn test_decline_blocks_finalization() {
        let h = harness();
        let (u1, u2, u3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let id = h
            .service
            .create(even_split(&h, &[u1, u2, u3], 300, Some(u1)), u1)
            .await
            .unwrap()
            .expense
            .id;

        h.service.approve(id, u2).await.unwrap();
        let declined = h.service.decline(id, u2).await.unwrap();
        assert!(!declined.share.approved);

        let result = h.service.approve(id, u3).await.unwrap();
        assert_eq!(result.state, ExpenseState::Proposed);
        assert_eq!(h.service.finalize(id).await.unwrap(), FinalizeOutcome::AwaitingApproval);
    }

    #[tokio::test]
    async fn test_decline_after_finalize_conflicts() {
        let h = harness();
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        let id = h
            .service
            .create(even_split(&h, &[u1, u2], 200, Some(u1)), u1)
            .await
            .unwrap()
            .expense
            .id;
        h.service.approve(id, u2).await.unwrap();

        let err = h.service.decline(id, u2).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let detail = h.service.get(id).await.unwrap();
        assert_eq!(detail.expense.state, ExpenseState::Finalized);
        assert!(detail.shares.iter().all(|s| s.approved));
    }

    #[tokio::test]
    async fn test_unknown_expense_or_member_is_not_found() {
        let h = harness();
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        let id = h
            .service
            .create(even_split(&h, &[u1, u2], 200, Some(u1)), u1)
            .await
            .unwrap()
            .expense
            .id;

        assert!(matches!(
            h.service.approve(id, Uuid::new_v4()).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            h.service.decline(Uuid::new_v4(), u2).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            h.service.finalize(Uuid::new_v4()).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_invalid_input_persists_nothing() {
        let h = harness();
        let u1 = Uuid::new_v4();

        let mut negative = even_split(&h, &[u1], -5, None);
        assert!(matches!(
            h.service.create(negative.clone(), u1).await.unwrap_err(),
            AppError::Validation(_)
        ));

        negative.total_cents = 100;
        negative.weights.clear();
        assert_err!(h.service.create(negative.clone(), u1).await);

        negative.weights = vec![MemberWeight::new(u1, 100.0)];
        negative.title = "   ".to_string();
        assert_err!(h.service.create(negative, u1).await);

        assert!(h.service.list(h.group, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_solo_expense_finalizes_on_create() {
        let h = harness();
        let u1 = Uuid::new_v4();
        let detail = h
            .service
            .create(even_split(&h, &[u1], 750, Some(u1)), u1)
            .await
            .unwrap();
        assert_eq!(detail.expense.state, ExpenseState::Finalized);
        assert!(detail.ledger.is_empty());
    }

    #[tokio::test]
    async fn test_payerless_expense_finalizes_without_ledger() {
        let (notifier, mut rx) = ChannelNotifier::new(16);
        let h = harness_with(Arc::new(notifier));
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        let id = h
            .service
            .create(even_split(&h, &[u1, u2], 600, None), u1)
            .await
            .unwrap()
            .expense
            .id;
        let result = h.service.approve(id, u2).await.unwrap();

        assert_eq!(result.state, ExpenseState::Finalized);
        assert_eq!(h.repo.ledger_len().await, 0);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], ExpenseEvent::Proposed { .. }));
        assert_eq!(
            events[1],
            ExpenseEvent::Approved {
                expense_id: id,
                member_id: u2
            }
        );
        assert!(matches!(
            events[2],
            ExpenseEvent::Finalized {
                ledger_entries: 0,
                payerless: true,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_delete_requires_creator_and_cascades() {
        let h = harness();
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        let id = h
            .service
            .create(even_split(&h, &[u1, u2], 1000, Some(u1)), u1)
            .await
            .unwrap()
            .expense
            .id;
        h.service.approve(id, u2).await.unwrap();

        assert!(matches!(
            h.service.delete(id, u2).await.unwrap_err(),
            AppError::Forbidden(_)
        ));

        let removed = h.service.delete(id, u1).await.unwrap();
        assert_eq!(removed.state, ExpenseState::Cancelled);
        assert_eq!(h.repo.ledger_len().await, 0);
        assert!(h.repo.list_shares(id).await.unwrap().is_empty());
        assert!(matches!(
            h.service.get(id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_dispatcher_failure_never_blocks_transitions() {
        let (notifier, rx) = ChannelNotifier::new(1);
        drop::<mpsc::Receiver<ExpenseEvent>>(rx);
        let h = harness_with(Arc::new(notifier));
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        let id = h
            .service
            .create(even_split(&h, &[u1, u2], 400, Some(u2)), u1)
            .await
            .unwrap()
            .expense
            .id;
        let result = h.service.approve(id, u2).await.unwrap();
        assert_eq!(result.state, ExpenseState::Finalized);
    }
}
