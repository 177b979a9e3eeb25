//! Net balances derived from the ledger
//!
//! Nothing here is stored. Positive amounts mean the counterpart owes the
//! user the balance is computed for.

use crate::error::{validation_error, AppError};
use crate::expense::types::LedgerEntry;
use crate::store::ExpenseRepository;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Signed net between a user and one counterpart
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterpartyBalance {
    pub counterpart_id: Uuid,
    pub net_cents: i64,
}

/// Net of entries between `a` and `b`; positive means `b` owes `a`.
/// Entries not between exactly this pair are ignored.
pub fn net_between(entries: &[LedgerEntry], a: Uuid, b: Uuid) -> Result<i64, AppError> {
    let net = entries.iter().fold(0i128, |net, e| {
        if e.payer_id == a && e.ower_id == b {
            net + i128::from(e.amount_cents)
        } else if e.payer_id == b && e.ower_id == a {
            net - i128::from(e.amount_cents)
        } else {
            net
        }
    });
    to_cents(net)
}

/// Group every entry touching `user` by counterpart, ordered by counterpart id
pub fn net_by_counterpart(
    entries: &[LedgerEntry],
    user: Uuid,
) -> Result<Vec<CounterpartyBalance>, AppError> {
    let mut nets: BTreeMap<Uuid, i128> = BTreeMap::new();
    for e in entries {
        if e.payer_id == user {
            *nets.entry(e.ower_id).or_default() += i128::from(e.amount_cents);
        } else if e.ower_id == user {
            *nets.entry(e.payer_id).or_default() -= i128::from(e.amount_cents);
        }
    }
    nets.into_iter()
        .map(|(counterpart_id, net)| {
            Ok(CounterpartyBalance {
                counterpart_id,
                net_cents: to_cents(net)?,
            })
        })
        .collect()
}

// Sums are exact in i128; only the final net has to fit the API type
fn to_cents(net: i128) -> Result<i64, AppError> {
    i64::try_from(net).map_err(|_| validation_error("Net balance is out of range"))
}

#[derive(Clone)]
pub struct BalanceAggregator {
    repo: Arc<dyn ExpenseRepository>,
}

impl BalanceAggregator {
    pub fn new(repo: Arc<dyn ExpenseRepository>) -> Self {
        Self { repo }
    }

    /// Positive means `user_b` owes `user_a`
    pub async fn net_balance(&self, user_a: Uuid, user_b: Uuid) -> Result<i64, AppError> {
        if user_a == user_b {
            return Ok(0);
        }
        let entries = self.repo.ledger_between(user_a, user_b).await?;
        net_between(&entries, user_a, user_b)
    }

    pub async fn balances_for_user(&self, user: Uuid) -> Result<Vec<CounterpartyBalance>, AppError> {
        let entries = self.repo.ledger_for_user(user).await?;
        net_by_counterpart(&entries, user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expense::{Expense, ExpenseShare, SettlementLedger};
    use crate::store::MemoryExpenseRepository;
    use pretty_assertions::assert_eq;

    fn entry(payer: Uuid, ower: Uuid, amount: i64) -> LedgerEntry {
        LedgerEntry::new(Uuid::new_v4(), payer, ower, amount)
    }

    #[test]
    fn test_net_between_scenario() {
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        let entries = vec![entry(u1, u2, 1000), entry(u2, u1, 400)];
        assert_eq!(net_between(&entries, u1, u2).unwrap(), 600);
        assert_eq!(net_between(&entries, u2, u1).unwrap(), -600);
    }

    #[test]
    fn test_net_between_is_antisymmetric() {
        let users: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let entries = vec![
            entry(users[0], users[1], 250),
            entry(users[1], users[0], 75),
            entry(users[2], users[1], 10),
            entry(users[0], users[3], 999),
            entry(users[3], users[2], 1),
        ];
        for a in &users {
            for b in &users {
                assert_eq!(
                    net_between(&entries, *a, *b).unwrap(),
                    -net_between(&entries, *b, *a).unwrap()
                );
            }
        }
    }

    #[test]
    fn test_net_between_ignores_other_pairs() {
        let (u1, u2, u3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let entries = vec![entry(u1, u3, 500), entry(u3, u2, 300)];
        assert_eq!(net_between(&entries, u1, u2).unwrap(), 0);
    }

    #[test]
    fn test_large_entries_net_without_overflow() {
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        let entries = vec![
            entry(u1, u2, i64::MAX),
            entry(u1, u2, i64::MAX),
            entry(u2, u1, i64::MAX),
        ];
        assert_eq!(net_between(&entries, u1, u2).unwrap(), i64::MAX);
        assert_eq!(net_between(&entries, u2, u1).unwrap(), -i64::MAX);
        assert_eq!(
            net_by_counterpart(&entries, u2).unwrap(),
            vec![CounterpartyBalance {
                counterpart_id: u1,
                net_cents: -i64::MAX
            }]
        );
    }

    #[test]
    fn test_net_beyond_i64_is_an_error() {
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        let half = i64::MAX / 2 + 1;
        let entries = vec![entry(u1, u2, half), entry(u1, u2, half)];

        let err = net_between(&entries, u1, u2).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = net_by_counterpart(&entries, u1).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_net_by_counterpart_groups_and_signs() {
        let (me, a, b) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let entries = vec![
            entry(me, a, 300),
            entry(a, me, 100),
            entry(b, me, 50),
            entry(a, b, 7000),
        ];
        let mut expected = vec![
            CounterpartyBalance {
                counterpart_id: a,
                net_cents: 200,
            },
            CounterpartyBalance {
                counterpart_id: b,
                net_cents: -50,
            },
        ];
        expected.sort_by_key(|c| c.counterpart_id);
        assert_eq!(net_by_counterpart(&entries, me).unwrap(), expected);
    }

    async fn settle(
        repo: &Arc<MemoryExpenseRepository>,
        payer: Uuid,
        ower: Uuid,
        amount: i64,
    ) -> Uuid {
        let expense = Expense::new(Uuid::new_v4(), "Split".into(), amount, Some(payer), None, payer);
        let shares = vec![
            ExpenseShare {
                expense_id: expense.id,
                member_id: payer,
                individual_amount_cents: 0,
                approved: true,
            },
            ExpenseShare {
                expense_id: expense.id,
                member_id: ower,
                individual_amount_cents: amount,
                approved: true,
            },
        ];
        repo.insert_expense(&expense, &shares).await.unwrap();
        let finalized = repo.mark_finalized(expense.id).await.unwrap().unwrap();
        SettlementLedger::new(repo.clone())
            .materialize(&finalized)
            .await
            .unwrap();
        expense.id
    }

    #[tokio::test]
    async fn test_deleting_one_expense_keeps_other_balances() {
        let repo = Arc::new(MemoryExpenseRepository::new());
        let balances = BalanceAggregator::new(repo.clone());
        let (u1, u2, u3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        settle(&repo, u1, u2, 1000).await;
        let e2 = settle(&repo, u2, u1, 400).await;
        settle(&repo, u3, u1, 250).await;
        assert_eq!(balances.net_balance(u1, u2).await.unwrap(), 600);
        assert_eq!(balances.net_balance(u1, u3).await.unwrap(), -250);

        repo.delete_expense(e2).await.unwrap();
        assert_eq!(balances.net_balance(u1, u2).await.unwrap(), 1000);
        assert_eq!(balances.net_balance(u2, u1).await.unwrap(), -1000);
        assert_eq!(balances.net_balance(u1, u3).await.unwrap(), -250);
    }

    #[tokio::test]
    async fn test_balances_for_user_from_store() {
        let repo = Arc::new(MemoryExpenseRepository::new());
        let balances = BalanceAggregator::new(repo.clone());
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        settle(&repo, u1, u2, 1000).await;
        settle(&repo, u2, u1, 400).await;

        let listed = balances.balances_for_user(u2).await.unwrap();
        assert_eq!(
            listed,
            vec![CounterpartyBalance {
                counterpart_id: u1,
                net_cents: -600
            }]
        );
        assert_eq!(balances.net_balance(u1, u1).await.unwrap(), 0);
    }
}
