//! Balance models and DTOs

use crate::expense::CounterpartyBalance;
use serde::Serialize;
use uuid::Uuid;

/// Net between two users; positive means `user_b` owes `user_a`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairBalanceResponse {
    pub user_a: Uuid,
    pub user_b: Uuid,
    pub net_cents: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBalancesResponse {
    pub user_id: Uuid,
    pub balances: Vec<CounterpartyBalance>,
}
