//! Receipt line items to an allocation request
//!
//! The receipt scanner hands over `(name, price)` items with the members each
//! one was assigned to. Each item is split evenly among its members; the
//! per-member sums become the weights and the item prices the total.

use crate::error::{validation_error, AppError};
use crate::expense::allocation::{allocate, even_weights};
use crate::expense::types::{MemberWeight, ShareAllocation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptItem {
    pub name: String,
    pub price_cents: i64,
    pub member_ids: Vec<Uuid>,
}

/// A receipt reduced to what `create` needs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemizedSplit {
    pub total_cents: i64,
    /// Percentages proportional to each member's item sum
    pub weights: Vec<MemberWeight>,
    /// Exact per-member sums, in order of first appearance
    pub shares: Vec<ShareAllocation>,
}

pub fn itemize(items: &[ReceiptItem], detected_total_cents: Option<i64>) -> Result<ItemizedSplit, AppError> {
    if items.is_empty() {
        return Err(validation_error("A receipt needs at least one item"));
    }

    let mut order: Vec<Uuid> = Vec::new();
    let mut sums: Vec<u64> = Vec::new();
    let mut total: u64 = 0;

    for item in items {
        let name = item.name.trim();
        if name.is_empty() {
            return Err(validation_error("Every receipt item needs a name"));
        }
        let price = u64::try_from(item.price_cents)
            .map_err(|_| validation_error(format!("Item '{}' has a negative price", name)))?;
        if item.member_ids.is_empty() {
            return Err(validation_error(format!("Item '{}' is not assigned to anyone", name)));
        }
        let mut seen = HashSet::with_capacity(item.member_ids.len());
        if !item.member_ids.iter().all(|m| seen.insert(*m)) {
            return Err(validation_error(format!(
                "Item '{}' lists a member more than once",
                name
            )));
        }

        // Every per-member sum is bounded by the total, so checking it first
        // keeps the sums below from overflowing
        total = total
            .checked_add(price)
            .filter(|t| i64::try_from(*t).is_ok())
            .ok_or_else(|| validation_error("Receipt total is too large"))?;

        for part in allocate(price, &even_weights(&item.member_ids)) {
            let idx = match order.iter().position(|m| *m == part.member_id) {
                Some(idx) => idx,
                None => {
                    order.push(part.member_id);
                    sums.push(0);
                    order.len() - 1
                }
            };
            sums[idx] += part.amount_cents;
        }
    }

    let total_cents =
        i64::try_from(total).map_err(|_| validation_error("Receipt total is too large"))?;
    if let Some(detected) = detected_total_cents {
        if detected != total_cents {
            return Err(validation_error(format!(
                "Items add up to {} cents but the receipt total is {}",
                total_cents, detected
            )));
        }
    }

    let weights = if total == 0 {
        even_weights(&order)
    } else {
        order
            .iter()
            .zip(&sums)
            .map(|(m, sum)| MemberWeight::new(*m, *sum as f64 * 100.0 / total as f64))
            .collect()
    };

    let shares = order
        .into_iter()
        .zip(sums)
        .map(|(member_id, amount_cents)| ShareAllocation {
            member_id,
            amount_cents,
        })
        .collect();

    Ok(ItemizedSplit {
        total_cents,
        weights,
        shares,
    })
}
