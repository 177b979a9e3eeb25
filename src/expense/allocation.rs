//! Allocation engine
//!
//! Turns a total in cents plus per-member percentage weights into integer
//! cent shares that always sum exactly to the total.
//!
//! Weights are accepted as floating percentages only at this boundary and are
//! converted to fixed-point integers straight away. All arithmetic after that
//! point is integer, using the largest-remainder (Hamilton) method to place
//! the cents lost to flooring.

use crate::expense::types::{MemberWeight, ShareAllocation};
use uuid::Uuid;

/// Fixed-point units per percentage point
const UNITS_PER_PERCENT: u128 = 1_000_000_000;

/// A weight of exactly 100%
const FULL_WEIGHT: u128 = 100 * UNITS_PER_PERCENT;

/// Convert a percentage to fixed-point, clamping into `[0, 100]`.
/// Non-finite input counts as zero.
fn to_fixed(weight: f64) -> u128 {
    if !weight.is_finite() || weight <= 0.0 {
        return 0;
    }
    (weight.min(100.0) * UNITS_PER_PERCENT as f64).round() as u128
}

/// Index of the member taking the whole total, if the override applies:
/// exactly one weight of 100 among more than one member.
fn full_share_override(fixed: &[u128]) -> Option<usize> {
    if fixed.len() < 2 {
        return None;
    }
    let mut full = fixed.iter().enumerate().filter(|(_, w)| **w == FULL_WEIGHT);
    match (full.next(), full.next()) {
        (Some((idx, _)), None) => Some(idx),
        _ => None,
    }
}

/// Split `total_cents` across `weights`.
///
/// Output order matches input order. The caller is responsible for rejecting
/// negative totals and out-of-range weights; this function never fails.
pub fn allocate(total_cents: u64, weights: &[MemberWeight]) -> Vec<ShareAllocation> {
    let fixed: Vec<u128> = weights.iter().map(|w| to_fixed(w.weight)).collect();

    if let Some(winner) = full_share_override(&fixed) {
        return weights
            .iter()
            .enumerate()
            .map(|(idx, w)| ShareAllocation {
                member_id: w.member_id,
                amount_cents: if idx == winner { total_cents } else { 0 },
            })
            .collect();
    }

    let weight_sum: u128 = fixed.iter().sum();
    if total_cents == 0 || weight_sum == 0 {
        return weights
            .iter()
            .map(|w| ShareAllocation {
                member_id: w.member_id,
                amount_cents: 0,
            })
            .collect();
    }

    let total = total_cents as u128;
    let mut amounts: Vec<u64> = Vec::with_capacity(fixed.len());
    let mut fractions: Vec<u128> = Vec::with_capacity(fixed.len());
    for w in &fixed {
        let scaled = total * w;
        // floor(scaled / weight_sum) <= total, so it fits back into u64
        amounts.push((scaled / weight_sum) as u64);
        fractions.push(scaled % weight_sum);
    }

    let assigned: u64 = amounts.iter().sum();
    let mut remainder = total_cents - assigned;

    // Stable sort: equal fractions keep input order
    let mut order: Vec<usize> = (0..fixed.len()).collect();
    order.sort_by(|a, b| fractions[*b].cmp(&fractions[*a]));

    for idx in order {
        if remainder == 0 {
            break;
        }
        amounts[idx] += 1;
        remainder -= 1;
    }

    weights
        .iter()
        .zip(amounts)
        .map(|(w, amount_cents)| ShareAllocation {
            member_id: w.member_id,
            amount_cents,
        })
        .collect()
}

/// Equal weights for every member, as the member directory supplies for a new proposal
pub fn even_weights(members: &[Uuid]) -> Vec<MemberWeight> {
    if members.is_empty() {
        return Vec::new();
    }
    let weight = 100.0 / members.len() as f64;
    members
        .iter()
        .map(|id| MemberWeight::new(*id, weight))
        .collect()
}
