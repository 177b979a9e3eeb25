//! Approval predicate and proposal input checks
//!
//! `is_fully_approved` is the single definition of "ready to finalize". The
//! live approval path, both repositories and the reconciliation sweep all
//! call it.

use crate::error::{validation_error, AppError};
use crate::expense::types::{ExpenseShare, MemberWeight};
use std::collections::HashSet;

/// Longest title accepted for a proposal
pub const MAX_TITLE_LEN: usize = 200;

/// True when the proposal has at least one share and every share is approved
pub fn is_fully_approved(shares: &[ExpenseShare]) -> bool {
    !shares.is_empty() && shares.iter().all(|s| s.approved)
}

/// Reject totals and weight vectors the allocation engine must never see
pub fn validate_allocation_input(
    total_cents: i64,
    weights: &[MemberWeight],
) -> Result<u64, AppError> {
    let total = u64::try_from(total_cents)
        .map_err(|_| validation_error("Total amount cannot be negative"))?;

    if weights.is_empty() {
        return Err(validation_error("An expense needs at least one member"));
    }

    let mut seen = HashSet::with_capacity(weights.len());
    for w in weights {
        if !w.weight.is_finite() || w.weight < 0.0 || w.weight > 100.0 {
            return Err(validation_error(format!(
                "Weight for member {} must be between 0 and 100, got {}",
                w.member_id, w.weight
            )));
        }
        if !seen.insert(w.member_id) {
            return Err(validation_error(format!(
                "Member {} appears more than once",
                w.member_id
            )));
        }
    }

    if !weights.iter().any(|w| w.weight > 0.0) {
        return Err(validation_error("At least one member needs a positive weight"));
    }

    Ok(total)
}

/// Trimmed, length-checked title
pub fn normalize_title(title: &str) -> Result<String, AppError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(validation_error("Title is required"));
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(validation_error(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn share(approved: bool) -> ExpenseShare {
        ExpenseShare {
            expense_id: Uuid::nil(),
            member_id: Uuid::new_v4(),
            individual_amount_cents: 100,
            approved,
        }
    }

    #[test]
    fn test_fully_approved_requires_every_share() {
        assert!(is_fully_approved(&[share(true), share(true)]));
        assert!(!is_fully_approved(&[share(true), share(false)]));
    }

    #[test]
    fn test_no_shares_is_never_approved() {
        assert!(!is_fully_approved(&[]));
    }

    #[test]
    fn test_validate_rejects_negative_total() {
        let weights = vec![MemberWeight::new(Uuid::new_v4(), 100.0)];
        let err = validate_allocation_input(-1, &weights).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_validate_rejects_empty_and_all_zero() {
        assert!(validate_allocation_input(100, &[]).is_err());
        let zeros = vec![
            MemberWeight::new(Uuid::new_v4(), 0.0),
            MemberWeight::new(Uuid::new_v4(), 0.0),
        ];
        assert!(validate_allocation_input(100, &zeros).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_weights_and_duplicates() {
        let id = Uuid::new_v4();
        assert!(validate_allocation_input(100, &[MemberWeight::new(id, 100.5)]).is_err());
        assert!(validate_allocation_input(100, &[MemberWeight::new(id, f64::NAN)]).is_err());
        assert!(validate_allocation_input(
            100,
            &[MemberWeight::new(id, 50.0), MemberWeight::new(id, 50.0)]
        )
        .is_err());
    }

    #[test]
    fn test_validate_accepts_zero_total() {
        let weights = vec![MemberWeight::new(Uuid::new_v4(), 50.0)];
        assert_eq!(validate_allocation_input(0, &weights).unwrap(), 0);
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("  Dinner ").unwrap(), "Dinner");
        assert!(normalize_title("   ").is_err());
        assert!(normalize_title(&"x".repeat(MAX_TITLE_LEN + 1)).is_err());
    }
}
