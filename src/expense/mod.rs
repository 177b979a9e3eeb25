//! Expense allocation and settlement
//!
//! Leaves first: the allocation engine, the proposal lifecycle, the ledger,
//! balances derived from it, and the reconciliation sweep.

pub mod allocation;
pub mod approval;
pub mod balance;
pub mod ledger;
pub mod receipt;
pub mod reconcile;
pub mod service;
pub mod types;

pub use allocation::allocate;
pub use approval::{is_fully_approved, validate_allocation_input};
pub use balance::{BalanceAggregator, CounterpartyBalance};
pub use ledger::SettlementLedger;
pub use receipt::{itemize, ItemizedSplit, ReceiptItem};
pub use reconcile::{ReconcileReport, Reconciler};
pub use service::{ApprovalResult, ExpenseDetail, ExpenseService, NewExpense};
pub use types::{Expense, ExpenseShare, ExpenseState, LedgerEntry, MemberWeight, ShareAllocation};
