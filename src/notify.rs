//! Expense notifications
//!
//! State transitions emit events for the external push dispatcher. Delivery
//! is fire-and-forget: `Notifier::notify` never blocks and never fails, so a
//! slow or dead consumer cannot hold up an approval or a finalization.

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExpenseEvent {
    Proposed {
        expense_id: Uuid,
        group_id: Uuid,
        title: String,
        created_by: Uuid,
    },
    Approved {
        expense_id: Uuid,
        member_id: Uuid,
    },
    Declined {
        expense_id: Uuid,
        member_id: Uuid,
    },
    Finalized {
        expense_id: Uuid,
        group_id: Uuid,
        ledger_entries: usize,
        /// No payer recorded, so nobody owes anything yet
        payerless: bool,
    },
    Deleted {
        expense_id: Uuid,
        group_id: Uuid,
    },
}

impl ExpenseEvent {
    pub fn expense_id(&self) -> Uuid {
        match self {
            ExpenseEvent::Proposed { expense_id, .. }
            | ExpenseEvent::Approved { expense_id, .. }
            | ExpenseEvent::Declined { expense_id, .. }
            | ExpenseEvent::Finalized { expense_id, .. }
            | ExpenseEvent::Deleted { expense_id, .. } => *expense_id,
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, event: ExpenseEvent);
}

/// Discards every event
#[cfg(test)]
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

#[cfg(test)]
impl Notifier for NullNotifier {
    fn notify(&self, _event: ExpenseEvent) {}
}

/// Hands events to a bounded channel, dropping them when it is full or closed
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<ExpenseEvent>,
}

impl ChannelNotifier {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ExpenseEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: ExpenseEvent) {
        if let Err(e) = self.tx.try_send(event) {
            let (reason, event) = match e {
                mpsc::error::TrySendError::Full(event) => ("buffer full", event),
                mpsc::error::TrySendError::Closed(event) => ("dispatcher gone", event),
            };
            warn!(
                "Dropping notification for expense {} ({})",
                event.expense_id(),
                reason
            );
        }
    }
}

/// Drain events and hand them to the push dispatcher.
///
/// Delivery here is a structured log line per event.
pub fn spawn_dispatcher(mut rx: mpsc::Receiver<ExpenseEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(payload) => info!(target: "notifications", "{}", payload),
                Err(e) => warn!("Failed to encode notification: {}", e),
            }
        }
    })
}
