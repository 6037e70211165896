use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::CoordinationError;

/// The global status of a distributed transaction.
///
/// Statuses advance `Created → Preparing → {Prepared | Failed}`, and from
/// `Prepared` to `{Committed | Failed}`. A rollback moves any
/// not-yet-committed transaction to `RolledBack`. `Committed`, `RolledBack`,
/// and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// The transaction record exists but no phase has started.
    Created,
    /// A prepare round is in flight.
    Preparing,
    /// Every participant prepared successfully.
    Prepared,
    /// The transaction committed on every participant.
    Committed,
    /// The transaction was rolled back.
    RolledBack,
    /// A prepare or commit round failed. After a failed commit round this
    /// can mean participants disagree on the outcome; see the participant
    /// records for the divergence.
    Failed,
}

impl TransactionStatus {
    /// Returns true once the transaction can no longer change status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Committed | TransactionStatus::RolledBack | TransactionStatus::Failed
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Created => "created",
            TransactionStatus::Preparing => "preparing",
            TransactionStatus::Prepared => "prepared",
            TransactionStatus::Committed => "committed",
            TransactionStatus::RolledBack => "rolledback",
            TransactionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The status of one participant within a transaction.
///
/// `Prepared` is part of the vocabulary for completeness but is never
/// written by this crate: a participant's prepared condition is implicit in
/// the coordinator's round results, and the record moves straight from
/// `Registered` to a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    /// The participant joined the transaction.
    Registered,
    /// The participant's local work is staged, awaiting the decision.
    Prepared,
    /// The participant's local transaction committed.
    Committed,
    /// The participant's local transaction was rolled back.
    RolledBack,
    /// A participant operation failed. Terminal, reachable from any
    /// non-terminal status.
    Failed,
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParticipantStatus::Registered => "registered",
            ParticipantStatus::Prepared => "prepared",
            ParticipantStatus::Committed => "committed",
            ParticipantStatus::RolledBack => "rolledback",
            ParticipantStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The persisted record of one distributed transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Globally unique transaction id. Immutable once created.
    pub xid: String,
    /// Current status.
    pub status: TransactionStatus,
    /// When the transaction was begun.
    pub start_time: DateTime<Utc>,
    /// Set exactly once, when the status becomes terminal.
    pub finish_time: Option<DateTime<Utc>>,
    /// Free-text description supplied by the caller.
    pub description: String,
}

/// The persisted record of one participant in one transaction.
///
/// At most one record exists per `(xid, name)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantRecord {
    /// The transaction this participant belongs to.
    pub xid: String,
    /// Participant name, unique within the transaction.
    pub name: String,
    /// Current status.
    pub status: ParticipantStatus,
    /// Identifies the resource manager backing this participant.
    pub resource_id: String,
}

/// Uniform outcome of a participant operation.
///
/// Every participant operation reports through this value rather than
/// unwinding: one participant's failure must never abort the collection of
/// the others' results, so callers branch on `success` instead of `?`.
#[derive(Debug, Clone)]
pub struct OperationResult {
    /// Whether the operation succeeded.
    pub success: bool,
    /// The underlying error, when `success` is false.
    pub error: Option<CoordinationError>,
    /// Human-readable outcome description.
    pub message: String,
}

impl OperationResult {
    /// A successful outcome with the given message.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            error: None,
            message: message.into(),
        }
    }

    /// A failed outcome carrying the error and a message.
    pub fn fail(error: CoordinationError, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error),
            message: message.into(),
        }
    }
}
