use chrono::{DateTime, Utc};

use crate::errors::Result;
use crate::model::{ParticipantRecord, ParticipantStatus, TransactionRecord, TransactionStatus};

/// Trait for the store that persists transaction and participant records.
///
/// The coordinator and the participants share one `TransactionLogStore` and
/// use it as the durable source of truth for the protocol: the global
/// transaction state machine advances by writing through this trait, and a
/// participant reports its own terminal status through it. How records are
/// persisted (relational tables, a KV store, an in-memory map in tests) is
/// the implementation's concern; this crate only relies on the contract
/// below.
///
/// Implementations must be `Send` and `Sync`: during a fan-out round every
/// participant writes its record concurrently.
pub trait TransactionLogStore: Send + Sync {
    /// Persists a new transaction record.
    ///
    /// # Errors
    ///
    /// Returns `CoordinationError::LogStore` if the record cannot be
    /// written, including when a record with the same `xid` already exists.
    fn create_transaction(&self, record: &TransactionRecord) -> Result<()>;

    /// Updates the status of an existing transaction.
    ///
    /// # Errors
    ///
    /// Returns `CoordinationError::TransactionNotFound` if no record with
    /// the given `xid` exists, or `CoordinationError::LogStore` on a write
    /// failure.
    fn update_transaction_status(&self, xid: &str, status: TransactionStatus) -> Result<()>;

    /// Stamps the finish time of a transaction.
    ///
    /// Called once, after the status write that made the transaction
    /// terminal succeeded.
    fn set_transaction_finish_time(&self, xid: &str, finish_time: DateTime<Utc>) -> Result<()>;

    /// Looks up a transaction by id.
    ///
    /// # Errors
    ///
    /// Returns `CoordinationError::TransactionNotFound` if no record with
    /// the given `xid` exists.
    fn get_transaction(&self, xid: &str) -> Result<TransactionRecord>;

    /// Persists a new participant record.
    ///
    /// # Errors
    ///
    /// Returns `CoordinationError::LogStore` if the record cannot be
    /// written. Implementations should reject a second record for the same
    /// `(xid, name)` pair.
    fn create_participant(&self, record: &ParticipantRecord) -> Result<()>;

    /// Updates the status of an existing participant record.
    ///
    /// # Errors
    ///
    /// Returns `CoordinationError::ParticipantNotFound` if no record
    /// matches the `(xid, name)` pair.
    fn update_participant_status(
        &self,
        xid: &str,
        name: &str,
        status: ParticipantStatus,
    ) -> Result<()>;

    /// Lists all participant records of a transaction.
    fn list_participants(&self, xid: &str) -> Result<Vec<ParticipantRecord>>;
}
