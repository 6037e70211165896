use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::errors::{CoordinationError, Result};
use crate::log_store::TransactionLogStore;
use crate::model::{OperationResult, ParticipantRecord, ParticipantStatus};
use crate::resource::{LocalTransaction, ParticipantAction, ResourceManager};

/// A stateful proxy around one resource manager in a distributed
/// transaction.
///
/// A `Participant` executes its resource's share of the protocol — it
/// registers into the transaction, stages work in the prepare phase, and
/// finalizes it in the decision phase — and reports its own status into the
/// shared [`TransactionLogStore`]. It owns at most one open
/// [`LocalTransaction`] handle at a time: `Some` exactly between a
/// successful `prepare` and the subsequent `commit`/`rollback`.
///
/// Concurrent calls to the same `Participant` for the same transaction are
/// not supported; the coordinator invokes each participant at most once per
/// round.
pub struct Participant {
    /// Participant name, unique within a transaction.
    name: String,
    /// Identifies the resource manager backing this participant.
    resource_id: String,
    /// The resource manager this participant fronts.
    resource: Arc<dyn ResourceManager>,
    /// Shared store for participant records.
    log_store: Arc<dyn TransactionLogStore>,
    /// The in-flight local transaction, if any. The boxed handle is moved
    /// out of this slot when finalized.
    local_tx: Mutex<Option<Box<dyn LocalTransaction>>>,
}

impl Participant {
    /// Creates a new participant.
    ///
    /// # Arguments
    ///
    /// * `name` - Participant name, unique within a transaction.
    /// * `resource_id` - Identifier of the backing resource manager.
    /// * `resource` - The resource manager itself.
    /// * `log_store` - The shared transaction log store.
    pub fn new(
        name: impl Into<String>,
        resource_id: impl Into<String>,
        resource: Arc<dyn ResourceManager>,
        log_store: Arc<dyn TransactionLogStore>,
    ) -> Self {
        Self {
            name: name.into(),
            resource_id: resource_id.into(),
            resource,
            log_store,
            local_tx: Mutex::new(None),
        }
    }

    /// Returns the participant's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the identifier of the backing resource manager.
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Registers this participant into the given transaction.
    ///
    /// Inserts a participant record with status `Registered`. On a
    /// persistence failure the caller must treat this participant as
    /// not-yet-prepared.
    pub fn register(&self, xid: &str) -> OperationResult {
        let record = ParticipantRecord {
            xid: xid.to_string(),
            name: self.name.clone(),
            status: ParticipantStatus::Registered,
            resource_id: self.resource_id.clone(),
        };

        match self.log_store.create_participant(&record) {
            Ok(()) => OperationResult::ok(format!(
                "Participant {} successfully registered to transaction {}",
                self.name, xid
            )),
            Err(err) => OperationResult::fail(
                err,
                format!(
                    "Failed to register participant {} to transaction {}",
                    self.name, xid
                ),
            ),
        }
    }

    /// Executes the prepare phase on this participant's resource.
    ///
    /// Opens a new local transaction and runs `action` against it. On
    /// success the handle stays open — neither committed nor rolled back —
    /// and is retained until the decision phase. On an action error the
    /// handle is rolled back immediately and a failing result is returned;
    /// the stored participant status is left untouched (the record never
    /// reads `Prepared` — the coordinator tracks the prepared set from the
    /// round results).
    pub fn prepare(&self, xid: &str, action: ParticipantAction) -> OperationResult {
        let mut handle = match self.resource.begin_local_transaction() {
            Ok(handle) => handle,
            Err(err) => {
                return OperationResult::fail(
                    err,
                    format!(
                        "Failed to open local transaction for participant {} in transaction {}",
                        self.name, xid
                    ),
                );
            }
        };

        if let Err(err) = action(&mut *handle) {
            // The staged work is discarded right away; only the coordinator
            // decides when a successfully prepared handle gets finalized.
            if let Err(rollback_err) = handle.rollback() {
                warn!(
                    "participant {}: failed to discard local transaction after prepare error in {}: {}",
                    self.name, xid, rollback_err
                );
            }
            return OperationResult::fail(
                err,
                format!(
                    "Prepare phase failed for participant {} in transaction {}",
                    self.name, xid
                ),
            );
        }

        *self.local_tx.lock() = Some(handle);
        debug!("participant {} prepared in transaction {}", self.name, xid);

        OperationResult::ok(format!(
            "Prepare phase successful for participant {} in transaction {}",
            self.name, xid
        ))
    }

    /// Commits the prepared local transaction.
    ///
    /// Fails with a "no active local transaction" result when no handle is
    /// open. On a commit failure the participant record is marked `Failed`;
    /// on success it is marked `Committed`. The handle is consumed either
    /// way — a failed commit cannot be retried.
    pub fn commit(&self, xid: &str) -> OperationResult {
        let handle = match self.local_tx.lock().take() {
            Some(handle) => handle,
            None => {
                return OperationResult::fail(
                    CoordinationError::NoActiveTransaction(self.name.clone()),
                    format!("No active transaction found for participant {}", self.name),
                );
            }
        };

        if let Err(err) = handle.commit() {
            self.mark_status(xid, ParticipantStatus::Failed);
            return OperationResult::fail(
                err,
                format!(
                    "Commit failed for participant {} in transaction {}",
                    self.name, xid
                ),
            );
        }

        if let Err(err) = self
            .log_store
            .update_participant_status(xid, &self.name, ParticipantStatus::Committed)
        {
            return OperationResult::fail(
                err,
                format!(
                    "Failed to update participant status after commit for {}",
                    self.name
                ),
            );
        }

        debug!("participant {} committed in transaction {}", self.name, xid);

        OperationResult::ok(format!(
            "Transaction committed successfully for participant {} in transaction {}",
            self.name, xid
        ))
    }

    /// Rolls back the prepared local transaction.
    ///
    /// Symmetric to [`commit`](Participant::commit): fails without a handle,
    /// marks the record `Failed` on a rollback failure and `RolledBack` on
    /// success, and consumes the handle either way.
    pub fn rollback(&self, xid: &str) -> OperationResult {
        let handle = match self.local_tx.lock().take() {
            Some(handle) => handle,
            None => {
                return OperationResult::fail(
                    CoordinationError::NoActiveTransaction(self.name.clone()),
                    format!("No active transaction found for participant {}", self.name),
                );
            }
        };

        if let Err(err) = handle.rollback() {
            self.mark_status(xid, ParticipantStatus::Failed);
            return OperationResult::fail(
                err,
                format!(
                    "Rollback failed for participant {} in transaction {}",
                    self.name, xid
                ),
            );
        }

        if let Err(err) = self
            .log_store
            .update_participant_status(xid, &self.name, ParticipantStatus::RolledBack)
        {
            return OperationResult::fail(
                err,
                format!(
                    "Failed to update participant status after rollback for {}",
                    self.name
                ),
            );
        }

        debug!(
            "participant {} rolled back in transaction {}",
            self.name, xid
        );

        OperationResult::ok(format!(
            "Transaction rolled back successfully for participant {} in transaction {}",
            self.name, xid
        ))
    }

    /// Runs a caller-supplied compensating action and reports the outcome
    /// uniformly.
    ///
    /// Used when a resource's effect must be undone outside the handle's
    /// own rollback — typically after the handle has already been
    /// committed and an external recovery step needs to reverse it. The
    /// core never invokes compensation automatically.
    pub fn execute_compensation<F>(&self, xid: &str, compensation: F) -> OperationResult
    where
        F: FnOnce() -> Result<()>,
    {
        match compensation() {
            Ok(()) => OperationResult::ok(format!(
                "Compensation executed successfully for participant {} in transaction {}",
                self.name, xid
            )),
            Err(err) => OperationResult::fail(
                err,
                format!(
                    "Compensation failed for participant {} in transaction {}",
                    self.name, xid
                ),
            ),
        }
    }

    /// Best-effort status write used on failure paths, where the original
    /// operation error must win over a secondary persistence error.
    fn mark_status(&self, xid: &str, status: ParticipantStatus) {
        if let Err(err) = self
            .log_store
            .update_participant_status(xid, &self.name, status)
        {
            warn!(
                "participant {}: failed to record status {} in transaction {}: {}",
                self.name, status, xid, err
            );
        }
    }
}
