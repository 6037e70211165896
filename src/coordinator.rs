use std::sync::Arc;
use std::thread;

use ahash::AHashMap as HashMap;
use chrono::Utc;
use crossbeam_channel as channel;
use log::{debug, warn};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::errors::{CoordinationError, Result};
use crate::log_store::TransactionLogStore;
use crate::model::{OperationResult, ParticipantRecord, TransactionRecord, TransactionStatus};
use crate::participant::Participant;
use crate::resource::ParticipantAction;

/// Seshat prelude.
pub mod prelude {
    pub use crate::coordinator::*;
    pub use crate::errors::*;
    pub use crate::log_store::*;
    pub use crate::model::*;
    pub use crate::participant::*;
    pub use crate::resource::*;
}

/// A decision-phase operation fanned out to every participant.
type PhaseOp = fn(&Participant, &str) -> OperationResult;

/// The central component driving two-phase commit across a set of
/// registered participants.
///
/// The coordinator owns the global transaction state machine and advances
/// it through the shared [`TransactionLogStore`]. Each protocol phase fans
/// out one unit of work per participant, runs them concurrently, and joins
/// on a barrier before inspecting the aggregate — no partial results are
/// acted on, and no participant observes another within a round. Only one
/// round runs at a time per coordinator.
pub struct Coordinator {
    /// Name of this coordinator, used in log output.
    service_name: String,
    /// Shared store for transaction and participant records.
    log_store: Arc<dyn TransactionLogStore>,
    /// The registered participants.
    participants: Mutex<Vec<Arc<Participant>>>,
    /// Serializes protocol rounds.
    round: Mutex<()>,
}

impl Coordinator {
    /// Creates a new coordinator.
    ///
    /// # Arguments
    ///
    /// * `service_name` - Name identifying this coordinator in logs.
    /// * `log_store` - The shared transaction log store.
    pub fn new(service_name: impl Into<String>, log_store: Arc<dyn TransactionLogStore>) -> Self {
        Self {
            service_name: service_name.into(),
            log_store,
            participants: Mutex::new(Vec::new()),
            round: Mutex::new(()),
        }
    }

    /// Registers a participant with this coordinator.
    ///
    /// Registration only mutates the in-memory registry; the participant's
    /// record for a given transaction is created during the prepare round.
    pub fn register_participant(&self, participant: Arc<Participant>) {
        self.participants.lock().push(participant);
    }

    /// Begins a new distributed transaction.
    ///
    /// Generates a globally unique transaction id and persists a
    /// transaction record with status `Created`.
    ///
    /// # Returns
    ///
    /// The generated xid.
    ///
    /// # Errors
    ///
    /// Fails only if the record cannot be persisted.
    pub fn begin(&self, description: &str) -> Result<String> {
        let _round = self.round.lock();

        let xid = Uuid::new_v4().to_string();
        let record = TransactionRecord {
            xid: xid.clone(),
            status: TransactionStatus::Created,
            start_time: Utc::now(),
            finish_time: None,
            description: description.to_string(),
        };
        self.log_store.create_transaction(&record)?;

        debug!("{}: began transaction {}", self.service_name, xid);
        Ok(xid)
    }

    /// Runs the prepare phase: every registered participant attempts its
    /// work without finalizing it.
    ///
    /// For each participant, concurrently: register it into the
    /// transaction, then run the action supplied for its name against a
    /// fresh local transaction. A participant with no matching action fails
    /// locally without its resource manager being contacted. Once all
    /// results are in: if every one succeeded the transaction becomes
    /// `Prepared`, otherwise `Failed`.
    ///
    /// # Errors
    ///
    /// Returns the first failing participant's error (which of several
    /// simultaneous failures is unspecified), or a persistence error from
    /// the status writes.
    pub fn prepare(
        &self,
        xid: &str,
        mut actions: HashMap<String, ParticipantAction>,
    ) -> Result<()> {
        let _round = self.round.lock();

        self.log_store
            .update_transaction_status(xid, TransactionStatus::Preparing)?;

        let participants = self.participants.lock().clone();
        let (sender, receiver) = channel::bounded(participants.len());

        for participant in &participants {
            let action = actions.remove(participant.name());
            let participant = Arc::clone(participant);
            let sender = sender.clone();
            let xid = xid.to_string();

            thread::spawn(move || {
                let registered = participant.register(&xid);
                let result = if !registered.success {
                    registered
                } else {
                    match action {
                        Some(action) => participant.prepare(&xid, action),
                        None => OperationResult::fail(
                            CoordinationError::NoActionDefined(participant.name().to_string()),
                            format!("No action defined for participant {}", participant.name()),
                        ),
                    }
                };
                let _ = sender.send((participant.name().to_string(), result));
            });
        }
        drop(sender);

        // Barrier: the channel only disconnects once every worker reported.
        let results: HashMap<String, OperationResult> = receiver.iter().collect();

        match Self::first_error(&results) {
            None => {
                self.log_store
                    .update_transaction_status(xid, TransactionStatus::Prepared)?;
                debug!("{}: transaction {} prepared", self.service_name, xid);
                Ok(())
            }
            Some(err) => {
                self.mark_failed(xid);
                debug!(
                    "{}: prepare round failed for transaction {}: {}",
                    self.service_name, xid, err
                );
                Err(err)
            }
        }
    }

    /// Runs the commit phase: every participant finalizes its prepared
    /// work.
    ///
    /// Rejected before any participant is contacted unless the transaction
    /// status is exactly `Prepared`. If every participant commits, the
    /// transaction becomes `Committed` and the finish time is stamped. If
    /// any commit fails the transaction is marked `Failed` — participants
    /// that already committed stay committed, a recognized indeterminate
    /// state that requires external recovery and is observable via
    /// [`get_participants`](Coordinator::get_participants).
    ///
    /// # Errors
    ///
    /// `CoordinationError::NotPrepared` when the status gate rejects the
    /// call; otherwise the first failing participant's error or a
    /// persistence error.
    pub fn commit(&self, xid: &str) -> Result<()> {
        let _round = self.round.lock();

        let status = self.log_store.get_transaction(xid)?.status;
        if status != TransactionStatus::Prepared {
            return Err(CoordinationError::NotPrepared(status));
        }

        let results = self.run_phase(xid, |p, xid| p.commit(xid));

        match Self::first_error(&results) {
            None => {
                self.log_store
                    .update_transaction_status(xid, TransactionStatus::Committed)?;
                self.stamp_finish_time(xid);
                debug!("{}: transaction {} committed", self.service_name, xid);
                Ok(())
            }
            Some(err) => {
                self.mark_failed(xid);
                warn!(
                    "{}: commit round failed for transaction {}, participant outcomes diverge: {}",
                    self.service_name, xid, err
                );
                Err(err)
            }
        }
    }

    /// Runs the rollback phase: every participant discards its prepared
    /// work.
    ///
    /// Rejected if the transaction has already committed. Rollback is
    /// best-effort: individual participant failures are recorded on their
    /// own records but do not change the overall outcome — the transaction
    /// always ends `RolledBack`.
    ///
    /// # Errors
    ///
    /// `CoordinationError::AlreadyCommitted` when the transaction has
    /// committed, or a persistence error from the status write.
    pub fn rollback(&self, xid: &str) -> Result<()> {
        let _round = self.round.lock();

        let status = self.log_store.get_transaction(xid)?.status;
        if status == TransactionStatus::Committed {
            return Err(CoordinationError::AlreadyCommitted);
        }

        let _results = self.run_phase(xid, |p, xid| p.rollback(xid));

        self.log_store
            .update_transaction_status(xid, TransactionStatus::RolledBack)?;
        self.stamp_finish_time(xid);
        debug!("{}: transaction {} rolled back", self.service_name, xid);
        Ok(())
    }

    /// Looks up the transaction record.
    pub fn get_transaction(&self, xid: &str) -> Result<TransactionRecord> {
        self.log_store.get_transaction(xid)
    }

    /// Lists the participant records of the transaction.
    pub fn get_participants(&self, xid: &str) -> Result<Vec<ParticipantRecord>> {
        self.log_store.list_participants(xid)
    }

    /// Fans a decision-phase operation out to every participant and joins
    /// on the results.
    fn run_phase(&self, xid: &str, op: PhaseOp) -> HashMap<String, OperationResult> {
        let participants = self.participants.lock().clone();
        let (sender, receiver) = channel::bounded(participants.len());

        for participant in &participants {
            let participant = Arc::clone(participant);
            let sender = sender.clone();
            let xid = xid.to_string();

            thread::spawn(move || {
                let result = op(&participant, &xid);
                let _ = sender.send((participant.name().to_string(), result));
            });
        }
        drop(sender);

        receiver.iter().collect()
    }

    /// Picks the error out of any one failing result. Iteration order over
    /// the result map is not significant.
    fn first_error(results: &HashMap<String, OperationResult>) -> Option<CoordinationError> {
        results.values().find(|r| !r.success).map(|r| {
            r.error
                .clone()
                .unwrap_or_else(|| CoordinationError::Other(r.message.clone()))
        })
    }

    /// Best-effort `Failed` status write. The participant error that
    /// triggered it must reach the caller, so a persistence failure here is
    /// only logged; the status stays at the last successful write.
    fn mark_failed(&self, xid: &str) {
        if let Err(err) = self
            .log_store
            .update_transaction_status(xid, TransactionStatus::Failed)
        {
            warn!(
                "{}: failed to record failed status for transaction {}: {}",
                self.service_name, xid, err
            );
        }
    }

    /// Stamps the finish time once, after the terminal status write
    /// succeeded. A failure here is logged and does not affect the
    /// operation's outcome.
    fn stamp_finish_time(&self, xid: &str) {
        match self.log_store.get_transaction(xid) {
            Ok(record) if record.finish_time.is_some() => {}
            Ok(_) => {
                if let Err(err) = self.log_store.set_transaction_finish_time(xid, Utc::now()) {
                    warn!(
                        "{}: failed to record finish time for transaction {}: {}",
                        self.service_name, xid, err
                    );
                }
            }
            Err(err) => {
                warn!(
                    "{}: failed to read transaction {} before stamping finish time: {}",
                    self.service_name, xid, err
                );
            }
        }
    }
}
