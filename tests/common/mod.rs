//! Common utilities for Seshat integration tests.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ahash::AHashMap as HashMap;
use parking_lot::Mutex;

use seshat::{
    Coordinator, Participant,
    errors::{CoordinationError, Result},
    log_store::TransactionLogStore,
    model::{ParticipantRecord, ParticipantStatus, TransactionRecord, TransactionStatus},
    resource::{LocalTransaction, ResourceManager},
};

// --- MemoryLogStore ---

/// An in-memory implementation of the `TransactionLogStore` trait for
/// testing purposes. Enforces the same record constraints a relational
/// store would: unique xid, unique (xid, name), not-found on updates of
/// missing records.
pub struct MemoryLogStore {
    transactions: Mutex<HashMap<String, TransactionRecord>>,
    participants: Mutex<Vec<ParticipantRecord>>,
}

impl Default for MemoryLogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLogStore {
    /// Creates a new, empty `MemoryLogStore`.
    pub fn new() -> Self {
        Self {
            transactions: Mutex::new(HashMap::new()),
            participants: Mutex::new(Vec::new()),
        }
    }
}

impl TransactionLogStore for MemoryLogStore {
    fn create_transaction(&self, record: &TransactionRecord) -> Result<()> {
        let mut transactions = self.transactions.lock();
        if transactions.contains_key(&record.xid) {
            return Err(CoordinationError::LogStore(format!(
                "duplicate transaction {}",
                record.xid
            )));
        }
        transactions.insert(record.xid.clone(), record.clone());
        Ok(())
    }

    fn update_transaction_status(&self, xid: &str, status: TransactionStatus) -> Result<()> {
        match self.transactions.lock().get_mut(xid) {
            Some(record) => {
                record.status = status;
                Ok(())
            }
            None => Err(CoordinationError::TransactionNotFound(xid.to_string())),
        }
    }

    fn set_transaction_finish_time(
        &self,
        xid: &str,
        finish_time: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        match self.transactions.lock().get_mut(xid) {
            Some(record) => {
                record.finish_time = Some(finish_time);
                Ok(())
            }
            None => Err(CoordinationError::TransactionNotFound(xid.to_string())),
        }
    }

    fn get_transaction(&self, xid: &str) -> Result<TransactionRecord> {
        self.transactions
            .lock()
            .get(xid)
            .cloned()
            .ok_or_else(|| CoordinationError::TransactionNotFound(xid.to_string()))
    }

    fn create_participant(&self, record: &ParticipantRecord) -> Result<()> {
        let mut participants = self.participants.lock();
        if participants
            .iter()
            .any(|p| p.xid == record.xid && p.name == record.name)
        {
            return Err(CoordinationError::LogStore(format!(
                "duplicate participant {} in transaction {}",
                record.name, record.xid
            )));
        }
        participants.push(record.clone());
        Ok(())
    }

    fn update_participant_status(
        &self,
        xid: &str,
        name: &str,
        status: ParticipantStatus,
    ) -> Result<()> {
        let mut participants = self.participants.lock();
        match participants
            .iter_mut()
            .find(|p| p.xid == xid && p.name == name)
        {
            Some(record) => {
                record.status = status;
                Ok(())
            }
            None => Err(CoordinationError::ParticipantNotFound {
                xid: xid.to_string(),
                name: name.to_string(),
            }),
        }
    }

    fn list_participants(&self, xid: &str) -> Result<Vec<ParticipantRecord>> {
        Ok(self
            .participants
            .lock()
            .iter()
            .filter(|p| p.xid == xid)
            .cloned()
            .collect())
    }
}

// --- KvResource ---

/// An in-memory key-value resource manager. Local transactions stage
/// writes privately and apply them on commit, so prepared work is
/// invisible until the decision phase — the smallest store that behaves
/// like a real resource manager for protocol tests.
pub struct KvResource {
    data: Arc<Mutex<HashMap<String, i64>>>,
    fail_commits: Arc<AtomicBool>,
}

impl Default for KvResource {
    fn default() -> Self {
        Self::new()
    }
}

impl KvResource {
    /// Creates a new, empty `KvResource`.
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
            fail_commits: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Reads a committed value.
    pub fn get(&self, key: &str) -> Option<i64> {
        self.data.lock().get(key).copied()
    }

    /// Seeds a committed value outside any transaction.
    pub fn put(&self, key: &str, value: i64) {
        self.data.lock().insert(key.to_string(), value);
    }

    /// Makes every subsequent local transaction commit fail, simulating a
    /// resource that dies between prepare and commit.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

impl ResourceManager for KvResource {
    fn begin_local_transaction(&self) -> Result<Box<dyn LocalTransaction>> {
        Ok(Box::new(KvTransaction {
            data: Arc::clone(&self.data),
            staged: HashMap::new(),
            fail_commit: Arc::clone(&self.fail_commits),
        }))
    }
}

/// A staged local transaction on a [`KvResource`].
pub struct KvTransaction {
    data: Arc<Mutex<HashMap<String, i64>>>,
    staged: HashMap<String, i64>,
    fail_commit: Arc<AtomicBool>,
}

impl KvTransaction {
    /// Reads through the staged writes into the committed data.
    pub fn get(&self, key: &str) -> Option<i64> {
        self.staged
            .get(key)
            .copied()
            .or_else(|| self.data.lock().get(key).copied())
    }

    /// Stages a write, visible only to this transaction until commit.
    pub fn set(&mut self, key: &str, value: i64) {
        self.staged.insert(key.to_string(), value);
    }
}

impl LocalTransaction for KvTransaction {
    fn commit(self: Box<Self>) -> Result<()> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(CoordinationError::Resource(
                "simulated commit failure".to_string(),
            ));
        }
        let mut data = self.data.lock();
        for (key, value) in self.staged {
            data.insert(key, value);
        }
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        // Staged writes are dropped with the handle.
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// --- Helper Functions ---

/// Creates a coordinator wired to a fresh in-memory log store.
pub fn setup_coordinator() -> (Arc<Coordinator>, Arc<MemoryLogStore>) {
    let store = Arc::new(MemoryLogStore::new());
    let coordinator = Arc::new(Coordinator::new("coordinator", store.clone()));
    (coordinator, store)
}

/// Creates a participant over its own `KvResource` and registers it.
pub fn register_kv_participant(
    coordinator: &Coordinator,
    store: &Arc<MemoryLogStore>,
    name: &str,
) -> (Arc<Participant>, Arc<KvResource>) {
    let resource = Arc::new(KvResource::new());
    let participant = Arc::new(Participant::new(
        name,
        format!("{name}_db"),
        resource.clone(),
        store.clone(),
    ));
    coordinator.register_participant(participant.clone());
    (participant, resource)
}

/// Seeds an inventory row the way the demo scenarios expect it:
/// an available quantity and a reserved count per product.
pub fn seed_inventory(resource: &KvResource, product: &str, quantity: i64, reserved: i64) {
    resource.put(&format!("{product}.quantity"), quantity);
    resource.put(&format!("{product}.reserved"), reserved);
}
