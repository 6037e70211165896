use std::any::Any;

use crate::errors::{CoordinationError, Result};

/// A resource manager's own in-flight transaction.
///
/// A handle is opened by [`ResourceManager::begin_local_transaction`]
/// during the prepare phase and stays open (neither committed nor rolled
/// back) until the decision phase. Ownership is exclusive: the handle is
/// held by exactly one [`Participant`](crate::participant::Participant)
/// and `commit`/`rollback` consume it, so a handle can never be finalized
/// twice.
pub trait LocalTransaction: Send + 'static {
    /// Durably applies the staged work.
    fn commit(self: Box<Self>) -> Result<()>;

    /// Discards the staged work.
    fn rollback(self: Box<Self>) -> Result<()>;

    /// Escape hatch for actions to reach the concrete handle type behind
    /// the erased seam.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Trait for one independently-owned transactional resource.
///
/// A resource manager can prepare, commit, or roll back its own local work
/// but cannot see or control the other resources in a distributed
/// transaction; the coordinator provides the agreement on top. The only
/// operation the protocol needs from the resource itself is opening a fresh
/// local transaction — everything else goes through the returned handle.
///
/// Implementations must be `Send` and `Sync`: all participants prepare
/// concurrently.
pub trait ResourceManager: Send + Sync {
    /// Opens a new local transaction on this resource.
    ///
    /// # Errors
    ///
    /// Returns `CoordinationError::Resource` if the resource cannot open a
    /// transaction.
    fn begin_local_transaction(&self) -> Result<Box<dyn LocalTransaction>>;
}

/// A caller-supplied unit of work executed against a participant's local
/// transaction during the prepare phase.
///
/// The coordinator never knows the concrete resource type; it only needs
/// every registered participant to have a matching action keyed by name.
pub type ParticipantAction = Box<dyn FnOnce(&mut dyn LocalTransaction) -> Result<()> + Send>;

/// Wraps a closure over a concrete handle type into a [`ParticipantAction`].
///
/// The returned action downcasts the erased handle back to `T` before
/// invoking the closure, so callers write their business logic against the
/// resource's own transaction type.
///
/// # Errors
///
/// The action fails with `CoordinationError::Resource` if the participant's
/// handle is not a `T` — i.e. the action was attached to a participant
/// backed by a different resource manager.
pub fn action<T, F>(f: F) -> ParticipantAction
where
    T: LocalTransaction,
    F: FnOnce(&mut T) -> Result<()> + Send + 'static,
{
    Box::new(move |handle: &mut dyn LocalTransaction| {
        let tx = handle.as_any_mut().downcast_mut::<T>().ok_or_else(|| {
            CoordinationError::Resource("local transaction handle type mismatch".to_string())
        })?;
        f(tx)
    })
}
