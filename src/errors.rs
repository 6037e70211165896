use thiserror::Error;

use crate::model::TransactionStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinationError {
    #[error("log store error: {0}")]
    LogStore(String),

    #[error("transaction {0} not found")]
    TransactionNotFound(String),

    #[error("participant {name} not found in transaction {xid}")]
    ParticipantNotFound { xid: String, name: String },

    #[error("resource error: {0}")]
    Resource(String),

    #[error("{0}")]
    Action(String),

    #[error("transaction not in prepared state, current status: {0}")]
    NotPrepared(TransactionStatus),

    #[error("cannot rollback an already committed transaction")]
    AlreadyCommitted,

    #[error("no active local transaction for participant {0}")]
    NoActiveTransaction(String),

    #[error("no action defined for participant {0}")]
    NoActionDefined(String),

    #[error("other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CoordinationError>;
