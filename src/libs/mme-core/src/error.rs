//! MME core error types

use thiserror::Error;

/// MME core error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MmeError {
    /// No UE context is registered under the given key
    #[error("UE context not found: {0}")]
    UeNotFound(String),

    /// PDN connection identifier does not refer to an allocated PDN
    #[error("PDN connection {0} not found")]
    PdnNotFound(u8),

    /// No EPS bearer context matches the request
    #[error("EPS bearer context not found: {0}")]
    BearerNotFound(String),

    /// A bounded collection is full
    #[error("{what} capacity exceeded (max {max})")]
    CapacityExceeded { what: &'static str, max: usize },

    /// Sentinel or otherwise invalid value supplied
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// M-TMSI generator produced the reserved value or ran out of identities
    #[error("M-TMSI allocation exhausted")]
    AllocationExhausted,

    /// Outbound session/mobility signaling could not be started
    #[error("Signaling failure: {0}")]
    Signaling(String),
}

impl MmeError {
    /// True for any of the "referenced object does not exist" kinds
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            MmeError::UeNotFound(_) | MmeError::PdnNotFound(_) | MmeError::BearerNotFound(_)
        )
    }
}

/// MME core result type
pub type MmeResult<T> = Result<T, MmeError>;
