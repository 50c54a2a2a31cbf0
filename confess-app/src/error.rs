use thiserror::Error;

/// Errors raised by the confession client on top of the fhEVM protocol.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Fhevm(#[from] fhevm_client::error::FhevmError),

    /// The contract call reverted or returned undecodable data.
    #[error("contract error: {0}")]
    Contract(String),

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("no ChainConfess deployment on chain {0}")]
    NoContract(u64),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An in-process fhEVM backend paired with an on-chain contract.
    #[error("{0} is unavailable: the simulated fhEVM backend only shares state with an in-process contract")]
    DetachedBackend(&'static str),
}

pub type Result<T> = std::result::Result<T, AppError>;
