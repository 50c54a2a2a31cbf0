use thiserror::Error;

/// All errors the confidential-computation client can report.
///
/// Every backend failure reaches the immediate caller as one of these. The
/// only failures that are deliberately swallowed are the simulated-backend
/// fallthrough in the instance factory and results of superseded lifecycle
/// attempts, and both are logged.
#[derive(Debug, Error)]
pub enum FhevmError {
    /// The relayer SDK resource could not be fetched or did not yield a capability.
    #[error("relayer SDK load failed: {0}")]
    Load(String),

    /// Neither the simulated nor the production backend produced an instance.
    /// Wraps the production-path error.
    #[error("instance creation failed: {source}")]
    InstanceCreation {
        #[source]
        source: Box<FhevmError>,
    },

    #[error("value {value} does not fit in {bits} bits")]
    TypeRange { bits: u32, value: u128 },

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption authorization failed: {0}")]
    Authorization(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    /// A network-reading capability call failed.
    #[error("network error: {0}")]
    Network(String),
}

pub type Result<T> = std::result::Result<T, FhevmError>;

impl FhevmError {
    pub(crate) fn instance_creation(err: FhevmError) -> Self {
        match err {
            e @ FhevmError::InstanceCreation { .. } => e,
            other => FhevmError::InstanceCreation {
                source: Box::new(other),
            },
        }
    }

    pub(crate) fn into_encryption(self) -> Self {
        match self {
            e @ FhevmError::Encryption(_) | e @ FhevmError::TypeRange { .. } => e,
            other => FhevmError::Encryption(other.to_string()),
        }
    }

    pub(crate) fn into_authorization(self) -> Self {
        match self {
            e @ FhevmError::Authorization(_) => e,
            other => FhevmError::Authorization(other.to_string()),
        }
    }

    pub(crate) fn into_decryption(self) -> Self {
        match self {
            e @ FhevmError::Decryption(_) => e,
            other => FhevmError::Decryption(other.to_string()),
        }
    }
}
