use thiserror::Error;

use crate::bridge::collaborators::LaunchError;
use crate::types::OperationKind;

pub type Result<T> = core::result::Result<T, BridgeError>;

/// Errors that can occur while talking to the in-process signer provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    /// User explicitly rejected the request in the signer app.
    #[error("Signer rejected the request")]
    Rejected,

    /// Invalid or unexpected response from the signer.
    #[error("Invalid signer response: {0}")]
    InvalidResponse(String),

    /// The signer refused the arguments it was given.
    #[error("Invalid signer argument: {0}")]
    InvalidArgument(String),

    /// Platform (JNI) error when communicating with Android.
    #[error("Platform error: {0}")]
    Platform(String),

    /// The signer failed to perform the cryptographic operation.
    #[error("Crypto error: {0}")]
    Crypto(String),
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("Logging setup error: {0}")]
    LoggingSetup(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Signer app not installed: {0}")]
    SignerUnavailable(String),

    #[error(
        "Another fallback activity is already started. You need to wait for its result before starting another activity."
    )]
    DelegationInProgress,

    #[error("Activity Cancelled")]
    UserCancelled,

    #[error("No data returned from activity")]
    NoData,

    #[error("Unknown request code: {0}")]
    UnknownOperation(u32),

    #[error("Malformed {kind} result: missing `{field}`")]
    MalformedResult {
        kind: OperationKind,
        field: &'static str,
    },

    #[error("Failed to launch signer activity: {0}")]
    Launch(#[from] LaunchError),

    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),

    #[error("Pending delegation was abandoned")]
    DelegationAbandoned,

    #[error("Task join error: {0}")]
    Task(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BridgeError {
    /// Stable error code handed to the JavaScript side together with the message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Filesystem(_) | Self::LoggingSetup(_) => "ERR_SETUP",
            Self::Configuration(_) => "ERR_CONFIGURATION",
            Self::InvalidArgument(_) => "ERR_INVALID_ARGUMENT",
            Self::SignerUnavailable(_) => "SIGNER_NOT_INSTALLED",
            Self::DelegationInProgress => "ACTIVITY_IN_PROGRESS",
            Self::UserCancelled => "ActivityCancelled",
            Self::NoData | Self::UnknownOperation(_) => "ERROR",
            Self::MalformedResult { .. } => "ERR_MALFORMED_RESULT",
            Self::Launch(_) => "ERR_ACTIVITY_LAUNCH",
            Self::Signer(SignerError::Rejected) => "ERR_SIGNER_REJECTED",
            Self::Signer(_) => "ERR_SIGNER",
            Self::DelegationAbandoned => "ERR_DELEGATION_ABANDONED",
            Self::Task(_) => "ERR_TASK",
            Self::Serialization(_) => "ERR_SERIALIZATION",
        }
    }
}
