use crate::hw::Capability;
use thiserror::Error;

/// Numeric error codes reported by the command layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    NoDevicePath = -1,
    NoDeviceType = -2,
    DeviceConnError = -3,
    UnknownDeviceType = -4,
    InvalidTx = -5,
    NoPassword = -6,
    BadArgument = -7,
    /// Not one of the command codes, used for internal failures.
    Other = -99,
}

#[derive(Error, Debug)]
pub enum HwiError {
    #[error("Previous transaction {0} not found in PSBT")]
    PrevTxNotFound(String),

    #[error("Input {input} has more than one key; multisig is not supported")]
    UnsupportedMultisig { input: usize },

    #[error("Input {input} has no key derivation information")]
    MissingKeyForInput { input: usize },

    #[error("Input {input} has no spendable UTXO info")]
    NoUtxoInfo { input: usize },

    #[error("Input {input} is keyed by a different master fingerprint")]
    ForeignKey { input: usize },

    #[error("Output {output} has an unsupported script type")]
    UnsupportedOutputType { output: usize },

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Device did not respond before the signing timeout")]
    DeviceTimeout,

    #[error("Device returned {actual} signatures for {expected} inputs")]
    SignatureCountMismatch { expected: usize, actual: usize },

    #[error("Unrecognized extended key format: {0}")]
    UnrecognizedKeyFormat(String),

    #[error("{0} is not supported by this device")]
    Unsupported(Capability),

    #[error("Invalid PSBT: {0}")]
    InvalidPsbt(String),

    #[error("Unknown device type: {0}")]
    UnknownDeviceType(String),

    #[error("A password must be supplied for {0}")]
    NoPassword(String),

    #[error("Bad argument: {0}")]
    BadArgument(String),

    #[error("No device path given")]
    NoDevicePath,

    #[error("No device type given")]
    NoDeviceType,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Hex decoding error: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("Base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl HwiError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        HwiError::InvalidInput(msg.into())
    }

    pub fn invalid_psbt(msg: impl Into<String>) -> Self {
        HwiError::InvalidPsbt(msg.into())
    }

    /// The command-layer code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            HwiError::NoDevicePath => ErrorCode::NoDevicePath,
            HwiError::NoDeviceType => ErrorCode::NoDeviceType,
            HwiError::DeviceUnavailable(_) | HwiError::DeviceTimeout => ErrorCode::DeviceConnError,
            HwiError::UnknownDeviceType(_) => ErrorCode::UnknownDeviceType,
            HwiError::NoPassword(_) => ErrorCode::NoPassword,
            HwiError::BadArgument(_) => ErrorCode::BadArgument,
            HwiError::InvalidPsbt(_)
            | HwiError::Base64(_)
            | HwiError::PrevTxNotFound(_)
            | HwiError::UnsupportedMultisig { .. }
            | HwiError::MissingKeyForInput { .. }
            | HwiError::NoUtxoInfo { .. }
            | HwiError::ForeignKey { .. }
            | HwiError::UnsupportedOutputType { .. }
            | HwiError::SignatureCountMismatch { .. } => ErrorCode::InvalidTx,
            _ => ErrorCode::Other,
        }
    }
}
