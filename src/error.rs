//! Error types for the Art-Net controller

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Illegal state transitions and bad configuration values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Controller is running")]
    AlreadyRunning,

    #[error("Controller is not configured")]
    NotConfigured,

    #[error("Invalid frame rate: {0} fps")]
    InvalidFrameRate(u32),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Failed to save configuration: {0}")]
    Save(String),
}

/// Rejected payloads and malformed packets
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("DMX payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Packet too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("Invalid Art-Net identifier")]
    InvalidMagic,

    #[error("Unexpected opcode: {0:#06x}")]
    UnexpectedOpCode(u16),

    #[error("DMX length field {declared} does not fit in {available} bytes")]
    LengthMismatch { declared: usize, available: usize },

    #[error("Universe {actual} does not match configured universe {expected}")]
    UniverseMismatch { expected: u16, actual: u16 },

    #[error("No DMX data to send")]
    EmptyFrame,
}

/// Socket level failures
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket creation failed: {0}")]
    SocketCreate(String),

    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Socket is not open")]
    NotOpen,
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
