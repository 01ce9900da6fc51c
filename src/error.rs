use thiserror::Error;
use uuid::Uuid;

/// Result type for amplifier operations
pub type Result<T> = std::result::Result<T, AmpError>;

/// Errors that can occur when talking to an amplifier or editing its zones
#[derive(Error, Debug)]
pub enum AmpError {
    /// Host name could not be resolved to a socket address
    #[error("Unresolvable host: {host}:{port}")]
    UnresolvableHost {
        /// Host as configured
        host: String,
        /// UDP port as configured
        port: u16,
    },

    /// I/O error (socket bind, send, unreachable network)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML document could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Source list document parsed but had the wrong shape
    #[error("Invalid source list: {0}")]
    InvalidSourceList(String),

    /// Source name is not part of the zone's source list
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// A zone with the same host:port:channel identity already exists
    #[error("Already configured: {0}")]
    AlreadyConfigured(String),

    /// No config entry with this id
    #[error("Entry not found: {0}")]
    EntryNotFound(Uuid),

    /// Every update sender was dropped
    #[error("Update channel closed")]
    UpdatesClosed,

    /// Update receiver fell behind
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// A flow step was submitted while the flow was in another step
    #[error("Invalid flow state: {0}")]
    InvalidFlowState(String),
}
