use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarshalError {
    #[error("Provider {name} could not be set: {reason}")]
    ProviderInitialization { name: String, reason: String },
    #[error("No strategy in the chain accepts objects of type {type_name}")]
    NoStrategyAccepted { type_name: String },
    #[error("Identity {0} has no registered object")]
    UnresolvedIdentity(u32),
    #[error("Objects of type {type_name} cannot be externalized")]
    UnsupportedObject { type_name: String },
    #[error("Type tag {type_tag} is not registered with the knowledge base")]
    ClassResolution { type_tag: String },
    #[error("Unsupported stream format version {found} (supported: {supported})")]
    VersionMismatch { found: u16, supported: u16 },
    #[error("Malformed acceptor pattern '{pattern}': {reason}")]
    MalformedPattern { pattern: String, reason: String },
    #[error("Strategy chain differs from the one that wrote the stream")]
    ChainMismatch,
    #[error("Chain entry {index} does not exist (chain has {len} entries)")]
    UnknownChainEntry { index: usize, len: usize },
    #[error("Unknown definition: {0}")]
    UnknownDefinition(String),
    #[error("Invalid session operation: {0}")]
    InvalidSession(String),
    #[error("Data corruption: {message}")]
    DataCorruption { message: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, MarshalError>;

impl MarshalError {
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::DataCorruption { message: message.into() }
    }
}

// Helper conversions
impl From<serde_json::Error> for MarshalError {
    fn from(e: serde_json::Error) -> Self { Self::Serialization(e.to_string()) }
}
impl From<config::ConfigError> for MarshalError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
