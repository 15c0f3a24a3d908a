use std::error::Error;
use std::fmt;
use std::sync::PoisonError;

#[derive(Debug)]
pub enum RealmError {
    // Transport errors
    Transport(String),
    ConnectionClosed,

    // Framing errors
    Malformed(String),
    PayloadTooLarge { len: usize, max: usize },

    // Outbound queue errors
    CapacityExceeded(usize),

    // Dispatch errors
    Handler(String),
    DuplicateRoute(u32),

    // Lookup errors
    NotFound(String),

    // Persistence errors
    Serialization(String),
    Storage(String),

    // System errors
    System(String),

    // Configuration errors
    Config(String),
}

impl RealmError {
    /// Whether this error must terminate the connection that produced it
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::ConnectionClosed
                | Self::Malformed(_)
                | Self::PayloadTooLarge { .. }
        )
    }
}

impl fmt::Display for RealmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "Transport error: {}", msg),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::Malformed(msg) => write!(f, "Malformed message: {}", msg),
            Self::PayloadTooLarge { len, max } => {
                write!(f, "Payload too large: {} bytes (max {})", len, max)
            }
            Self::CapacityExceeded(cap) => {
                write!(f, "Outbound queue full ({} messages queued)", cap)
            }
            Self::Handler(msg) => write!(f, "Handler error: {}", msg),
            Self::DuplicateRoute(tag) => write!(f, "Route already registered for tag {}", tag),
            Self::NotFound(what) => write!(f, "Not found: {}", what),
            Self::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Self::Storage(msg) => write!(f, "Storage error: {}", msg),
            Self::System(msg) => write!(f, "System error: {}", msg),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for RealmError {}

impl From<std::io::Error> for RealmError {
    fn from(err: std::io::Error) -> Self {
        RealmError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for RealmError {
    fn from(err: serde_json::Error) -> Self {
        RealmError::Serialization(err.to_string())
    }
}

// Converting from PoisonError to facilitate poisoned mutex handling
impl<T> From<PoisonError<T>> for RealmError {
    fn from(err: PoisonError<T>) -> Self {
        RealmError::System(format!("Mutex poisoned: {}", err))
    }
}

// Generic result type for Rusty Realm
pub type Result<T> = std::result::Result<T, RealmError>;
