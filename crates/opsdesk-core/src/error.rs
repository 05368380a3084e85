/// Errors surfaced by the synchronization core.
///
/// None of these are fatal to the process: connection errors degrade the
/// session to pull-only, pull errors land in the owning loader's `error`
/// slot, and alert errors keep the gate locked until the next gesture.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error("Connection error: {message}")]
    Connection { message: String },
    #[error("Pull request to {path} failed: {message}")]
    Pull { path: String, message: String },
    #[error("Pull request to {path} returned HTTP {status}")]
    Http { path: String, status: u16 },
    #[error("Failed to decode payload: {message}")]
    Decode { message: String },
    #[error("Alert playback blocked: {message}")]
    AlertBlocked { message: String },
    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

impl SyncError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn alert_blocked(message: impl Into<String>) -> Self {
        Self::AlertBlocked {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::decode(e.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
