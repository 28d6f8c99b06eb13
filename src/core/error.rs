use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("malformed roll data: {0}")]
    MalformedRoll(String),

    #[error("unknown category: {0:?}")]
    UnknownCategory(String),

    #[error("unknown condition kind: {0:?}")]
    UnknownKind(String),

    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    #[error("unsupported condition file version {0}")]
    UnsupportedVersion(u32),
}

pub type Result<T> = std::result::Result<T, WatchError>;
