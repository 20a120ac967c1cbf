// error.rs

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("transport error at page {page}: {reason}")]
    Transport { page: u8, reason: String },
    #[error("format error: {0}")]
    Format(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("unsupported tag: {0}")]
    Unsupported(String),
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn format<S: Into<String>>(msg: S) -> Self {
        AppError::Format(msg.into())
    }
}

/// Problems that degrade a reading instead of aborting it.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeWarning {
    #[error("message truncated: TLV declares {declared} bytes, only {available} readable")]
    Truncated { declared: usize, available: usize },
    #[error("record truncated: header declares {wanted} bytes, only {got} readable")]
    ShortRecord { wanted: usize, got: usize },
    #[error("volume not numeric: {0:?}")]
    Volume(String),
}

// EOF
