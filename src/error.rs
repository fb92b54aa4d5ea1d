use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("upstream error: {0}")]
    Source(#[from] SourceError),
    #[error("state lock poisoned")]
    StateLock,
}

/// Failure talking to an upstream HTTP collaborator (lot store, weather, geocoder).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("http status {0} ({1})")]
    Status(u16, String),
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("fixture read error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected payload: {0}")]
    Payload(String),
    #[error("mock source error: {0}")]
    Mock(String),
}

impl SourceError {
    pub fn is_timeout(&self) -> bool {
        match self {
            SourceError::Timeout(_) => true,
            SourceError::Http(err) => err.is_timeout(),
            _ => false,
        }
    }
}
