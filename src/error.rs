use thiserror::Error;

pub type ScheduleResult<T> = Result<T, ScheduleError>;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("store query failed: {0}")]
    Query(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),
}

impl ScheduleError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable(message.into())
    }

    /// Stable wire code for the IPC error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Query(_) => "db_query_failed",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "bad_params",
            Self::Unauthorized(_) => "not_authorized",
        }
    }
}

impl From<rusqlite::Error> for ScheduleError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Query(err.to_string())
    }
}

impl From<serde_json::Error> for ScheduleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Query(format!("payload serialization: {}", err))
    }
}
