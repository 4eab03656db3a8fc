use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Unknown model type: {0}")]
    UnknownModelType(String),
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("training failed: {0}")]
    Training(String),
    #[error("artifact store: {0}")]
    Store(String),
}

impl EngineError {
    /// HTTP-equivalent status for callers that sit behind an API boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::UnknownModelType(_) => 400,
            _ => 500,
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::UpstreamUnavailable(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for EngineError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        EngineError::UpstreamUnavailable(err.to_string())
    }
}

impl From<csv::Error> for EngineError {
    fn from(err: csv::Error) -> Self {
        EngineError::UpstreamUnavailable(format!("csv: {err}"))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Store(format!("json: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_type_is_a_client_error() {
        let err = EngineError::UnknownModelType("weather".to_string());
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), "Unknown model type: weather");
    }

    #[test]
    fn internal_failures_map_to_server_errors() {
        assert_eq!(EngineError::Training("boom".into()).status_code(), 500);
        assert_eq!(
            EngineError::UpstreamUnavailable("down".into()).status_code(),
            500
        );
    }
}
