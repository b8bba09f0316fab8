use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use mongodb::error::ErrorKind;
use thiserror::Error;

/// Errors raised by the analytics pipeline.
///
/// `Clone` so a single collapsed dashboard fetch can hand the same failure
/// to every caller that joined it.
#[derive(Debug, Clone, Error)]
pub enum AnalyticsError {
    /// Dashboard query issued without an owner identity
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Backing store rejected or failed the operation
    #[error("store error: {0}")]
    Store(String),

    /// Backing store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl AnalyticsError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(self, AnalyticsError::Store(_) | AnalyticsError::Unavailable(_))
    }
}

impl From<mongodb::error::Error> for AnalyticsError {
    fn from(e: mongodb::error::Error) -> Self {
        match e.kind.as_ref() {
            ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } => {
                AnalyticsError::Unavailable(e.to_string())
            }
            _ => AnalyticsError::Store(e.to_string()),
        }
    }
}

impl ResponseError for AnalyticsError {
    fn status_code(&self) -> StatusCode {
        match self {
            AnalyticsError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            AnalyticsError::Forbidden(_) => StatusCode::FORBIDDEN,
            AnalyticsError::NotFound(_) => StatusCode::NOT_FOUND,
            AnalyticsError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AnalyticsError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AnalyticsError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string()
        }))
    }
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_failures_are_transient() {
        assert!(AnalyticsError::Store("boom".into()).is_transient());
        assert!(AnalyticsError::Unavailable("down".into()).is_transient());
        assert!(!AnalyticsError::NotAuthenticated.is_transient());
        assert!(!AnalyticsError::NotFound("deck".into()).is_transient());
        assert!(!AnalyticsError::InvalidInput("page".into()).is_transient());
    }

    #[test]
    fn maps_to_http_status() {
        assert_eq!(
            AnalyticsError::NotAuthenticated.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AnalyticsError::Forbidden("deck".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AnalyticsError::Unavailable("down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
