use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced at the service boundary.
///
/// Internal model failures (an unavailable model family, a degenerate fit)
/// are deliberately *not* represented here; they cascade inside the
/// forecasting layer and never reach the caller. Only input problems and
/// repository failures escape the engine.
#[derive(Error, Debug, Serialize)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Repository error: {0}")]
    RepositoryError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    pub fn product_not_found(product_id: Uuid) -> Self {
        ServiceError::NotFound(format!("Product {} not found", product_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_detail() {
        let err = ServiceError::RepositoryError("connection refused".to_string());
        assert_eq!(err.to_string(), "Repository error: connection refused");
    }
}
