use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde_json::json,
};

/// Errors surfaced to a REST client, per §7: `NotFound` maps to 404,
/// everything else to 500 and is logged.
#[derive(Debug)]
pub enum ServerError {
    NotFound(String),
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::Internal(message) => {
                tracing::error!(error = message, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };

        (status, Json(json!({ "status": "error", "error": message }))).into_response()
    }
}

pub(super) trait OptionExt<T> {
    fn ok_or_not_found(self, what: &str) -> ServerResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, what: &str) -> ServerResult<T> {
        self.ok_or_else(|| ServerError::NotFound(format!("{what} not found")))
    }
}
