//! Error-to-HTTP mapping for the API surface.
//!
//! Stage failures are returned to the caller with enough detail to fix
//! or retry; nothing is reduced to a bare 500 unless it genuinely is an
//! internal fault.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use sourcebank_shared::SourcebankError;

/// JSON error body: `{"error": "...", "kind": "..."}`.
#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
}

/// Wrapper giving [`SourcebankError`] an HTTP representation.
pub(crate) struct ApiError(pub SourcebankError);

impl From<SourcebankError> for ApiError {
    fn from(e: SourcebankError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            SourcebankError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            SourcebankError::Duplicate(_) => (StatusCode::CONFLICT, "duplicate"),
            SourcebankError::StageOrder { .. } => (StatusCode::CONFLICT, "stage_order"),
            SourcebankError::Discovery(_) => (StatusCode::UNPROCESSABLE_ENTITY, "discovery"),
            SourcebankError::Fetch(_) => (StatusCode::UNPROCESSABLE_ENTITY, "fetch"),
            SourcebankError::Extraction(_) => (StatusCode::UNPROCESSABLE_ENTITY, "extraction"),
            SourcebankError::Conversion(_) => (StatusCode::UNPROCESSABLE_ENTITY, "conversion"),
            SourcebankError::Validation { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
            SourcebankError::Config { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "config"),
            SourcebankError::Storage(_) | SourcebankError::Io { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "internal error");
        }

        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
                kind,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sourcebank_shared::{PipelineStatus, StageOp};

    fn status_of(e: SourcebankError) -> StatusCode {
        ApiError(e).into_response().status()
    }

    #[test]
    fn mapping_matches_contract() {
        assert_eq!(
            status_of(SourcebankError::NotFound("url x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(SourcebankError::Duplicate("domain x".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(SourcebankError::StageOrder {
                from: PipelineStatus::Discovered,
                op: StageOp::Convert,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(SourcebankError::Discovery(
                sourcebank_shared::DiscoveryError::NoSitemap {
                    host: "x.no".into()
                }
            )),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(SourcebankError::Storage("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
