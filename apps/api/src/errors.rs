use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::artifacts::SinkError;
use crate::cache::CacheError;
use crate::documents::DocumentError;
use crate::flow::state_machine::FlowState;
use crate::models::Stage;
use crate::pipeline::{GraphError, StepId};

/// Errors that end a run. Guardrail rejections are not errors: they are
/// reported as `FlowOutcome::Failed` with every failed validation outcome.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("invalid pipeline definition: {0}")]
    InvalidPipeline(#[from] GraphError),

    #[error("step '{step}' of the {stage} stage failed: {message}")]
    StepExecutionFailure {
        stage: Stage,
        step: StepId,
        message: String,
        skipped: Vec<StepId>,
    },

    #[error("cache unavailable: {0}")]
    CacheUnavailable(#[from] CacheError),

    #[error("artifact write failed: {0}")]
    ArtifactWriteFailure(#[from] SinkError),

    #[error("illegal flow transition {from} -> {to}")]
    IllegalTransition { from: FlowState, to: FlowState },

    #[error("internal error: {0}")]
    Internal(String),
}

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// A run that ended in a guardrail rejection; carries the full report.
    #[error("Rejected by guardrails")]
    Rejected(Value),

    #[error(transparent)]
    Flow(FlowError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<FlowError> for AppError {
    fn from(err: FlowError) -> Self {
        match err {
            FlowError::InvalidRequest(msg) => AppError::Validation(msg),
            other => AppError::Flow(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg.clone(),
                Value::Null,
            ),
            AppError::Rejected(report) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "GUARDRAIL_REJECTED",
                "Generated content failed validation; nothing was published".to_string(),
                report.clone(),
            ),
            AppError::Flow(err) => flow_error_parts(err),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    Value::Null,
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if !details.is_null() {
            error["details"] = details;
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

fn flow_error_parts(err: &FlowError) -> (StatusCode, &'static str, String, Value) {
    match err {
        FlowError::InvalidRequest(msg) => (
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            msg.clone(),
            Value::Null,
        ),
        FlowError::StepExecutionFailure {
            stage,
            step,
            skipped,
            ..
        } => {
            tracing::error!("Step execution failed: {err}");
            (
                StatusCode::BAD_GATEWAY,
                "STEP_EXECUTION_FAILURE",
                err.to_string(),
                json!({ "stage": stage, "step": step, "skipped": skipped }),
            )
        }
        FlowError::CacheUnavailable(e) => {
            tracing::error!("Cache error: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "CACHE_UNAVAILABLE",
                "The result cache is unavailable".to_string(),
                Value::Null,
            )
        }
        FlowError::ArtifactWriteFailure(e) => {
            tracing::error!("Artifact write error: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ARTIFACT_WRITE_FAILURE",
                "Artifacts could not be written".to_string(),
                Value::Null,
            )
        }
        FlowError::Document(e) => {
            tracing::error!("Document error: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DOCUMENT_ERROR",
                e.to_string(),
                Value::Null,
            )
        }
        FlowError::InvalidPipeline(_) | FlowError::IllegalTransition { .. } | FlowError::Internal(_) => {
            tracing::error!("Flow error: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal server error occurred".to_string(),
                Value::Null,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_request_maps_to_bad_request() {
        let response = AppError::from(FlowError::InvalidRequest("no route".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["message"], "no route");
    }

    #[tokio::test]
    async fn test_step_failure_names_the_step() {
        let err = FlowError::StepExecutionFailure {
            stage: Stage::Site,
            step: StepId::from("audit_accessibility"),
            message: "timeout".into(),
            skipped: vec![StepId::from("generate_resume_site")],
        };
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["error"]["details"]["step"], "audit_accessibility");
        assert_eq!(body["error"]["details"]["skipped"][0], "generate_resume_site");
    }

    #[tokio::test]
    async fn test_rejection_is_unprocessable_with_details() {
        let response = AppError::Rejected(json!({"status": "failed"})).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["error"]["details"]["status"], "failed");
    }
}
