use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ship_core::state::TaskStatus;
use ship_core::validation::ValidationIssue;
use ship_plan::launcher::PlanError;

use crate::model::ErrorBody;

#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{message}")]
    Validation {
        message: String,
        issues: Vec<ValidationIssue>,
    },
    #[error("bad request: {message}")]
    BadRequest { message: String },
    #[error("not found: {resource}")]
    NotFound { resource: String },
    #[error("{message}")]
    InFlight { message: String, status: TaskStatus },
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl WebError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebError::Validation { .. } | WebError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            WebError::NotFound { .. } => StatusCode::NOT_FOUND,
            WebError::InFlight { .. } => StatusCode::CONFLICT,
            WebError::Io(_) | WebError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        let mut body = ErrorBody {
            error: self.to_string(),
            issues: Vec::new(),
            status: None,
        };
        match self {
            WebError::Validation { issues, .. } => body.issues = issues.clone(),
            WebError::InFlight { status, .. } => body.status = Some(*status),
            _ => {}
        }
        body
    }
}

impl From<PlanError> for WebError {
    fn from(err: PlanError) -> Self {
        let message = err.to_string();
        match err {
            PlanError::Validation { issues } => WebError::Validation { message, issues },
            PlanError::TaskNotFound { task_id } => WebError::NotFound {
                resource: format!("task:{task_id}"),
            },
            PlanError::InFlight { status, .. } => WebError::InFlight { message, status },
            PlanError::Quote(_) => WebError::Internal { message },
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}
