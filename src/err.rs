use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub async fn handler404(path: Uri) -> (StatusCode, Json<Error>) {
    (
        StatusCode::NOT_FOUND,
        Json(Error::NotFound {
            message: format!("Invalid path: {}", path),
        }),
    )
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "error")]
pub enum Error {
    AuthorizationMissing { message: String },
    Unauthorized { message: String },
    MalformedPayload { message: String },
    EmptyRequest { message: String },
    MissingFields { message: String },
    DuplicateUsername { message: String },
    InvalidCredentials { message: String },
    NotFound { message: String },
    NoAddress { message: String },
    NoCourses { message: String },
    NoPassedCourses { message: String },
    InvalidCoursesShape { message: String },
    StoreFailure { message: String },
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::DuplicateUsername { .. }
            | Error::InvalidCredentials { .. }
            | Error::NotFound { .. }
            | Error::NoAddress { .. }
            | Error::NoCourses { .. }
            | Error::NoPassedCourses { .. } => StatusCode::BAD_REQUEST,
            Error::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Error::AuthorizationMissing { .. }
            | Error::MalformedPayload { .. }
            | Error::EmptyRequest { .. }
            | Error::MissingFields { .. }
            | Error::InvalidCoursesShape { .. }
            | Error::StoreFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(self)).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::StoreFailure {
            message: err.to_string(),
        }
    }
}

/// Strict body parser. The body must be readable JSON, must contain at least
/// one field, and must carry every field the target type requires.
pub fn parse_payload<T: DeserializeOwned>(body: &str) -> Result<T, Error> {
    if body.trim().is_empty() {
        return Err(Error::EmptyRequest {
            message: "Request body was empty!".to_string(),
        });
    }
    let document: Value = serde_json::from_str(body).map_err(|_| Error::MalformedPayload {
        message: "Request body was not valid JSON!".to_string(),
    })?;
    if document.as_object().map_or(false, |fields| fields.is_empty()) {
        return Err(Error::EmptyRequest {
            message: "Request body was empty!".to_string(),
        });
    }
    serde_json::from_value(document).map_err(|_| Error::MissingFields {
        message: "Required fields were missing from the request!".to_string(),
    })
}
