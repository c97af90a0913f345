use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::Extension;
use serde::{Deserialize, Serialize};

use crate::err::{parse_payload, Error};
use crate::session::SessionRegistry;
use crate::students::StudentQueryService;
use crate::{confirms, proceeds, Confirmation, Payload};

/// Shared precondition for every protected endpoint: the `Authorization`
/// header carries the raw session token, no scheme prefix.
pub fn ensure_authenticated(headers: &HeaderMap, sessions: &SessionRegistry) -> Result<(), Error> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| Error::AuthorizationMissing {
            message: "Missing `Authorization` header!".to_string(),
        })?;

    if !sessions.is_valid(token) {
        return Err(Error::Unauthorized {
            message: "Session token is not valid!".to_string(),
        });
    }
    Ok(())
}

pub async fn create_user(
    Extension(service): Extension<StudentQueryService>,
    body: String,
) -> Confirmation {
    let credentials: Credentials = parse_payload(&body)?;
    if credentials.username.is_empty() || credentials.password.is_empty() {
        return Err(Error::MissingFields {
            message: "`username` and `password` must not be empty!".to_string(),
        });
    }

    service
        .create_user(&credentials.username, &credentials.password)
        .await?;
    confirms(format!(
        "Successfully created user `{}`.",
        credentials.username
    ))
}

pub async fn login(
    Extension(service): Extension<StudentQueryService>,
    Extension(sessions): Extension<SessionRegistry>,
    body: String,
) -> Payload<LoggedIn> {
    let credentials: Credentials = parse_payload(&body)?;
    if credentials.username.is_empty() || credentials.password.is_empty() {
        return Err(Error::MissingFields {
            message: "`username` and `password` must not be empty!".to_string(),
        });
    }

    let user = service
        .verify_credentials(&credentials.username, &credentials.password)
        .await?;

    let token = sessions.create_session(&user.username);
    proceeds(LoggedIn {
        uuid: token,
        username: user.username,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggedIn {
    uuid: String,
    username: String,
}
