use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use deck_collab::{AuthError, MediaError, RepositoryError, RoomError};
use log::error;
use serde_json::Value;
use thiserror::Error;
use validator::ValidationErrors;

pub type ServerResult<T> = Result<T, ServerError>;
pub type ActionResult<T = Value> = Result<T, ActionError>;

/// Errors of the plain HTTP endpoints
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if let Self::Unknown(cause) = &self {
            error!("Request failed: {}", cause);
        }

        (self.as_status_code(), self.to_string()).into_response()
    }
}

impl From<AuthError> for ServerError {
    fn from(value: AuthError) -> Self {
        match value {
            e @ (AuthError::MissingCookie
            | AuthError::InvalidSession
            | AuthError::SessionExpired) => Self::Unauthorized(e.to_string()),
            e @ (AuthError::GloballyBanned { .. } | AuthError::Maintenance) => {
                Self::Forbidden(e.to_string())
            }
            e => Self::Unknown(e.to_string()),
        }
    }
}

/// The status code of an action reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Status {
    Ok = 0,
    BadRequest = 1,
    NotFound = 2,
    Forbidden = 3,
    AlreadyLoggedIn = 100,
    Unimplemented = 9998,
    ServerError = 9999,
}

impl Status {
    pub fn code(self) -> u16 {
        self as u16
    }
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(String),
    #[error("Not implemented")]
    Unimplemented,
    /// Anything the client can't do anything about. The cause is logged, not sent.
    #[error("Internal server error: {0}")]
    Server(String),
}

impl ActionError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn status(&self) -> Status {
        match self {
            Self::BadRequest(_) => Status::BadRequest,
            Self::NotFound(_) => Status::NotFound,
            Self::Forbidden(_) => Status::Forbidden,
            Self::Unimplemented => Status::Unimplemented,
            Self::Server(_) => Status::ServerError,
        }
    }

    /// The `d` field of the reply
    pub fn data(&self) -> Value {
        match self {
            Self::Server(cause) => {
                error!("Action failed: {}", cause);
                Value::String("Internal server error".to_string())
            }
            e => Value::String(e.to_string()),
        }
    }
}

impl From<RepositoryError> for ActionError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound { resource } => Self::NotFound(resource),
            RepositoryError::Conflict {
                resource, field, ..
            } => Self::BadRequest(format!("A {} with that {} already exists", resource, field)),
            RepositoryError::ValidationFailed { resource, field } => {
                Self::BadRequest(format!("Invalid {} {}", resource, field))
            }
            e => Self::Server(e.to_string()),
        }
    }
}

impl From<RoomError> for ActionError {
    fn from(value: RoomError) -> Self {
        match value {
            RoomError::Repository(e) => e.into(),
            // These only come up while advancing, and take the room down with them
            e @ (RoomError::NoPlaylist(_) | RoomError::EmptyPlaylist(_) | RoomError::Panicked) => {
                Self::Server(e.to_string())
            }
            e => Self::BadRequest(e.to_string()),
        }
    }
}

impl From<MediaError> for ActionError {
    fn from(value: MediaError) -> Self {
        match value {
            MediaError::Unavailable { .. } => Self::NotFound("Media"),
            MediaError::Repository(e) => e.into(),
            e => Self::Server(e.to_string()),
        }
    }
}

impl From<AuthError> for ActionError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::Repository(e) => e.into(),
            e => Self::Forbidden(e.to_string()),
        }
    }
}

impl From<ValidationErrors> for ActionError {
    fn from(value: ValidationErrors) -> Self {
        Self::BadRequest(value.to_string())
    }
}

impl From<serde_json::Error> for ActionError {
    fn from(value: serde_json::Error) -> Self {
        Self::BadRequest(format!("Malformed payload: {}", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_codes() {
        assert_eq!(Status::Ok.code(), 0);
        assert_eq!(Status::AlreadyLoggedIn.code(), 100);
        assert_eq!(Status::Unimplemented.code(), 9998);
        assert_eq!(Status::ServerError.code(), 9999);
    }

    #[test]
    fn test_repository_errors_map_to_statuses() {
        let not_found: ActionError = RepositoryError::NotFound { resource: "playlist" }.into();
        assert_eq!(not_found.status(), Status::NotFound);

        let conflict: ActionError = RepositoryError::Conflict {
            resource: "community",
            field: "url",
            value: "lounge".to_string(),
        }
        .into();
        assert_eq!(conflict.status(), Status::BadRequest);

        let room: ActionError = RoomError::WaitlistFull.into();
        assert_eq!(room.status(), Status::BadRequest);

        let panicked: ActionError = RoomError::Panicked.into();
        assert_eq!(panicked.status(), Status::ServerError);
    }

    #[test]
    fn test_auth_errors_refuse_the_upgrade() {
        let missing: ServerError = AuthError::MissingCookie.into();
        assert_eq!(missing.as_status_code(), StatusCode::UNAUTHORIZED);

        let maintenance: ServerError = AuthError::Maintenance.into();
        assert_eq!(maintenance.as_status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_server_errors_hide_their_cause() {
        let error = ActionError::Server("connection reset".to_string());
        assert_eq!(error.data(), Value::String("Internal server error".to_string()));
    }
}
