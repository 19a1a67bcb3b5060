use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use crossbeam::atomic::AtomicCell;
use deck_core::{Id, Query};
use log::{debug, info};
use thiserror::Error;

use crate::{
    util::{normalize_username, random_string},
    Entity, Meta, Moderation, Repositories, RepositoryError, RepositoryResult, SessionData, UserData,
};

/// Resolves session cookies to users, and guards who may connect
pub struct Auth {
    repos: Arc<Repositories>,
    moderation: Arc<Moderation>,
    maintenance: AtomicCell<bool>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No session cookie was provided")]
    MissingCookie,
    /// The cookie doesn't belong to a session, or the session's user is gone
    #[error("Invalid session")]
    InvalidSession,
    #[error("Session has expired")]
    SessionExpired,
    #[error("User is banned from the service")]
    GloballyBanned {
        until: Option<DateTime<Utc>>,
        reason: String,
    },
    #[error("The service is in maintenance mode")]
    Maintenance,
    /// Something else went wrong with the repositories
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl Auth {
    const SESSION_DURATION_IN_DAYS: i64 = 365;
    const COOKIE_LENGTH: usize = 48;

    pub fn new(repos: &Arc<Repositories>, moderation: &Arc<Moderation>) -> Self {
        Self {
            repos: repos.clone(),
            moderation: moderation.clone(),
            maintenance: AtomicCell::new(false),
        }
    }

    /// Returns the user the cookie belongs to, if they may connect
    pub async fn resolve(&self, cookie: Option<&str>) -> Result<UserData, AuthError> {
        let cookie = cookie
            .filter(|c| !c.is_empty())
            .ok_or(AuthError::MissingCookie)?;

        let session = self
            .repos
            .sessions
            .get(Query::new().eq("cookie", cookie))
            .await
            .optional()?
            .ok_or(AuthError::InvalidSession)?;

        if session.is_expired() {
            debug!("Removing expired session {}", session.id());
            self.repos.sessions.delete(&session).await.optional()?;

            return Err(AuthError::SessionExpired);
        }

        let user = self
            .repos
            .users
            .get_by_id(session.user)
            .await
            .optional()?
            .ok_or(AuthError::InvalidSession)?;

        if let Some(ban) = self.moderation.active_global_ban(user.id()).await? {
            return Err(AuthError::GloballyBanned {
                until: ban.until,
                reason: ban.reason,
            });
        }

        if self.is_maintenance() && !user.role.is_admin() {
            return Err(AuthError::Maintenance);
        }

        Ok(user)
    }

    /// Creates a new session for a user, returning it with its cookie
    pub async fn create_session(&self, user: Id) -> Result<SessionData, AuthError> {
        let expires = Utc::now() + Duration::days(Self::SESSION_DURATION_IN_DAYS);

        let session = self
            .repos
            .sessions
            .create(SessionData {
                meta: Meta::default(),
                cookie: random_string(Self::COOKIE_LENGTH),
                user,
                expires: Some(expires),
            })
            .await?;

        Ok(session)
    }

    /// Deletes the session belonging to the cookie, if it exists
    pub async fn logout(&self, cookie: &str) -> Result<(), AuthError> {
        let session = self
            .repos
            .sessions
            .get(Query::new().eq("cookie", cookie))
            .await
            .optional()?;

        if let Some(session) = session {
            self.repos.sessions.delete(&session).await.optional()?;
        }

        Ok(())
    }

    pub async fn username_taken(&self, username: &str) -> Result<bool, AuthError> {
        let Some(username) = normalize_username(username) else {
            return Ok(false);
        };

        let count = self
            .repos
            .users
            .count(Query::new().eq("username", username))
            .await?;

        Ok(count > 0)
    }

    pub async fn email_taken(&self, email: &str) -> Result<bool, AuthError> {
        let count = self
            .repos
            .users
            .count(Query::new().eq("email", email))
            .await?;

        Ok(count > 0)
    }

    pub fn is_maintenance(&self) -> bool {
        self.maintenance.load()
    }

    pub fn set_maintenance(&self, enabled: bool) {
        info!(
            "Maintenance mode is now {}",
            if enabled { "on" } else { "off" }
        );
        self.maintenance.store(enabled);
    }
}
