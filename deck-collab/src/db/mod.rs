use std::sync::Arc;

use chrono::{DateTime, Utc};
use deck_core::{DocumentStore, Id, Query, StoreError};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::Config;

mod data;
pub use data::*;

mod lock;
pub use lock::*;

mod repository;
pub use repository::*;

pub type Result<T> = std::result::Result<T, RepositoryError>;

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The document store failed
    #[error(transparent)]
    Backend(#[from] StoreError),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource doesn't exist
    #[error("{resource} doesn't exist")]
    NotFound { resource: &'static str },
    /// A field of a resource failed validation
    #[error("{resource} has an invalid {field}")]
    ValidationFailed {
        resource: &'static str,
        field: &'static str,
    },
}

/// The fixed order in which locks on different kinds of entities are taken.
/// A handler holding a lock may only acquire locks on kinds that come after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    User,
    Session,
    Community,
    CommunityStaff,
    Ban,
    Mute,
    GlobalBan,
    Chat,
    Media,
    Playlist,
    PlaylistItem,
    CommunityHistory,
    UserHistory,
}

/// Fields every persisted document has
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub id: Id,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// A type that is stored in a collection of the document store
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The name of the collection the entity is stored in
    const COLLECTION: &'static str;
    const KIND: EntityKind;
    /// A human readable name, used in errors
    const RESOURCE: &'static str;

    fn meta(&self) -> &Meta;
    fn meta_mut(&mut self) -> &mut Meta;

    /// Validates the entity before it is written, normalizing fields where needed.
    fn validate(&mut self) -> Result<()> {
        Ok(())
    }

    /// Queries that must not match any other document, labeled by the field they protect.
    fn unique(&self) -> Vec<(&'static str, Query)> {
        vec![]
    }

    fn id(&self) -> Id {
        self.meta().id
    }
}

/// Helper trait to reduce boilerplate
pub trait RepositoryResult<T> {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;

    /// Turns a not found error into None
    fn optional(self) -> Result<Option<T>>;
}

impl<T> RepositoryResult<T> for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(RepositoryError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(RepositoryError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(RepositoryError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Typed access to every collection deck persists.
pub struct Repositories {
    pub locks: Arc<LockManager>,

    pub users: Repository<UserData>,
    pub sessions: Repository<SessionData>,
    pub communities: Repository<CommunityData>,
    pub staff: Repository<StaffData>,
    pub community_history: Repository<CommunityHistoryData>,
    pub user_history: Repository<UserHistoryData>,
    pub bans: Repository<BanData>,
    pub global_bans: Repository<GlobalBanData>,
    pub mutes: Repository<MuteData>,
    pub chat: Repository<ChatData>,
    pub media: Repository<MediaData>,
    pub playlists: Repository<PlaylistData>,
    pub playlist_items: Repository<PlaylistItemData>,
}

impl Repositories {
    pub fn new(store: Arc<dyn DocumentStore>, config: &Config) -> Self {
        let locks = Arc::new(LockManager::new());
        let ttl = config.cache_ttl;

        Self {
            users: Repository::new(&store, &locks, ttl),
            sessions: Repository::new(&store, &locks, ttl),
            communities: Repository::new(&store, &locks, ttl),
            staff: Repository::new(&store, &locks, ttl),
            community_history: Repository::new(&store, &locks, ttl),
            user_history: Repository::new(&store, &locks, ttl),
            bans: Repository::new(&store, &locks, ttl),
            global_bans: Repository::new(&store, &locks, ttl),
            mutes: Repository::new(&store, &locks, ttl),
            chat: Repository::new(&store, &locks, ttl),
            media: Repository::new(&store, &locks, ttl),
            playlists: Repository::new(&store, &locks, ttl),
            playlist_items: Repository::new(&store, &locks, ttl),
            locks,
        }
    }
}
