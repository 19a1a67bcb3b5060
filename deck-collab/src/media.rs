use std::sync::Arc;

use async_trait::async_trait;
use deck_core::Query;
use log::{info, warn};
use thiserror::Error;

use crate::{MediaData, MediaKind, Meta, Repositories, RepositoryError, RepositoryResult};

/// Metadata about a piece of media, as reported by its platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInfo {
    pub image: String,
    pub artist: String,
    pub title: String,
    pub blurb: String,
    /// Length in seconds
    pub length: u32,
}

#[derive(Debug, Error)]
pub enum MediaError {
    /// The platform doesn't know the media, or can't be reached
    #[error("{kind:?} media {mid} is unavailable")]
    Unavailable { kind: MediaKind, mid: String },
    /// The platform answered with something unusable
    #[error("Failed to fetch media: {0}")]
    Fetch(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Looks up metadata for media on a third-party platform
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn fetch(&self, kind: MediaKind, mid: &str) -> Result<MediaInfo, MediaError>;
}

/// A media source for deployments without any platform integration
pub struct UnavailableSource;

#[async_trait]
impl MediaSource for UnavailableSource {
    async fn fetch(&self, kind: MediaKind, mid: &str) -> Result<MediaInfo, MediaError> {
        Err(MediaError::Unavailable {
            kind,
            mid: mid.to_string(),
        })
    }
}

/// Resolves media records, fetching metadata for media deck hasn't seen before
pub struct MediaLibrary {
    repos: Arc<Repositories>,
    source: Arc<dyn MediaSource>,
}

impl MediaLibrary {
    pub fn new(repos: &Arc<Repositories>, source: Arc<dyn MediaSource>) -> Self {
        Self {
            repos: repos.clone(),
            source,
        }
    }

    /// Returns the stored media for (kind, mid), creating it from the media source if needed
    pub async fn resolve(&self, kind: MediaKind, mid: &str) -> Result<MediaData, MediaError> {
        let query = Query::new().eq("type", u8::from(kind)).eq("mid", mid);

        if let Some(media) = self.repos.media.get(query.clone()).await.optional()? {
            return Ok(media);
        }

        let info = self.source.fetch(kind, mid).await.map_err(|e| {
            warn!("Could not fetch {:?} media {}: {}", kind, mid, e);
            e
        })?;

        let created = self
            .repos
            .media
            .create(MediaData {
                meta: Meta::default(),
                kind,
                mid: mid.to_string(),
                title: info.title,
                artist: info.artist,
                blurb: info.blurb,
                image: info.image,
                length: info.length,
                plays: 0,
                woots: 0,
                mehs: 0,
                grabs: 0,
                playlists: 0,
            })
            .await;

        match created {
            Ok(media) => {
                info!("Added {:?} media {} ({})", kind, mid, media.title);
                Ok(media)
            }
            // Someone else resolved it first
            Err(RepositoryError::Conflict { .. }) => Ok(self.repos.media.get(query).await?),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_source {
    use super::*;

    /// Reports every media as a track of the given length
    pub struct FixedSource {
        pub length: u32,
    }

    #[async_trait]
    impl MediaSource for FixedSource {
        async fn fetch(&self, _kind: MediaKind, mid: &str) -> Result<MediaInfo, MediaError> {
            Ok(MediaInfo {
                image: format!("https://img.example/{}.jpg", mid),
                artist: "Artist".to_string(),
                title: format!("Track {}", mid),
                blurb: String::new(),
                length: self.length,
            })
        }
    }
}
