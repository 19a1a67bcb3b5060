mod room;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use deck_core::Id;
use serde::Serialize;
use thiserror::Error;

use crate::{CollabContext, MediaData, MediaKind, PlaylistItemData, RepositoryError};

pub use room::*;

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("User is not in the room")]
    NotInRoom,
    #[error("User is already in the waitlist")]
    AlreadyQueued,
    #[error("User is not in the waitlist")]
    NotQueued,
    #[error("User is the current DJ")]
    AlreadyPlaying,
    #[error("The waitlist is full")]
    WaitlistFull,
    #[error("Position is out of bounds")]
    OutOfBounds,
    #[error("Nothing is playing")]
    NothingPlaying,
    #[error("User already voted that way")]
    AlreadyVoted,
    /// The next DJ has no selected playlist
    #[error("DJ {0} has no selected playlist")]
    NoPlaylist(Id),
    #[error("Playlist {0} is empty")]
    EmptyPlaylist(Id),
    /// The room hit an unrecoverable error and was shut down
    #[error("The room was shut down")]
    Panicked,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// A vote on the currently playing media
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteKind {
    Woot,
    Meh,
    /// Added the media to a playlist. Implies a woot.
    Grab,
}

/// Who voted what on the current media
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Votes {
    pub woot: Vec<Id>,
    pub meh: Vec<Id>,
    pub grab: Vec<Id>,
}

impl Votes {
    /// Applies a vote, returning false if it changes nothing
    pub fn apply(&mut self, user: Id, kind: VoteKind) -> bool {
        match kind {
            VoteKind::Woot => {
                if self.woot.contains(&user) {
                    return false;
                }

                self.meh.retain(|u| *u != user);
                self.woot.push(user);
            }
            VoteKind::Meh => {
                if self.meh.contains(&user) {
                    return false;
                }

                self.woot.retain(|u| *u != user);
                self.meh.push(user);
            }
            VoteKind::Grab => {
                if self.grab.contains(&user) {
                    return false;
                }

                self.grab.push(user);
                self.meh.retain(|u| *u != user);

                if !self.woot.contains(&user) {
                    self.woot.push(user);
                }
            }
        }

        true
    }

    pub fn counts(&self) -> (u32, u32, u32) {
        (
            self.woot.len() as u32,
            self.meh.len() as u32,
            self.grab.len() as u32,
        )
    }
}

/// The media being played, with the playlist item's overrides applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayingMedia {
    pub id: Id,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub mid: String,
    pub title: String,
    pub artist: String,
    pub image: String,
    pub blurb: String,
    /// Length in seconds
    pub length: u32,
}

impl PlayingMedia {
    pub fn new(media: &MediaData, item: &PlaylistItemData) -> Self {
        Self {
            id: media.meta.id,
            kind: media.kind,
            mid: media.mid.clone(),
            title: item.title.clone().unwrap_or_else(|| media.title.clone()),
            artist: item.artist.clone().unwrap_or_else(|| media.artist.clone()),
            image: media.image.clone(),
            blurb: media.blurb.clone(),
            length: media.length,
        }
    }
}

/// What a room is currently playing.
/// Clients compute the remaining time from `started_at` and the media length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlaying {
    pub dj_id: Id,
    pub started_at: DateTime<Utc>,
    pub media: PlayingMedia,
    /// The playlist item the media was taken from
    pub item: Id,
    pub votes: Votes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdvanceData {
    pub waitlist: Vec<Id>,
    pub media: Option<NowPlaying>,
}

/// The live state of a room, as sent to clients
#[derive(Debug, Clone, Serialize)]
pub struct RoomSnapshot {
    pub population: Vec<Id>,
    pub waitlist: Vec<Id>,
    pub media: Option<NowPlaying>,
}

/// Keeps track of the rooms that are live in this process
pub struct RoomManager {
    context: CollabContext,
}

impl RoomManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Returns the room if it's live
    pub fn get(&self, community: Id) -> Option<Arc<Room>> {
        self.context.rooms.get(&community).map(|r| r.clone())
    }

    /// Returns the live room for a community, bringing it up if needed
    pub async fn load(&self, community: Id) -> Result<Arc<Room>, RoomError> {
        if let Some(room) = self.get(community) {
            return Ok(room);
        }

        // Make sure the community exists before a room is made for it
        self.context.repos.communities.get_by_id(community).await?;

        Ok(self.get_or_create(community))
    }

    /// Returns the live room for a community known to exist
    pub fn get_or_create(&self, community: Id) -> Arc<Room> {
        self.context
            .rooms
            .entry(community)
            .or_insert_with(|| Room::new(&self.context, community))
            .clone()
    }

    /// Get all rooms in memory
    pub fn list_all(&self) -> Vec<Arc<Room>> {
        self.context.rooms.iter().map(|r| r.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_switching() {
        let mut votes = Votes::default();
        let user = Id::new();

        assert!(votes.apply(user, VoteKind::Meh));
        assert_eq!(votes.meh, vec![user]);

        assert!(votes.apply(user, VoteKind::Woot));
        assert_eq!(votes.woot, vec![user]);
        assert!(votes.meh.is_empty(), "woot replaces meh");

        assert!(!votes.apply(user, VoteKind::Woot), "same side twice is refused");

        assert!(votes.apply(user, VoteKind::Grab));
        assert_eq!(votes.grab, vec![user]);
        assert_eq!(votes.woot, vec![user], "grab keeps the woot");
        assert!(!votes.apply(user, VoteKind::Grab));
    }

    #[test]
    fn test_grab_implies_woot() {
        let mut votes = Votes::default();
        let user = Id::new();

        votes.apply(user, VoteKind::Meh);
        votes.apply(user, VoteKind::Grab);

        assert_eq!(votes.counts(), (1, 0, 1));
    }
}
