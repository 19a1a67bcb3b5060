//! What clients get to see of the stored records

use chrono::{DateTime, Utc};
use deck_collab::{
    CommunityData, Entity, GlobalRole, MediaData, PlaylistItemData, RoomSnapshot, StaffData,
    StaffRole, UserData,
};
use deck_core::Id;
use serde::Serialize;

/// A user as anyone else sees them
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    id: Id,
    username: String,
    role: GlobalRole,
    points: u64,
    created: DateTime<Utc>,
}

/// A user as they see themselves
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Me {
    id: Id,
    username: String,
    email: Option<String>,
    role: GlobalRole,
    points: u64,
    diamonds: u64,
    locale: String,
    has_facebook: bool,
    has_twitter: bool,
    has_google: bool,
    created: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Staff {
    user: Id,
    role: StaffRole,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Community {
    #[serde(flatten)]
    data: CommunityData,
    /// How many users are in the room, if it's live
    population: usize,
}

/// What a user gets back when they join a community
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedCommunity {
    pub community: CommunityData,
    pub state: RoomSnapshot,
    /// Everyone in the room, joiner included
    pub users: Vec<PublicUser>,
    pub role: StaffRole,
}

/// A playlist item with its media, overrides applied
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistEntry {
    id: Id,
    order: u32,
    media: MediaData,
    artist: String,
    title: String,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<PublicUser> for UserData {
    fn to_serialized(&self) -> PublicUser {
        PublicUser {
            id: self.id(),
            username: self.username.clone(),
            role: self.role,
            points: self.points,
            created: self.meta.created,
        }
    }
}

impl ToSerialized<Me> for UserData {
    fn to_serialized(&self) -> Me {
        Me {
            id: self.id(),
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
            points: self.points,
            diamonds: self.diamonds,
            locale: self.locale.clone(),
            has_facebook: self.facebook_id.is_some(),
            has_twitter: self.twitter_id.is_some(),
            has_google: self.google_id.is_some(),
            created: self.meta.created,
        }
    }
}

impl ToSerialized<Staff> for StaffData {
    fn to_serialized(&self) -> Staff {
        Staff {
            user: self.user,
            role: self.role,
        }
    }
}

impl ToSerialized<Community> for (CommunityData, usize) {
    fn to_serialized(&self) -> Community {
        Community {
            data: self.0.clone(),
            population: self.1,
        }
    }
}

impl ToSerialized<PlaylistEntry> for (PlaylistItemData, MediaData) {
    fn to_serialized(&self) -> PlaylistEntry {
        let (item, media) = self;

        PlaylistEntry {
            id: item.id(),
            order: item.order,
            artist: item.artist.clone().unwrap_or_else(|| media.artist.clone()),
            title: item.title.clone().unwrap_or_else(|| media.title.clone()),
            media: media.clone(),
        }
    }
}
