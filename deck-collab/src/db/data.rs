use chrono::{DateTime, Utc};
use deck_core::{Id, Query};
use serde::{Deserialize, Serialize};

use super::{Entity, EntityKind, Meta, RepositoryError, Result};
use crate::util::{is_valid_email, length_within, normalize_community_url, normalize_username};

/// The longest chat message stored, in bytes
pub const CHAT_MAX_LENGTH: usize = 300;

macro_rules! impl_meta {
    () => {
        fn meta(&self) -> &Meta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut Meta {
            &mut self.meta
        }
    };
}

macro_rules! impl_rank {
    ($role:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        impl From<$role> for u8 {
            fn from(role: $role) -> u8 {
                role as u8
            }
        }

        impl TryFrom<u8> for $role {
            type Error = String;

            fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
                match value {
                    $($value => Ok(Self::$variant),)+
                    other => Err(format!("{} is not a valid {}", other, stringify!($role))),
                }
            }
        }
    };
}

fn invalid(resource: &'static str, field: &'static str) -> RepositoryError {
    RepositoryError::ValidationFailed { resource, field }
}

/// A role that applies across the whole service, compared by rank
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum GlobalRole {
    Guest = 0,
    #[default]
    User = 1,
    Donator = 2,
    DonatorPlus = 3,
    DonatorPlusPlus = 4,
    TrialAmbassador = 5,
    Ambassador = 6,
    SeniorAmbassador = 7,
    Admin = 8,
    Server = 9,
}

impl_rank!(GlobalRole {
    Guest = 0,
    User = 1,
    Donator = 2,
    DonatorPlus = 3,
    DonatorPlusPlus = 4,
    TrialAmbassador = 5,
    Ambassador = 6,
    SeniorAmbassador = 7,
    Admin = 8,
    Server = 9,
});

impl GlobalRole {
    /// Ambassadors and above can moderate any community
    pub fn is_ambassador(self) -> bool {
        self >= GlobalRole::TrialAmbassador
    }

    pub fn is_admin(self) -> bool {
        self >= GlobalRole::Admin
    }
}

/// A role within a single community, compared by rank
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum StaffRole {
    #[default]
    User = 0,
    ResidentDj = 1,
    Bouncer = 2,
    Manager = 3,
    CoHost = 4,
    Host = 5,
}

impl_rank!(StaffRole {
    User = 0,
    ResidentDj = 1,
    Bouncer = 2,
    Manager = 3,
    CoHost = 4,
    Host = 5,
});

/// The platform a media item is played from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum MediaKind {
    YouTube = 1,
    SoundCloud = 2,
}

impl_rank!(MediaKind {
    YouTube = 1,
    SoundCloud = 2,
});

/// A deck account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    #[serde(flatten)]
    pub meta: Meta,
    pub username: String,
    pub email: Option<String>,
    /// The password hash, never sent to clients
    pub password: String,
    pub facebook_id: Option<String>,
    pub twitter_id: Option<String>,
    pub google_id: Option<String>,
    pub role: GlobalRole,
    pub points: u64,
    pub diamonds: u64,
    pub locale: String,
}

impl UserData {
    pub fn new(username: &str) -> Self {
        Self {
            meta: Meta::default(),
            username: username.to_string(),
            email: None,
            password: String::new(),
            facebook_id: None,
            twitter_id: None,
            google_id: None,
            role: GlobalRole::User,
            points: 0,
            diamonds: 0,
            locale: "en".to_string(),
        }
    }
}

impl Entity for UserData {
    const COLLECTION: &'static str = "users";
    const KIND: EntityKind = EntityKind::User;
    const RESOURCE: &'static str = "User";

    impl_meta!();

    fn validate(&mut self) -> Result<()> {
        self.username =
            normalize_username(&self.username).ok_or_else(|| invalid(Self::RESOURCE, "username"))?;

        if let Some(email) = &self.email {
            if !is_valid_email(email) {
                return Err(invalid(Self::RESOURCE, "email"));
            }
        }

        Ok(())
    }

    fn unique(&self) -> Vec<(&'static str, Query)> {
        let mut unique = vec![("username", Query::new().eq("username", &*self.username))];

        if let Some(email) = &self.email {
            unique.push(("email", Query::new().eq("email", &**email)));
        }

        unique
    }
}

/// A login session, identified by the `auth` cookie
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    #[serde(flatten)]
    pub meta: Meta,
    pub cookie: String,
    pub user: Id,
    pub expires: Option<DateTime<Utc>>,
}

impl SessionData {
    pub fn is_expired(&self) -> bool {
        self.expires.is_some_and(|expires| expires <= Utc::now())
    }
}

impl Entity for SessionData {
    const COLLECTION: &'static str = "sessions";
    const KIND: EntityKind = EntityKind::Session;
    const RESOURCE: &'static str = "Session";

    impl_meta!();

    fn unique(&self) -> Vec<(&'static str, Query)> {
        vec![(
            "cookie",
            Query::new()
                .eq("cookie", &*self.cookie)
                .eq("user", self.user),
        )]
    }
}

/// A deck community, the persisted side of a room
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityData {
    #[serde(flatten)]
    pub meta: Meta,
    /// A slug used to identify the community
    pub url: String,
    pub name: String,
    pub host: Id,
    pub description: String,
    pub welcome_message: String,
    pub waitlist_enabled: bool,
    /// If this is true, the DJ is put back at the end of the waitlist after playing
    pub dj_recycling: bool,
    pub nsfw: bool,
}

impl CommunityData {
    pub fn new(url: &str, name: &str, host: Id) -> Self {
        Self {
            meta: Meta::default(),
            url: url.to_string(),
            name: name.to_string(),
            host,
            description: String::new(),
            welcome_message: String::new(),
            waitlist_enabled: true,
            dj_recycling: true,
            nsfw: false,
        }
    }
}

impl Entity for CommunityData {
    const COLLECTION: &'static str = "communities";
    const KIND: EntityKind = EntityKind::Community;
    const RESOURCE: &'static str = "Community";

    impl_meta!();

    fn validate(&mut self) -> Result<()> {
        self.url =
            normalize_community_url(&self.url).ok_or_else(|| invalid(Self::RESOURCE, "url"))?;

        if !length_within(&self.name, 2, 30) {
            return Err(invalid(Self::RESOURCE, "name"));
        }

        if !length_within(&self.description, 0, 1000) {
            return Err(invalid(Self::RESOURCE, "description"));
        }

        if !length_within(&self.welcome_message, 0, 300) {
            return Err(invalid(Self::RESOURCE, "welcomeMessage"));
        }

        Ok(())
    }

    fn unique(&self) -> Vec<(&'static str, Query)> {
        vec![("url", Query::new().eq("url", &*self.url))]
    }
}

/// A user's role in a community
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffData {
    #[serde(flatten)]
    pub meta: Meta,
    pub community: Id,
    pub user: Id,
    pub role: StaffRole,
}

impl Entity for StaffData {
    const COLLECTION: &'static str = "communityStaff";
    const KIND: EntityKind = EntityKind::CommunityStaff;
    const RESOURCE: &'static str = "Staff";

    impl_meta!();

    fn unique(&self) -> Vec<(&'static str, Query)> {
        vec![(
            "user",
            Query::new()
                .eq("community", self.community)
                .eq("user", self.user),
        )]
    }
}

fn validate_reason(resource: &'static str, reason: &str) -> Result<()> {
    if !length_within(reason, 0, 500) {
        return Err(invalid(resource, "reason"));
    }

    Ok(())
}

fn is_active(until: Option<DateTime<Utc>>) -> bool {
    until.map_or(true, |until| until > Utc::now())
}

/// A ban from a single community
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanData {
    #[serde(flatten)]
    pub meta: Meta,
    pub community: Id,
    pub bannee: Id,
    pub banner: Id,
    pub reason: String,
    /// When the ban ends, or None if it's permanent
    pub until: Option<DateTime<Utc>>,
}

impl BanData {
    pub fn is_active(&self) -> bool {
        is_active(self.until)
    }
}

impl Entity for BanData {
    const COLLECTION: &'static str = "bans";
    const KIND: EntityKind = EntityKind::Ban;
    const RESOURCE: &'static str = "Ban";

    impl_meta!();

    fn validate(&mut self) -> Result<()> {
        validate_reason(Self::RESOURCE, &self.reason)
    }
}

/// A mute in a single community, which prevents chatting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuteData {
    #[serde(flatten)]
    pub meta: Meta,
    pub community: Id,
    pub bannee: Id,
    pub banner: Id,
    pub reason: String,
    pub until: Option<DateTime<Utc>>,
}

impl MuteData {
    pub fn is_active(&self) -> bool {
        is_active(self.until)
    }
}

impl Entity for MuteData {
    const COLLECTION: &'static str = "mutes";
    const KIND: EntityKind = EntityKind::Mute;
    const RESOURCE: &'static str = "Mute";

    impl_meta!();

    fn validate(&mut self) -> Result<()> {
        validate_reason(Self::RESOURCE, &self.reason)
    }
}

/// A ban from the whole service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalBanData {
    #[serde(flatten)]
    pub meta: Meta,
    pub bannee: Id,
    pub banner: Id,
    pub reason: String,
    pub until: Option<DateTime<Utc>>,
}

impl GlobalBanData {
    pub fn is_active(&self) -> bool {
        is_active(self.until)
    }
}

impl Entity for GlobalBanData {
    const COLLECTION: &'static str = "globalBans";
    const KIND: EntityKind = EntityKind::GlobalBan;
    const RESOURCE: &'static str = "Global ban";

    impl_meta!();

    fn validate(&mut self) -> Result<()> {
        validate_reason(Self::RESOURCE, &self.reason)
    }
}

/// A chat message sent in a community
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatData {
    #[serde(flatten)]
    pub meta: Meta,
    pub community: Id,
    pub user: Id,
    pub message: String,
    /// The message is an action, like `/me dances`
    pub me: bool,
    pub deleted: bool,
    pub deleter: Option<Id>,
}

impl Entity for ChatData {
    const COLLECTION: &'static str = "chat";
    const KIND: EntityKind = EntityKind::Chat;
    const RESOURCE: &'static str = "Chat";

    impl_meta!();

    fn validate(&mut self) -> Result<()> {
        let truncated = crate::util::truncate_bytes(&self.message, CHAT_MAX_LENGTH);

        if truncated.len() != self.message.len() {
            self.message = truncated.to_string();
        }

        Ok(())
    }
}

/// A playable piece of media, shared by every playlist that contains it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaData {
    #[serde(flatten)]
    pub meta: Meta,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    /// The id of the media on its platform
    pub mid: String,
    pub title: String,
    pub artist: String,
    pub blurb: String,
    pub image: String,
    /// Length in seconds
    pub length: u32,
    pub plays: u64,
    pub woots: u64,
    pub mehs: u64,
    pub grabs: u64,
    /// How many playlist items reference this media
    pub playlists: u64,
}

impl Entity for MediaData {
    const COLLECTION: &'static str = "media";
    const KIND: EntityKind = EntityKind::Media;
    const RESOURCE: &'static str = "Media";

    impl_meta!();

    fn unique(&self) -> Vec<(&'static str, Query)> {
        vec![(
            "mid",
            Query::new()
                .eq("type", u8::from(self.kind))
                .eq("mid", &*self.mid),
        )]
    }
}

/// An ordered collection of media owned by a user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistData {
    #[serde(flatten)]
    pub meta: Meta,
    pub owner: Id,
    pub name: String,
    /// The playlist DJs play from. A user has at most one.
    pub selected: bool,
    pub order: u32,
}

impl Entity for PlaylistData {
    const COLLECTION: &'static str = "playlists";
    const KIND: EntityKind = EntityKind::Playlist;
    const RESOURCE: &'static str = "Playlist";

    impl_meta!();

    fn validate(&mut self) -> Result<()> {
        if !length_within(&self.name, 1, 50) {
            return Err(invalid(Self::RESOURCE, "name"));
        }

        Ok(())
    }
}

/// A media entry in a playlist, with optional overrides for how it's displayed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItemData {
    #[serde(flatten)]
    pub meta: Meta,
    pub playlist: Id,
    pub media: Id,
    pub order: u32,
    pub artist: Option<String>,
    pub title: Option<String>,
}

impl Entity for PlaylistItemData {
    const COLLECTION: &'static str = "playlistitems";
    const KIND: EntityKind = EntityKind::PlaylistItem;
    const RESOURCE: &'static str = "Playlist item";

    impl_meta!();

    fn validate(&mut self) -> Result<()> {
        if self.artist.as_deref().is_some_and(|a| !length_within(a, 0, 100)) {
            return Err(invalid(Self::RESOURCE, "artist"));
        }

        if self.title.as_deref().is_some_and(|t| !length_within(t, 0, 100)) {
            return Err(invalid(Self::RESOURCE, "title"));
        }

        Ok(())
    }
}

/// A finished play in a community
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityHistoryData {
    #[serde(flatten)]
    pub meta: Meta,
    pub community: Id,
    /// The DJ that played the media
    pub user: Id,
    pub media: Id,
    pub artist: String,
    pub title: String,
    pub woots: u32,
    pub mehs: u32,
    pub grabs: u32,
}

impl Entity for CommunityHistoryData {
    const COLLECTION: &'static str = "communityHistory";
    const KIND: EntityKind = EntityKind::CommunityHistory;
    const RESOURCE: &'static str = "Community history";

    impl_meta!();
}

/// A finished play by a user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserHistoryData {
    #[serde(flatten)]
    pub meta: Meta,
    pub user: Id,
    pub community: Id,
    pub media: Id,
    pub artist: String,
    pub title: String,
    pub woots: u32,
    pub mehs: u32,
    pub grabs: u32,
}

impl Entity for UserHistoryData {
    const COLLECTION: &'static str = "userhistory";
    const KIND: EntityKind = EntityKind::UserHistory;
    const RESOURCE: &'static str = "User history";

    impl_meta!();
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn test_roles_serialize_as_ranks() {
        assert_eq!(serde_json::to_value(GlobalRole::Admin).unwrap(), json!(8));
        assert_eq!(
            serde_json::from_value::<StaffRole>(json!(2)).unwrap(),
            StaffRole::Bouncer
        );
        assert!(serde_json::from_value::<StaffRole>(json!(6)).is_err());
        assert!(GlobalRole::TrialAmbassador.is_ambassador());
        assert!(!GlobalRole::DonatorPlusPlus.is_ambassador());
    }

    #[test]
    fn test_user_validation_lowercases_username() {
        let mut user = UserData::new("Night_Owl");
        user.validate().unwrap();
        assert_eq!(user.username, "night_owl");

        let mut user = UserData::new("bad name");
        assert!(matches!(
            user.validate(),
            Err(RepositoryError::ValidationFailed {
                field: "username",
                ..
            })
        ));
    }

    #[test]
    fn test_chat_is_truncated() {
        let mut chat = ChatData {
            meta: Meta::default(),
            community: Id::new(),
            user: Id::new(),
            message: "é".repeat(200),
            me: false,
            deleted: false,
            deleter: None,
        };

        chat.validate().unwrap();
        assert_eq!(chat.message.len(), CHAT_MAX_LENGTH);
    }

    #[test]
    fn test_documents_are_camel_case() {
        let community = CommunityData::new("lounge", "The Lounge", Id::new());
        let value = serde_json::to_value(&community).unwrap();

        assert!(value.get("welcomeMessage").is_some());
        assert!(value.get("djRecycling").is_some());
        assert!(value.get("id").is_some(), "meta should be flattened");
    }

    #[test]
    fn test_media_kind_field_is_type() {
        let media = MediaData {
            meta: Meta::default(),
            kind: MediaKind::SoundCloud,
            mid: "abc".to_string(),
            title: String::new(),
            artist: String::new(),
            blurb: String::new(),
            image: String::new(),
            length: 10,
            plays: 0,
            woots: 0,
            mehs: 0,
            grabs: 0,
            playlists: 0,
        };

        let value = serde_json::to_value(&media).unwrap();
        assert_eq!(value.get("type"), Some(&Value::from(2)));
    }
}
