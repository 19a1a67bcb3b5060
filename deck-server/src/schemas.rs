//! Payloads of the actions that take one, validated before a handler sees them

use deck_collab::MediaKind;
use deck_core::Id;
use serde::Deserialize;
use validator::Validate;

/// For actions that only need an id
#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdSchema {
    pub id: Id,
}

/// A community, by id or by url
#[derive(Debug, Default, Validate, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityRefSchema {
    pub id: Option<Id>,
    #[validate(length(min = 2, max = 25))]
    pub url: Option<String>,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSendSchema {
    #[validate(length(min = 1))]
    pub message: String,
    #[serde(default)]
    pub me: bool,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityCreateSchema {
    #[validate(length(min = 2, max = 25))]
    pub url: String,
    #[validate(length(min = 2, max = 30))]
    pub name: String,
    #[serde(default)]
    pub nsfw: bool,
}

/// Fields left out are not changed
#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityEditSchema {
    pub id: Id,
    #[validate(length(min = 2, max = 30))]
    pub name: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(length(max = 300))]
    pub welcome_message: Option<String>,
    pub waitlist_enabled: Option<bool>,
    pub dj_recycling: Option<bool>,
    pub nsfw: Option<bool>,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityTakenSchema {
    #[validate(length(min = 2, max = 25))]
    pub url: String,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastSchema {
    #[serde(rename = "type")]
    #[validate(length(min = 1, max = 50))]
    pub kind: String,
    #[validate(length(min = 1, max = 1000))]
    pub message: String,
}

/// A ban, mute, or global ban. A missing duration means permanent.
#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestrictionSchema {
    pub id: Id,
    /// In seconds
    pub duration: Option<u64>,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub reason: String,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceSchema {
    pub start: bool,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveSchema {
    pub id: Id,
    pub position: usize,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetRoleSchema {
    pub id: Id,
    pub role: u8,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistNameSchema {
    #[validate(length(min = 1, max = 50))]
    pub name: String,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistRenameSchema {
    pub id: Id,
    #[validate(length(min = 1, max = 50))]
    pub name: String,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemAddSchema {
    pub playlist_id: Id,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    #[validate(length(min = 1, max = 64))]
    pub mid: String,
    #[validate(length(max = 100))]
    pub artist: Option<String>,
    #[validate(length(max = 100))]
    pub title: Option<String>,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemEditSchema {
    pub id: Id,
    #[validate(length(max = 100))]
    pub artist: Option<String>,
    #[validate(length(max = 100))]
    pub title: Option<String>,
}
