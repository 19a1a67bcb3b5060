use chrono::{DateTime, Utc};
use deck_core::Id;
use serde::Serialize;
use serde_json::Value;

use crate::{AdvanceData, ChatData, CommunityData, StaffRole, Votes};

/// Anything the server sends to a connection
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Frame {
    /// The reply to an action, sent only to the connection that sent it
    Reply {
        i: Value,
        s: u16,
        a: String,
        d: Value,
    },
    /// A server-pushed state change
    Event(Event),
    /// An arbitrary object sent as-is, like the handshake greeting
    Unique(Value),
}

/// Events pushed to the members of a room, or to every connection
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "e", content = "d")]
pub enum Event {
    /// A user entered the room
    #[serde(rename = "user.join")]
    UserJoin(Id),
    /// A user left the room
    #[serde(rename = "user.leave")]
    UserLeave(Id),
    /// The waitlist changed, without the media changing
    #[serde(rename = "waitlist.update")]
    WaitlistUpdate(Vec<Id>),
    #[serde(rename = "vote.update")]
    VoteUpdate(Votes),
    /// The room moved on to the next DJ, or stopped playing
    #[serde(rename = "advance")]
    Advance(AdvanceData),
    #[serde(rename = "chat.receive")]
    ChatReceive(ChatData),
    #[serde(rename = "chat.delete")]
    ChatDelete { id: Id, deleter: Id },
    /// The community's settings were edited
    #[serde(rename = "community.update")]
    CommunityUpdate(CommunityData),
    #[serde(rename = "staff.update")]
    StaffUpdate { user: Id, role: StaffRole },
    #[serde(rename = "user.ban")]
    UserBan {
        id: Id,
        until: Option<DateTime<Utc>>,
        reason: String,
    },
    #[serde(rename = "user.mute")]
    UserMute {
        id: Id,
        until: Option<DateTime<Utc>>,
        reason: String,
    },
    #[serde(rename = "user.unmute")]
    UserUnmute(Id),
    /// A message from the admins, sent to every connection
    #[serde(rename = "server.broadcast")]
    ServerBroadcast {
        #[serde(rename = "type")]
        kind: String,
        message: String,
    },
    /// A user in the room was banned from the whole service
    #[serde(rename = "globalBan")]
    GlobalBan(Id),
    /// Sent to a connection right before it's replaced by a newer one
    #[serde(rename = "staleSession")]
    StaleSession,
}

impl From<Event> for Frame {
    fn from(event: Event) -> Self {
        Frame::Event(event)
    }
}

impl Event {
    /// Returns the wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            Event::UserJoin(_) => "user.join",
            Event::UserLeave(_) => "user.leave",
            Event::WaitlistUpdate(_) => "waitlist.update",
            Event::VoteUpdate(_) => "vote.update",
            Event::Advance(_) => "advance",
            Event::ChatReceive(_) => "chat.receive",
            Event::ChatDelete { .. } => "chat.delete",
            Event::CommunityUpdate(_) => "community.update",
            Event::StaffUpdate { .. } => "staff.update",
            Event::UserBan { .. } => "user.ban",
            Event::UserMute { .. } => "user.mute",
            Event::UserUnmute(_) => "user.unmute",
            Event::ServerBroadcast { .. } => "server.broadcast",
            Event::GlobalBan(_) => "globalBan",
            Event::StaleSession => "staleSession",
        }
    }
}
