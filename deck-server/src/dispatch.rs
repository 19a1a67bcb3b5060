use std::{collections::HashMap, sync::Arc};

use deck_collab::{Collab, RealtimeUser, Room, StaffRole, UserData};
use deck_core::Id;
use futures_util::future::BoxFuture;
use lazy_static::lazy_static;
use serde::de::DeserializeOwned;
use serde_json::Value;
use validator::Validate;

use crate::{
    actions::{admin, chat, community, dj, moderation, playlist, user},
    ActionError, ActionResult, ServerContext,
};

pub type Handler = fn(Request) -> BoxFuture<'static, ActionResult>;

/// An entry in the action table
pub struct Action {
    pub handler: Handler,
    /// Handlers that change state run one at a time per connection
    pub mutates: bool,
}

/// An action sent by a connected user, along with everything a handler needs
pub struct Request {
    pub context: ServerContext,
    pub user: Arc<RealtimeUser>,
    data: Value,
}

impl Request {
    pub fn new(context: ServerContext, user: Arc<RealtimeUser>, data: Value) -> Self {
        Self {
            context,
            user,
            data,
        }
    }

    pub fn collab(&self) -> &Collab {
        &self.context.collab
    }

    pub fn user_id(&self) -> Id {
        self.user.id
    }

    /// Decodes and validates the payload of the action
    pub fn payload<T>(&self) -> ActionResult<T>
    where
        T: DeserializeOwned + Validate,
    {
        let payload: T = serde_json::from_value(self.data.clone())?;
        payload.validate()?;

        Ok(payload)
    }

    /// Like [Request::payload], but an absent payload decodes to the default
    pub fn payload_or_default<T>(&self) -> ActionResult<T>
    where
        T: DeserializeOwned + Validate + Default,
    {
        if self.data.is_null() {
            return Ok(T::default());
        }

        self.payload()
    }

    /// Returns the stored record of the user
    pub async fn user_data(&self) -> ActionResult<UserData> {
        Ok(self.collab().repos().users.get_by_id(self.user_id()).await?)
    }

    /// Returns the room the user is currently in
    pub fn room(&self) -> ActionResult<Arc<Room>> {
        self.user
            .community()
            .and_then(|c| self.collab().rooms.get(c))
            .ok_or_else(|| ActionError::bad_request("You are not in a community"))
    }

    /// Fails unless the user has at least `role` in the room
    pub async fn require(&self, room: &Room, role: StaffRole) -> ActionResult<()> {
        if room.has_permission(self.user_id(), role).await? {
            Ok(())
        } else {
            Err(ActionError::forbidden("You don't have permission to do that"))
        }
    }
}

macro_rules! handler {
    ($handler:path) => {
        |request| -> BoxFuture<'static, ActionResult> { Box::pin($handler(request)) }
    };
}

fn register(
    actions: &mut HashMap<&'static str, Action>,
    name: &'static str,
    mutates: bool,
    handler: Handler,
) {
    actions.insert(name, Action { handler, mutates });
}

lazy_static! {
    static ref ACTIONS: HashMap<&'static str, Action> = {
        let mut actions = HashMap::new();
        let a = &mut actions;

        register(a, "whoami", false, handler!(user::whoami));

        register(a, "chat.send", true, handler!(chat::send));
        register(a, "chat.delete", true, handler!(chat::delete));

        register(a, "community.create", true, handler!(community::create));
        register(a, "community.edit", true, handler!(community::edit));
        register(a, "community.gethistory", false, handler!(community::get_history));
        register(a, "community.getinfo", false, handler!(community::get_info));
        register(a, "community.getstaff", false, handler!(community::get_staff));
        register(a, "community.getusers", false, handler!(community::get_users));
        register(a, "community.getstate", false, handler!(community::get_state));
        register(a, "community.join", true, handler!(community::join));
        register(a, "community.leave", true, handler!(community::leave));
        register(a, "community.taken", false, handler!(community::taken));
        register(a, "community.search", false, handler!(unimplemented));

        register(a, "adm.broadcast", true, handler!(admin::broadcast));
        register(a, "adm.globalban", true, handler!(admin::global_ban));
        register(a, "adm.maintenance", true, handler!(admin::maintenance));

        register(a, "dj.join", true, handler!(dj::join));
        register(a, "dj.leave", true, handler!(dj::leave));
        register(a, "vote.woot", true, handler!(dj::woot));
        register(a, "vote.meh", true, handler!(dj::meh));
        register(a, "vote.grab", true, handler!(dj::grab));

        register(a, "moderation.skip", true, handler!(moderation::skip));
        register(a, "moderation.removedj", true, handler!(moderation::remove_dj));
        register(a, "moderation.movedj", true, handler!(moderation::move_dj));
        register(a, "moderation.ban", true, handler!(moderation::ban));
        register(a, "moderation.unban", true, handler!(moderation::unban));
        register(a, "moderation.mute", true, handler!(moderation::mute));
        register(a, "moderation.unmute", true, handler!(moderation::unmute));
        register(a, "moderation.deletechat", true, handler!(moderation::delete_chat));
        register(a, "moderation.setrole", true, handler!(moderation::set_role));

        register(a, "playlist.create", true, handler!(playlist::create));
        register(a, "playlist.list", false, handler!(playlist::list));
        register(a, "playlist.rename", true, handler!(playlist::rename));
        register(a, "playlist.activate", true, handler!(playlist::activate));
        register(a, "playlist.delete", true, handler!(playlist::delete));
        register(a, "playlist.items", false, handler!(playlist::items));
        register(a, "playlistitem.add", true, handler!(playlist::add_item));
        register(a, "playlistitem.edit", true, handler!(playlist::edit_item));
        register(a, "playlistitem.move", true, handler!(playlist::move_item));
        register(a, "playlistitem.delete", true, handler!(playlist::delete_item));

        register(a, "media.search", false, handler!(unimplemented));
        register(a, "media.import", false, handler!(unimplemented));

        actions
    };
}

/// Looks up an action by name, ignoring case
pub fn find(name: &str) -> Option<&'static Action> {
    ACTIONS.get(name.to_lowercase().as_str())
}

/// Runs an action to completion
pub async fn run(action: &Action, request: Request) -> ActionResult {
    (action.handler)(request).await
}

async fn unimplemented(_: Request) -> ActionResult {
    Err(ActionError::Unimplemented)
}
