//! Handlers of the actions a connected user can send

pub mod admin;
pub mod chat;
pub mod community;
pub mod dj;
pub mod moderation;
pub mod playlist;
pub mod user;

use deck_collab::{Room, StaffRole};
use deck_core::Id;
use serde::Serialize;
use serde_json::Value;

use crate::{ActionError, ActionResult, Request};

/// Turns anything serializable into reply data
pub fn reply<T: Serialize>(value: T) -> ActionResult {
    serde_json::to_value(value).map_err(|e| ActionError::Server(e.to_string()))
}

/// The reply of actions with nothing to report
pub fn done() -> ActionResult {
    Ok(Value::Null)
}

/// The rank of a user in a room. Ambassadors rank like hosts everywhere.
async fn rank(request: &Request, room: &Room, user: Id) -> ActionResult<StaffRole> {
    let data = request.collab().repos().users.get_by_id(user).await?;

    if data.role.is_ambassador() {
        return Ok(StaffRole::Host);
    }

    Ok(room.staff_role(user).await?)
}

/// Fails unless the acting user ranks strictly above `target` in the room
async fn require_outranks(request: &Request, room: &Room, target: Id) -> ActionResult<()> {
    if target == request.user_id() {
        return Err(ActionError::bad_request("You can't do that to yourself"));
    }

    let actor = rank(request, room, request.user_id()).await?;
    let target = rank(request, room, target).await?;

    if actor > target {
        Ok(())
    } else {
        Err(ActionError::forbidden("You don't outrank that user"))
    }
}
