use deck_collab::{ChatData, Event, Meta, StaffRole};
use deck_core::Id;
use log::debug;

use crate::{
    schemas::{ChatSendSchema, IdSchema},
    ActionError, ActionResult, Request,
};

use super::{done, reply};

pub async fn send(request: Request) -> ActionResult {
    let payload: ChatSendSchema = request.payload()?;
    let room = request.room()?;
    let collab = request.collab();

    if let Some(mute) = collab
        .context
        .moderation
        .active_mute(room.id, request.user_id())
        .await?
    {
        return Err(ActionError::forbidden(match mute.until {
            Some(until) => format!("You are muted until {}", until.to_rfc3339()),
            None => "You are muted".to_string(),
        }));
    }

    // The message is truncated on validation
    let chat = collab
        .repos()
        .chat
        .create(ChatData {
            meta: Meta::default(),
            community: room.id,
            user: request.user_id(),
            message: payload.message,
            me: payload.me,
            deleted: false,
            deleter: None,
        })
        .await?;

    room.broadcast(Event::ChatReceive(chat.clone())).await;
    reply(chat)
}

/// Deletes a chat message. Users may delete their own messages, staff anyone's.
pub async fn delete(request: Request) -> ActionResult {
    let payload: IdSchema = request.payload()?;
    let chat = request.collab().repos().chat.get_by_id(payload.id).await?;

    if chat.user != request.user_id() {
        let room = request.room()?;
        request.require(&room, StaffRole::Bouncer).await?;
    }

    soft_delete(&request, payload.id).await
}

/// Marks a message as deleted and tells the room
pub(super) async fn soft_delete(request: &Request, id: Id) -> ActionResult {
    let room = request.room()?;
    let mut chat = request.collab().repos().chat.lock(id).await?;

    if chat.community != room.id {
        return Err(ActionError::NotFound("Chat"));
    }

    if !chat.deleted {
        chat.deleted = true;
        chat.deleter = Some(request.user_id());
        chat.save().await?;
    }

    drop(chat);
    debug!("Chat {} was deleted by {}", id, request.user_id());

    room.broadcast(Event::ChatDelete {
        id,
        deleter: request.user_id(),
    })
    .await;

    done()
}
