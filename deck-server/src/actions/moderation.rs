use deck_collab::{restriction_end, Event, Meta, RepositoryResult, StaffData, StaffRole};
use deck_core::Query;
use log::info;

use crate::{
    schemas::{IdSchema, MoveSchema, RestrictionSchema, SetRoleSchema},
    ActionError, ActionResult, Request,
};

use super::{chat::soft_delete, done, rank, reply, require_outranks};

pub async fn skip(request: Request) -> ActionResult {
    let room = request.room()?;
    request.require(&room, StaffRole::Bouncer).await?;

    info!("User {} skipped the DJ in {}", request.user_id(), room.id);
    room.advance().await?;

    done()
}

pub async fn remove_dj(request: Request) -> ActionResult {
    let payload: IdSchema = request.payload()?;
    let room = request.room()?;
    request.require(&room, StaffRole::Bouncer).await?;

    room.leave_waitlist(payload.id).await?;
    done()
}

pub async fn move_dj(request: Request) -> ActionResult {
    let payload: MoveSchema = request.payload()?;
    let room = request.room()?;
    request.require(&room, StaffRole::Bouncer).await?;

    room.move_user(payload.id, payload.position).await?;
    done()
}

/// Bans a user from the community and removes them from the room
pub async fn ban(request: Request) -> ActionResult {
    let payload: RestrictionSchema = request.payload()?;
    let room = request.room()?;
    request.require(&room, StaffRole::Bouncer).await?;
    require_outranks(&request, &room, payload.id).await?;

    let ban = request
        .collab()
        .context
        .moderation
        .ban(
            room.id,
            payload.id,
            request.user_id(),
            restriction_end(payload.duration),
            &payload.reason,
        )
        .await?;

    info!("User {} was banned from {} by {}", payload.id, room.id, request.user_id());

    room.broadcast(Event::UserBan {
        id: payload.id,
        until: ban.until,
        reason: ban.reason.clone(),
    })
    .await;

    room.leave(payload.id).await?;
    reply(ban)
}

pub async fn unban(request: Request) -> ActionResult {
    let payload: IdSchema = request.payload()?;
    let room = request.room()?;
    request.require(&room, StaffRole::Bouncer).await?;

    let lifted = request
        .collab()
        .context
        .moderation
        .unban(room.id, payload.id)
        .await?;

    if lifted == 0 {
        return Err(ActionError::NotFound("Ban"));
    }

    done()
}

pub async fn mute(request: Request) -> ActionResult {
    let payload: RestrictionSchema = request.payload()?;
    let room = request.room()?;
    request.require(&room, StaffRole::Bouncer).await?;
    require_outranks(&request, &room, payload.id).await?;

    let mute = request
        .collab()
        .context
        .moderation
        .mute(
            room.id,
            payload.id,
            request.user_id(),
            restriction_end(payload.duration),
            &payload.reason,
        )
        .await?;

    room.broadcast(Event::UserMute {
        id: payload.id,
        until: mute.until,
        reason: mute.reason.clone(),
    })
    .await;

    reply(mute)
}

pub async fn unmute(request: Request) -> ActionResult {
    let payload: IdSchema = request.payload()?;
    let room = request.room()?;
    request.require(&room, StaffRole::Bouncer).await?;

    let lifted = request
        .collab()
        .context
        .moderation
        .unmute(room.id, payload.id)
        .await?;

    if lifted == 0 {
        return Err(ActionError::NotFound("Mute"));
    }

    room.broadcast(Event::UserUnmute(payload.id)).await;
    done()
}

pub async fn delete_chat(request: Request) -> ActionResult {
    let payload: IdSchema = request.payload()?;
    let room = request.room()?;
    request.require(&room, StaffRole::Bouncer).await?;

    soft_delete(&request, payload.id).await
}

/// Gives a user a role in the community. Managers and up can hand out roles below their own.
pub async fn set_role(request: Request) -> ActionResult {
    let payload: SetRoleSchema = request.payload()?;
    let role = StaffRole::try_from(payload.role).map_err(ActionError::BadRequest)?;

    let room = request.room()?;
    request.require(&room, StaffRole::Manager).await?;
    require_outranks(&request, &room, payload.id).await?;

    if role >= rank(&request, &room, request.user_id()).await? {
        return Err(ActionError::forbidden("You can only give out roles below your own"));
    }

    let staff = &request.collab().repos().staff;
    let existing = staff
        .get(Query::new().eq("community", room.id).eq("user", payload.id))
        .await
        .optional()?;

    match existing {
        Some(existing) if role == StaffRole::User => staff.delete(&existing).await?,
        Some(existing) => {
            let mut locked = staff.lock(existing.meta.id).await?;
            locked.role = role;
            locked.save().await?;
        }
        None if role == StaffRole::User => {}
        None => {
            staff
                .create(StaffData {
                    meta: Meta::default(),
                    community: room.id,
                    user: payload.id,
                    role,
                })
                .await?;
        }
    }

    room.broadcast(Event::StaffUpdate {
        user: payload.id,
        role,
    })
    .await;

    done()
}
