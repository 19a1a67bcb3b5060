use deck_collab::{StaffRole, VoteKind};

use crate::{ActionError, ActionResult, Request};

use super::done;

/// Joins the waitlist. With the waitlist locked, only resident DJs and up may join.
pub async fn join(request: Request) -> ActionResult {
    let room = request.room()?;
    let community = request.collab().repos().communities.get_by_id(room.id).await?;

    if !community.waitlist_enabled
        && !room
            .has_permission(request.user_id(), StaffRole::ResidentDj)
            .await?
    {
        return Err(ActionError::forbidden("The waitlist is locked"));
    }

    room.join_waitlist(request.user_id()).await?;
    done()
}

pub async fn leave(request: Request) -> ActionResult {
    let room = request.room()?;
    room.leave_waitlist(request.user_id()).await?;

    done()
}

async fn vote(request: Request, kind: VoteKind) -> ActionResult {
    let room = request.room()?;
    room.vote(request.user_id(), kind).await?;

    done()
}

pub async fn woot(request: Request) -> ActionResult {
    vote(request, VoteKind::Woot).await
}

pub async fn meh(request: Request) -> ActionResult {
    vote(request, VoteKind::Meh).await
}

pub async fn grab(request: Request) -> ActionResult {
    vote(request, VoteKind::Grab).await
}
