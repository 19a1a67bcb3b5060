use deck_collab::restriction_end;
use log::warn;

use crate::{
    schemas::{BroadcastSchema, MaintenanceSchema, RestrictionSchema},
    ActionError, ActionResult, Request,
};

use super::{done, reply};

fn require_admin(request: &Request) -> ActionResult<()> {
    if request.user.role().is_admin() {
        Ok(())
    } else {
        Err(ActionError::forbidden("Only admins can do that"))
    }
}

pub async fn broadcast(request: Request) -> ActionResult {
    require_admin(&request)?;

    let payload: BroadcastSchema = request.payload()?;
    request.collab().broadcast(&payload.kind, &payload.message);

    done()
}

/// Bans a user from the whole service. Only users of a lower global role can be banned.
pub async fn global_ban(request: Request) -> ActionResult {
    require_admin(&request)?;

    let payload: RestrictionSchema = request.payload()?;
    let target = request.collab().repos().users.get_by_id(payload.id).await?;

    if target.role >= request.user.role() {
        return Err(ActionError::forbidden("You don't outrank that user"));
    }

    let ban = request
        .collab()
        .global_ban(
            payload.id,
            request.user_id(),
            restriction_end(payload.duration),
            &payload.reason,
        )
        .await?;

    reply(ban)
}

pub async fn maintenance(request: Request) -> ActionResult {
    require_admin(&request)?;

    let payload: MaintenanceSchema = request.payload()?;
    warn!(
        "Maintenance mode turned {} by {}",
        if payload.start { "on" } else { "off" },
        request.user_id()
    );

    request.collab().set_maintenance(payload.start).await;
    done()
}
