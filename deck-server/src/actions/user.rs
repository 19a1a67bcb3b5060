use crate::{serialized::{Me, ToSerialized}, ActionResult, Request};

use super::reply;

pub async fn whoami(request: Request) -> ActionResult {
    let user = request.user_data().await?;
    let me: Me = user.to_serialized();

    reply(me)
}
