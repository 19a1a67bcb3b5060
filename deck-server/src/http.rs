use axum::{
    extract::{Path, State},
    routing::get,
    Json,
};
use serde::Serialize;

use crate::{Router, ServerContext, ServerResult};

#[derive(Debug, Serialize)]
pub struct Taken {
    taken: bool,
}

async fn email_taken(
    State(context): State<ServerContext>,
    Path(email): Path<String>,
) -> ServerResult<Json<Taken>> {
    let taken = context.collab.auth.email_taken(&email).await?;
    Ok(Json(Taken { taken }))
}

async fn username_taken(
    State(context): State<ServerContext>,
    Path(username): Path<String>,
) -> ServerResult<Json<Taken>> {
    let taken = context.collab.auth.username_taken(&username).await?;
    Ok(Json(Taken { taken }))
}

pub fn router() -> Router {
    Router::new()
        .route("/taken/email/:email", get(email_taken))
        .route("/taken/username/:username", get(username_taken))
}
