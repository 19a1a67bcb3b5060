use deck_collab::{PlaylistData, PlaylistItemData, RepositoryResult};
use deck_core::Id;
use log::debug;

use crate::{
    schemas::{
        IdSchema, ItemAddSchema, ItemEditSchema, MoveSchema, PlaylistNameSchema,
        PlaylistRenameSchema,
    },
    serialized::{PlaylistEntry, ToSerialized},
    ActionError, ActionResult, Request,
};

use super::{done, reply};

/// Returns the playlist if it belongs to the user. Other users' playlists don't exist to them.
async fn owned_playlist(request: &Request, id: Id) -> ActionResult<PlaylistData> {
    let playlist = request.collab().repos().playlists.get_by_id(id).await?;

    if playlist.owner != request.user_id() {
        return Err(ActionError::NotFound("Playlist"));
    }

    Ok(playlist)
}

async fn owned_item(request: &Request, id: Id) -> ActionResult<PlaylistItemData> {
    let item = request.collab().repos().playlist_items.get_by_id(id).await?;
    owned_playlist(request, item.playlist).await?;

    Ok(item)
}

pub async fn create(request: Request) -> ActionResult {
    let payload: PlaylistNameSchema = request.payload()?;

    let playlist = request
        .collab()
        .context
        .playlists
        .create(request.user_id(), &payload.name)
        .await?;

    reply(playlist)
}

pub async fn list(request: Request) -> ActionResult {
    let playlists = request
        .collab()
        .context
        .playlists
        .list(request.user_id())
        .await?;

    reply(playlists)
}

pub async fn rename(request: Request) -> ActionResult {
    let payload: PlaylistRenameSchema = request.payload()?;
    owned_playlist(&request, payload.id).await?;

    let mut playlist = request.collab().repos().playlists.lock(payload.id).await?;
    playlist.name = payload.name;
    playlist.save().await?;

    reply(playlist.into_inner())
}

pub async fn activate(request: Request) -> ActionResult {
    let payload: IdSchema = request.payload()?;

    request
        .collab()
        .context
        .playlists
        .activate(request.user_id(), payload.id)
        .await?;

    done()
}

pub async fn delete(request: Request) -> ActionResult {
    let payload: IdSchema = request.payload()?;
    let playlist = owned_playlist(&request, payload.id).await?;

    request.collab().context.playlists.delete(&playlist).await?;
    debug!("User {} deleted playlist {}", request.user_id(), payload.id);

    done()
}

/// The items of a playlist with their media, by order
pub async fn items(request: Request) -> ActionResult {
    let payload: IdSchema = request.payload()?;
    owned_playlist(&request, payload.id).await?;

    let collab = request.collab();
    let mut entries = vec![];

    for item in collab.context.playlists.items(payload.id).await? {
        // Items pointing at missing media are skipped
        if let Some(media) = collab.repos().media.get_by_id(item.media).await.optional()? {
            entries.push((item, media));
        }
    }

    let entries: Vec<PlaylistEntry> = entries.to_serialized();
    reply(entries)
}

pub async fn add_item(request: Request) -> ActionResult {
    let payload: ItemAddSchema = request.payload()?;
    owned_playlist(&request, payload.playlist_id).await?;

    let collab = request.collab();
    let media = collab.context.media.resolve(payload.kind, &payload.mid).await?;

    let item = collab
        .context
        .playlists
        .add_item(payload.playlist_id, &media, payload.artist, payload.title)
        .await?;

    let entry: PlaylistEntry = (item, media).to_serialized();
    reply(entry)
}

pub async fn edit_item(request: Request) -> ActionResult {
    let payload: ItemEditSchema = request.payload()?;
    owned_item(&request, payload.id).await?;

    let mut item = request.collab().repos().playlist_items.lock(payload.id).await?;
    item.artist = payload.artist;
    item.title = payload.title;
    item.save().await?;

    reply(item.into_inner())
}

pub async fn move_item(request: Request) -> ActionResult {
    let payload: MoveSchema = request.payload()?;
    let item = owned_item(&request, payload.id).await?;

    request
        .collab()
        .context
        .playlists
        .move_item(&item, payload.position)
        .await?;

    done()
}

pub async fn delete_item(request: Request) -> ActionResult {
    let payload: IdSchema = request.payload()?;
    let item = owned_item(&request, payload.id).await?;

    request.collab().context.playlists.delete_item(&item).await?;
    done()
}
