use std::sync::Arc;

use deck_core::{Id, Query, SortOrder};
use log::debug;

use crate::{
    Entity, Locked, MediaData, Meta, PlaylistData, PlaylistItemData, Repositories,
    RepositoryError, RepositoryResult, Result,
};

/// Playlist bookkeeping that spans several records
pub struct Playlists {
    repos: Arc<Repositories>,
}

impl Playlists {
    pub fn new(repos: &Arc<Repositories>) -> Self {
        Self {
            repos: repos.clone(),
        }
    }

    /// Returns the playlists of a user, by order
    pub async fn list(&self, owner: Id) -> Result<Vec<PlaylistData>> {
        self.repos
            .playlists
            .get_all(
                Query::new()
                    .eq("owner", owner)
                    .sort_by("order", SortOrder::Ascending),
            )
            .await
    }

    /// Returns the playlist a user plays from
    pub async fn selected(&self, owner: Id) -> Result<Option<PlaylistData>> {
        self.repos
            .playlists
            .get(Query::new().eq("owner", owner).eq("selected", true))
            .await
            .optional()
    }

    /// Creates a playlist at the end of the user's list. A user's first playlist is selected.
    pub async fn create(&self, owner: Id, name: &str) -> Result<PlaylistData> {
        let existing = self
            .repos
            .playlists
            .count(Query::new().eq("owner", owner))
            .await?;

        self.repos
            .playlists
            .create(PlaylistData {
                meta: Meta::default(),
                owner,
                name: name.to_string(),
                selected: existing == 0,
                order: existing as u32,
            })
            .await
    }

    /// Makes `playlist` the only selected playlist of its owner
    pub async fn activate(&self, owner: Id, playlist: Id) -> Result<()> {
        let ids: Vec<_> = self.list(owner).await?.iter().map(|p| p.id()).collect();

        if !ids.contains(&playlist) {
            return Err(RepositoryError::NotFound {
                resource: PlaylistData::RESOURCE,
            });
        }

        for mut locked in self.repos.playlists.lock_many(&ids).await? {
            let selected = locked.id() == playlist;

            if locked.selected != selected {
                locked.selected = selected;
                locked.save().await?;
            }
        }

        debug!("User {} selected playlist {}", owner, playlist);
        Ok(())
    }

    /// Deletes a playlist and its items. If it was selected, the next playlist is selected.
    pub async fn delete(&self, playlist: &PlaylistData) -> Result<()> {
        for item in self.items(playlist.id()).await? {
            self.forget_item(&item).await?;
        }

        self.repos.playlists.delete(playlist).await?;

        let remaining = self.list(playlist.owner).await?;
        let ids: Vec<_> = remaining.iter().map(|p| p.id()).collect();
        let mut locked = self.repos.playlists.lock_many(&ids).await?;
        sort_locked(&mut locked, |p| p.order);

        let needs_selection = playlist.selected && !locked.iter().any(|p| p.selected);

        for (index, entry) in locked.iter_mut().enumerate() {
            let select = needs_selection && index == 0;

            if entry.order != index as u32 || select {
                entry.order = index as u32;
                entry.selected |= select;
                entry.save().await?;
            }
        }

        Ok(())
    }

    /// Returns the items of a playlist, by order
    pub async fn items(&self, playlist: Id) -> Result<Vec<PlaylistItemData>> {
        self.repos
            .playlist_items
            .get_all(
                Query::new()
                    .eq("playlist", playlist)
                    .sort_by("order", SortOrder::Ascending),
            )
            .await
    }

    /// Appends media to a playlist
    pub async fn add_item(
        &self,
        playlist: Id,
        media: &MediaData,
        artist: Option<String>,
        title: Option<String>,
    ) -> Result<PlaylistItemData> {
        let order = self
            .repos
            .playlist_items
            .count(Query::new().eq("playlist", playlist))
            .await?;

        let item = self
            .repos
            .playlist_items
            .create(PlaylistItemData {
                meta: Meta::default(),
                playlist,
                media: media.id(),
                order: order as u32,
                artist,
                title,
            })
            .await?;

        let mut media = self.repos.media.lock(media.id()).await?;
        media.playlists += 1;
        media.save().await?;

        Ok(item)
    }

    /// Moves an item to `position` within its playlist
    pub async fn move_item(&self, item: &PlaylistItemData, position: usize) -> Result<()> {
        self.reorder(item.playlist, |ids| {
            let Some(current) = ids.iter().position(|id| *id == item.id()) else {
                return;
            };

            let id = ids.remove(current);
            ids.insert(position.min(ids.len()), id);
        })
        .await
    }

    pub async fn delete_item(&self, item: &PlaylistItemData) -> Result<()> {
        self.forget_item(item).await?;
        self.reorder(item.playlist, |_| {}).await
    }

    /// Takes the first item of a playlist and moves it to the end
    pub async fn rotate(&self, playlist: Id) -> Result<Option<PlaylistItemData>> {
        let mut head = None;

        self.reorder(playlist, |ids| {
            if !ids.is_empty() {
                let first = ids.remove(0);
                ids.push(first);
                head = Some(first);
            }
        })
        .await?;

        match head {
            Some(id) => self.repos.playlist_items.get_by_id(id).await.map(Some),
            None => Ok(None),
        }
    }

    async fn forget_item(&self, item: &PlaylistItemData) -> Result<()> {
        self.repos.playlist_items.delete(item).await?;

        if let Some(mut media) = self.repos.media.lock(item.media).await.optional()? {
            media.playlists = media.playlists.saturating_sub(1);
            media.save().await?;
        }

        Ok(())
    }

    /// Locks every item of a playlist, lets `arrange` reorder their ids, and renumbers them
    async fn reorder<F>(&self, playlist: Id, arrange: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<Id>),
    {
        let ids: Vec<_> = self.items(playlist).await?.iter().map(|i| i.id()).collect();

        let mut locked = self.repos.playlist_items.lock_many(&ids).await?;
        sort_locked(&mut locked, |i| i.order);

        let mut arranged: Vec<_> = locked.iter().map(|i| i.id()).collect();
        arrange(&mut arranged);

        for mut item in locked {
            let order = arranged
                .iter()
                .position(|id| *id == item.id())
                .unwrap_or(arranged.len()) as u32;

            if item.order != order {
                item.order = order;
                item.save().await?;
            }
        }

        Ok(())
    }
}

fn sort_locked<T, F>(locked: &mut [Locked<'_, T>], key: F)
where
    T: Entity,
    F: Fn(&T) -> u32,
{
    locked.sort_by_key(|l| (key(&**l), l.id()));
}
