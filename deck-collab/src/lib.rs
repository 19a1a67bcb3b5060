mod auth;
mod config;
mod db;
mod events;
mod media;
mod moderation;
mod playlists;
mod realtime;
mod rooms;
mod util;

use std::sync::Arc;

pub use auth::*;
pub use config::*;
pub use db::*;
pub use events::*;
pub use media::*;
pub use moderation::*;
pub use playlists::*;
pub use realtime::*;
pub use rooms::*;
pub use util::{length_within, normalize_community_url, truncate_bytes};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use deck_core::{DocumentStore, Id};
use log::{info, warn};

/// The deck collab system, facilitating rooms, realtime users, authentication, and more.
pub struct Collab {
    pub context: CollabContext,
    pub auth: Auth,
    pub rooms: RoomManager,
}

/// A type passed to various components of the collab system, to access state and emit events.
#[derive(Clone)]
pub struct CollabContext {
    pub config: Arc<Config>,
    pub repos: Arc<Repositories>,
    pub realtime: Arc<Realtime>,
    /// The rooms that are live, by community id
    pub rooms: Arc<DashMap<Id, Arc<Room>>>,
    pub playlists: Arc<Playlists>,
    pub media: Arc<MediaLibrary>,
    pub moderation: Arc<Moderation>,
}

impl Collab {
    pub fn new(store: Arc<dyn DocumentStore>, source: Arc<dyn MediaSource>, config: Config) -> Self {
        let repos = Arc::new(Repositories::new(store, &config));
        let moderation = Arc::new(Moderation::new(&repos));

        let context = CollabContext {
            config: Arc::new(config),
            realtime: Default::default(),
            rooms: Default::default(),
            playlists: Arc::new(Playlists::new(&repos)),
            media: Arc::new(MediaLibrary::new(&repos, source)),
            moderation: moderation.clone(),
            repos: repos.clone(),
        };

        Self {
            auth: Auth::new(&repos, &moderation),
            rooms: RoomManager::new(&context),
            context,
        }
    }

    pub fn repos(&self) -> &Repositories {
        &self.context.repos
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }

    /// Registers a connection for an authenticated user.
    /// An existing connection of the same user is told it's stale and closed.
    pub fn connect(&self, user: &UserData, peer: ArcedPeer) -> Arc<RealtimeUser> {
        let (realtime_user, previous) = self.context.realtime.attach(user, peer);

        if let Some(previous) = previous {
            info!("User {} connected again, closing old connection", user.username);

            previous.send(Event::StaleSession.into());
            previous.close();
        }

        realtime_user
    }

    /// Called when a connection ends. If the user doesn't reconnect within the grace period,
    /// they are removed from their room.
    pub fn disconnect(&self, user_id: Id, peer_id: Id) {
        let Some((_, generation)) = self.context.realtime.detach(user_id, peer_id) else {
            return;
        };

        let context = self.context.clone();
        let grace = self.context.config.reconnect_grace;

        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            destroy_if_idle(&context, user_id, generation).await;
        });
    }

    /// Sends a message to every connected user
    pub fn broadcast(&self, kind: &str, message: &str) {
        self.context.realtime.broadcast(Event::ServerBroadcast {
            kind: kind.to_string(),
            message: message.to_string(),
        });
    }

    /// Bans a user from the whole service and kicks them out
    pub async fn global_ban(
        &self,
        bannee: Id,
        banner: Id,
        until: Option<DateTime<Utc>>,
        reason: &str,
    ) -> Result<GlobalBanData> {
        let ban = self
            .context
            .moderation
            .global_ban(bannee, banner, until, reason)
            .await?;

        info!("User {} was banned from the service by {}", bannee, banner);

        if let Some(user) = self.context.realtime.get(bannee) {
            if let Some(room) = self.kick(&user).await {
                room.broadcast(Event::GlobalBan(bannee)).await;
            }
        }

        Ok(ban)
    }

    /// Turns maintenance mode on or off. Turning it on disconnects everyone but admins.
    pub async fn set_maintenance(&self, enabled: bool) {
        self.auth.set_maintenance(enabled);

        if !enabled {
            return;
        }

        for user in self.context.realtime.all() {
            if !user.role().is_admin() {
                self.kick(&user).await;
            }
        }
    }

    /// Takes a user out of their room and terminates their connection.
    /// Returns the room they were in.
    async fn kick(&self, user: &RealtimeUser) -> Option<Arc<Room>> {
        let room = user.community().and_then(|c| self.rooms.get(c));

        if let Some(room) = &room {
            if let Err(e) = room.leave(user.id).await {
                warn!("Failed to remove user {} from room {}: {}", user.id, room.id, e);
            }
        }

        user.panic();
        room
    }
}

async fn destroy_if_idle(context: &CollabContext, user_id: Id, generation: u64) {
    let Some(user) = context.realtime.remove_if_idle(user_id, generation) else {
        return;
    };

    info!("User {} did not reconnect in time", user_id);

    let room = user
        .community()
        .and_then(|c| context.rooms.get(&c).map(|r| r.clone()));

    if let Some(room) = room {
        // The room may have been shut down in the meantime, which is fine
        let _ = room.leave(user_id).await;
    }
}

#[cfg(test)]
mod tests;
