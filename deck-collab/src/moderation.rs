use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use deck_core::{Id, Query};
use log::debug;

use crate::{
    BanData, Entity, GlobalBanData, Meta, MuteData, Repositories, Repository, RepositoryError,
    RepositoryResult, Result,
};

/// A record that restricts a user until it expires
pub trait Restriction: Entity {
    fn until(&self) -> Option<DateTime<Utc>>;

    fn is_active(&self) -> bool {
        self.until().map_or(true, |until| until > Utc::now())
    }
}

impl Restriction for BanData {
    fn until(&self) -> Option<DateTime<Utc>> {
        self.until
    }
}

impl Restriction for MuteData {
    fn until(&self) -> Option<DateTime<Utc>> {
        self.until
    }
}

impl Restriction for GlobalBanData {
    fn until(&self) -> Option<DateTime<Utc>> {
        self.until
    }
}

/// Returns the point in time a restriction of `duration` seconds ends, or None if it's permanent.
/// Durations too long to represent are permanent.
pub fn restriction_end(duration: Option<u64>) -> Option<DateTime<Utc>> {
    let seconds = i64::try_from(duration?).ok()?;
    let duration = Duration::try_seconds(seconds)?;

    Utc::now().checked_add_signed(duration)
}

/// Returns the first active restriction matching the query.
/// Expired ones found along the way are deleted.
async fn active<T: Restriction>(repository: &Repository<T>, query: Query) -> Result<Option<T>> {
    let mut found = None;

    for restriction in repository.get_all(query).await? {
        if restriction.is_active() {
            found.get_or_insert(restriction);
            continue;
        }

        debug!("Removing expired {} {}", T::RESOURCE, restriction.id());
        repository.delete(&restriction).await.optional()?;
    }

    Ok(found)
}

/// Bans, mutes, and global bans
pub struct Moderation {
    repos: Arc<Repositories>,
}

impl Moderation {
    pub fn new(repos: &Arc<Repositories>) -> Self {
        Self {
            repos: repos.clone(),
        }
    }

    pub async fn active_ban(&self, community: Id, user: Id) -> Result<Option<BanData>> {
        let query = Query::new().eq("community", community).eq("bannee", user);
        active(&self.repos.bans, query).await
    }

    pub async fn active_mute(&self, community: Id, user: Id) -> Result<Option<MuteData>> {
        let query = Query::new().eq("community", community).eq("bannee", user);
        active(&self.repos.mutes, query).await
    }

    pub async fn active_global_ban(&self, user: Id) -> Result<Option<GlobalBanData>> {
        active(&self.repos.global_bans, Query::new().eq("bannee", user)).await
    }

    /// Bans a user from a community, replacing an existing ban
    pub async fn ban(
        &self,
        community: Id,
        bannee: Id,
        banner: Id,
        until: Option<DateTime<Utc>>,
        reason: &str,
    ) -> Result<BanData> {
        self.unban(community, bannee).await?;

        self.repos
            .bans
            .create(BanData {
                meta: Meta::default(),
                community,
                bannee,
                banner,
                reason: reason.to_string(),
                until,
            })
            .await
    }

    /// Lifts every ban of the user in the community, returning how many there were
    pub async fn unban(&self, community: Id, bannee: Id) -> Result<usize> {
        let query = Query::new().eq("community", community).eq("bannee", bannee);
        lift(&self.repos.bans, query).await
    }

    pub async fn mute(
        &self,
        community: Id,
        bannee: Id,
        banner: Id,
        until: Option<DateTime<Utc>>,
        reason: &str,
    ) -> Result<MuteData> {
        self.unmute(community, bannee).await?;

        self.repos
            .mutes
            .create(MuteData {
                meta: Meta::default(),
                community,
                bannee,
                banner,
                reason: reason.to_string(),
                until,
            })
            .await
    }

    pub async fn unmute(&self, community: Id, bannee: Id) -> Result<usize> {
        let query = Query::new().eq("community", community).eq("bannee", bannee);
        lift(&self.repos.mutes, query).await
    }

    pub async fn global_ban(
        &self,
        bannee: Id,
        banner: Id,
        until: Option<DateTime<Utc>>,
        reason: &str,
    ) -> Result<GlobalBanData> {
        lift(&self.repos.global_bans, Query::new().eq("bannee", bannee)).await?;

        self.repos
            .global_bans
            .create(GlobalBanData {
                meta: Meta::default(),
                bannee,
                banner,
                reason: reason.to_string(),
                until,
            })
            .await
    }
}

async fn lift<T: Restriction>(repository: &Repository<T>, query: Query) -> Result<usize> {
    let mut lifted = 0;

    for restriction in repository.get_all(query).await? {
        match repository.delete(&restriction).await {
            Ok(()) => lifted += 1,
            Err(RepositoryError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }
    }

    Ok(lifted)
}
