use deck_collab::{
    normalize_community_url, CommunityData, Entity, Event, Meta, RepositoryResult, StaffData,
    StaffRole,
};
use deck_core::{Query, SortOrder};
use log::info;
use serde_json::json;

use crate::{
    schemas::{
        CommunityCreateSchema, CommunityEditSchema, CommunityRefSchema, CommunityTakenSchema,
        IdSchema,
    },
    serialized::{Community, JoinedCommunity, PublicUser, Staff, ToSerialized},
    ActionError, ActionResult, Request,
};

use super::{done, rank, reply};

/// Finds a community by id, or by url if no id is given
async fn find(request: &Request, reference: CommunityRefSchema) -> ActionResult<CommunityData> {
    let communities = &request.collab().repos().communities;

    if let Some(id) = reference.id {
        return Ok(communities.get_by_id(id).await?);
    }

    let url = reference
        .url
        .as_deref()
        .and_then(normalize_community_url)
        .ok_or_else(|| ActionError::bad_request("An id or url is required"))?;

    Ok(communities.get(Query::new().eq("url", url)).await?)
}

pub async fn create(request: Request) -> ActionResult {
    let payload: CommunityCreateSchema = request.payload()?;
    let repos = request.collab().repos();
    let host = request.user_id();

    let url = normalize_community_url(&payload.url)
        .ok_or_else(|| ActionError::bad_request("Invalid community url"))?;

    let hosted = repos
        .communities
        .count(Query::new().eq("host", host))
        .await?;

    if hosted >= request.collab().config().max_hosted_communities {
        return Err(ActionError::forbidden("You can't host any more communities"));
    }

    let mut community = CommunityData::new(&url, &payload.name, host);
    community.nsfw = payload.nsfw;

    let community = repos.communities.create(community).await?;

    repos
        .staff
        .create(StaffData {
            meta: Meta::default(),
            community: community.id(),
            user: host,
            role: StaffRole::Host,
        })
        .await?;

    request.collab().rooms.get_or_create(community.id());

    info!("User {} created community {}", host, community.url);
    reply(community)
}

pub async fn edit(request: Request) -> ActionResult {
    let payload: CommunityEditSchema = request.payload()?;
    let collab = request.collab();

    let room = collab.rooms.load(payload.id).await?;
    request.require(&room, StaffRole::Manager).await?;

    let mut community = collab.repos().communities.lock(payload.id).await?;

    if let Some(name) = payload.name {
        community.name = name;
    }

    if let Some(description) = payload.description {
        community.description = description;
    }

    if let Some(welcome_message) = payload.welcome_message {
        community.welcome_message = welcome_message;
    }

    if let Some(waitlist_enabled) = payload.waitlist_enabled {
        community.waitlist_enabled = waitlist_enabled;
    }

    if let Some(dj_recycling) = payload.dj_recycling {
        community.dj_recycling = dj_recycling;
    }

    if let Some(nsfw) = payload.nsfw {
        community.nsfw = nsfw;
    }

    community.save().await?;
    let community = community.into_inner();

    room.broadcast(Event::CommunityUpdate(community.clone())).await;
    reply(community)
}

/// The latest plays of a community, newest first
pub async fn get_history(request: Request) -> ActionResult {
    let payload: IdSchema = request.payload()?;
    let collab = request.collab();

    let history = collab
        .repos()
        .community_history
        .get_multi(
            collab.config().page_size,
            Query::new()
                .eq("community", payload.id)
                .sort_by("created", SortOrder::Descending),
        )
        .await?;

    reply(history)
}

pub async fn get_info(request: Request) -> ActionResult {
    let payload: CommunityRefSchema = request.payload()?;
    let community = find(&request, payload).await?;

    let population = match request.collab().rooms.get(community.id()) {
        Some(room) => room.population().await.len(),
        None => 0,
    };

    let community: Community = (community, population).to_serialized();
    reply(community)
}

pub async fn get_staff(request: Request) -> ActionResult {
    let payload: IdSchema = request.payload()?;
    let collab = request.collab();

    let staff = collab
        .repos()
        .staff
        .get_multi(
            collab.config().page_size,
            Query::new()
                .eq("community", payload.id)
                .sort_by("role", SortOrder::Descending),
        )
        .await?;

    let staff: Vec<Staff> = staff.to_serialized();
    reply(staff)
}

/// The ids of the users in a live room. Without an id, the room the user is in.
pub async fn get_users(request: Request) -> ActionResult {
    let payload: CommunityRefSchema = request.payload_or_default()?;

    let room = match payload.id {
        Some(id) => request
            .collab()
            .rooms
            .get(id)
            .ok_or(ActionError::NotFound("Room"))?,
        None => request.room()?,
    };

    reply(room.population().await)
}

pub async fn get_state(request: Request) -> ActionResult {
    let payload: IdSchema = request.payload()?;

    let room = request
        .collab()
        .rooms
        .get(payload.id)
        .ok_or(ActionError::NotFound("Room"))?;

    reply(room.snapshot().await)
}

/// Enters a community, leaving the one the user was in before
pub async fn join(request: Request) -> ActionResult {
    let payload: CommunityRefSchema = request.payload()?;
    let community = find(&request, payload).await?;
    let collab = request.collab();
    let user = request.user_id();

    if let Some(ban) = collab
        .context
        .moderation
        .active_ban(community.id(), user)
        .await?
    {
        return Err(ActionError::forbidden(match ban.until {
            Some(until) => format!(
                "You are banned from this community until {}",
                until.to_rfc3339()
            ),
            None => "You are banned from this community".to_string(),
        }));
    }

    if let Some(previous) = request.user.community() {
        if previous != community.id() {
            if let Some(room) = collab.rooms.get(previous) {
                room.leave(user).await?;
            }
        }
    }

    let room = collab.rooms.load(community.id()).await?;
    room.join(user).await?;

    let role = rank(&request, &room, user).await?;
    let state = room.snapshot().await;

    let mut users = vec![];
    for id in &state.population {
        if let Some(member) = collab.repos().users.get_by_id(*id).await.optional()? {
            users.push(member);
        }
    }

    let users: Vec<PublicUser> = users.to_serialized();

    reply(JoinedCommunity {
        users,
        state,
        community,
        role,
    })
}

pub async fn leave(request: Request) -> ActionResult {
    let room = request.room()?;
    room.leave(request.user_id()).await?;
    request.user.set_community(None);

    done()
}

pub async fn taken(request: Request) -> ActionResult {
    let payload: CommunityTakenSchema = request.payload()?;

    let url = normalize_community_url(&payload.url)
        .ok_or_else(|| ActionError::bad_request("Invalid community url"))?;

    let count = request
        .collab()
        .repos()
        .communities
        .count(Query::new().eq("url", url))
        .await?;

    reply(json!({ "taken": count > 0 }))
}
