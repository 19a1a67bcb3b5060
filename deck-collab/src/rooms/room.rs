use std::{
    collections::VecDeque,
    sync::{Arc, Weak},
    time::Duration,
};

use chrono::Utc;
use deck_core::{Id, Query};
use log::{error, info};
use tokio::{
    sync::{Mutex, MutexGuard},
    task::JoinHandle,
};

use crate::{
    CollabContext, CommunityHistoryData, Config, Entity, Event, Meta, RepositoryResult,
    StaffRole, UserHistoryData,
};

use super::{AdvanceData, NowPlaying, PlayingMedia, RoomError, RoomSnapshot, VoteKind};

/// The live side of a community: who's there, who's waiting to DJ, and what's playing.
pub struct Room {
    pub id: Id,
    context: CollabContext,
    this: Weak<Room>,
    state: Mutex<RoomState>,
    /// Held while events of one transition go out, so members see transitions in order
    emit_order: parking_lot::Mutex<()>,
}

#[derive(Default)]
struct RoomState {
    population: Vec<Id>,
    waitlist: VecDeque<Id>,
    media: Option<NowPlaying>,
    timer: Option<JoinHandle<()>>,
    /// Bumped whenever the timer is cancelled or replaced
    generation: u64,
    panicked: bool,
}

impl RoomState {
    fn is_dj(&self, user: Id) -> bool {
        self.media.as_ref().is_some_and(|m| m.dj_id == user)
    }

    fn waitlist(&self) -> Vec<Id> {
        self.waitlist.iter().copied().collect()
    }
}

type Guard<'a> = MutexGuard<'a, RoomState>;

impl Room {
    pub fn new(context: &CollabContext, community: Id) -> Arc<Self> {
        info!("Bringing up room for community {}", community);

        Arc::new_cyclic(|this| Self {
            id: community,
            context: context.clone(),
            this: this.clone(),
            state: Default::default(),
            emit_order: Default::default(),
        })
    }

    /// Adds a user to the population. Returns false if they were already there.
    pub async fn join(&self, user: Id) -> Result<bool, RoomError> {
        let mut state = self.lock().await?;

        if state.population.contains(&user) {
            return Ok(false);
        }

        state.population.push(user);

        if let Some(realtime_user) = self.context.realtime.get(user) {
            realtime_user.set_community(Some(self.id));
        }

        self.emit(state, vec![Event::UserJoin(user)]);
        Ok(true)
    }

    /// Removes a user from the room and its waitlist. If they were the DJ, the room advances
    /// without putting them back in the waitlist.
    pub async fn leave(&self, user: Id) -> Result<(), RoomError> {
        let mut state = self.lock().await?;

        let was_member = remove(&mut state.population, user);
        let was_queued = remove_queued(&mut state.waitlist, user);
        let was_dj = state.is_dj(user);

        if let Some(realtime_user) = self.context.realtime.get(user) {
            realtime_user.leave_community(self.id);
        }

        let mut events = vec![];

        if was_member {
            events.push(Event::UserLeave(user));
        }

        if was_dj {
            return self.advance_with(state, false, events).await;
        }

        if was_queued {
            events.push(Event::WaitlistUpdate(state.waitlist()));
        }

        self.emit(state, events);
        Ok(())
    }

    /// Puts a user at the end of the waitlist, or makes them DJ right away if nothing plays
    pub async fn join_waitlist(&self, user: Id) -> Result<(), RoomError> {
        let mut state = self.lock().await?;

        if !state.population.contains(&user) {
            return Err(RoomError::NotInRoom);
        }

        if state.waitlist.len() > self.context.config.waitlist_limit {
            return Err(RoomError::WaitlistFull);
        }

        if state.is_dj(user) {
            return Err(RoomError::AlreadyPlaying);
        }

        if state.waitlist.contains(&user) {
            return Err(RoomError::AlreadyQueued);
        }

        state.waitlist.push_back(user);

        if state.media.is_none() {
            return self.advance_with(state, true, vec![]).await;
        }

        let waitlist = state.waitlist();
        self.emit(state, vec![Event::WaitlistUpdate(waitlist)]);

        Ok(())
    }

    /// Takes a user out of the waitlist. The current DJ stops playing instead.
    pub async fn leave_waitlist(&self, user: Id) -> Result<(), RoomError> {
        let mut state = self.lock().await?;

        if state.is_dj(user) {
            return self.advance_with(state, false, vec![]).await;
        }

        if !remove_queued(&mut state.waitlist, user) {
            return Err(RoomError::NotQueued);
        }

        let waitlist = state.waitlist();
        self.emit(state, vec![Event::WaitlistUpdate(waitlist)]);

        Ok(())
    }

    /// Moves a queued user to `position` in the waitlist
    pub async fn move_user(&self, user: Id, position: usize) -> Result<(), RoomError> {
        let mut state = self.lock().await?;

        if position >= state.waitlist.len() {
            return Err(RoomError::OutOfBounds);
        }

        if !remove_queued(&mut state.waitlist, user) {
            return Err(RoomError::NotQueued);
        }

        state.waitlist.insert(position, user);

        let waitlist = state.waitlist();
        self.emit(state, vec![Event::WaitlistUpdate(waitlist)]);

        Ok(())
    }

    pub async fn vote(&self, user: Id, kind: VoteKind) -> Result<(), RoomError> {
        let mut state = self.lock().await?;

        if !state.population.contains(&user) {
            return Err(RoomError::NotInRoom);
        }

        let Some(playing) = state.media.as_mut() else {
            return Err(RoomError::NothingPlaying);
        };

        if !playing.votes.apply(user, kind) {
            return Err(RoomError::AlreadyVoted);
        }

        let votes = playing.votes.clone();
        self.emit(state, vec![Event::VoteUpdate(votes)]);

        Ok(())
    }

    /// Ends the current play and moves on to the next DJ
    pub async fn advance(&self) -> Result<(), RoomError> {
        let state = self.lock().await?;
        self.advance_with(state, true, vec![]).await
    }

    /// Returns true if the user's role is at least `required` in this room.
    /// Ambassadors have every permission.
    pub async fn has_permission(&self, user: Id, required: StaffRole) -> Result<bool, RoomError> {
        let user_data = self.context.repos.users.get_by_id(user).await?;

        if user_data.role.is_ambassador() {
            return Ok(true);
        }

        Ok(self.staff_role(user).await? >= required)
    }

    pub async fn staff_role(&self, user: Id) -> Result<StaffRole, RoomError> {
        let staff = self
            .context
            .repos
            .staff
            .get(Query::new().eq("community", self.id).eq("user", user))
            .await
            .optional()?;

        Ok(staff.map(|s| s.role).unwrap_or_default())
    }

    pub async fn snapshot(&self) -> RoomSnapshot {
        let state = self.state.lock().await;

        RoomSnapshot {
            population: state.population.clone(),
            waitlist: state.waitlist(),
            media: state.media.clone(),
        }
    }

    pub async fn population(&self) -> Vec<Id> {
        self.state.lock().await.population.clone()
    }

    /// Pushes an event to everyone in the room
    pub async fn broadcast(&self, event: Event) {
        let state = self.state.lock().await;
        self.emit(state, vec![event]);
    }

    /// Shuts the room down and disconnects everyone in it
    pub async fn panic(&self) {
        let mut state = self.state.lock().await;
        let members = self.panic_locked(&mut state);
        drop(state);

        self.terminate(members);
    }

    async fn lock(&self) -> Result<Guard<'_>, RoomError> {
        let state = self.state.lock().await;

        if state.panicked {
            return Err(RoomError::Panicked);
        }

        Ok(state)
    }

    async fn on_timer(&self, generation: u64) {
        let mut state = self.state.lock().await;

        if state.panicked || state.generation != generation {
            return;
        }

        // This task is the timer, so it must not be aborted
        state.timer = None;

        if let Err(e) = self.advance_with(state, true, vec![]).await {
            error!("Room {} failed to advance: {}", self.id, e);
        }
    }

    /// Advances, and panics the room if any step fails
    async fn advance_with(
        &self,
        mut state: Guard<'_>,
        recycle: bool,
        mut events: Vec<Event>,
    ) -> Result<(), RoomError> {
        match self.advance_locked(&mut state, recycle).await {
            Ok(data) => {
                events.push(Event::Advance(data));
                self.emit(state, events);

                Ok(())
            }
            Err(e) => {
                error!("Panicking room {} after failed advance: {}", self.id, e);

                let members = self.panic_locked(&mut state);
                drop(state);
                self.terminate(members);

                Err(RoomError::Panicked)
            }
        }
    }

    async fn advance_locked(
        &self,
        state: &mut RoomState,
        recycle: bool,
    ) -> Result<AdvanceData, RoomError> {
        self.cancel_timer(state);

        let repos = &self.context.repos;
        let community = repos.communities.get_by_id(self.id).await?;

        if let Some(playing) = state.media.take() {
            let dj = playing.dj_id;
            let (woots, mehs, grabs) = playing.votes.counts();

            let mut media = repos.media.lock(playing.media.id).await?;
            media.woots += woots as u64;
            media.mehs += mehs as u64;
            media.grabs += grabs as u64;
            media.plays += 1;
            media.save().await?;
            drop(media);

            if let Some(mut user) = repos.users.lock(dj).await.optional()? {
                user.points += (woots + grabs) as u64;
                user.save().await?;
            }

            repos
                .community_history
                .create(CommunityHistoryData {
                    meta: Meta::default(),
                    community: self.id,
                    user: dj,
                    media: playing.media.id,
                    artist: playing.media.artist.clone(),
                    title: playing.media.title.clone(),
                    woots,
                    mehs,
                    grabs,
                })
                .await?;

            repos
                .user_history
                .create(UserHistoryData {
                    meta: Meta::default(),
                    user: dj,
                    community: self.id,
                    media: playing.media.id,
                    artist: playing.media.artist,
                    title: playing.media.title,
                    woots,
                    mehs,
                    grabs,
                })
                .await?;

            if recycle && community.dj_recycling && !state.waitlist.contains(&dj) {
                state.waitlist.push_back(dj);
            }
        }

        if let Some(next) = state.waitlist.pop_front() {
            let playlist = self
                .context
                .playlists
                .selected(next)
                .await?
                .ok_or(RoomError::NoPlaylist(next))?;

            let item = self
                .context
                .playlists
                .rotate(playlist.id())
                .await?
                .ok_or(RoomError::EmptyPlaylist(playlist.id()))?;

            let media = repos.media.get_by_id(item.media).await?;

            state.media = Some(NowPlaying {
                dj_id: next,
                started_at: Utc::now(),
                media: PlayingMedia::new(&media, &item),
                item: item.id(),
                votes: Default::default(),
            });

            self.schedule(state, Config::media_duration(media.length));
        }

        Ok(AdvanceData {
            waitlist: state.waitlist(),
            media: state.media.clone(),
        })
    }

    fn schedule(&self, state: &mut RoomState, after: Duration) {
        self.cancel_timer(state);

        let generation = state.generation;
        let room = self.this.clone();

        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;

            if let Some(room) = room.upgrade() {
                room.on_timer(generation).await;
            }
        }));
    }

    fn cancel_timer(&self, state: &mut RoomState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        state.generation += 1;
    }

    /// Takes the room out of service. Returns the members that need to be disconnected,
    /// which must happen after the state lock is released.
    fn panic_locked(&self, state: &mut RoomState) -> Vec<Id> {
        self.context
            .rooms
            .remove_if(&self.id, |_, room| std::ptr::eq(Arc::as_ptr(room), self));

        self.cancel_timer(state);
        state.panicked = true;
        state.media = None;
        state.waitlist.clear();

        std::mem::take(&mut state.population)
    }

    fn terminate(&self, members: Vec<Id>) {
        for member in members {
            if let Some(user) = self.context.realtime.get(member) {
                user.leave_community(self.id);
                user.panic();
            }
        }
    }

    /// Sends events to the population captured under the state lock, after releasing it
    fn emit(&self, state: Guard<'_>, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }

        let recipients = state.population.clone();
        let _order = self.emit_order.lock();
        drop(state);

        for event in events {
            for member in &recipients {
                if let Some(user) = self.context.realtime.get(*member) {
                    user.emit(event.clone());
                }
            }
        }
    }
}

fn remove(list: &mut Vec<Id>, user: Id) -> bool {
    let before = list.len();
    list.retain(|u| *u != user);

    before != list.len()
}

fn remove_queued(waitlist: &mut VecDeque<Id>, user: Id) -> bool {
    let before = waitlist.len();
    waitlist.retain(|u| *u != user);

    before != waitlist.len()
}
