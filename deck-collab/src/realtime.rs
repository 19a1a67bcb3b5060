use std::sync::Arc;

use crossbeam::atomic::AtomicCell;
use dashmap::{mapref::entry::Entry, DashMap};
use deck_core::Id;
use log::{debug, info};
use parking_lot::RwLock;

use crate::{Entity, Event, Frame, GlobalRole, UserData};

/// A live connection that frames can be pushed to
pub trait Peer: Send + Sync {
    /// Uniquely identifies the connection
    fn id(&self) -> Id;
    /// Queues a frame for sending. Must not block.
    fn send(&self, frame: Frame);
    /// Terminates the connection
    fn close(&self);
}

pub type ArcedPeer = Arc<dyn Peer>;

/// An authenticated user with a live, or recently lost, connection
pub struct RealtimeUser {
    pub id: Id,
    role: AtomicCell<GlobalRole>,
    peer: RwLock<ArcedPeer>,
    community: AtomicCell<Option<Id>>,
    connected: AtomicCell<bool>,
    /// Bumped every time a connection takes over this user
    generation: AtomicCell<u64>,
}

impl RealtimeUser {
    fn new(user: &UserData, peer: ArcedPeer) -> Self {
        Self {
            id: user.id(),
            role: AtomicCell::new(user.role),
            peer: RwLock::new(peer),
            community: AtomicCell::new(None),
            connected: AtomicCell::new(true),
            generation: AtomicCell::new(0),
        }
    }

    pub fn send(&self, frame: Frame) {
        self.peer.read().send(frame);
    }

    pub fn emit(&self, event: Event) {
        self.send(event.into());
    }

    /// The community the user is currently in
    pub fn community(&self) -> Option<Id> {
        self.community.load()
    }

    pub fn set_community(&self, community: Option<Id>) {
        self.community.store(community);
    }

    /// Clears the current community, but only if it is `community`
    pub fn leave_community(&self, community: Id) {
        let _ = self
            .community
            .compare_exchange(Some(community), None);
    }

    pub fn role(&self) -> GlobalRole {
        self.role.load()
    }

    pub fn set_role(&self, role: GlobalRole) {
        self.role.store(role);
    }

    pub fn peer_id(&self) -> Id {
        self.peer.read().id()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load()
    }

    /// Terminates the user's connection after an unrecoverable error, or to kick them
    pub fn panic(&self) {
        info!("Terminating connection of user {}", self.id);
        self.peer.read().close();
    }

    fn replace_peer(&self, peer: ArcedPeer) -> ArcedPeer {
        let previous = std::mem::replace(&mut *self.peer.write(), peer);

        self.generation.fetch_add(1);
        self.connected.store(true);

        previous
    }
}

/// Every user with a live connection, keyed by user id
#[derive(Default)]
pub struct Realtime {
    users: DashMap<Id, Arc<RealtimeUser>>,
}

impl Realtime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection for the user. If the user already has one, it is replaced
    /// and the previous connection is returned, so the caller can terminate it.
    pub fn attach(&self, user: &UserData, peer: ArcedPeer) -> (Arc<RealtimeUser>, Option<ArcedPeer>) {
        match self.users.entry(user.id()) {
            Entry::Occupied(entry) => {
                let existing = entry.get().clone();
                let previous = existing.replace_peer(peer);

                existing.set_role(user.role);
                debug!("User {} took over their realtime slot", user.id());

                (existing, Some(previous))
            }
            Entry::Vacant(entry) => {
                let realtime_user = Arc::new(RealtimeUser::new(user, peer));
                entry.insert(realtime_user.clone());

                (realtime_user, None)
            }
        }
    }

    /// Marks the user as disconnected if `peer_id` is still their connection.
    /// Returns the user and the generation to wait on before destroying it.
    pub fn detach(&self, user_id: Id, peer_id: Id) -> Option<(Arc<RealtimeUser>, u64)> {
        let user = self.get(user_id)?;

        if user.peer_id() != peer_id {
            return None;
        }

        user.connected.store(false);
        let generation = user.generation();

        Some((user, generation))
    }

    /// Removes the user if nothing reconnected since it was detached at `generation`
    pub fn remove_if_idle(&self, user_id: Id, generation: u64) -> Option<Arc<RealtimeUser>> {
        self.users
            .remove_if(&user_id, |_, user| {
                !user.is_connected() && user.generation() == generation
            })
            .map(|(_, user)| user)
    }

    pub fn get(&self, user_id: Id) -> Option<Arc<RealtimeUser>> {
        self.users.get(&user_id).map(|u| u.clone())
    }

    /// Returns every registered user
    pub fn all(&self) -> Vec<Arc<RealtimeUser>> {
        self.users.iter().map(|u| u.clone()).collect()
    }

    /// Pushes an event to every registered user
    pub fn broadcast(&self, event: Event) {
        for user in self.all() {
            user.emit(event.clone());
        }
    }

    /// Terminates the connection of a user, if they have one
    pub fn panic(&self, user_id: Id) {
        if let Some(user) = self.get(user_id) {
            user.panic();
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod test_peer {
    use parking_lot::Mutex;

    use super::*;

    /// A peer that records everything sent to it
    pub struct RecordingPeer {
        id: Id,
        frames: Mutex<Vec<Frame>>,
        closed: AtomicCell<bool>,
    }

    impl RecordingPeer {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                id: Id::new(),
                frames: Mutex::new(vec![]),
                closed: AtomicCell::new(false),
            })
        }

        pub fn event_names(&self) -> Vec<&'static str> {
            self.frames
                .lock()
                .iter()
                .filter_map(|f| match f {
                    Frame::Event(e) => Some(e.name()),
                    _ => None,
                })
                .collect()
        }

        pub fn events(&self) -> Vec<Event> {
            self.frames
                .lock()
                .iter()
                .filter_map(|f| match f {
                    Frame::Event(e) => Some(e.clone()),
                    _ => None,
                })
                .collect()
        }

        pub fn clear(&self) {
            self.frames.lock().clear();
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load()
        }
    }

    impl Peer for RecordingPeer {
        fn id(&self) -> Id {
            self.id
        }

        fn send(&self, frame: Frame) {
            self.frames.lock().push(frame);
        }

        fn close(&self) {
            self.closed.store(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{test_peer::RecordingPeer, *};

    fn user(name: &str) -> UserData {
        let mut user = UserData::new(name);
        user.meta.id = Id::new();
        user
    }

    #[test]
    fn test_attach_replaces_and_returns_previous() {
        let realtime = Realtime::new();
        let dj = user("dj");

        let first = RecordingPeer::new();
        let (realtime_user, previous) = realtime.attach(&dj, first.clone());
        assert!(previous.is_none());

        let community = Id::new();
        realtime_user.set_community(Some(community));

        let second = RecordingPeer::new();
        let (same_user, previous) = realtime.attach(&dj, second.clone());

        assert_eq!(previous.map(|p| p.id()), Some(first.id()));
        assert_eq!(same_user.peer_id(), second.id());
        assert_eq!(same_user.community(), Some(community), "community survives takeover");
        assert_eq!(realtime.len(), 1);
    }

    #[test]
    fn test_detach_ignores_replaced_peers() {
        let realtime = Realtime::new();
        let dj = user("dj");

        let first = RecordingPeer::new();
        realtime.attach(&dj, first.clone());
        let second = RecordingPeer::new();
        realtime.attach(&dj, second.clone());

        assert!(realtime.detach(dj.id(), first.id()).is_none());

        let (_, generation) = realtime.detach(dj.id(), second.id()).unwrap();

        // A reconnect bumps the generation, so the stale removal is refused
        realtime.attach(&dj, RecordingPeer::new());
        assert!(realtime.remove_if_idle(dj.id(), generation).is_none());
        assert_eq!(realtime.len(), 1);
    }

    #[test]
    fn test_remove_if_idle() {
        let realtime = Realtime::new();
        let dj = user("dj");
        let peer = RecordingPeer::new();

        realtime.attach(&dj, peer.clone());
        let (_, generation) = realtime.detach(dj.id(), peer.id()).unwrap();

        assert!(realtime.remove_if_idle(dj.id(), generation).is_some());
        assert!(realtime.is_empty());
    }

    #[test]
    fn test_broadcast_and_panic() {
        let realtime = Realtime::new();
        let a = RecordingPeer::new();
        let b = RecordingPeer::new();
        let user_a = user("a");

        realtime.attach(&user_a, a.clone());
        realtime.attach(&user("b"), b.clone());

        realtime.broadcast(Event::ServerBroadcast {
            kind: "info".to_string(),
            message: "hi".to_string(),
        });

        assert_eq!(a.event_names(), vec!["server.broadcast"]);
        assert_eq!(b.event_names(), vec!["server.broadcast"]);

        realtime.panic(user_a.id());
        assert!(a.is_closed());
        assert!(!b.is_closed());
    }
}
