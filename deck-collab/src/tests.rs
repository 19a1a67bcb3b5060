use std::{sync::Arc, time::Duration};

use chrono::Utc;
use deck_core::{Id, MemoryStore, Query};

use crate::{media::test_source::FixedSource, realtime::test_peer::RecordingPeer, *};

struct Harness {
    collab: Collab,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(Config::default())
    }

    fn with_config(config: Config) -> Self {
        Self {
            collab: Collab::new(
                Arc::new(MemoryStore::new()),
                Arc::new(FixedSource { length: 60 }),
                config,
            ),
        }
    }

    async fn user(&self, name: &str) -> (Id, Arc<RecordingPeer>) {
        self.user_with_role(name, GlobalRole::User).await
    }

    async fn user_with_role(&self, name: &str, role: GlobalRole) -> (Id, Arc<RecordingPeer>) {
        let mut user = UserData::new(name);
        user.role = role;

        let user = self.collab.repos().users.create(user).await.unwrap();
        let peer = RecordingPeer::new();
        self.collab.connect(&user, peer.clone());

        (user.id(), peer)
    }

    async fn room(&self, url: &str, host: Id, recycling: bool) -> Arc<Room> {
        let mut community = CommunityData::new(url, "Test room", host);
        community.dj_recycling = recycling;

        let community = self
            .collab
            .repos()
            .communities
            .create(community)
            .await
            .unwrap();

        self.collab.rooms.load(community.id()).await.unwrap()
    }

    /// Gives the user a selected playlist with one item per length
    async fn playlist(&self, owner: Id, lengths: &[u32]) -> PlaylistData {
        let playlists = &self.collab.context.playlists;
        let playlist = playlists.create(owner, "set").await.unwrap();

        for length in lengths {
            let media = self
                .collab
                .repos()
                .media
                .create(MediaData {
                    meta: Meta::default(),
                    kind: MediaKind::YouTube,
                    mid: Id::new().to_string(),
                    title: format!("{} seconds", length),
                    artist: "Artist".to_string(),
                    blurb: String::new(),
                    image: String::new(),
                    length: *length,
                    plays: 0,
                    woots: 0,
                    mehs: 0,
                    grabs: 0,
                    playlists: 0,
                })
                .await
                .unwrap();

            playlists
                .add_item(playlist.id(), &media, None, None)
                .await
                .unwrap();
        }

        playlist
    }

    async fn history(&self, community: Id) -> Vec<CommunityHistoryData> {
        self.collab
            .repos()
            .community_history
            .get_all(Query::new().eq("community", community))
            .await
            .unwrap()
    }
}

fn advances(peer: &RecordingPeer) -> Vec<AdvanceData> {
    peer.events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Advance(data) => Some(data),
            _ => None,
        })
        .collect()
}

async fn sleep(seconds: u64) {
    tokio::time::sleep(Duration::from_secs(seconds)).await;
}

#[tokio::test(start_paused = true)]
async fn test_single_dj_playback() {
    let harness = Harness::new();
    let (a, peer) = harness.user("alpha").await;
    harness.playlist(a, &[120]).await;

    let room = harness.room("single", a, false).await;
    room.join(a).await.unwrap();
    room.join_waitlist(a).await.unwrap();

    let snapshot = room.snapshot().await;
    let playing = snapshot.media.expect("A should be playing");
    assert_eq!(playing.dj_id, a);
    assert_eq!(playing.media.length, 120);
    assert!(snapshot.waitlist.is_empty(), "the DJ is never in the waitlist");

    sleep(121).await;

    assert!(room.snapshot().await.media.is_none());
    assert_eq!(peer.event_names(), vec!["user.join", "advance", "advance"]);

    let advances = advances(&peer);
    assert_eq!(advances[0].media.as_ref().map(|m| m.dj_id), Some(a));
    assert!(advances[1].media.is_none());

    let history = harness.history(room.id).await;
    assert_eq!(history.len(), 1);
    assert_eq!(
        (history[0].woots, history[0].mehs, history[0].grabs),
        (0, 0, 0)
    );

    let media = harness
        .collab
        .repos()
        .media
        .get_by_id(history[0].media)
        .await
        .unwrap();
    assert_eq!(media.plays, 1);
}

#[tokio::test(start_paused = true)]
async fn test_recycling_puts_dj_back() {
    for recycling in [true, false] {
        let harness = Harness::new();
        let (a, _) = harness.user("alpha").await;
        let (b, _) = harness.user("bravo").await;
        harness.playlist(a, &[100]).await;
        harness.playlist(b, &[100]).await;

        let room = harness.room("recycle", a, recycling).await;
        room.join(a).await.unwrap();
        room.join(b).await.unwrap();
        room.join_waitlist(a).await.unwrap();
        room.join_waitlist(b).await.unwrap();

        assert_eq!(room.snapshot().await.waitlist, vec![b]);

        sleep(101).await;

        let snapshot = room.snapshot().await;
        assert_eq!(snapshot.media.map(|m| m.dj_id), Some(b));

        let expected = if recycling { vec![a] } else { vec![] };
        assert_eq!(snapshot.waitlist, expected, "recycling: {}", recycling);
    }
}

#[tokio::test(start_paused = true)]
async fn test_dj_leaving_is_not_recycled() {
    let harness = Harness::new();
    let (a, _) = harness.user("alpha").await;
    let (b, _) = harness.user("bravo").await;
    harness.playlist(a, &[100]).await;
    harness.playlist(b, &[300]).await;

    let room = harness.room("leaving", a, true).await;
    room.join(a).await.unwrap();
    room.join(b).await.unwrap();
    room.join_waitlist(a).await.unwrap();
    room.join_waitlist(b).await.unwrap();

    room.leave_waitlist(a).await.unwrap();

    let snapshot = room.snapshot().await;
    assert_eq!(snapshot.media.as_ref().map(|m| m.dj_id), Some(b));
    assert!(snapshot.waitlist.is_empty(), "A left, so A isn't put back");

    // A's timer would have fired here, but it was cancelled
    sleep(150).await;

    let snapshot = room.snapshot().await;
    assert_eq!(snapshot.media.map(|m| m.dj_id), Some(b));
    assert_eq!(harness.history(room.id).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dj_leaving_room_advances() {
    let harness = Harness::new();
    let (a, _) = harness.user("alpha").await;
    let (b, peer_b) = harness.user("bravo").await;
    harness.playlist(a, &[100]).await;

    let room = harness.room("gone", a, true).await;
    room.join(a).await.unwrap();
    room.join(b).await.unwrap();
    room.join_waitlist(a).await.unwrap();
    peer_b.clear();

    room.leave(a).await.unwrap();

    let snapshot = room.snapshot().await;
    assert!(snapshot.media.is_none());
    assert!(snapshot.waitlist.is_empty());
    assert_eq!(snapshot.population, vec![b]);
    assert_eq!(peer_b.event_names(), vec!["user.leave", "advance"]);
}

#[tokio::test(start_paused = true)]
async fn test_votes_are_counted_in_history() {
    let harness = Harness::new();
    let (a, _) = harness.user("alpha").await;
    let (u, _) = harness.user("uniform").await;
    harness.playlist(a, &[100]).await;

    let room = harness.room("votes", a, false).await;
    room.join(a).await.unwrap();
    room.join(u).await.unwrap();

    assert!(matches!(
        room.vote(u, VoteKind::Woot).await,
        Err(RoomError::NothingPlaying)
    ));

    room.join_waitlist(a).await.unwrap();

    room.vote(u, VoteKind::Meh).await.unwrap();
    room.vote(u, VoteKind::Woot).await.unwrap();
    assert!(matches!(
        room.vote(u, VoteKind::Woot).await,
        Err(RoomError::AlreadyVoted)
    ));
    room.vote(u, VoteKind::Grab).await.unwrap();

    let votes = room.snapshot().await.media.unwrap().votes;
    assert_eq!(votes.woot, vec![u]);
    assert!(votes.meh.is_empty());
    assert_eq!(votes.grab, vec![u]);

    sleep(101).await;

    let history = harness.history(room.id).await;
    assert_eq!(
        (history[0].woots, history[0].mehs, history[0].grabs),
        (1, 0, 1)
    );

    let dj = harness.collab.repos().users.get_by_id(a).await.unwrap();
    assert_eq!(dj.points, 2, "the DJ is credited woots and grabs");
}

#[tokio::test]
async fn test_population_and_waitlist_are_unique() {
    let harness = Harness::new();
    let (a, _) = harness.user("alpha").await;
    let (b, _) = harness.user("bravo").await;
    harness.playlist(a, &[100]).await;

    let room = harness.room("unique", a, true).await;
    assert!(room.join(a).await.unwrap());
    assert!(!room.join(a).await.unwrap());
    room.join(b).await.unwrap();

    room.join_waitlist(a).await.unwrap();
    assert!(matches!(
        room.join_waitlist(a).await,
        Err(RoomError::AlreadyPlaying)
    ));

    room.join_waitlist(b).await.unwrap();
    assert!(matches!(
        room.join_waitlist(b).await,
        Err(RoomError::AlreadyQueued)
    ));

    assert!(matches!(
        room.move_user(b, 1).await,
        Err(RoomError::OutOfBounds)
    ));
    room.move_user(b, 0).await.unwrap();

    let snapshot = room.snapshot().await;
    assert_eq!(snapshot.population, vec![a, b]);
    assert_eq!(snapshot.waitlist, vec![b]);
}

#[tokio::test]
async fn test_waitlist_limit() {
    let harness = Harness::with_config(Config {
        waitlist_limit: 1,
        ..Default::default()
    });

    let mut users = vec![];
    for name in ["alpha", "bravo", "charlie", "delta"] {
        users.push(harness.user(name).await.0);
    }

    harness.playlist(users[0], &[100]).await;
    let room = harness.room("limit", users[0], true).await;

    for user in &users {
        room.join(*user).await.unwrap();
    }

    room.join_waitlist(users[0]).await.unwrap();
    room.join_waitlist(users[1]).await.unwrap();
    room.join_waitlist(users[2]).await.unwrap();

    assert!(matches!(
        room.join_waitlist(users[3]).await,
        Err(RoomError::WaitlistFull)
    ));
}

#[tokio::test]
async fn test_missing_playlist_panics_room() {
    let harness = Harness::new();
    let (a, peer_a) = harness.user("alpha").await;
    let (b, peer_b) = harness.user("bravo").await;

    let room = harness.room("panic", a, true).await;
    room.join(a).await.unwrap();
    room.join(b).await.unwrap();

    assert!(matches!(
        room.join_waitlist(a).await,
        Err(RoomError::Panicked)
    ));

    assert!(peer_a.is_closed());
    assert!(peer_b.is_closed());
    assert!(harness.collab.rooms.get(room.id).is_none());
    assert!(matches!(room.join(a).await, Err(RoomError::Panicked)));

    // The community can be brought up again
    let revived = harness.collab.rooms.load(room.id).await.unwrap();
    assert!(!Arc::ptr_eq(&revived, &room));
}

#[tokio::test]
async fn test_permissions() {
    let harness = Harness::new();
    let (host, _) = harness.user("host").await;
    let (listener, _) = harness.user("listener").await;
    let (ambassador, _) = harness
        .user_with_role("ambassador", GlobalRole::TrialAmbassador)
        .await;

    let room = harness.room("perms", host, true).await;

    harness
        .collab
        .repos()
        .staff
        .create(StaffData {
            meta: Meta::default(),
            community: room.id,
            user: host,
            role: StaffRole::Host,
        })
        .await
        .unwrap();

    assert!(room
        .has_permission(host, StaffRole::Manager)
        .await
        .unwrap());
    assert!(!room
        .has_permission(listener, StaffRole::Bouncer)
        .await
        .unwrap());
    assert!(room
        .has_permission(ambassador, StaffRole::Host)
        .await
        .unwrap());
    assert_eq!(room.staff_role(listener).await.unwrap(), StaffRole::User);
}

#[tokio::test(start_paused = true)]
async fn test_hijack_keeps_room_membership() {
    let harness = Harness::new();
    let (a, first) = harness.user("alpha").await;

    let room = harness.room("hijack", a, true).await;
    room.join(a).await.unwrap();

    let user = harness.collab.repos().users.get_by_id(a).await.unwrap();
    let second = RecordingPeer::new();
    harness.collab.connect(&user, second.clone());

    assert!(first.is_closed());
    assert_eq!(first.event_names().last(), Some(&"staleSession"));
    assert!(!second.is_closed());

    let realtime = &harness.collab.context.realtime;
    assert_eq!(realtime.len(), 1);
    assert_eq!(realtime.get(a).map(|u| u.peer_id()), Some(second.id()));
    assert_eq!(realtime.get(a).and_then(|u| u.community()), Some(room.id));

    // The old connection going away must not tear down the new one
    harness.collab.disconnect(a, first.id());
    sleep(31).await;

    assert_eq!(realtime.len(), 1);
    assert_eq!(room.population().await, vec![a]);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_grace_period() {
    let harness = Harness::new();
    let (a, peer_a) = harness.user("alpha").await;
    let (b, peer_b) = harness.user("bravo").await;

    let room = harness.room("grace", a, true).await;
    room.join(a).await.unwrap();
    room.join(b).await.unwrap();
    peer_b.clear();

    harness.collab.disconnect(a, peer_a.id());

    sleep(10).await;
    assert_eq!(room.population().await, vec![a, b], "still within grace");

    sleep(21).await;
    assert_eq!(room.population().await, vec![b]);
    assert!(harness.collab.context.realtime.get(a).is_none());
    assert_eq!(peer_b.event_names(), vec!["user.leave"]);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_within_grace() {
    let harness = Harness::new();
    let (a, peer_a) = harness.user("alpha").await;

    let room = harness.room("return", a, true).await;
    room.join(a).await.unwrap();

    harness.collab.disconnect(a, peer_a.id());
    sleep(10).await;

    let user = harness.collab.repos().users.get_by_id(a).await.unwrap();
    harness.collab.connect(&user, RecordingPeer::new());

    sleep(30).await;
    assert_eq!(room.population().await, vec![a]);
}

#[tokio::test]
async fn test_maintenance_disconnects_non_admins() {
    let harness = Harness::new();
    let (a, listener) = harness.user("listener").await;
    let (admin, admin_peer) = harness.user_with_role("admin", GlobalRole::Admin).await;

    let room = harness.room("maintenance", admin, true).await;
    room.join(admin).await.unwrap();
    room.join(a).await.unwrap();

    harness.collab.set_maintenance(true).await;

    assert!(listener.is_closed());
    assert!(!admin_peer.is_closed());
    assert!(harness.collab.auth.is_maintenance());
    assert_eq!(room.population().await, vec![admin]);
}

#[tokio::test(start_paused = true)]
async fn test_global_ban_kicks_user() {
    let harness = Harness::new();
    let (admin, admin_peer) = harness.user_with_role("admin", GlobalRole::Admin).await;
    let (troll, troll_peer) = harness.user("troll").await;
    harness.playlist(troll, &[120]).await;

    let room = harness.room("banned", admin, true).await;
    room.join(admin).await.unwrap();
    room.join(troll).await.unwrap();
    room.join_waitlist(troll).await.unwrap();
    admin_peer.clear();

    harness
        .collab
        .global_ban(troll, admin, None, "trolling")
        .await
        .unwrap();

    assert!(troll_peer.is_closed());
    assert_eq!(
        admin_peer.event_names(),
        vec!["user.leave", "advance", "globalBan"]
    );

    // Recycling is on, but a kicked DJ is never put back
    let snapshot = room.snapshot().await;
    assert!(snapshot.media.is_none());
    assert!(snapshot.waitlist.is_empty());
    assert_eq!(room.population().await, vec![admin]);

    assert!(harness
        .collab
        .context
        .moderation
        .active_global_ban(troll)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_expired_mute_is_lifted_lazily() {
    let harness = Harness::new();
    let moderation = &harness.collab.context.moderation;
    let (community, user, banner) = (Id::new(), Id::new(), Id::new());

    let mut mute = moderation
        .mute(community, user, banner, None, "")
        .await
        .unwrap();
    assert!(moderation
        .active_mute(community, user)
        .await
        .unwrap()
        .is_some());

    mute.until = Some(Utc::now() - chrono::Duration::seconds(1));
    harness.collab.repos().mutes.save(&mut mute).await.unwrap();

    assert!(moderation
        .active_mute(community, user)
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        harness.collab.repos().mutes.count(Query::new()).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_broadcast_reaches_everyone() {
    let harness = Harness::new();
    let (_, a) = harness.user("alpha").await;
    let (_, b) = harness.user("bravo").await;

    harness.collab.broadcast("info", "restarting");

    assert_eq!(a.event_names(), vec!["server.broadcast"]);
    assert_eq!(b.event_names(), vec!["server.broadcast"]);
}
