use std::{fmt::Display, sync::Arc, time::Duration};

use axum::extract::ws::{Message, WebSocket};
use crossbeam::atomic::AtomicCell;
use deck_collab::{Entity, Frame, Peer, RealtimeUser, UserData};
use deck_core::Id;
use futures_util::{Sink, SinkExt, StreamExt};
use log::{debug, info, warn};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::{
    sync::{mpsc, watch},
    time::{interval, sleep_until, timeout, Instant},
};

use crate::{
    dispatch::{self, Action},
    Request, ServerContext,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Unauthenticated,
    Authenticated,
    Terminated,
}

/// Something a client sent that it never should have. The connection is dropped for these.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(String),
    #[error("Unknown action {0}")]
    UnknownAction(String),
    #[error("Binary frames are not supported")]
    Binary,
    #[error("Frame received before authentication")]
    Unauthenticated,
}

/// An action frame as clients send it
#[derive(Debug, Deserialize)]
struct Incoming {
    i: Value,
    a: String,
    #[serde(default)]
    d: Value,
}

/// An action that changes state, waiting for the ones before it
struct Mutation {
    action: &'static Action,
    user: Arc<RealtimeUser>,
    incoming: Incoming,
}

/// A live websocket connection of an authenticated user
pub struct Connection {
    id: Id,
    context: ServerContext,
    outgoing: mpsc::UnboundedSender<Message>,
    lifecycle: AtomicCell<Lifecycle>,
    terminated: watch::Sender<bool>,
    user: RwLock<Option<Arc<RealtimeUser>>>,
}

impl Connection {
    fn new(
        context: ServerContext,
        outgoing: mpsc::UnboundedSender<Message>,
        terminated: watch::Sender<bool>,
    ) -> Self {
        Self {
            id: Id::new(),
            context,
            outgoing,
            lifecycle: AtomicCell::new(Lifecycle::Unauthenticated),
            terminated,
            user: RwLock::new(None),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.load()
    }

    fn authenticate(&self, user: Arc<RealtimeUser>) {
        *self.user.write() = Some(user);

        // A connection that was closed while registering stays closed
        let _ = self
            .lifecycle
            .compare_exchange(Lifecycle::Unauthenticated, Lifecycle::Authenticated);
    }

    /// Stops the connection. The read loop notices and tears everything down.
    pub fn terminate(&self) {
        self.lifecycle.store(Lifecycle::Terminated);
        self.terminated.send_replace(true);
    }

    fn queue(&self, message: Message) {
        if self.lifecycle() == Lifecycle::Terminated {
            return;
        }

        // The writer is gone once the connection is, so a failed send is fine
        let _ = self.outgoing.send(message);
    }

    fn queue_frame(&self, frame: &Frame) {
        match serde_json::to_string(frame) {
            Ok(text) => self.queue(Message::Text(text)),
            Err(e) => warn!("Failed to serialize frame: {}", e),
        }
    }

    /// Decodes a text frame and runs the action it carries. Queries run right away in the
    /// background, actions that change state are queued behind the ones before them.
    fn receive(
        self: &Arc<Self>,
        text: &str,
        mutations: &mpsc::UnboundedSender<Mutation>,
    ) -> Result<(), ProtocolError> {
        if self.lifecycle() != Lifecycle::Authenticated {
            return Err(ProtocolError::Unauthenticated);
        }

        let incoming: Incoming =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let action = dispatch::find(&incoming.a)
            .ok_or_else(|| ProtocolError::UnknownAction(incoming.a.clone()))?;

        let user = self
            .user
            .read()
            .clone()
            .ok_or(ProtocolError::Unauthenticated)?;

        if action.mutates {
            // The worker only stops once the connection is gone
            let _ = mutations.send(Mutation {
                action,
                user,
                incoming,
            });
        } else {
            let connection = self.clone();
            tokio::spawn(async move { connection.handle(action, user, incoming).await });
        }

        Ok(())
    }

    /// Runs an action and replies with its result
    async fn handle(&self, action: &Action, user: Arc<RealtimeUser>, incoming: Incoming) {
        let request = Request::new(self.context.clone(), user, incoming.d);

        let (status, data) = match dispatch::run(action, request).await {
            Ok(data) => (crate::Status::Ok, data),
            Err(e) => {
                debug!("Action {} failed: {}", incoming.a, e);
                (e.status(), e.data())
            }
        };

        self.queue_frame(&Frame::Reply {
            i: incoming.i,
            s: status.code(),
            a: incoming.a,
            d: data,
        });
    }
}

/// Runs the state changing actions of a connection one at a time, in the order they arrived
async fn mutation_loop(
    connection: Arc<Connection>,
    mut queued: mpsc::UnboundedReceiver<Mutation>,
) {
    while let Some(mutation) = queued.recv().await {
        if connection.lifecycle() == Lifecycle::Terminated {
            break;
        }

        connection
            .handle(mutation.action, mutation.user, mutation.incoming)
            .await;
    }
}

impl Peer for Connection {
    fn id(&self) -> Id {
        self.id
    }

    fn send(&self, frame: Frame) {
        self.queue_frame(&frame);
    }

    fn close(&self) {
        self.terminate();
    }
}

/// Runs a connection of an authenticated user until either side ends it
pub async fn run_connection(socket: WebSocket, context: ServerContext, user: UserData) {
    let config = context.collab.config().clone();

    let (sink, mut stream) = socket.split();
    let (outgoing, queued) = mpsc::unbounded_channel();
    let (terminated, mut on_terminate) = watch::channel(false);
    let (mutations, queued_mutations) = mpsc::unbounded_channel();

    let connection = Arc::new(Connection::new(context.clone(), outgoing, terminated));
    let mut writer = tokio::spawn(write_loop(sink, queued, config.write_deadline));
    let mut writer_stopped = false;

    tokio::spawn(mutation_loop(connection.clone(), queued_mutations));

    let realtime_user = context.collab.connect(&user, connection.clone());
    connection.authenticate(realtime_user);
    connection.queue_frame(&Frame::Unique(json!({ "hello": true })));

    info!("User {} connected", user.username);

    let mut ping = interval(config.ping_interval);
    ping.tick().await;

    let mut deadline = Instant::now() + config.read_deadline;

    loop {
        tokio::select! {
            _ = on_terminate.changed() => break,
            _ = &mut writer => {
                debug!("Writer of {} stopped", user.username);
                writer_stopped = true;
                break;
            }
            _ = sleep_until(deadline) => {
                debug!("User {} timed out", user.username);
                break;
            }
            _ = ping.tick() => connection.queue(Message::Ping(vec![])),
            message = stream.next() => {
                let Some(Ok(message)) = message else {
                    break;
                };

                let result = match message {
                    Message::Text(text) => connection.receive(&text, &mutations),
                    Message::Binary(_) => Err(ProtocolError::Binary),
                    Message::Pong(_) => {
                        deadline = Instant::now() + config.read_deadline;
                        Ok(())
                    }
                    // Pings are answered by axum
                    Message::Ping(_) => Ok(()),
                    Message::Close(_) => break,
                };

                if let Err(e) = result {
                    warn!("Dropping connection of {}: {}", user.username, e);
                    break;
                }
            }
        }
    }

    connection.terminate();
    drop(mutations);

    info!("User {} disconnected", user.username);
    context.collab.disconnect(user.id(), connection.id);

    if writer_stopped {
        return;
    }

    // Frames queued before termination, like a stale session notice, still go out
    let _ = connection.outgoing.send(Message::Close(None));

    if timeout(config.write_deadline, &mut writer).await.is_err() {
        debug!("Writer of {} did not finish in time", user.username);
        writer.abort();
    }
}

/// Writes queued messages to the socket until a close frame has been written
async fn write_loop<S>(
    mut sink: S,
    mut queued: mpsc::UnboundedReceiver<Message>,
    deadline: Duration,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(message) = queued.recv().await {
        let closing = matches!(message, Message::Close(_));

        match timeout(deadline, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("Failed to write to socket: {}", e);
                break;
            }
            Err(_) => {
                warn!("Writing to socket timed out");
                break;
            }
        }

        if closing {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use deck_collab::{Collab, Config, Event, UnavailableSource};
    use deck_core::MemoryStore;

    use super::*;

    fn connection() -> (Arc<Connection>, mpsc::UnboundedReceiver<Message>) {
        let collab = Collab::new(
            Arc::new(MemoryStore::new()),
            Arc::new(UnavailableSource),
            Config::default(),
        );

        let (outgoing, queued) = mpsc::unbounded_channel();
        let (terminated, _) = watch::channel(false);
        let context = ServerContext::new(Arc::new(collab));

        (
            Arc::new(Connection::new(context, outgoing, terminated)),
            queued,
        )
    }

    #[tokio::test]
    async fn test_stale_session_is_written_before_close() {
        let (connection, queued) = connection();

        // What a hijack does to the old connection
        connection.send(Event::StaleSession.into());
        connection.close();
        connection.send(Event::StaleSession.into());

        assert_eq!(connection.lifecycle(), Lifecycle::Terminated);

        // What teardown does
        connection.outgoing.send(Message::Close(None)).unwrap();
        connection.outgoing.send(Message::Ping(vec![])).unwrap();

        let mut written: Vec<Message> = vec![];
        write_loop(&mut written, queued, Duration::from_secs(1)).await;

        assert_eq!(written.len(), 2);
        assert!(matches!(&written[0], Message::Text(text) if text.contains("staleSession")));
        assert_eq!(written[1], Message::Close(None));
    }

    #[tokio::test]
    async fn test_mutations_run_in_arrival_order() {
        let (connection, mut queued) = connection();
        let user = connection.context.collab.connect(
            &UserData::new("alpha"),
            connection.clone(),
        );
        connection.authenticate(user);

        let (mutations, queued_mutations) = mpsc::unbounded_channel();
        for i in 0..5 {
            let text = json!({ "i": i, "a": "community.leave", "d": null }).to_string();
            connection.receive(&text, &mutations).unwrap();
        }
        drop(mutations);

        mutation_loop(connection.clone(), queued_mutations).await;

        let mut replies = vec![];
        while let Ok(Message::Text(text)) = queued.try_recv() {
            let reply: Value = serde_json::from_str(&text).unwrap();
            replies.push(reply["i"].clone());
        }

        assert_eq!(replies, vec![json!(0), json!(1), json!(2), json!(3), json!(4)]);
    }

    #[tokio::test]
    async fn test_protocol_violations() {
        let (connection, _queued) = connection();
        let (mutations, _) = mpsc::unbounded_channel();

        assert!(matches!(
            connection.receive("{}", &mutations),
            Err(ProtocolError::Unauthenticated)
        ));

        let user = connection.context.collab.connect(
            &UserData::new("alpha"),
            connection.clone(),
        );
        connection.authenticate(user);

        assert!(matches!(
            connection.receive("not json", &mutations),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            connection.receive(r#"{"i": 1, "a": "nope.nope"}"#, &mutations),
            Err(ProtocolError::UnknownAction(_))
        ));
    }
}
