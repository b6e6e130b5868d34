use axum::{
    extract::Path,
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
    routing::get,
};
use futures_util::Stream;
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    collections::VecDeque,
    convert::Infallible,
    pin::Pin,
    sync::{Arc, Weak},
    task::{Context, Poll, Waker},
};
use stayscout_collab::CollabEvent;
use stayscout_core::Id;
use utoipa::ToSchema;

use crate::{
    context::ServerContext,
    errors::ServerResult,
    serialized::{LeaderboardEntry, Member, ToSerialized},
    Router,
};

type ConnectionId = Id<Connection>;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case", rename_all_fields = "camelCase", tag = "type")]
pub enum ServerEvent {
    /// A group's ranked listing list changed. Always carries the full
    /// current list, never a delta.
    LeaderboardUpdated {
        group_id: i32,
        entries: Vec<LeaderboardEntry>,
    },
    /// A fetch run stored another page of listings
    FetchProgressed {
        group_id: i32,
        destination_id: i32,
        page: usize,
        stored: usize,
    },
    /// A destination's fetch run finished
    FetchCompleted { group_id: i32, destination_id: i32 },
    /// Someone joined the group
    MemberJoined { group_id: i32, new_member: Member },
    /// Someone left the group
    MemberLeft { group_id: i32, member_id: i32 },
}

impl From<CollabEvent> for ServerEvent {
    fn from(value: CollabEvent) -> Self {
        match value {
            CollabEvent::LeaderboardUpdated { group_id, entries } => Self::LeaderboardUpdated {
                group_id,
                entries: entries.to_serialized(),
            },
            CollabEvent::FetchProgressed {
                group_id,
                destination_id,
                page,
                stored,
            } => Self::FetchProgressed {
                group_id,
                destination_id,
                page,
                stored,
            },
            CollabEvent::FetchCompleted {
                group_id,
                destination_id,
            } => Self::FetchCompleted {
                group_id,
                destination_id,
            },
            CollabEvent::MemberJoined {
                group_id,
                new_member,
            } => Self::MemberJoined {
                group_id,
                new_member: new_member.to_serialized(),
            },
            CollabEvent::MemberLeft {
                group_id,
                member_id,
            } => Self::MemberLeft {
                group_id,
                member_id,
            },
        }
    }
}

/// Manages server sent event connections, each subscribed to one group
pub struct ServerSentEvents {
    me: Weak<Self>,
    connections: Mutex<Vec<Connection>>,
}

struct Connection {
    id: ConnectionId,
    group_id: i32,
    pending_messages: Arc<Mutex<VecDeque<ServerEvent>>>,
    waker: Arc<Mutex<Option<Waker>>>,
}

pub struct ConnectionHandle {
    id: ConnectionId,
    /// A reference to [Connection]'s pending messages
    pending_messages: Arc<Mutex<VecDeque<ServerEvent>>>,
    /// A reference to [Connection]'s stored [Waker]
    waker: Arc<Mutex<Option<Waker>>>,
    /// Required to remove connection when dropped
    manager: Weak<ServerSentEvents>,
}

impl ServerSentEvents {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            connections: Default::default(),
        })
    }

    /// Sends an event to every connection subscribed to the group
    pub fn broadcast(&self, group_id: i32, event: ServerEvent) {
        let connections = self.connections.lock();

        for connection in connections.iter().filter(|c| c.group_id == group_id) {
            connection.send(event.clone())
        }
    }

    /// Registers a connection for a group, with an initial event already
    /// queued so subscribers never start from a blank state
    fn connect(&self, group_id: i32, initial: ServerEvent) -> ConnectionHandle {
        let connection = Connection::new(group_id);
        connection.send(initial);

        let handle = connection.handle(self.me.clone());

        self.connections.lock().push(connection);
        handle
    }

    fn disconnect(&self, id: ConnectionId) {
        self.connections.lock().retain(|c| c.id != id)
    }

    #[cfg(test)]
    fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }
}

impl Connection {
    fn new(group_id: i32) -> Self {
        Self {
            id: ConnectionId::new(),
            group_id,
            pending_messages: Default::default(),
            waker: Default::default(),
        }
    }

    fn send(&self, message: ServerEvent) {
        self.pending_messages.lock().push_back(message);

        if let Some(waker) = self.waker.lock().take() {
            waker.wake()
        }
    }

    fn handle(&self, manager: Weak<ServerSentEvents>) -> ConnectionHandle {
        ConnectionHandle {
            id: self.id,
            pending_messages: self.pending_messages.clone(),
            waker: self.waker.clone(),
            manager,
        }
    }
}

impl Stream for ConnectionHandle {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut pending_messages = self.pending_messages.lock();

        let next_event = pending_messages
            .pop_front()
            .map(|m| serde_json::to_string(&m).expect("serializes properly"));

        if let Some(event) = next_event {
            return Poll::Ready(Some(Ok(Event::default().data(event))));
        }

        *self.waker.lock() = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.disconnect(self.id)
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/groups/{id}/events",
    tag = "events",
    responses(
        (
            status = 200,
            content_type = "text/event-stream",
            description = "A live feed of the group's events, starting with a leaderboard snapshot",
            body = ServerEvent
        )
    )
)]
pub(crate) async fn event_stream(
    context: ServerContext,
    Path(group_id): Path<i32>,
) -> ServerResult<Sse<ConnectionHandle>> {
    context.collab.groups.group_by_id(group_id).await?;

    let entries = context.collab.leaderboard(group_id).await?;

    let snapshot = ServerEvent::LeaderboardUpdated {
        group_id,
        entries: entries.to_serialized(),
    };

    let stream = context.sse.connect(group_id, snapshot);

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub fn router() -> Router {
    Router::new().route("/:id/events", get(event_stream))
}

#[cfg(test)]
mod test {
    use super::*;
    use futures_util::StreamExt;

    fn event(group_id: i32) -> ServerEvent {
        ServerEvent::FetchCompleted {
            group_id,
            destination_id: 1,
        }
    }

    #[tokio::test]
    async fn events_only_reach_their_groups_subscribers() {
        let sse = ServerSentEvents::new();

        let mut handle = sse.connect(1, event(1));

        sse.broadcast(2, event(2));
        sse.broadcast(1, event(1));

        // The initial event and the group 1 broadcast, nothing from group 2
        assert!(handle.next().await.is_some());
        assert!(handle.next().await.is_some());
        assert!(handle.pending_messages.lock().is_empty());
    }

    #[tokio::test]
    async fn dropped_connections_are_forgotten() {
        let sse = ServerSentEvents::new();

        let handle = sse.connect(1, event(1));
        assert_eq!(sse.connection_count(), 1);

        drop(handle);
        assert_eq!(sse.connection_count(), 0);
    }

    fn page_event(page: usize) -> ServerEvent {
        ServerEvent::FetchProgressed {
            group_id: 7,
            destination_id: 1,
            page,
            stored: 18,
        }
    }

    #[tokio::test]
    async fn queued_events_arrive_in_order() {
        let sse = ServerSentEvents::new();

        let mut handle = sse.connect(7, page_event(1));
        sse.broadcast(7, page_event(2));

        {
            let pending = handle.pending_messages.lock();

            assert_eq!(pending.len(), 2);
            assert!(matches!(
                pending[0],
                ServerEvent::FetchProgressed { page: 1, .. }
            ));
            assert!(matches!(
                pending[1],
                ServerEvent::FetchProgressed { page: 2, .. }
            ));
        }

        assert!(handle.next().await.is_some());
        assert!(handle.next().await.is_some());
        assert!(handle.pending_messages.lock().is_empty());
    }
}
