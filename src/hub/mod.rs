//! Room-based fan-out to live client connections.
//!
//! Each connection owns a bounded mailbox. Rooms map a [`Target`] to the
//! mailboxes subscribed to it; a publish holds the room entry for the whole
//! fan-out so messages to the same target keep their publish order.

pub mod events;
pub mod identity;

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::observability::metrics::Metrics;

pub use events::Event;
pub use identity::{Identity, Role, Target};

pub type ConnectionId = Uuid;

struct Connection {
    sender: mpsc::Sender<Arc<Event>>,
    rooms: Vec<Target>,
}

pub struct ConnectionHub {
    buffer_size: usize,
    connections: DashMap<ConnectionId, Connection>,
    rooms: DashMap<Target, HashMap<ConnectionId, mpsc::Sender<Arc<Event>>>>,
    metrics: Metrics,
}

impl ConnectionHub {
    pub fn new(buffer_size: usize, metrics: Metrics) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
            connections: DashMap::new(),
            rooms: DashMap::new(),
            metrics,
        }
    }

    /// Registers a new, unauthenticated connection. It only joins the global room.
    pub fn connect(&self) -> (ConnectionId, mpsc::Receiver<Arc<Event>>) {
        let id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(self.buffer_size);

        self.join(Target::Everyone, id, &sender);
        self.connections.insert(
            id,
            Connection {
                sender,
                rooms: vec![Target::Everyone],
            },
        );
        self.metrics.connections_active.inc();

        debug!(connection_id = %id, "connection opened");
        (id, receiver)
    }

    /// Joins the rooms derived from `identity` and leaves any it no longer maps to.
    /// Re-authenticating replaces the previous identity without duplicating rooms.
    pub fn authenticate(
        &self,
        connection_id: ConnectionId,
        identity: Identity,
    ) -> Result<Vec<Target>, AppError> {
        let desired = identity.rooms();

        let (sender, previous) = {
            let mut connection = self.connections.get_mut(&connection_id).ok_or_else(|| {
                AppError::NotFound(format!("connection {connection_id} not found"))
            })?;
            let previous = std::mem::replace(&mut connection.rooms, desired.clone());
            (connection.sender.clone(), previous)
        };

        for room in previous.iter().filter(|room| !desired.contains(room)) {
            self.leave(room, connection_id);
        }
        for room in &desired {
            self.join(*room, connection_id, &sender);
        }

        info!(
            connection_id = %connection_id,
            account_id = %identity.account_id,
            role = identity.role.as_str(),
            "connection authenticated"
        );
        Ok(desired)
    }

    /// Removes the connection from every room it joined.
    pub fn disconnect(&self, connection_id: ConnectionId) {
        let Some((_, connection)) = self.connections.remove(&connection_id) else {
            return;
        };

        for room in &connection.rooms {
            self.leave(room, connection_id);
        }
        self.metrics.connections_active.dec();

        debug!(connection_id = %connection_id, "connection closed");
    }

    /// Delivers `event` to every connection subscribed to `target` and returns
    /// how many mailboxes accepted it. Zero subscribers is not an error.
    pub fn publish(&self, target: Target, event: Event) -> usize {
        let name = event.name();
        let event = Arc::new(event);

        let delivered = {
            let Some(mut room) = self.rooms.get_mut(&target) else {
                return 0;
            };

            let mut delivered = 0;
            let mut closed = Vec::new();
            for (connection_id, sender) in room.iter() {
                match sender.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(
                            connection_id = %connection_id,
                            room = %target,
                            event = name,
                            "mailbox full; dropping event"
                        );
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*connection_id),
                }
            }
            for connection_id in closed {
                room.remove(&connection_id);
            }
            delivered
        };

        self.rooms.remove_if(&target, |_, members| members.is_empty());
        delivered
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn room_size(&self, target: &Target) -> usize {
        self.rooms.get(target).map(|room| room.len()).unwrap_or(0)
    }

    /// Drops every mailbox so connection tasks observe a closed channel.
    pub fn shutdown(&self) -> usize {
        let drained = self.connections.len();
        self.rooms.clear();
        self.connections.clear();
        self.metrics.connections_active.set(0);

        info!(connections = drained, "connection hub shut down");
        drained
    }

    fn join(&self, room: Target, connection_id: ConnectionId, sender: &mpsc::Sender<Arc<Event>>) {
        self.rooms
            .entry(room)
            .or_default()
            .insert(connection_id, sender.clone());
    }

    fn leave(&self, room: &Target, connection_id: ConnectionId) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(&connection_id);
        }
        self.rooms.remove_if(room, |_, members| members.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::events::{DriverStatusChanged, Event, OrderMessage};
    use super::{ConnectionHub, Identity, Role, Target};
    use crate::observability::metrics::Metrics;

    fn hub() -> ConnectionHub {
        ConnectionHub::new(16, Metrics::new())
    }

    fn message(n: u128) -> Event {
        Event::OrderPickedUp(OrderMessage {
            order_id: Uuid::from_u128(n),
            message: format!("message {n}"),
        })
    }

    fn driver_identity(driver_id: Uuid) -> Identity {
        Identity {
            account_id: Uuid::new_v4(),
            role: Role::Driver,
            restaurant_id: None,
            driver_id: Some(driver_id),
        }
    }

    #[tokio::test]
    async fn publish_reaches_only_subscribed_connections() {
        let hub = hub();
        let driver_id = Uuid::new_v4();
        let (driver_conn, mut driver_rx) = hub.connect();
        let (other_conn, mut other_rx) = hub.connect();

        hub.authenticate(driver_conn, driver_identity(driver_id)).unwrap();
        hub.authenticate(other_conn, driver_identity(Uuid::new_v4())).unwrap();

        let delivered = hub.publish(Target::Driver(driver_id), message(1));

        assert_eq!(delivered, 1);
        assert_eq!(*driver_rx.recv().await.unwrap(), message(1));
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn role_broadcast_reaches_every_member() {
        let hub = hub();
        let (a, mut a_rx) = hub.connect();
        let (b, mut b_rx) = hub.connect();
        hub.authenticate(a, driver_identity(Uuid::new_v4())).unwrap();
        hub.authenticate(b, driver_identity(Uuid::new_v4())).unwrap();

        assert_eq!(hub.publish(Target::Role(Role::Driver), message(2)), 2);
        assert!(a_rx.recv().await.is_some());
        assert!(b_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn unauthenticated_connection_only_gets_global_broadcasts() {
        let hub = hub();
        let (_conn, mut rx) = hub.connect();

        assert_eq!(hub.publish(Target::Role(Role::Driver), message(3)), 0);
        assert_eq!(hub.publish(Target::Everyone, message(4)), 1);
        assert_eq!(*rx.recv().await.unwrap(), message(4));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let hub = hub();
        assert_eq!(hub.publish(Target::User(Uuid::new_v4()), message(5)), 0);
    }

    #[tokio::test]
    async fn reauthenticate_does_not_duplicate_and_moves_rooms() {
        let hub = hub();
        let first_driver = Uuid::new_v4();
        let second_driver = Uuid::new_v4();
        let (conn, mut rx) = hub.connect();

        hub.authenticate(conn, driver_identity(first_driver)).unwrap();
        hub.authenticate(conn, driver_identity(first_driver)).unwrap();
        assert_eq!(hub.room_size(&Target::Role(Role::Driver)), 1);

        hub.authenticate(conn, driver_identity(second_driver)).unwrap();
        assert_eq!(hub.room_size(&Target::Driver(first_driver)), 0);
        assert_eq!(hub.room_size(&Target::Driver(second_driver)), 1);
        assert_eq!(hub.room_size(&Target::Everyone), 1);

        assert_eq!(hub.publish(Target::Role(Role::Driver), message(6)), 1);
        assert_eq!(*rx.recv().await.unwrap(), message(6));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn disconnect_removes_connection_from_all_rooms() {
        let hub = hub();
        let driver_id = Uuid::new_v4();
        let (conn, _rx) = hub.connect();
        hub.authenticate(conn, driver_identity(driver_id)).unwrap();

        hub.disconnect(conn);

        assert_eq!(hub.connection_count(), 0);
        assert_eq!(hub.room_size(&Target::Driver(driver_id)), 0);
        assert_eq!(hub.room_size(&Target::Everyone), 0);
        assert_eq!(hub.publish(Target::Driver(driver_id), message(7)), 0);
    }

    #[test]
    fn authenticate_unknown_connection_is_not_found() {
        let hub = hub();
        let result = hub.authenticate(Uuid::new_v4(), driver_identity(Uuid::new_v4()));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn same_target_preserves_publish_order() {
        let hub = hub();
        let restaurant_id = Uuid::new_v4();
        let (conn, mut rx) = hub.connect();
        hub.authenticate(
            conn,
            Identity {
                account_id: Uuid::new_v4(),
                role: Role::Restaurant,
                restaurant_id: Some(restaurant_id),
                driver_id: None,
            },
        )
        .unwrap();

        for n in 0..10 {
            hub.publish(Target::Restaurant(restaurant_id), message(n));
        }
        for n in 0..10 {
            assert_eq!(*rx.recv().await.unwrap(), message(n));
        }
    }

    #[tokio::test]
    async fn dropped_receiver_is_pruned_on_publish() {
        let hub = hub();
        let (conn, rx) = hub.connect();
        hub.authenticate(conn, driver_identity(Uuid::new_v4())).unwrap();
        drop(rx);

        let event = Event::DriverStatusChanged(DriverStatusChanged {
            driver_id: Uuid::new_v4(),
            is_online: true,
            is_available: true,
        });
        assert_eq!(hub.publish(Target::Role(Role::Driver), event), 0);
        assert_eq!(hub.room_size(&Target::Role(Role::Driver)), 0);
    }

    #[tokio::test]
    async fn shutdown_closes_mailboxes() {
        let hub = hub();
        let (_conn, mut rx) = hub.connect();

        assert_eq!(hub.shutdown(), 1);
        assert!(rx.recv().await.is_none());
        assert_eq!(hub.connection_count(), 0);
    }
}
