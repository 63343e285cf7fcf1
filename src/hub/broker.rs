use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, RwLock};

use crate::events::ProjectEvent;
use crate::metrics::HubMetrics;
use crate::websocket::Message;

use super::registry::{Connection, DeliveryFailure, HubSnapshot, Recipient, Registry};
use super::ClientId;

/// Error returned when the hub event loop is no longer running
#[derive(Debug, Clone, thiserror::Error)]
pub enum HubError {
    #[error("hub event loop is not running")]
    Closed,
}

/// Request to add or remove one channel from a client's subscription set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub client_id: ClientId,
    pub channel: String,
}

/// Events processed by the hub loop, strictly one at a time in arrival order
#[derive(Debug)]
pub enum HubEvent {
    Register(Connection),
    /// Removes the entry only if it still belongs to the connection with
    /// this serial
    Unregister { client_id: ClientId, serial: u64 },
    Subscribe(Subscription),
    Unsubscribe(Subscription),
    Broadcast(Message),
    Send { client_id: ClientId, message: Message },
}

/// The single owner of the client registry.
///
/// Only this loop mutates the registry. Other tasks reach it through a
/// [`HubHandle`], which queues events and may take read-only snapshots.
pub struct Hub {
    events: mpsc::UnboundedReceiver<HubEvent>,
    registry: Arc<RwLock<Registry>>,
}

impl Hub {
    pub fn new() -> (Self, HubHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = Arc::new(RwLock::new(Registry::new()));

        let hub = Self {
            events: rx,
            registry: registry.clone(),
        };
        let handle = HubHandle {
            events: tx,
            registry,
        };
        (hub, handle)
    }

    /// Process events until shutdown is signalled or every handle is dropped.
    /// On exit every outbound buffer is closed.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!("Hub event loop started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Hub received shutdown signal");
                    break;
                }
                event = self.events.recv() => match event {
                    Some(event) => self.apply(event).await,
                    None => {
                        tracing::info!("All hub handles dropped");
                        break;
                    }
                }
            }
        }

        let closed = self.registry.write().await.clear();
        HubMetrics::set_clients(0);
        tracing::info!(closed_connections = closed, "Hub event loop stopped");
    }

    /// Take every queued event without applying it
    #[cfg(test)]
    pub(crate) fn drain_pending(&mut self) -> Vec<HubEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Apply a single event to the registry
    pub async fn apply(&self, event: HubEvent) {
        match event {
            HubEvent::Register(connection) => self.register(connection).await,
            HubEvent::Unregister { client_id, serial } => {
                self.unregister(&client_id, serial).await
            }
            HubEvent::Subscribe(sub) => self.subscribe(sub).await,
            HubEvent::Unsubscribe(sub) => self.unsubscribe(sub).await,
            HubEvent::Broadcast(message) => self.broadcast(message).await,
            HubEvent::Send { client_id, message } => self.send(&client_id, message).await,
        }
    }

    async fn register(&self, connection: Connection) {
        let client_id = connection.id.clone();

        let (recipient, total) = {
            let mut registry = self.registry.write().await;
            if let Err(duplicate) = registry.insert(connection) {
                tracing::warn!(client_id = %duplicate.id, "Duplicate client id, registration ignored");
                return;
            }
            HubMetrics::set_clients(registry.len());
            (registry.recipient(&client_id), registry.len())
        };

        HubMetrics::record_registered();
        tracing::info!(client_id = %client_id, total = total, "Client connected");

        if let Some(recipient) = recipient {
            self.deliver_all(vec![recipient], Message::connected(&client_id))
                .await;
        }
    }

    async fn unregister(&self, client_id: &ClientId, serial: u64) {
        let mut registry = self.registry.write().await;
        if registry.remove(client_id, serial) {
            HubMetrics::record_unregistered();
            HubMetrics::set_clients(registry.len());
            tracing::info!(client_id = %client_id, total = registry.len(), "Client disconnected");
        }
    }

    async fn subscribe(&self, sub: Subscription) {
        let mut registry = self.registry.write().await;
        if registry.subscribe(&sub.client_id, &sub.channel) {
            tracing::info!(client_id = %sub.client_id, channel = %sub.channel, "Subscribed to channel");
        } else {
            tracing::debug!(client_id = %sub.client_id, channel = %sub.channel, "Subscribe for unknown client dropped");
        }
    }

    async fn unsubscribe(&self, sub: Subscription) {
        let mut registry = self.registry.write().await;
        if registry.unsubscribe(&sub.client_id, &sub.channel) {
            tracing::info!(client_id = %sub.client_id, channel = %sub.channel, "Unsubscribed from channel");
        }
    }

    async fn broadcast(&self, message: Message) {
        // Copy recipients so the read lock is released before any enqueue
        let recipients = self.registry.read().await.recipients(&message);

        HubMetrics::record_broadcast(message.is_global());
        tracing::debug!(
            kind = %message.kind,
            channel = %message.channel,
            recipients = recipients.len(),
            "Broadcasting message"
        );

        self.deliver_all(recipients, message).await;
    }

    async fn send(&self, client_id: &ClientId, message: Message) {
        let recipient = self.registry.read().await.recipient(client_id);
        match recipient {
            Some(recipient) => self.deliver_all(vec![recipient], message).await,
            None => {
                tracing::debug!(client_id = %client_id, kind = %message.kind, "Direct send to unknown client dropped");
            }
        }
    }

    /// Non-blocking enqueue to each recipient. A full or closed buffer evicts
    /// that client; nobody else is affected.
    async fn deliver_all(&self, recipients: Vec<Recipient>, message: Message) {
        let mut delivered = 0u64;
        let mut failed = Vec::new();

        for recipient in &recipients {
            match recipient.try_deliver(message.clone()) {
                Ok(()) => delivered += 1,
                Err(failure) => failed.push((recipient.id.clone(), recipient.serial, failure)),
            }
        }
        // Release our sender clones before evicting so removal really closes
        drop(recipients);

        HubMetrics::record_delivered(delivered);

        if !failed.is_empty() {
            self.evict(failed).await;
        }
    }

    async fn evict(&self, failed: Vec<(ClientId, u64, DeliveryFailure)>) {
        let mut registry = self.registry.write().await;
        for (client_id, serial, failure) in failed {
            if registry.remove(&client_id, serial) {
                HubMetrics::record_evicted(failure.as_str());
                tracing::warn!(
                    client_id = %client_id,
                    reason = failure.as_str(),
                    "Evicting client with unavailable outbound buffer"
                );
            }
        }
        HubMetrics::set_clients(registry.len());
    }
}

/// Cloneable entry point to the hub for connections, producers and status
/// readers
#[derive(Clone)]
pub struct HubHandle {
    events: mpsc::UnboundedSender<HubEvent>,
    registry: Arc<RwLock<Registry>>,
}

impl HubHandle {
    fn dispatch(&self, event: HubEvent) -> Result<(), HubError> {
        self.events.send(event).map_err(|_| HubError::Closed)
    }

    pub fn register(&self, connection: Connection) -> Result<(), HubError> {
        self.dispatch(HubEvent::Register(connection))
    }

    /// Idempotent; unregistering an absent client, or one whose id has since
    /// been taken by another connection, is a no-op
    pub fn unregister(&self, client_id: &ClientId, serial: u64) -> Result<(), HubError> {
        self.dispatch(HubEvent::Unregister {
            client_id: client_id.clone(),
            serial,
        })
    }

    pub fn subscribe(&self, client_id: &ClientId, channel: impl Into<String>) -> Result<(), HubError> {
        self.dispatch(HubEvent::Subscribe(Subscription {
            client_id: client_id.clone(),
            channel: channel.into(),
        }))
    }

    pub fn unsubscribe(&self, client_id: &ClientId, channel: impl Into<String>) -> Result<(), HubError> {
        self.dispatch(HubEvent::Unsubscribe(Subscription {
            client_id: client_id.clone(),
            channel: channel.into(),
        }))
    }

    /// Fan out to everyone, or to subscribers of `message.channel` when set
    pub fn broadcast(&self, message: Message) -> Result<(), HubError> {
        self.dispatch(HubEvent::Broadcast(message))
    }

    pub fn broadcast_to_channel(
        &self,
        channel: impl Into<String>,
        message: Message,
    ) -> Result<(), HubError> {
        self.broadcast(message.with_channel(channel))
    }

    /// Deliver to a single client's outbound buffer
    pub fn send_to(&self, client_id: &ClientId, message: Message) -> Result<(), HubError> {
        self.dispatch(HubEvent::Send {
            client_id: client_id.clone(),
            message,
        })
    }

    /// Announce a committed project mutation on its channel
    pub fn publish_project_event(&self, event: ProjectEvent) -> Result<(), HubError> {
        self.broadcast(event.into_message())
    }

    pub async fn snapshot(&self) -> HubSnapshot {
        self.registry.read().await.snapshot()
    }

    pub async fn client_count(&self) -> usize {
        self.registry.read().await.len()
    }

    pub async fn is_registered(&self, client_id: &ClientId) -> bool {
        self.registry.read().await.contains(client_id)
    }

    pub async fn is_subscribed(&self, client_id: &ClientId, channel: &str) -> bool {
        self.registry
            .read()
            .await
            .get(client_id)
            .is_some_and(|c| c.is_subscribed(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn open(hub: &Hub, id: &str, capacity: usize) -> mpsc::Receiver<Message> {
        let (connection, rx) = Connection::open(ClientId::from(id), capacity);
        hub.apply(HubEvent::Register(connection)).await;
        rx
    }

    async fn serial_of(hub: &Hub, id: &str) -> u64 {
        hub.registry
            .read()
            .await
            .get(&ClientId::from(id))
            .map(Connection::serial)
            .expect("registered")
    }

    fn unregister(id: &str, serial: u64) -> HubEvent {
        HubEvent::Unregister {
            client_id: ClientId::from(id),
            serial,
        }
    }

    fn sub(id: &str, channel: &str) -> Subscription {
        Subscription {
            client_id: ClientId::from(id),
            channel: channel.to_string(),
        }
    }

    /// Consume the handshake message sent on registration
    fn expect_connected(rx: &mut mpsc::Receiver<Message>) {
        let msg = rx.try_recv().expect("connected message");
        assert_eq!(msg.kind, "connected");
    }

    #[tokio::test]
    async fn test_register_sends_connected() {
        let (hub, handle) = Hub::new();
        let mut rx = open(&hub, "a", 8).await;

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.kind, "connected");
        assert_eq!(msg.data.unwrap()["clientId"], "a");
        assert!(handle.is_registered(&ClientId::from("a")).await);
    }

    #[tokio::test]
    async fn test_duplicate_register_is_ignored() {
        let (hub, handle) = Hub::new();
        let _rx1 = open(&hub, "a", 8).await;
        let mut rx2 = open(&hub, "a", 8).await;

        assert_eq!(handle.client_count().await, 1);
        // The duplicate's buffer was dropped with the rejected record
        assert!(rx2.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_teardown_keeps_original() {
        let (hub, handle) = Hub::new();
        let mut original = open(&hub, "dup", 8).await;
        expect_connected(&mut original);

        let (duplicate, _rx) = Connection::open(ClientId::from("dup"), 8);
        let duplicate_serial = duplicate.serial();
        hub.apply(HubEvent::Register(duplicate)).await;
        // The refused connection tears down with its own serial
        hub.apply(unregister("dup", duplicate_serial)).await;

        assert!(handle.is_registered(&ClientId::from("dup")).await);
        hub.apply(HubEvent::Broadcast(Message::new("still-here"))).await;
        assert_eq!(original.try_recv().unwrap().kind, "still-here");
    }

    #[tokio::test]
    async fn test_subscribe_cost_does_not_grow_with_registry() {
        let (hub, handle) = Hub::new();
        let count = 5_000;
        let mut receivers = Vec::with_capacity(count);
        for i in 0..count {
            receivers.push(open(&hub, &format!("c{}", i), 2).await);
        }

        // One distinct channel per client; a per-event scan of every
        // subscription would make this quadratic
        let started = std::time::Instant::now();
        for i in 0..count {
            let id = format!("c{}", i);
            hub.apply(HubEvent::Subscribe(sub(&id, &format!("ch{}", i))))
                .await;
        }
        let elapsed = started.elapsed();

        assert!(
            elapsed < std::time::Duration::from_secs(3),
            "{} subscribes took {:?}",
            count,
            elapsed
        );
        assert_eq!(handle.snapshot().await.channel_count(), count);
    }

    #[tokio::test]
    async fn test_unregister_closes_buffer_once() {
        let (hub, handle) = Hub::new();
        let mut rx = open(&hub, "a", 8).await;
        expect_connected(&mut rx);
        let serial = serial_of(&hub, "a").await;

        hub.apply(unregister("a", serial)).await;
        hub.apply(unregister("a", serial)).await;
        hub.apply(unregister("never", serial)).await;

        assert_eq!(handle.client_count().await, 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_register_unregister_sequence_tracks_live_set() {
        let (hub, handle) = Hub::new();
        let _a = open(&hub, "a", 8).await;
        let _b = open(&hub, "b", 8).await;
        let _c = open(&hub, "c", 8).await;
        let serial = serial_of(&hub, "b").await;
        hub.apply(unregister("b", serial)).await;
        let _d = open(&hub, "d", 8).await;

        let ids = handle.snapshot().await.client_ids();
        assert_eq!(
            ids,
            vec![ClientId::from("a"), ClientId::from("c"), ClientId::from("d")]
        );
    }

    #[tokio::test]
    async fn test_global_broadcast_reaches_everyone() {
        let (hub, _handle) = Hub::new();
        let mut a = open(&hub, "a", 8).await;
        let mut b = open(&hub, "b", 8).await;
        expect_connected(&mut a);
        expect_connected(&mut b);
        hub.apply(HubEvent::Subscribe(sub("a", "projects"))).await;

        hub.apply(HubEvent::Broadcast(Message::new("announcement"))).await;

        assert_eq!(a.try_recv().unwrap().kind, "announcement");
        assert_eq!(b.try_recv().unwrap().kind, "announcement");
    }

    #[tokio::test]
    async fn test_channel_broadcast_reaches_only_subscribers() {
        let (hub, _handle) = Hub::new();
        let mut a = open(&hub, "a", 8).await;
        let mut b = open(&hub, "b", 8).await;
        expect_connected(&mut a);
        expect_connected(&mut b);
        hub.apply(HubEvent::Subscribe(sub("a", "projects"))).await;

        let message = Message::new("project_updated")
            .with_channel("projects")
            .with_data(json!({"id": 5}));
        hub.apply(HubEvent::Broadcast(message)).await;

        let received = a.try_recv().unwrap();
        assert_eq!(received.channel, "projects");
        assert_eq!(received.data.unwrap(), json!({"id": 5}));
        assert!(b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_restores_delivery_behaviour() {
        let (hub, handle) = Hub::new();
        let mut a = open(&hub, "a", 8).await;
        expect_connected(&mut a);
        let id = ClientId::from("a");

        hub.apply(HubEvent::Subscribe(sub("a", "projects"))).await;
        assert!(handle.is_subscribed(&id, "projects").await);
        hub.apply(HubEvent::Unsubscribe(sub("a", "projects"))).await;
        assert!(!handle.is_subscribed(&id, "projects").await);

        hub.apply(HubEvent::Broadcast(Message::new("x").with_channel("projects")))
            .await;
        assert!(a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscribe_for_unknown_client_is_dropped() {
        let (hub, handle) = Hub::new();
        hub.apply(HubEvent::Subscribe(sub("ghost", "projects"))).await;
        hub.apply(HubEvent::Unsubscribe(sub("ghost", "projects"))).await;
        assert_eq!(handle.client_count().await, 0);
    }

    #[tokio::test]
    async fn test_saturated_client_is_evicted() {
        let (hub, handle) = Hub::new();
        // capacity 1 is consumed by the connected message
        let mut slow = open(&hub, "slow", 1).await;
        let mut fast = open(&hub, "fast", 8).await;
        expect_connected(&mut fast);

        hub.apply(HubEvent::Broadcast(Message::new("first"))).await;

        assert!(!handle.is_registered(&ClientId::from("slow")).await);
        assert!(handle.is_registered(&ClientId::from("fast")).await);
        assert_eq!(fast.try_recv().unwrap().kind, "first");

        hub.apply(HubEvent::Broadcast(Message::new("second"))).await;
        assert_eq!(fast.try_recv().unwrap().kind, "second");

        // The slow client drains what it had, then sees the closed buffer
        assert_eq!(slow.recv().await.unwrap().kind, "connected");
        assert!(slow.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_buffer_is_evicted() {
        let (hub, handle) = Hub::new();
        let rx = open(&hub, "gone", 8).await;
        drop(rx);

        hub.apply(HubEvent::Broadcast(Message::new("hello"))).await;
        assert_eq!(handle.client_count().await, 0);
    }

    #[tokio::test]
    async fn test_direct_send_targets_one_client() {
        let (hub, _handle) = Hub::new();
        let mut a = open(&hub, "a", 8).await;
        let mut b = open(&hub, "b", 8).await;
        expect_connected(&mut a);
        expect_connected(&mut b);

        hub.apply(HubEvent::Send {
            client_id: ClientId::from("b"),
            message: Message::pong(),
        })
        .await;

        assert!(a.try_recv().is_err());
        assert_eq!(b.try_recv().unwrap().kind, "pong");
    }

    #[tokio::test]
    async fn test_handle_reports_closed_loop() {
        let (hub, handle) = Hub::new();
        drop(hub);
        assert!(matches!(
            handle.broadcast(Message::new("x")),
            Err(HubError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_run_processes_events_and_closes_on_shutdown() {
        let (hub, handle) = Hub::new();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(hub.run(shutdown_rx));

        let (connection, mut rx) = Connection::open(ClientId::from("a"), 8);
        handle.register(connection).unwrap();
        handle.subscribe(&ClientId::from("a"), "projects").unwrap();
        handle
            .publish_project_event(ProjectEvent::Deleted { id: 9 })
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().kind, "connected");
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, "project_deleted");
        assert_eq!(event.channel, "projects");

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();

        assert!(rx.recv().await.is_none());
        assert_eq!(handle.client_count().await, 0);
    }
}
