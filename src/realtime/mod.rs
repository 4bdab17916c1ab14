//! Room-based real-time broadcast server.
//!
//! Connection lifecycle: connected (unauthenticated) -> optionally
//! authenticated via connection-time query parameters or a later
//! `authenticate` frame. Every state may subscribe, unsubscribe, negotiate a
//! push frequency, and ping. Rooms are created lazily on first subscription
//! and deleted when their membership drops to zero; unauthenticated clients
//! may subscribe to any room.
//!
//! Two independent timers drive output: a broadcast tick that pushes metrics
//! snapshots to `realtime-metrics` members at each member's own negotiated
//! frequency, and a heartbeat tick that pings live connections and reaps
//! stale ones. Sends are best-effort and unbounded; a slow client is never
//! flow-controlled, only eventually reaped.

pub mod protocol;

pub use protocol::{ClientMessage, ServerMessage, ALERTS_ROOM, REALTIME_METRICS_ROOM};

use crate::aggregation::MetricsAggregator;
use crate::alerts::AlertEngine;
use crate::core::config::{AuthConfig, RealtimeConfig};
use crate::core::AbPulseError;
use crate::events::{AnalyticsEvent, EventBus};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use rand::RngCore;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::interval;

/// Granularity of the broadcast scheduler. Per-client frequencies are
/// multiples of at least this (min_frequency is clamped to >= 1s).
const BROADCAST_TICK: Duration = Duration::from_secs(1);

/// How a connection proved its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Token { user_id: String },
    ApiKey,
}

struct ClientConnection {
    auth: AuthState,
    rooms: HashSet<String>,
    last_seen: Instant,
    frequency: Duration,
    last_push: Option<Instant>,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

/// The real-time broadcast server: connection registry, rooms, and timers.
pub struct RealtimeServer {
    config: RealtimeConfig,
    auth_config: AuthConfig,
    aggregator: Arc<MetricsAggregator>,
    alerts: Arc<AlertEngine>,
    events: Arc<EventBus>,
    connections: DashMap<String, ClientConnection>,
    rooms: DashMap<String, HashSet<String>>,
    shutdown: Arc<AtomicBool>,
}

impl RealtimeServer {
    /// Create a server; call [`RealtimeServer::start`] to launch its timers.
    pub fn new(
        config: RealtimeConfig,
        auth_config: AuthConfig,
        aggregator: Arc<MetricsAggregator>,
        alerts: Arc<AlertEngine>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            auth_config,
            aggregator,
            alerts,
            events,
            connections: DashMap::new(),
            rooms: DashMap::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Launch the broadcast, heartbeat, and event fan-out tasks.
    pub fn start(self: &Arc<Self>) {
        let server = Arc::clone(self);
        let shutdown = Arc::clone(&self.shutdown);
        tokio::spawn(async move {
            let mut ticker = interval(BROADCAST_TICK);
            while !shutdown.load(Ordering::Relaxed) {
                ticker.tick().await;
                server.broadcast_tick().await;
            }
        });

        let server = Arc::clone(self);
        let shutdown = Arc::clone(&self.shutdown);
        let heartbeat = self.config.heartbeat_interval;
        tokio::spawn(async move {
            let mut ticker = interval(heartbeat);
            while !shutdown.load(Ordering::Relaxed) {
                ticker.tick().await;
                server.heartbeat_tick();
            }
        });

        let server = Arc::clone(self);
        let shutdown = Arc::clone(&self.shutdown);
        let mut subscription = self.events.subscribe();
        tokio::spawn(async move {
            while !shutdown.load(Ordering::Relaxed) {
                match subscription.recv().await {
                    Some(event) => server.handle_event(event),
                    None => break,
                }
            }
        });
    }

    /// Stop all background tasks.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Register a new connection, applying connection-time credentials.
    /// Returns the assigned client id.
    pub fn connect(
        &self,
        tx: mpsc::UnboundedSender<ServerMessage>,
        token: Option<&str>,
        api_key: Option<&str>,
    ) -> String {
        let client_id = new_client_id();
        self.connections.insert(
            client_id.clone(),
            ClientConnection {
                auth: AuthState::Unauthenticated,
                rooms: HashSet::new(),
                last_seen: Instant::now(),
                frequency: self.config.default_frequency,
                last_push: None,
                tx,
            },
        );

        if token.is_some() || api_key.is_some() {
            let authenticated = self.try_authenticate(&client_id, token, api_key);
            if authenticated {
                self.send_to(&client_id, ServerMessage::Connected {
                    client_id: client_id.clone(),
                });
            } else {
                // Invalid credentials degrade to unauthenticated; the
                // connection stays open.
                let err = AbPulseError::auth("invalid token or api key");
                self.send_to(
                    &client_id,
                    ServerMessage::error(err.to_string(), Some("auth_failed")),
                );
                self.send_to(&client_id, ServerMessage::ConnectedUnauthenticated {
                    client_id: client_id.clone(),
                });
            }
        } else {
            self.send_to(&client_id, ServerMessage::ConnectedUnauthenticated {
                client_id: client_id.clone(),
            });
        }

        tracing::debug!(client_id = %client_id, total = self.connections.len(), "client connected");
        client_id
    }

    /// Handle one client frame.
    pub async fn handle_message(&self, client_id: &str, message: ClientMessage) {
        self.touch(client_id);
        match message {
            ClientMessage::Authenticate { token, api_key } => {
                if !self.try_authenticate(client_id, token.as_deref(), api_key.as_deref()) {
                    let err = AbPulseError::auth("invalid token or api key");
                    self.send_to(
                        client_id,
                        ServerMessage::error(err.to_string(), Some("auth_failed")),
                    );
                }
            },
            ClientMessage::Subscribe { room } => self.subscribe(client_id, &room).await,
            ClientMessage::Unsubscribe { room } => self.unsubscribe(client_id, &room),
            ClientMessage::SetMetricsFrequency { frequency } => {
                self.set_frequency(client_id, frequency)
            },
            ClientMessage::Ping => {
                self.send_to(client_id, ServerMessage::Pong {
                    timestamp: chrono::Utc::now().timestamp_millis(),
                });
            },
        }
    }

    /// Validate credentials and upgrade the connection's auth state. An
    /// invalid credential never downgrades an existing authentication.
    fn try_authenticate(
        &self,
        client_id: &str,
        token: Option<&str>,
        api_key: Option<&str>,
    ) -> bool {
        let new_state = if let Some(token) = token {
            self.auth_config
                .tokens
                .get(token)
                .map(|user_id| (AuthState::Token {
                    user_id: user_id.clone(),
                }, "token"))
        } else if let Some(key) = api_key {
            self.auth_config
                .api_keys
                .iter()
                .any(|k| k == key)
                .then_some((AuthState::ApiKey, "apiKey"))
        } else {
            None
        };

        let Some((state, method)) = new_state else {
            return false;
        };

        let user_id = match &state {
            AuthState::Token { user_id } => Some(user_id.clone()),
            _ => None,
        };
        if let Some(mut conn) = self.connections.get_mut(client_id) {
            conn.auth = state;
        }
        self.send_to(client_id, ServerMessage::Authenticated {
            method: method.to_string(),
            user_id,
        });
        true
    }

    async fn subscribe(&self, client_id: &str, room: &str) {
        if room.is_empty() {
            let err = AbPulseError::validation("room name must not be empty");
            self.send_to(
                client_id,
                ServerMessage::error(err.to_string(), Some("invalid_room")),
            );
            return;
        }

        {
            let Some(mut conn) = self.connections.get_mut(client_id) else {
                return;
            };
            conn.rooms.insert(room.to_string());
        }
        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(client_id.to_string());

        // A disconnect (close, error, or reaper) can interleave between the
        // two table updates above: it removes the connection and cleans the
        // rooms it finds there, then our insert lands and would leave a
        // member with no backing connection. Re-check and undo.
        if !self.connections.contains_key(client_id) {
            self.remove_from_room(room, client_id);
            return;
        }

        self.send_to(client_id, ServerMessage::Subscribed {
            room: room.to_string(),
        });
        tracing::debug!(client_id, room, "subscribed");

        // Joining the metrics room gets an immediate one-shot snapshot.
        if room == REALTIME_METRICS_ROOM {
            match self
                .aggregator
                .get_real_time_metrics(self.alerts.unacknowledged_count())
                .await
            {
                Ok(snapshot) => {
                    if let Some(mut conn) = self.connections.get_mut(client_id) {
                        conn.last_push = Some(Instant::now());
                        let _ = conn.tx.send(ServerMessage::RealtimeMetrics { data: snapshot });
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "initial metrics push failed");
                },
            }
        }
    }

    fn unsubscribe(&self, client_id: &str, room: &str) {
        if let Some(mut conn) = self.connections.get_mut(client_id) {
            conn.rooms.remove(room);
        }
        self.remove_from_room(room, client_id);
        self.send_to(client_id, ServerMessage::Unsubscribed {
            room: room.to_string(),
        });
    }

    fn set_frequency(&self, client_id: &str, frequency_ms: u64) {
        let min = self.config.min_frequency.as_millis() as u64;
        let max = self.config.max_frequency.as_millis() as u64;
        if frequency_ms < min || frequency_ms > max {
            let err = AbPulseError::FrequencyOutOfRange {
                got: frequency_ms,
                min,
                max,
            };
            self.send_to(
                client_id,
                ServerMessage::error(err.to_string(), Some("invalid_frequency")),
            );
            return;
        }

        if let Some(mut conn) = self.connections.get_mut(client_id) {
            conn.frequency = Duration::from_millis(frequency_ms);
        }
        self.send_to(client_id, ServerMessage::FrequencyUpdated {
            frequency: frequency_ms,
        });
    }

    /// Tear down a connection: leave every room, delete rooms left empty,
    /// drop the connection record. Idempotent; safe to call from the close
    /// path, the error path, and the reaper.
    pub fn disconnect(&self, client_id: &str) -> bool {
        // The removal is the exactly-once gate: whichever trigger gets here
        // first runs the cleanup, later callers see None.
        let Some((_, conn)) = self.connections.remove(client_id) else {
            return false;
        };
        for room in &conn.rooms {
            self.remove_from_room(room, client_id);
        }
        tracing::debug!(client_id, remaining = self.connections.len(), "client disconnected");
        true
    }

    fn remove_from_room(&self, room: &str, client_id: &str) {
        let emptied = if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(client_id);
            members.is_empty()
        } else {
            false
        };
        if emptied {
            self.rooms.remove(room);
            tracing::debug!(room, "room deleted");
        }
    }

    /// One pass of the broadcast scheduler: push a fresh snapshot to every
    /// `realtime-metrics` member whose negotiated frequency has elapsed. A
    /// tick with no members (or no member due) computes nothing.
    pub async fn broadcast_tick(&self) {
        let members: Vec<String> = match self.rooms.get(REALTIME_METRICS_ROOM) {
            Some(members) => members.iter().cloned().collect(),
            None => return,
        };

        let now = Instant::now();
        let due: Vec<String> = members
            .into_iter()
            .filter(|id| {
                self.connections
                    .get(id)
                    .map(|c| c.last_push.map_or(true, |t| now.duration_since(t) >= c.frequency))
                    .unwrap_or(false)
            })
            .collect();
        if due.is_empty() {
            return;
        }

        let snapshot = match self
            .aggregator
            .get_real_time_metrics(self.alerts.unacknowledged_count())
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "broadcast snapshot failed");
                return;
            },
        };

        self.events
            .publish(AnalyticsEvent::RealTimeUpdate(snapshot.clone()));
        for client_id in due {
            if let Some(mut conn) = self.connections.get_mut(&client_id) {
                conn.last_push = Some(now);
                let _ = conn.tx.send(ServerMessage::RealtimeMetrics {
                    data: snapshot.clone(),
                });
            }
        }
    }

    /// One pass of the heartbeat reaper: disconnect connections silent for
    /// longer than the stale threshold, ping the rest.
    pub fn heartbeat_tick(&self) {
        let now = Instant::now();
        let stale: Vec<String> = self
            .connections
            .iter()
            .filter(|entry| now.duration_since(entry.last_seen) > self.config.stale_threshold)
            .map(|entry| entry.key().clone())
            .collect();

        for client_id in stale {
            tracing::info!(client_id = %client_id, "reaping stale connection");
            self.disconnect(&client_id);
        }

        let timestamp = chrono::Utc::now().timestamp_millis();
        for conn in self.connections.iter() {
            let _ = conn.tx.send(ServerMessage::Ping { timestamp });
        }
    }

    /// Fan alert lifecycle events out to the alerts room.
    fn handle_event(&self, event: AnalyticsEvent) {
        match event {
            AnalyticsEvent::NewAlert(alert) => {
                self.send_to_room(ALERTS_ROOM, ServerMessage::NewAlert { data: alert });
            },
            AnalyticsEvent::AlertAcknowledged(alert) => {
                self.send_to_room(ALERTS_ROOM, ServerMessage::AlertAcknowledged { data: alert });
            },
            // RealTimeUpdate originates from our own broadcast tick; the SSE
            // stream is its other consumer.
            _ => {},
        }
    }

    fn send_to_room(&self, room: &str, message: ServerMessage) {
        let Some(members) = self.rooms.get(room) else {
            return;
        };
        for client_id in members.iter() {
            if let Some(conn) = self.connections.get(client_id) {
                let _ = conn.tx.send(message.clone());
            }
        }
    }

    fn send_to(&self, client_id: &str, message: ServerMessage) {
        if let Some(conn) = self.connections.get(client_id) {
            let _ = conn.tx.send(message);
        }
    }

    /// Record liveness for a client.
    pub fn touch(&self, client_id: &str) {
        if let Some(mut conn) = self.connections.get_mut(client_id) {
            conn.last_seen = Instant::now();
        }
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Members of a room, or empty when the room does not exist.
    pub fn room_members(&self, room: &str) -> Vec<String> {
        self.rooms
            .get(room)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether a room currently exists.
    pub fn room_exists(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    /// Rooms a client belongs to, or empty when unknown.
    pub fn client_rooms(&self, client_id: &str) -> Vec<String> {
        self.connections
            .get(client_id)
            .map(|c| c.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The client's auth state, or None when unknown.
    pub fn auth_state(&self, client_id: &str) -> Option<AuthState> {
        self.connections.get(client_id).map(|c| c.auth.clone())
    }
}

fn new_client_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("client-{}", hex::encode(bytes))
}

/// Connection-time credentials supplied as query parameters.
#[derive(Debug, Deserialize)]
struct AuthQuery {
    token: Option<String>,
    #[serde(rename = "apiKey")]
    api_key: Option<String>,
}

/// Router exposing the WebSocket endpoint at `/ws`.
pub fn router(server: Arc<RealtimeServer>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(server)
}

async fn ws_handler(
    State(server): State<Arc<RealtimeServer>>,
    Query(auth): Query<AuthQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| client_loop(server, socket, auth))
}

async fn client_loop(server: Arc<RealtimeServer>, socket: WebSocket, auth: AuthQuery) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client_id = server.connect(tx, auth.token.as_deref(), auth.api_key.as_deref());

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&message) else {
                continue;
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(parsed) => server.handle_message(&client_id, parsed).await,
                Err(e) => {
                    // Malformed frames get an error reply; the connection
                    // stays open.
                    server.send_to(
                        &client_id,
                        ServerMessage::error(format!("invalid message: {}", e), Some("bad_message")),
                    );
                },
            },
            Message::Ping(_) | Message::Pong(_) => server.touch(&client_id),
            Message::Close(_) => break,
            _ => {},
        }
    }

    server.disconnect(&client_id);
    writer.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{AlertsConfig, CacheConfig, StoreConfig};
    use crate::store::{MemoryMetricsStore, MetricsStore};

    fn server_with(config: RealtimeConfig) -> Arc<RealtimeServer> {
        let store: Arc<dyn MetricsStore> = Arc::new(MemoryMetricsStore::new());
        let events = Arc::new(EventBus::new());
        let aggregator = Arc::new(MetricsAggregator::new(
            store,
            Arc::clone(&events),
            StoreConfig::default(),
            CacheConfig::default(),
        ));
        let alerts = Arc::new(AlertEngine::new(
            Arc::clone(&aggregator),
            Arc::clone(&events),
            AlertsConfig::default(),
        ));
        let mut auth = AuthConfig::default();
        auth.tokens.insert("tok-1".to_string(), "user-1".to_string());
        auth.api_keys.push("key-1".to_string());
        Arc::new(RealtimeServer::new(config, auth, aggregator, alerts, events))
    }

    fn connect(server: &RealtimeServer) -> (String, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = server.connect(tx, None, None);
        (id, rx)
    }

    #[tokio::test]
    async fn test_connect_unauthenticated_then_authenticate() {
        let server = server_with(RealtimeConfig::default());
        let (id, mut rx) = connect(&server);

        assert!(matches!(
            rx.recv().await,
            Some(ServerMessage::ConnectedUnauthenticated { .. })
        ));
        assert_eq!(server.auth_state(&id), Some(AuthState::Unauthenticated));

        server
            .handle_message(
                &id,
                ClientMessage::Authenticate {
                    token: Some("tok-1".to_string()),
                    api_key: None,
                },
            )
            .await;

        match rx.recv().await {
            Some(ServerMessage::Authenticated { method, user_id }) => {
                assert_eq!(method, "token");
                assert_eq!(user_id.as_deref(), Some("user-1"));
            },
            other => panic!("expected authenticated frame, got {:?}", other),
        }
        assert_eq!(
            server.auth_state(&id),
            Some(AuthState::Token {
                user_id: "user-1".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_invalid_credentials_keep_connection_open() {
        let server = server_with(RealtimeConfig::default());
        let (id, mut rx) = connect(&server);
        let _ = rx.recv().await;

        server
            .handle_message(
                &id,
                ClientMessage::Authenticate {
                    token: Some("wrong".to_string()),
                    api_key: None,
                },
            )
            .await;

        assert!(matches!(rx.recv().await, Some(ServerMessage::Error { .. })));
        assert_eq!(server.connection_count(), 1);
        assert_eq!(server.auth_state(&id), Some(AuthState::Unauthenticated));
    }

    #[tokio::test]
    async fn test_room_membership_bidirectional_consistency() {
        let server = server_with(RealtimeConfig::default());
        let (a, _rx_a) = connect(&server);
        let (b, _rx_b) = connect(&server);

        server
            .handle_message(&a, ClientMessage::Subscribe { room: "alerts".into() })
            .await;
        server
            .handle_message(&b, ClientMessage::Subscribe { room: "alerts".into() })
            .await;
        server
            .handle_message(&b, ClientMessage::Subscribe { room: "ops".into() })
            .await;

        let mut members = server.room_members("alerts");
        members.sort();
        let mut expected = vec![a.clone(), b.clone()];
        expected.sort();
        assert_eq!(members, expected);
        assert_eq!(server.client_rooms(&a), vec!["alerts".to_string()]);

        server
            .handle_message(&b, ClientMessage::Unsubscribe { room: "alerts".into() })
            .await;
        assert_eq!(server.room_members("alerts"), vec![a.clone()]);

        // Disconnect removes the client from every room and deletes rooms
        // left empty.
        server.disconnect(&b);
        assert!(!server.room_exists("ops"));
        assert!(server.room_exists("alerts"));

        server.disconnect(&a);
        assert!(!server.room_exists("alerts"));
    }

    #[tokio::test]
    async fn test_racing_subscribe_and_disconnect_leave_no_ghost_member() {
        let server = server_with(RealtimeConfig::default());

        // Drive the two paths concurrently many times; whichever order the
        // map operations land in, a removed connection must never survive as
        // a room member.
        for _ in 0..200 {
            let (id, _rx) = connect(&server);

            let subscriber = {
                let server = Arc::clone(&server);
                let id = id.clone();
                tokio::spawn(async move {
                    server
                        .handle_message(&id, ClientMessage::Subscribe { room: "ops".into() })
                        .await;
                })
            };
            let reaper = {
                let server = Arc::clone(&server);
                let id = id.clone();
                tokio::spawn(async move {
                    server.disconnect(&id);
                })
            };
            let _ = tokio::join!(subscriber, reaper);

            // If subscribe won outright the member is legitimate; finish the
            // teardown and the room must be empty either way.
            server.disconnect(&id);
            assert!(
                !server.room_members("ops").contains(&id),
                "disconnected client left behind in room"
            );
        }
        assert!(!server.room_exists("ops"));
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let server = server_with(RealtimeConfig::default());
        let (id, _rx) = connect(&server);
        server
            .handle_message(&id, ClientMessage::Subscribe { room: "alerts".into() })
            .await;

        assert!(server.disconnect(&id));
        assert!(!server.disconnect(&id));
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_frequency_validation() {
        let server = server_with(RealtimeConfig::default());
        let (id, mut rx) = connect(&server);
        let _ = rx.recv().await;

        server
            .handle_message(&id, ClientMessage::SetMetricsFrequency { frequency: 500 })
            .await;
        match rx.recv().await {
            Some(ServerMessage::Error { code, error, .. }) => {
                assert_eq!(code.as_deref(), Some("invalid_frequency"));
                // The frame carries the typed error's bounds message.
                assert!(error.contains("1000ms"), "unexpected message: {}", error);
                assert!(error.contains("got 500"), "unexpected message: {}", error);
            },
            other => panic!("expected error frame, got {:?}", other),
        }

        server
            .handle_message(&id, ClientMessage::SetMetricsFrequency { frequency: 5000 })
            .await;
        match rx.recv().await {
            Some(ServerMessage::FrequencyUpdated { frequency }) => assert_eq!(frequency, 5000),
            other => panic!("expected frequencyUpdated frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subscribe_metrics_room_pushes_immediately() {
        let server = server_with(RealtimeConfig::default());
        let (id, mut rx) = connect(&server);
        let _ = rx.recv().await;

        server
            .handle_message(
                &id,
                ClientMessage::Subscribe {
                    room: REALTIME_METRICS_ROOM.into(),
                },
            )
            .await;

        assert!(matches!(rx.recv().await, Some(ServerMessage::Subscribed { .. })));
        assert!(matches!(
            rx.recv().await,
            Some(ServerMessage::RealtimeMetrics { .. })
        ));
    }

    #[tokio::test]
    async fn test_broadcast_tick_with_empty_room_is_a_noop() {
        let server = server_with(RealtimeConfig::default());
        let (id, _rx) = connect(&server);
        server
            .handle_message(
                &id,
                ClientMessage::Subscribe {
                    room: REALTIME_METRICS_ROOM.into(),
                },
            )
            .await;
        server.disconnect(&id);

        assert!(!server.room_exists(REALTIME_METRICS_ROOM));
        // Must not error or recreate the room.
        server.broadcast_tick().await;
        assert!(!server.room_exists(REALTIME_METRICS_ROOM));
    }

    #[tokio::test]
    async fn test_heartbeat_reaps_stale_connections() {
        let config = RealtimeConfig {
            stale_threshold: Duration::from_millis(30),
            heartbeat_interval: Duration::from_millis(30),
            ..Default::default()
        };
        let server = server_with(config);
        let (stale_id, _stale_rx) = connect(&server);
        server
            .handle_message(&stale_id, ClientMessage::Subscribe { room: "alerts".into() })
            .await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        let (live_id, mut live_rx) = connect(&server);
        let _ = live_rx.recv().await;

        server.heartbeat_tick();

        assert_eq!(server.connection_count(), 1);
        assert!(!server.room_exists("alerts"));
        assert_eq!(server.auth_state(&stale_id), None);
        // The surviving connection got a ping.
        assert!(matches!(live_rx.recv().await, Some(ServerMessage::Ping { .. })));
        assert!(server.auth_state(&live_id).is_some());
    }

    #[tokio::test]
    async fn test_ping_updates_liveness_and_replies_pong() {
        let server = server_with(RealtimeConfig::default());
        let (id, mut rx) = connect(&server);
        let _ = rx.recv().await;

        server.handle_message(&id, ClientMessage::Ping).await;
        assert!(matches!(rx.recv().await, Some(ServerMessage::Pong { .. })));
    }

    #[tokio::test]
    async fn test_alert_events_fan_out_to_alerts_room() {
        let server = server_with(RealtimeConfig::default());
        let (id, mut rx) = connect(&server);
        let _ = rx.recv().await;
        server
            .handle_message(&id, ClientMessage::Subscribe { room: ALERTS_ROOM.into() })
            .await;
        let _ = rx.recv().await; // subscribed frame

        let alert = crate::core::RealTimeAlert {
            id: "alert-1".into(),
            kind: crate::core::AlertKind::WinnerDetected,
            severity: crate::core::AlertSeverity::High,
            test_id: "t1".into(),
            message: "winner".into(),
            created_at: chrono::Utc::now(),
            acknowledged: false,
            action_required: true,
            recommended_actions: vec![],
        };
        server.handle_event(AnalyticsEvent::NewAlert(alert));

        match rx.recv().await {
            Some(ServerMessage::NewAlert { data }) => assert_eq!(data.id, "alert-1"),
            other => panic!("expected new_alert frame, got {:?}", other),
        }
    }
}
