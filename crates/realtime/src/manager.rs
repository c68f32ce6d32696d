//! Connection manager owning the single event-stream connection.
//!
//! The manager is a single-owner state machine: every mutation happens
//! synchronously inside a `&mut self` call, either from the caller
//! (`connect`, `send`, `subscribe`, ...) or from [`ConnectionManager::step`],
//! which processes exactly one transport event or retry timer expiry.
//! Outcomes are reported as [`ConnectionEvent`]s on the receiver returned by
//! [`ConnectionManager::take_events`].

use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use creatorguard_protocol::{Message, MessageType};

use crate::auth::AuthBinder;
use crate::dispatcher::Dispatcher;
use crate::error::ClientError;
use crate::health::{ConnectionHealth, HealthTracker};
use crate::projection::ProjectedState;
use crate::reconnection::RetryTimer;
use crate::state::StateMachine;
use crate::subscription::{Subscription, SubscriptionConfig, SubscriptionRegistry};
use crate::transport::{CloseReason, Connector, Link, OpenRequest, TransportEvent, WsConnector};
use crate::types::{ClientOptions, ConnectionEvent, ConnectionState, HeartbeatConfig, ReconnectConfig};

/// Keeps one connection to the dashboard event stream alive and multiplexes
/// subscriptions over it.
pub struct ConnectionManager<C: Connector = WsConnector> {
    connector: C,
    endpoint: String,
    max_reconnect_attempts: u32,
    reconnect_config: ReconnectConfig,
    heartbeat: HeartbeatConfig,
    announce_subscriptions: bool,
    verbose: bool,

    machine: StateMachine,
    health: HealthTracker,
    auth: AuthBinder,
    registry: SubscriptionRegistry,
    dispatcher: Dispatcher,
    retry: RetryTimer,

    /// Outbound side of the current connection, present only while Connected.
    link: Option<Link>,
    /// Generation of the most recent open request. Transport events tagged
    /// with any other generation are stale.
    generation: u64,
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    events_tx: Option<mpsc::UnboundedSender<ConnectionEvent>>,
}

impl ConnectionManager<WsConnector> {
    /// Creates a manager that connects over tokio-tungstenite.
    pub fn new(options: ClientOptions) -> Self {
        Self::with_connector(options, WsConnector)
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Creates a manager that opens connections through `connector`.
    pub fn with_connector(options: ClientOptions, connector: C) -> Self {
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();

        Self {
            connector,
            endpoint: options.endpoint,
            max_reconnect_attempts: options.max_reconnect_attempts.max(1),
            reconnect_config: options.reconnect,
            heartbeat: options.heartbeat,
            announce_subscriptions: options.announce_subscriptions,
            verbose: options.debug,
            machine: StateMachine::new(),
            health: HealthTracker::new(),
            auth: AuthBinder::new(options.auth_token),
            registry: SubscriptionRegistry::new(),
            dispatcher: Dispatcher::new(options.recent_capacity, options.debug),
            retry: RetryTimer::new(),
            link: None,
            generation: 0,
            transport_tx,
            transport_rx,
            events_tx: None,
        }
    }

    /// Takes the notification receiver. Only the first call returns one;
    /// notifications emitted before it are dropped.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ConnectionEvent>> {
        if self.events_tx.is_some() {
            return None;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.events_tx = Some(tx);
        Some(rx)
    }

    pub fn state(&self) -> ConnectionState {
        self.machine.current()
    }

    /// Returns a snapshot of the connection counters.
    pub fn health(&self) -> ConnectionHealth {
        self.health.snapshot()
    }

    /// Shared state folded from recognized message types.
    pub fn projections(&self) -> &ProjectedState {
        self.dispatcher.state()
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = &Subscription> {
        self.registry.iter()
    }

    /// Opens the connection unless one is already open or opening.
    ///
    /// Returns immediately; the outcome arrives as notifications while
    /// [`step`](Self::step) is driven. Resets the reconnect attempt counter.
    ///
    /// After the server rejected the credential nothing is opened until
    /// [`update_auth_token`](Self::update_auth_token) supplies a new one;
    /// the attempt is reported as an `Error(Auth)` notification instead.
    pub fn connect(&mut self) {
        let state = self.state();
        if state.is_active() {
            debug!(?state, "connect ignored, connection already active");
            return;
        }
        if self.auth.is_rejected() {
            let error =
                ClientError::Auth("credential was rejected, rotate it before connecting".into());
            warn!(%error, "connect refused");
            self.health.record_error(&error);
            self.emit(ConnectionEvent::Error(error));
            return;
        }
        self.retry.cancel();
        self.health.reset_attempts();
        self.open();
    }

    /// Closes the connection on purpose. Pending retries are cancelled and
    /// nothing reconnects until the next `connect`.
    pub fn disconnect(&mut self) {
        if self.retry.cancel() {
            debug!("pending reconnect cancelled");
        }
        // Invalidates any open request still in flight.
        self.generation += 1;
        if let Some(link) = self.link.take() {
            link.close();
        }
        if self.state() != ConnectionState::Disconnected
            && self.transition(ConnectionState::Disconnected)
        {
            info!("disconnected");
            self.emit(ConnectionEvent::Disconnected);
        }
    }

    /// Drops the current connection, if any, and opens a fresh one with the
    /// attempt counter reset.
    pub fn reconnect(&mut self) {
        if self.state().is_active() {
            self.disconnect();
        }
        self.connect();
    }

    /// Stores the credential for the next connection attempt. A live session
    /// keeps using the credential it was opened with. Clears a previous
    /// rejection so `connect` may open again.
    pub fn update_auth_token(&mut self, token: impl Into<String>) {
        self.auth.rotate(token);
    }

    /// Queues `message` on the live connection.
    ///
    /// Fails fast with `false` unless Connected; nothing is buffered.
    pub fn send(&mut self, message: &Message) -> bool {
        if self.state() != ConnectionState::Connected {
            debug!(state = ?self.state(), msg_type = ?message.msg_type, "send refused, not connected");
            return false;
        }
        let Some(link) = &self.link else {
            return false;
        };
        let text = match message.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(msg_type = ?message.msg_type, error = %e, "failed to encode outbound message");
                return false;
            }
        };
        if !link.try_send_text(text) {
            warn!(msg_type = ?message.msg_type, "outbound queue unavailable, message dropped");
            return false;
        }
        self.health.record_sent();
        true
    }

    /// Registers `id`, replacing any existing subscription with that id
    /// together with all of its handlers.
    pub fn subscribe<F>(&mut self, id: impl Into<String>, config: SubscriptionConfig, handler: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let id = id.into();
        let replaced = self.registry.subscribe(id.clone(), config, Box::new(handler));
        debug!(%id, replaced, "subscription registered");

        if self.announce_subscriptions && self.state() == ConnectionState::Connected {
            let announcement = self.registry.get(&id).and_then(announce_frame);
            if let Some(message) = announcement {
                self.send(&message);
            }
        }
    }

    /// Attaches another handler to an existing subscription. Returns `false`
    /// if `id` isn't registered.
    pub fn bind<F>(&mut self, id: &str, handler: F) -> bool
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.registry.bind(id, Box::new(handler))
    }

    /// Removes the subscription and all its handlers. The connection is not
    /// affected.
    pub fn unsubscribe(&mut self, id: &str) -> bool {
        let Some(removed) = self.registry.unsubscribe(id) else {
            return false;
        };
        debug!(id = %removed.id, "subscription removed");

        if self.announce_subscriptions && self.state() == ConnectionState::Connected {
            match Message::new(MessageType::Unsubscribe, &json!({ "id": removed.id })) {
                Ok(message) => {
                    self.send(&message);
                }
                Err(e) => warn!(error = %e, "failed to build unsubscribe frame"),
            }
        }
        true
    }

    /// Waits for and processes one transport event or retry timer expiry.
    ///
    /// Pending transport events win over a due timer. Never resolves while
    /// the manager is idle (Disconnected or Failed with nothing in flight).
    pub async fn step(&mut self) {
        let deadline = self.retry.deadline();
        tokio::select! {
            biased;
            Some(event) = self.transport_rx.recv() => self.handle_transport(event),
            () = RetryTimer::fired(deadline) => self.retry_due(),
        }
    }

    fn handle_transport(&mut self, event: TransportEvent) {
        let generation = event.generation();
        if generation != self.generation {
            trace!(generation, current = self.generation, "ignoring stale transport event");
            if let TransportEvent::Opened { link, .. } = event {
                link.close();
            }
            return;
        }

        match event {
            TransportEvent::Opened { link, .. } => self.on_opened(link),
            TransportEvent::Frame { text, .. } => self.on_frame(&text),
            TransportEvent::Closed { reason, .. } => self.on_closed(reason),
            TransportEvent::Failed { error, .. } => self.on_failed(error),
        }
    }

    fn on_opened(&mut self, link: Link) {
        if self.state() != ConnectionState::Connecting || !self.transition(ConnectionState::Connected)
        {
            link.close();
            return;
        }
        self.link = Some(link);
        self.health.record_connected();
        info!(generation = self.generation, "connected");
        self.emit(ConnectionEvent::Connected);

        if self.announce_subscriptions {
            let announcements: Vec<Message> = self.registry.iter().filter_map(announce_frame).collect();
            for message in &announcements {
                self.send(message);
            }
        }
    }

    fn on_frame(&mut self, text: &str) {
        if self.state() != ConnectionState::Connected {
            return;
        }
        match self
            .dispatcher
            .dispatch_frame(text, &mut self.health, &self.registry)
        {
            Ok((message, _)) => {
                if message.msg_type == MessageType::Ping {
                    self.send(&Message::empty(MessageType::Pong));
                }
                self.emit(ConnectionEvent::Message(message));
            }
            Err(e) => {
                let error = ClientError::from(e);
                self.health.record_error(&error);
                self.emit(ConnectionEvent::Error(error));
            }
        }
    }

    fn on_closed(&mut self, reason: CloseReason) {
        if !self.state().is_active() {
            return;
        }
        self.link = None;

        if reason.is_unauthorized() {
            self.fail_auth(ClientError::Auth(reason.to_string()));
            return;
        }

        warn!(generation = self.generation, %reason, "connection lost");
        let error = ClientError::Transport(reason.to_string());
        self.health.record_error(&error);
        self.emit(ConnectionEvent::Error(error));
        self.schedule_retry();
    }

    fn on_failed(&mut self, error: ClientError) {
        if self.state() != ConnectionState::Connecting {
            return;
        }
        if matches!(error, ClientError::Auth(_)) {
            self.fail_auth(error);
            return;
        }

        warn!(generation = self.generation, %error, "connection attempt failed");
        self.health.record_error(&error);
        self.emit(ConnectionEvent::Error(error));
        self.schedule_retry();
    }

    fn fail_auth(&mut self, error: ClientError) {
        warn!(%error, "credential rejected, not retrying");
        self.retry.cancel();
        self.auth.reject();
        self.health.record_error(&error);
        self.emit(ConnectionEvent::Error(error));
        self.transition(ConnectionState::Failed);
    }

    fn schedule_retry(&mut self) {
        let attempt = self.health.record_attempt();
        if !self.transition(ConnectionState::Reconnecting { attempt }) {
            return;
        }

        if attempt >= self.max_reconnect_attempts {
            warn!(attempts = attempt, "reconnect attempts exhausted");
            self.health
                .record_error(ClientError::RetriesExhausted { attempts: attempt });
            self.transition(ConnectionState::Failed);
            self.emit(ConnectionEvent::MaxReconnectAttemptsReached { attempts: attempt });
            return;
        }

        let delay = self.reconnect_config.delay_for_attempt(attempt);
        self.retry.arm(delay);
        info!(attempt, delay_ms = duration_ms(delay), "reconnect scheduled");
        self.emit(ConnectionEvent::Reconnecting { attempt, delay });
    }

    fn retry_due(&mut self) {
        self.retry.cancel();
        if matches!(self.state(), ConnectionState::Reconnecting { .. }) {
            self.open();
        }
    }

    /// Moves to Connecting and asks the connector for a new connection.
    fn open(&mut self) {
        if !self.transition(ConnectionState::Connecting) {
            return;
        }
        self.generation += 1;
        if let Some(link) = self.link.take() {
            link.close();
        }

        let url = match self.auth.bind(&self.endpoint) {
            Ok(url) => url,
            Err(e) => {
                let error = ClientError::Transport(format!("invalid endpoint: {e}"));
                warn!(endpoint = %self.endpoint, %error, "cannot open connection");
                self.health.record_error(&error);
                self.emit(ConnectionEvent::Error(error));
                self.transition(ConnectionState::Failed);
                return;
            }
        };

        debug!(generation = self.generation, endpoint = %self.endpoint, "opening connection");
        self.connector.open(
            OpenRequest {
                generation: self.generation,
                url,
                heartbeat: self.heartbeat.clone(),
            },
            self.transport_tx.clone(),
        );
    }

    /// Applies a transition and reports it. Illegal requests are logged and
    /// leave the state untouched.
    fn transition(&mut self, to: ConnectionState) -> bool {
        match self.machine.transition(to) {
            Ok(from) => {
                self.health.set_state(to);
                if self.verbose {
                    debug!(generation = self.generation, ?from, ?to, "transition");
                }
                info!(?from, ?to, "connection state changed");
                self.emit(ConnectionEvent::StateChanged { from, to });
                true
            }
            Err(e) => {
                warn!(error = %e, "transition rejected");
                false
            }
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        if let Some(tx) = &self.events_tx {
            let _ = tx.send(event);
        }
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            link.close();
        }
    }
}

fn announce_frame(subscription: &Subscription) -> Option<Message> {
    match Message::new(MessageType::Subscribe, subscription) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!(id = %subscription.id, error = %e, "failed to build subscribe frame");
            None
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
