//! Realtime connection and subscription manager for the CreatorGuard
//! dashboard event stream.
//!
//! Keeps one WebSocket connection alive across failures, multiplexes
//! filtered subscriptions over it, and folds known event types into shared
//! projections.

pub mod auth;
pub mod dispatcher;
pub mod error;
pub mod health;
pub mod manager;
pub mod projection;
mod pumps;
pub(crate) mod reconnection;
pub mod state;
pub mod subscription;
pub mod transport;
pub mod types;
pub mod ws_client;

pub use auth::AuthBinder;
pub use error::ClientError;
pub use health::ConnectionHealth;
pub use manager::ConnectionManager;
pub use projection::{Feed, ProjectedState, RecentList};
pub use state::{InvalidTransition, StateMachine};
pub use subscription::{Filter, Handler, Subscription, SubscriptionConfig};
pub use transport::{CloseReason, Connector, Link, OpenRequest, TransportEvent, WsConnector};
pub use types::{
    ClientOptions, ConnectionEvent, ConnectionState, HeartbeatConfig, ReconnectConfig,
};
pub use ws_client::{WsClient, WsError};
