#![forbid(unsafe_code)]

use thiserror::Error;

pub mod auth;
pub mod commands;
pub mod config;
pub mod connection;
pub mod engine;
pub mod history;
pub mod receipts;
pub mod reconnect;
pub mod timeline;
pub mod transport;


pub use auth::{AccessToken, AuthError, AuthTokenProvider, SecretString, StaticTokenProvider};
pub use commands::{CommandError, OutboundCommand};
pub use config::{ClientConfig, default_config_path, load_client_config, load_client_config_from_path};
pub use connection::{CloseReason, ConnectionState, ConnectionStatus, TransitionError};
pub use engine::{ChatEngine, CurrentUser, EngineContext, EngineEvent, EngineSettings};
pub use history::{HistoryError, HistoryPage, HistorySource, HttpHistoryClient};
pub use receipts::ReadReceiptTracker;
pub use reconnect::ReconnectPolicy;
pub use timeline::{ChannelTimeline, MergeOutcome, SeedOutcome, TimelineStore, map_raw_message};
pub use transport::{SocketConnection, Transport, TransportError, WsTransport};

#[derive(Debug, Error)]
pub enum ClientCoreError {
	#[error("invalid endpoint: {0}")]
	Endpoint(String),

	#[error("invalid config: {0}")]
	Config(String),
}
