//! Open8055 network server.
//!
//! Lets TCP clients list, open and drive Open8055 USB experiment cards
//! through a line based text protocol.
//!
//! # Components
//!
//! - **Server**: accepts clients and checks the connect rules
//! - **Session**: one per client, runs the text protocol and owns the open card
//! - **Reader**: one per open card, forwards card reports to its session
//! - **ServerConfig**: TOML configuration and the access policy built from it
//! - **RemoteClient**: client side of the protocol
//!
//! # Example
//!
//! ```no_run
//! use open8055_server::{RemoteClient, RemoteClientConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RemoteClientConfig {
//!     server_addr: "127.0.0.1:8055".parse()?,
//!     timeout: Duration::from_millis(3000),
//! };
//!
//! let mut client = RemoteClient::connect(config).await?;
//! println!("cards: {:?}", client.list("nobody", "nopass").await?);
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod reader;
pub mod server;
pub mod session;
pub mod state;

pub use client::{ClientError, RemoteClient, RemoteClientConfig};
pub use config::ServerConfig;
pub use error::{ConfigError, Result, ServerError, SessionError};
pub use server::{Server, ServerHandle, SessionInfo};
pub use session::{Session, SessionShared};
pub use state::{PolicyCell, StateCell};
