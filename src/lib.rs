//! Multi-room TCP Chat Server Library
//!
//! A text chat server: clients register a display name, exchange direct
//! messages, broadcast within named rooms and share a counter.
//!
//! # Features
//! - Length-prefixed text framing compatible with Java `writeUTF`/`readUTF`
//! - Unique display names (`bob`, `bob#1`, ...)
//! - Rooms with any number of members
//! - Direct messages
//! - Shared counter with broadcast increments
//! - Connection cap and graceful shutdown
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning the client registry, the room
//!   registry and the counter
//! - Each connection has a reader task feeding commands to the actor and a
//!   writer task that is the only writer of its stream
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use multiroom_chat::{listener, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let socket = TcpListener::bind(config.socket_addr()).await.unwrap();
//!     listener::serve(socket, &config, listener::shutdown_signal())
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod listener;
pub mod message;
pub mod room;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use client::{Client, ClientRegistry};
pub use codec::{Channel, TextCodec};
pub use config::ServerConfig;
pub use error::{AppError, SendError};
pub use handler::handle_connection;
pub use message::{Command, ErrorCode, ServerMessage};
pub use room::{Room, RoomRegistry};
pub use server::{ChatServer, ServerCommand};
pub use types::ClientId;
