//! # Bourse
//!
//! WebSocket gateway for Bourse game rooms.
//!
//! Clients connect, handshake, join a room by name, and then exchange
//! engine commands and notifications inside [`Envelope`](bourse_protocol::Envelope)s.
//! Rooms are created on first join and destroyed by a sweeper once nobody
//! has used them for a while.
//!
//! ```rust,no_run
//! use bourse::{BourseServer, ServerConfig};
//!
//! # async fn run() -> Result<(), bourse::BourseError> {
//! let server = BourseServer::builder()
//!     .config(ServerConfig::from_env()?)
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::{ADDR_VAR, DEFAULT_ADDR, ROOM_TTL_VAR, ServerConfig};
pub use error::BourseError;
pub use server::{BourseServer, BourseServerBuilder};
