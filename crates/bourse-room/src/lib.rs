//! Room hosting for Bourse.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns one
//! [`RoomState`](bourse_engine::RoomState) and the single phase timer the
//! game needs. Outbound notifications leave through an [`EventSink`].
//!
//! # Key types
//!
//! - [`RoomManager`]: creates rooms on demand, routes players, reaps idle rooms
//! - [`RoomHandle`]: sends requests to a running room actor
//! - [`Subscribers`]: per-player notification channels, the usual sink
//! - [`RoomConfig`]: seat count, mailbox depth, and phase timing

mod config;
mod error;
mod manager;
mod room;
mod sink;

pub use config::{RoomConfig, RoomTiming};
pub use error::RoomError;
pub use manager::{DiceFactory, RoomManager};
pub use room::{RoomHandle, RoomInfo};
pub use sink::{EventSink, NotificationReceiver, NullSink, Subscribers, SubscriptionId};
