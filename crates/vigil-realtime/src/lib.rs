//! Real-time fan-out for Vigil.
//!
//! [`Broadcaster`] keeps one bounded queue per live connection and an index
//! from user id to that user's connections. [`socket::router`] exposes it as
//! a WebSocket endpoint at `/ws`.

pub mod broadcaster;
pub mod socket;

pub use broadcaster::{Broadcaster, ConnectionId};
