//! Core types, services and trait definitions for Vigil, the school incident
//! reporting backend.
//!
//! This crate is free of HTTP and database dependencies. Storage backends
//! implement [`store::SchoolStore`]; real-time transports implement
//! [`event::EventSink`].

pub mod alerts;
pub mod error;
pub mod event;
pub mod incident;
pub mod lifecycle;
pub mod notification;
pub mod report;
pub mod store;
pub mod user;

pub use error::{Error, Result};
