//! cityslicker-server: bounding-box queries over a city catalogue
//!
//! Clients send a 16-byte box and get back the ids of every city inside it.
//!
//! # Architecture
//!
//! - Single-threaded reactor over mio (epoll on Linux)
//! - One tagged `FileEvent` per registered descriptor
//! - Fixed-width native-endian wire format, lockstep request/response
//! - Pluggable `SpatialIndex`, with an in-memory `World` of cities

/// Configuration management for the server
pub mod config;

/// Error types and result aliases
pub mod error;

/// Spatial index trait and the city catalogue
pub mod index;

/// Multiplexer, connection state and descriptor bindings
pub mod network;

/// Request/response wire format
pub mod protocol;

/// Reactor: accept, dispatch and connection lifecycle
pub mod server;

/// Process-wide signal setup
pub mod signal;

pub use config::Config;
pub use error::{Error, Result};
pub use index::{City, SpatialIndex, World};
pub use protocol::BoundingBox;
pub use server::{Server, ShutdownHandle};
