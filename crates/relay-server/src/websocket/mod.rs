//! Live connections: state, registry, fan-out, and the socket session.

pub mod broadcast;
pub mod connection;
pub mod registry;
pub mod session;
