//! Transport implementations for the bridge.

pub mod websocket;
