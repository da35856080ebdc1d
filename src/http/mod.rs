//! HTTP surface shared with the WebSocket endpoint.

pub mod routes;
