//! Telemetry hub: state store, viewer registry and broadcaster behind an
//! axum websocket endpoint.

pub mod broadcast;
pub mod config;
pub mod hub;
pub mod routes;
pub mod store;
