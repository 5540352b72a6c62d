//! # faster-app-test
//!
//! Testing utilities for faster-app applications.
//!
//! - [`client`]: [`TestClient`] drives an axum router in-process and decodes
//!   the response envelope
//! - [`live_server`]: [`LiveServer`] binds a router to a random local port

pub mod client;
pub mod live_server;

pub use client::{TestClient, TestResponse};
pub use live_server::LiveServer;
