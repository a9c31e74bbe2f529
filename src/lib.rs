//! sandboard — collaborative project canvas with per-project compute
//! sandboxes.
//!
//! The server half (routes, services, rooms) keeps authoritative project
//! state in memory, persists it to Postgres in the background, and fans
//! out live updates to websocket rooms. The client half (`client`) holds
//! the reconnecting sync agent, the idle-shutdown monitor, and the local
//! change cache that browser-side consumers drive.

pub mod client;
pub mod db;
pub mod dedup;
pub mod event;
pub mod jobs;
pub mod provider;
pub mod rooms;
pub mod routes;
pub mod services;
pub mod state;
