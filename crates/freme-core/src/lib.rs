//! Core freme library (API client, session, auth glue, polling, read tracking).

pub mod api;
pub mod auth;
pub mod config;
pub mod feed;
pub mod logging;
pub mod poller;
pub mod read_tracker;
pub mod render;
pub mod session;
