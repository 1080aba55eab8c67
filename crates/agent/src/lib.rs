//! Bridge agent: HTTP front end for the workspace bridge connectors

pub mod api;
pub mod config;
