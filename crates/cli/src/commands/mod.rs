//! CLI command implementations

pub mod containers;
pub mod workspaces;
