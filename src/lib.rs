// ABOUTME: Library module for nightscout-ops
// ABOUTME: Exports all core functionality for use in binary and tests

pub mod backup;
pub mod commands;
pub mod compose;
pub mod config;
pub mod envfile;
pub mod error;
pub mod interactive;
pub mod migration;
pub mod mongodb;
pub mod tunnel;
pub mod utils;
pub mod validation;
