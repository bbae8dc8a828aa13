// ABOUTME: Command implementations behind each CLI subcommand
// ABOUTME: Exports the top-level pipeline commands; grouped commands live in their modules

pub mod backup;
pub mod compose;
pub mod diagnose;
pub mod env;
pub mod export;
pub mod import;
pub mod migrate;
pub mod tunnel;
pub mod validate;

pub use diagnose::diagnose;
pub use export::export;
pub use import::import;
pub use migrate::{migrate, MigrationPlan};
pub use validate::validate;
