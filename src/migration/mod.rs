// ABOUTME: Migration utilities module
// ABOUTME: Handles mongodump export and mongorestore import between Atlas and self-hosted MongoDB

pub mod dump;
pub mod restore;

pub use dump::{dump_archive, dumped_collections, export_database, ExportOptions};
pub use restore::{import_database, restore_archive, ImportOptions};
