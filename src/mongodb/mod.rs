// ABOUTME: MongoDB connection utilities for Atlas and self-hosted targets
// ABOUTME: Provides connection string validation, connect-with-ping, and database name extraction

pub mod reader;

pub use reader::{count_collections, get_collection_count, list_collections, CollectionCount};

use crate::utils::mask_connection_string;
use anyhow::{bail, Context, Result};
use mongodb::{options::ClientOptions, Client};
use std::time::Duration;

/// Collections Nightscout writes to, checked on every migration
pub const NIGHTSCOUT_COLLECTIONS: &[&str] = &[
    "entries",
    "treatments",
    "devicestatus",
    "profile",
    "food",
    "activity",
];

/// Validate a MongoDB connection string
///
/// Verifies the URL starts with mongodb:// or mongodb+srv://. Full parsing
/// happens during the async connect.
///
/// # Examples
///
/// ```
/// # use nightscout_ops::mongodb::validate_mongodb_url;
/// assert!(validate_mongodb_url("mongodb://localhost:27017/nightscout").is_ok());
/// assert!(validate_mongodb_url("mongodb+srv://cluster0.abc.mongodb.net/nightscout").is_ok());
/// assert!(validate_mongodb_url("postgresql://localhost/db").is_err());
/// ```
pub fn validate_mongodb_url(connection_string: &str) -> Result<String> {
    if connection_string.trim().is_empty() {
        bail!("MongoDB connection string cannot be empty");
    }

    if !connection_string.starts_with("mongodb://")
        && !connection_string.starts_with("mongodb+srv://")
    {
        bail!(
            "Invalid MongoDB connection string '{}'. \
             Must start with 'mongodb://' or 'mongodb+srv://'",
            mask_connection_string(connection_string)
        );
    }

    Ok(connection_string.to_string())
}

/// Whether the connection string carries a user name in its authority
pub fn has_credentials(connection_string: &str) -> bool {
    connection_string
        .split_once("://")
        .map(|(_, rest)| {
            let authority = rest.split('/').next().unwrap_or(rest);
            authority.contains('@')
        })
        .unwrap_or(false)
}

/// Connect to MongoDB and verify the server answers a ping
///
/// # Examples
///
/// ```no_run
/// # use nightscout_ops::mongodb::connect_mongodb;
/// # async fn example() -> anyhow::Result<()> {
/// let client = connect_mongodb("mongodb://localhost:27017/nightscout").await?;
/// # Ok(())
/// # }
/// ```
pub async fn connect_mongodb(connection_string: &str) -> Result<Client> {
    let validated_url = validate_mongodb_url(connection_string)?;

    tracing::debug!(
        "Connecting to MongoDB at {}",
        mask_connection_string(&validated_url)
    );

    let mut client_options = ClientOptions::parse(&validated_url)
        .await
        .context("Failed to parse MongoDB connection options")?;
    if client_options.server_selection_timeout.is_none() {
        client_options.server_selection_timeout = Some(Duration::from_secs(10));
    }
    client_options.app_name = Some("nightscout-ops".to_string());

    let client = Client::with_options(client_options).context("Failed to create MongoDB client")?;

    ping(&client).await?;

    tracing::debug!("Successfully connected to MongoDB");
    Ok(client)
}

/// Run the `ping` admin command
pub async fn ping(client: &Client) -> Result<()> {
    client
        .database("admin")
        .run_command(bson::doc! {"ping": 1}, None)
        .await
        .context(
            "Failed to ping MongoDB server (connection may be invalid or server unreachable)",
        )?;
    Ok(())
}

/// Extract the default database name from a MongoDB connection string
pub async fn extract_database_name(connection_string: &str) -> Result<Option<String>> {
    let options = ClientOptions::parse(connection_string)
        .await
        .context("Failed to parse MongoDB connection string")?;

    Ok(options.default_database.clone())
}

/// Database named explicitly, else the one in the URI, else Nightscout's default
pub async fn resolve_database(connection_string: &str, explicit: Option<&str>) -> Result<String> {
    if let Some(db) = explicit {
        return Ok(db.to_string());
    }
    Ok(extract_database_name(connection_string)
        .await?
        .unwrap_or_else(|| "nightscout".to_string()))
}
