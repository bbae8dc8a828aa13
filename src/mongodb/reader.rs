// ABOUTME: MongoDB collection introspection and document counting
// ABOUTME: Read-only access used by the migration validator and diagnostics

use crate::utils::sanitize_identifier;
use anyhow::{bail, Context, Result};
use bson::Document;
use futures::stream::{self, StreamExt};
use mongodb::{Client, Database};

/// Document count of one collection, or the reason it could not be counted
#[derive(Debug)]
pub struct CollectionCount {
    pub collection: String,
    pub count: Result<u64>,
}

/// List all user collection names in a database
///
/// System collections (starting with "system.") are excluded.
pub async fn list_collections(client: &Client, db_name: &str) -> Result<Vec<String>> {
    tracing::debug!("Listing collections in database '{}'", db_name);

    let collection_names = client
        .database(db_name)
        .list_collection_names(None)
        .await
        .with_context(|| format!("Failed to list collections in database '{}'", db_name))?;

    let mut user_collections: Vec<String> = collection_names
        .into_iter()
        .filter(|name| !name.starts_with("system."))
        .collect();
    user_collections.sort();

    tracing::debug!(
        "Found {} user collections in '{}'",
        user_collections.len(),
        db_name
    );

    Ok(user_collections)
}

fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('$') || name.contains('\0') || name.starts_with("system.")
    {
        bail!("Invalid collection name '{}'", sanitize_identifier(name));
    }
    Ok(())
}

/// Exact document count for a collection
///
/// A collection that does not exist counts as zero documents.
pub async fn get_collection_count(database: &Database, collection_name: &str) -> Result<u64> {
    validate_collection_name(collection_name)?;

    tracing::debug!("Counting documents in '{}'", collection_name);

    database
        .collection::<Document>(collection_name)
        .count_documents(None, None)
        .await
        .with_context(|| format!("Failed to count documents in collection '{}'", collection_name))
}

/// Count each named collection one after another
pub async fn count_collections(database: &Database, collections: &[&str]) -> Vec<CollectionCount> {
    stream::iter(collections.iter().copied())
        .then(|name| async move {
            CollectionCount {
                collection: name.to_string(),
                count: get_collection_count(database, name).await,
            }
        })
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mongodb::{connect_mongodb, NIGHTSCOUT_COLLECTIONS};

    #[test]
    fn test_validate_collection_names() {
        for name in NIGHTSCOUT_COLLECTIONS {
            assert!(validate_collection_name(name).is_ok(), "{}", name);
        }
    }

    #[test]
    fn test_reject_invalid_collection_names() {
        for name in ["", "entries$", "system.users", "bad\0name"] {
            assert!(
                validate_collection_name(name).is_err(),
                "Invalid collection name should be rejected: {:?}",
                name
            );
        }
    }

    #[tokio::test]
    #[ignore]
    async fn test_count_collections_live() {
        let url = std::env::var("TEST_TARGET_URL").unwrap();
        let client = connect_mongodb(&url).await.unwrap();
        let db = client.database("nightscout");

        let counts = count_collections(&db, NIGHTSCOUT_COLLECTIONS).await;
        assert_eq!(counts.len(), NIGHTSCOUT_COLLECTIONS.len());
        assert!(counts.iter().all(|c| c.count.is_ok()));
    }
}
