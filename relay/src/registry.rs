//! Live connection registry.
//!
//! Multiple relay instances mutate the registry concurrently and nothing is
//! cached in process; every broadcast re-reads the full live set.

use async_trait::async_trait;
use awsio::ServiceError;
use awsio::dynamodb::{AttributeValue, DynamoDbClient, Item};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const KEY_ATTRIBUTE: &str = "connectionId";
const EXPIRY_ATTRIBUTE: &str = "expireAt";

#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// Idempotent: re-registering overwrites the entry and refreshes any
    /// expiry.
    async fn register(&self, connection_id: &str) -> Result<(), ServiceError>;

    /// Deleting an unknown connection is a no-op.
    async fn deregister(&self, connection_id: &str) -> Result<(), ServiceError>;

    async fn live_connections(&self) -> Result<Vec<String>, ServiceError>;
}

/// Registry backed by a key-value table.
pub struct DynamoRegistry {
    db: DynamoDbClient,
    table: String,
    ttl: Option<Duration>,
}

impl DynamoRegistry {
    pub fn new(db: DynamoDbClient, table: impl Into<String>, ttl: Option<Duration>) -> Self {
        Self {
            db,
            table: table.into(),
            ttl,
        }
    }
}

fn registration_item(connection_id: &str, ttl: Option<Duration>) -> Item {
    let mut item: Item = HashMap::from([(
        KEY_ATTRIBUTE.to_string(),
        AttributeValue::S(connection_id.to_string()),
    )]);
    if let Some(ttl) = ttl {
        let expire_at = chrono::Utc::now().timestamp() + ttl.as_secs() as i64;
        item.insert(
            EXPIRY_ATTRIBUTE.to_string(),
            AttributeValue::N(expire_at.to_string()),
        );
    }
    item
}

fn connection_key(connection_id: &str) -> Item {
    HashMap::from([(
        KEY_ATTRIBUTE.to_string(),
        AttributeValue::S(connection_id.to_string()),
    )])
}

#[async_trait]
impl ConnectionRegistry for DynamoRegistry {
    async fn register(&self, connection_id: &str) -> Result<(), ServiceError> {
        self.db
            .put_item(&self.table, &registration_item(connection_id, self.ttl))
            .await?;
        debug!(connection_id, "registered connection");
        Ok(())
    }

    async fn deregister(&self, connection_id: &str) -> Result<(), ServiceError> {
        self.db
            .delete_item(&self.table, &connection_key(connection_id))
            .await?;
        debug!(connection_id, "deregistered connection");
        Ok(())
    }

    async fn live_connections(&self) -> Result<Vec<String>, ServiceError> {
        let items = self.db.scan_all(&self.table).await?;
        Ok(items
            .iter()
            .filter_map(|item| item.get(KEY_ATTRIBUTE).and_then(AttributeValue::as_s))
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_without_ttl_stores_only_the_key() {
        let item = registration_item("c-1", None);
        assert_eq!(item.len(), 1);
        assert_eq!(item[KEY_ATTRIBUTE].as_s(), Some("c-1"));
    }

    #[test]
    fn registration_with_ttl_adds_an_expiry() {
        let item = registration_item("c-1", Some(Duration::from_secs(600)));
        let expire_at: i64 = item[EXPIRY_ATTRIBUTE].as_n().unwrap().parse().unwrap();
        let now = chrono::Utc::now().timestamp();
        assert!(expire_at >= now + 595 && expire_at <= now + 605);
    }

    #[test]
    fn key_carries_the_connection_id() {
        let key = connection_key("PHVtc=");
        assert_eq!(key[KEY_ATTRIBUTE].as_s(), Some("PHVtc="));
    }
}
