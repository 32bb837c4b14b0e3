//! Key-value table operations, AWS JSON 1.0 protocol.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::credentials::ProvideCredentials;
use crate::error::ServiceError;
use crate::http::HttpHandle;

const TARGET_PREFIX: &str = "DynamoDB_20120810";

/// The subset of attribute types these tables use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    S(String),
    N(String),
}

impl AttributeValue {
    pub fn as_s(&self) -> Option<&str> {
        match self {
            AttributeValue::S(v) => Some(v),
            AttributeValue::N(_) => None,
        }
    }

    pub fn as_n(&self) -> Option<&str> {
        match self {
            AttributeValue::N(v) => Some(v),
            AttributeValue::S(_) => None,
        }
    }
}

pub type Item = HashMap<String, AttributeValue>;

pub struct DynamoDbClient {
    http: HttpHandle,
    credentials: Arc<dyn ProvideCredentials>,
}

#[derive(Serialize)]
struct PutItemRequest<'a> {
    #[serde(rename = "TableName")]
    table_name: &'a str,
    #[serde(rename = "Item")]
    item: &'a Item,
}

#[derive(Serialize)]
struct DeleteItemRequest<'a> {
    #[serde(rename = "TableName")]
    table_name: &'a str,
    #[serde(rename = "Key")]
    key: &'a Item,
}

#[derive(Serialize)]
struct ScanRequest<'a> {
    #[serde(rename = "TableName")]
    table_name: &'a str,
    #[serde(rename = "ExclusiveStartKey", skip_serializing_if = "Option::is_none")]
    exclusive_start_key: Option<Item>,
}

#[derive(Deserialize)]
struct ScanResponse {
    #[serde(rename = "Items", default)]
    items: Vec<Item>,
    #[serde(rename = "LastEvaluatedKey")]
    last_evaluated_key: Option<Item>,
}

impl DynamoDbClient {
    pub fn new(http: HttpHandle, credentials: Arc<dyn ProvideCredentials>) -> Self {
        Self { http, credentials }
    }

    pub async fn put_item(&self, table: &str, item: &Item) -> Result<(), ServiceError> {
        let body = serde_json::to_vec(&PutItemRequest {
            table_name: table,
            item,
        })
        .map_err(|e| ServiceError::Encode {
            operation: "PutItem",
            source: e,
        })?;
        self.post("PutItem", body).await?;
        Ok(())
    }

    pub async fn delete_item(&self, table: &str, key: &Item) -> Result<(), ServiceError> {
        let body = serde_json::to_vec(&DeleteItemRequest {
            table_name: table,
            key,
        })
        .map_err(|e| ServiceError::Encode {
            operation: "DeleteItem",
            source: e,
        })?;
        self.post("DeleteItem", body).await?;
        Ok(())
    }

    /// Full scan, following `LastEvaluatedKey` until the table is exhausted.
    pub async fn scan_all(&self, table: &str) -> Result<Vec<Item>, ServiceError> {
        let mut items = Vec::new();
        let mut exclusive_start_key: Option<Item> = None;
        loop {
            let body = serde_json::to_vec(&ScanRequest {
                table_name: table,
                exclusive_start_key: exclusive_start_key.take(),
            })
            .map_err(|e| ServiceError::Encode {
                operation: "Scan",
                source: e,
            })?;
            let response = self.post("Scan", body).await?;
            let page: ScanResponse = response.json().await?;
            items.extend(page.items);
            match page.last_evaluated_key {
                Some(key) => exclusive_start_key = Some(key),
                None => return Ok(items),
            }
        }
    }

    async fn post(
        &self,
        operation: &'static str,
        body: Vec<u8>,
    ) -> Result<reqwest::Response, ServiceError> {
        let host = format!("dynamodb.{}.amazonaws.com", self.http.region());
        let url = self.http.url_for(&host, "/")?;
        let headers = [
            ("content-type", "application/x-amz-json-1.0".to_string()),
            ("x-amz-target", format!("{TARGET_PREFIX}.{operation}")),
        ];
        let credentials = self.credentials.credentials().await?;
        self.http
            .send_signed(
                "dynamodb",
                operation,
                Method::POST,
                url,
                &headers,
                body,
                &credentials,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_values_use_external_tags() {
        let item: Item = HashMap::from([
            ("connectionId".to_string(), AttributeValue::S("c-1".to_string())),
            ("expireAt".to_string(), AttributeValue::N("1700000000".to_string())),
        ]);
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["connectionId"]["S"], "c-1");
        assert_eq!(value["expireAt"]["N"], "1700000000");

        let back: Item = serde_json::from_value(value).unwrap();
        assert_eq!(back["connectionId"].as_s(), Some("c-1"));
        assert_eq!(back["expireAt"].as_n(), Some("1700000000"));
    }
}
