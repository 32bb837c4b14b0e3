//! Delivery of payloads to connected recipients.

use async_trait::async_trait;
use awsio::ServiceError;
use awsio::apigateway::ApiGatewayManagementClient;

/// Pushes one payload to one recipient. A recipient that disconnected since
/// the last registry read surfaces as [`ServiceError::ConnectionGone`].
#[async_trait]
pub trait RecipientPush: Send + Sync {
    async fn push(&self, connection_id: &str, payload: &[u8]) -> Result<(), ServiceError>;
}

#[async_trait]
impl RecipientPush for ApiGatewayManagementClient {
    async fn push(&self, connection_id: &str, payload: &[u8]) -> Result<(), ServiceError> {
        self.post_to_connection(connection_id, payload).await
    }
}
