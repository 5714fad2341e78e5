pub mod api_types;
pub mod client;
pub mod queries;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;

pub use client::GraphqlClient;

/// Executes one GraphQL document against the backend and returns its `data` object.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, document: &str, variables: Value) -> Result<Value, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn execute(&self, document: &str, variables: Value) -> Result<Value, TransportError> {
        (**self).execute(document, variables).await
    }
}
