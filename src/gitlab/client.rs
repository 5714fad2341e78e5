use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::Transport;
use crate::error::TransportError;

/// GraphQL transport over HTTPS with a personal access token.
pub struct GraphqlClient {
    endpoint: String,
    token: String,
    client: reqwest::Client,
}

impl GraphqlClient {
    pub fn new(base_url: &str, token: String, timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self {
            endpoint: format!("{}/api/graphql", base_url.trim_end_matches('/')),
            token,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Deserialize)]
struct GqlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GqlError>,
}

#[derive(Deserialize)]
struct GqlError {
    message: String,
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_decode() {
        TransportError::Decode(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

/// Turn an HTTP status and body into the GraphQL `data` object or an error.
///
/// Non-2xx answers carry the body's GraphQL messages when it has any, else the
/// status reason. A 2xx answer with top-level `errors` is reported as HTTP with
/// the same status.
fn read_response(status: StatusCode, body: &str) -> Result<Value, TransportError> {
    if !status.is_success() {
        let messages = serde_json::from_str::<GqlResponse>(body)
            .map(|gql| gql.errors.into_iter().map(|e| e.message).collect::<Vec<_>>())
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| vec![status.canonical_reason().unwrap_or("request failed").to_string()]);
        return Err(TransportError::Http {
            status: status.as_u16(),
            messages,
        });
    }

    let gql: GqlResponse =
        serde_json::from_str(body).map_err(|e| TransportError::Decode(e.to_string()))?;
    if !gql.errors.is_empty() {
        return Err(TransportError::Http {
            status: status.as_u16(),
            messages: gql.errors.into_iter().map(|e| e.message).collect(),
        });
    }
    gql.data
        .ok_or_else(|| TransportError::Decode("no data in GraphQL response".into()))
}

#[async_trait]
impl Transport for GraphqlClient {
    async fn execute(&self, document: &str, variables: Value) -> Result<Value, TransportError> {
        let body = serde_json::json!({ "query": document, "variables": variables });
        debug!(endpoint = %self.endpoint, "executing GraphQL request");

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = resp.status();
        let text = resp.text().await.map_err(map_reqwest_error)?;
        read_response(status, &text)
    }
}
