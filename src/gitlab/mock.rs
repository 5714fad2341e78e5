use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::queries::operation_name;
use super::Transport;
use crate::error::TransportError;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub operation: String,
    pub variables: Value,
}

/// A transport that replays scripted responses keyed by operation name and
/// records every call it receives.
#[derive(Clone, Default)]
pub struct MockTransport {
    pub calls: Arc<Mutex<Vec<RecordedCall>>>,
    responses: Arc<Mutex<HashMap<String, VecDeque<Result<Value, TransportError>>>>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a response for the next call to `operation`.
    pub fn respond(&self, operation: &str, response: Result<Value, TransportError>) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .entry(operation.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn operations(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.operation.clone())
            .collect()
    }

    pub fn last_variables(&self, operation: &str) -> Option<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| c.operation == operation)
            .map(|c| c.variables.clone())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, document: &str, variables: Value) -> Result<Value, TransportError> {
        let operation = operation_name(document).to_string();
        self.calls.lock().unwrap().push(RecordedCall {
            operation: operation.clone(),
            variables,
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .get_mut(&operation)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| {
                Err(TransportError::Http {
                    status: 500,
                    messages: vec![format!("no scripted response for {operation}")],
                })
            })
    }
}
