//! Client trait and the provider router.
//!
//! [`LlmClient`] is the interface consumed by sessions and handlers. The
//! [`Client`] router owns named adapters and resolves each request to one by
//! its `provider` field, falling back to a default.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;

use crate::error::LlmError;
use crate::types::{Request, Response, StreamEvent};

/// Boxed stream of incremental completion events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>;

/// A completion backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends a request and blocks until the full response is available.
    async fn complete(&self, request: Request) -> Result<Response, LlmError>;

    /// Sends a request and yields incremental deltas, terminating with a
    /// `Finish` event that carries the assembled response.
    async fn stream(&self, request: Request) -> Result<EventStream, LlmError>;
}

/// Provider-routing client.
///
/// Holds named adapters; a request's `provider` field picks one, otherwise
/// the default applies. Registering the first adapter makes it the default.
#[derive(Default)]
pub struct Client {
    providers: HashMap<String, Arc<dyn LlmClient>>,
    default_provider: Option<String>,
}

impl Client {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider adapter; the first registration becomes the
    /// default.
    pub fn register_provider(&mut self, name: impl Into<String>, adapter: Arc<dyn LlmClient>) {
        let name = name.into();
        if self.default_provider.is_none() {
            self.default_provider = Some(name.clone());
        }
        self.providers.insert(name, adapter);
    }

    /// Overrides the default provider.
    pub fn set_default_provider(&mut self, name: impl Into<String>) {
        self.default_provider = Some(name.into());
    }

    /// Name of the current default provider.
    pub fn default_provider(&self) -> Option<&str> {
        self.default_provider.as_deref()
    }

    fn resolve(&self, request: &Request) -> Result<Arc<dyn LlmClient>, LlmError> {
        let name = request
            .provider
            .as_deref()
            .or(self.default_provider.as_deref())
            .ok_or_else(|| {
                LlmError::Configuration(
                    "no provider specified and no default provider set".to_string(),
                )
            })?;
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| LlmError::Configuration(format!("unknown provider: {}", name)))
    }
}

#[async_trait]
impl LlmClient for Client {
    async fn complete(&self, request: Request) -> Result<Response, LlmError> {
        let adapter = self.resolve(&request)?;
        adapter.complete(request).await
    }

    async fn stream(&self, request: Request) -> Result<EventStream, LlmError> {
        let adapter = self.resolve(&request)?;
        adapter.stream(request).await
    }
}
