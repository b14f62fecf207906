//! Model gateway.
//!
//! Forwards chat requests to an Ollama-compatible backend and keeps a cached
//! snapshot of the model names it reports.
//!
//! # Backend contract
//!
//! | Method | Path | Used for |
//! |--------|------|----------|
//! | `GET`  | `/api/tags` | liveness probe and model listing |
//! | `POST` | `/api/chat` | chat completion (non-streaming) |
//!
//! # Model resolution
//!
//! A chat request names a model, or falls back to the configured default.
//! On a cache miss the gateway refreshes the cache once; if the model is
//! still missing it sends the request with the default model instead of
//! failing. There is no retry on backend errors.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::{self, ConfigResolver};
use crate::error::{Error, Result};
use crate::models::{BackendOptions, ChatRequest, NormalizedChatRequest, TagsResponse};

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const FALLBACK_DEFAULT_MODEL: &str = "llama3.2:latest";

pub struct ModelGateway {
    base_url: String,
    default_model: String,
    client: reqwest::Client,
    cache: RwLock<Arc<Vec<String>>>,
}

impl ModelGateway {
    pub fn new(config: &ConfigResolver) -> Self {
        let host = config
            .get_string(config::OLLAMA_HOST)
            .unwrap_or_else(|| "http://localhost".to_string());
        let port = config
            .get_string(config::OLLAMA_PORT)
            .unwrap_or_else(|| "11434".to_string());
        let default_model = config
            .get_string(config::DEFAULT_MODEL)
            .unwrap_or_else(|| FALLBACK_DEFAULT_MODEL.to_string());

        Self::with_base_url(format!("{}:{}", host, port), default_model)
    }

    pub fn with_base_url(base_url: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_model: default_model.into(),
            client: reqwest::Client::new(),
            cache: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Current cache snapshot. No I/O.
    pub fn cached_models(&self) -> Arc<Vec<String>> {
        match self.cache.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn replace_cache(&self, models: Vec<String>) {
        let snapshot = Arc::new(models);
        match self.cache.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }

    fn is_cached(&self, model: &str) -> bool {
        self.cached_models().iter().any(|m| m == model)
    }

    /// Probe the backend, then fill the model cache.
    ///
    /// A failed probe is [`Error::BackendUnavailable`], which is fatal for
    /// startup.
    pub async fn initialize(&self) -> Result<()> {
        info!(base_url = %self.base_url, "initializing model gateway");
        self.probe().await?;
        self.list_models().await?;
        info!("model gateway initialized");
        Ok(())
    }

    async fn probe(&self) -> Result<()> {
        let unavailable = |reason: String| {
            error!(base_url = %self.base_url, %reason, "model backend is not running");
            Error::BackendUnavailable {
                base_url: self.base_url.clone(),
                reason,
            }
        };

        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(unavailable(format!("status {}", response.status())));
        }

        info!("model backend is running");
        Ok(())
    }

    /// Fetch the backend's model list and replace the cache with it.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?;
        let response = check_status(response).await?;
        let tags: TagsResponse = response.json().await?;

        let models: Vec<String> = tags
            .models
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.name)
            .collect();

        if models.is_empty() {
            warn!("no models found on the backend");
        } else {
            info!(models = %models.join(", "), "available models");
        }

        self.replace_cache(models.clone());
        Ok(models)
    }

    /// Pick the model a request will run on.
    ///
    /// Refreshes the cache at most once. A model that is still unknown after
    /// the refresh is replaced by the default model.
    pub async fn resolve_model(&self, requested: Option<&str>) -> Result<String> {
        let model = requested
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_model)
            .to_string();

        if self.is_cached(&model) {
            return Ok(model);
        }

        warn!(model = %model, "model not found in cache, refreshing");
        self.list_models().await?;
        if self.is_cached(&model) {
            return Ok(model);
        }

        let missing = Error::ModelNotFound(model);
        warn!(
            error = %missing,
            default = %self.default_model,
            "falling back to the default model"
        );
        Ok(self.default_model.clone())
    }

    /// Build the body sent to the backend for `request` on `model`.
    pub fn normalize(&self, model: String, request: ChatRequest) -> NormalizedChatRequest {
        NormalizedChatRequest {
            model,
            messages: request.messages,
            stream: false,
            options: request.options.as_ref().and_then(BackendOptions::from_request),
        }
    }

    /// Send a chat request and return the backend's response untouched.
    pub async fn chat(&self, request: ChatRequest) -> Result<Value> {
        let model = self.resolve_model(request.model.as_deref()).await?;
        let body = self.normalize(model, request);

        info!(model = %body.model, messages = body.messages.len(), "sending chat request");
        let result = self.send_chat(&body).await;
        match &result {
            Ok(_) => debug!(model = %body.model, "chat request complete"),
            Err(e) => error!(model = %body.model, error = %e, "chat request failed"),
        }
        result
    }

    async fn send_chat(&self, body: &NormalizedChatRequest) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(body)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(Error::BackendRequest {
        status: Some(status.as_u16()),
        message: if body.is_empty() {
            status.to_string()
        } else {
            body
        },
    })
}
