//! LLM completion backends
//!
//! The evaluator only sees [`CompletionBackend`]. Adapters normalise every
//! response shape to plain `String`s, and batch outputs always follow the
//! order of the input prompts.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::BackendError;

/// Sampling parameters shared by every prompt of one call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub system_instruction: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerationParams {
    pub fn new(system_instruction: impl Into<String>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            max_tokens,
            temperature,
        }
    }
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str, params: &GenerationParams)
        -> Result<String, BackendError>;

    /// Complete many prompts. Output `i` answers prompt `i`.
    async fn complete_batch(
        &self,
        prompts: &[String],
        params: &GenerationParams,
    ) -> Result<Vec<String>, BackendError> {
        let mut outputs = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            outputs.push(self.complete(prompt, params).await?);
        }
        Ok(outputs)
    }

    fn supports_batching(&self) -> bool {
        false
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, BackendError> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent("biomarker-eval/0.1.0")
        .build()?)
}

async fn post_json(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    body: &Value,
    timeout: Duration,
) -> Result<Value, BackendError> {
    let mut request = client
        .post(url)
        .header("Content-Type", "application/json")
        .json(body);
    if let Some(key) = api_key {
        request = request.header("Authorization", format!("Bearer {}", key));
    }

    let response = request
        .send()
        .await
        .map_err(|e| BackendError::from_request(e, timeout))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        warn!("Backend error {}: {}", status, message);
        return Err(BackendError::Api { status, message });
    }

    response
        .json()
        .await
        .map_err(|e| BackendError::from_request(e, timeout))
}

/// OpenAI-compatible `/chat/completions` endpoint
#[derive(Clone)]
pub struct ChatCompletionsBackend {
    client: reqwest::Client,
    api_url: Arc<String>,
    api_key: Option<Arc<String>>,
    model: Arc<String>,
    timeout: Duration,
}

impl ChatCompletionsBackend {
    pub fn new(
        api_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            client: build_client(timeout)?,
            api_url: Arc::new(api_url.into().trim_end_matches('/').to_string()),
            api_key: api_key.map(Arc::new),
            model: Arc::new(model.into()),
            timeout,
        })
    }

    fn request_body(&self, prompt: &str, params: &GenerationParams) -> Value {
        json!({
            "model": self.model.as_str(),
            "messages": [
                { "role": "system", "content": params.system_instruction },
                { "role": "user", "content": prompt }
            ],
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
        })
    }
}

#[async_trait]
impl CompletionBackend for ChatCompletionsBackend {
    async fn complete(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, BackendError> {
        let url = format!("{}/chat/completions", self.api_url);
        debug!("Chat completion request to {} ({} chars)", url, prompt.len());

        let json = post_json(
            &self.client,
            &url,
            self.api_key.as_deref().map(String::as_str),
            &self.request_body(prompt, params),
            self.timeout,
        )
        .await?;

        json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BackendError::Shape("missing choices[0].message.content".to_string()))
    }

    async fn complete_batch(
        &self,
        prompts: &[String],
        params: &GenerationParams,
    ) -> Result<Vec<String>, BackendError> {
        let handles: Vec<_> = prompts
            .iter()
            .map(|prompt| {
                let backend = self.clone();
                let prompt = prompt.clone();
                let params = params.clone();
                tokio::spawn(async move { backend.complete(&prompt, &params).await })
            })
            .collect();

        join_in_order(handles).await
    }

    fn supports_batching(&self) -> bool {
        true
    }
}

/// Join completion tasks in spawn order so outputs line up with prompts.
/// The first failure aborts every task still outstanding.
async fn join_in_order(
    handles: Vec<JoinHandle<Result<String, BackendError>>>,
) -> Result<Vec<String>, BackendError> {
    let mut outputs = Vec::with_capacity(handles.len());
    let mut pending = handles.into_iter();
    while let Some(handle) = pending.next() {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(BackendError::Shape(format!("completion task failed: {}", e))),
        };
        match result {
            Ok(output) => outputs.push(output),
            Err(e) => {
                let remaining: Vec<_> = pending.collect();
                if !remaining.is_empty() {
                    warn!("Aborting {} outstanding completions after: {}", remaining.len(), e);
                }
                for handle in remaining {
                    handle.abort();
                }
                return Err(e);
            }
        }
    }
    Ok(outputs)
}

/// Endpoint taking `{"instances": [...]}` and answering `{"predictions": [...]}`
pub struct PredictEndpointBackend {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl PredictEndpointBackend {
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
            api_key,
            timeout,
        })
    }

    fn instance(prompt: &str, params: &GenerationParams) -> Value {
        json!({
            "prompt": format!("{} {}", params.system_instruction, prompt),
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "raw_response": true,
        })
    }
}

#[async_trait]
impl CompletionBackend for PredictEndpointBackend {
    async fn complete(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, BackendError> {
        let mut outputs = self.complete_batch(&[prompt.to_string()], params).await?;
        outputs
            .pop()
            .ok_or_else(|| BackendError::Shape("empty predictions".to_string()))
    }

    async fn complete_batch(
        &self,
        prompts: &[String],
        params: &GenerationParams,
    ) -> Result<Vec<String>, BackendError> {
        let instances: Vec<Value> = prompts
            .iter()
            .map(|prompt| Self::instance(prompt, params))
            .collect();
        debug!("Predict request to {} ({} instances)", self.url, instances.len());

        let json = post_json(
            &self.client,
            &self.url,
            self.api_key.as_deref(),
            &json!({ "instances": instances }),
            self.timeout,
        )
        .await?;

        let predictions = normalize_predictions(&json)?;
        if predictions.len() != prompts.len() {
            return Err(BackendError::BatchLength {
                expected: prompts.len(),
                got: predictions.len(),
            });
        }
        Ok(predictions)
    }

    fn supports_batching(&self) -> bool {
        true
    }
}

/// Reduce a predictions payload to one string per instance
pub fn normalize_predictions(json: &Value) -> Result<Vec<String>, BackendError> {
    let predictions = json
        .get("predictions")
        .and_then(Value::as_array)
        .ok_or_else(|| BackendError::Shape("missing predictions array".to_string()))?;

    predictions.iter().map(normalize_prediction).collect()
}

fn normalize_prediction(value: &Value) -> Result<String, BackendError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Object(map) => {
            if let Some(inner) = map.get("predictions").and_then(Value::as_array) {
                let texts: Vec<String> = inner
                    .iter()
                    .map(normalize_prediction)
                    .collect::<Result<_, _>>()?;
                return Ok(texts.join("\n"));
            }
            map.get("content")
                .or_else(|| map.get("text"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| BackendError::Shape(format!("unrecognised prediction: {}", value)))
        }
        other => Err(BackendError::Shape(format!(
            "unrecognised prediction: {}",
            other
        ))),
    }
}
