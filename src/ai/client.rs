use super::memory::ContextManager;
use super::schema::{Schema, parse_structured};
use crate::config::{BackendKind, ModelConfig};
use crate::error::{Result, ScoutError};
use crate::utils::truncate_chars;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// A single completion call
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub prompt: String,
    /// System message; ignored by backends without chat roles
    pub system: Option<String>,
    /// Overrides the configured temperature
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }
}

/// A model inference backend
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &str;

    /// Run one completion, returning the generated text
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Local generation endpoint (`POST /api/generate`)
pub struct OllamaBackend {
    http: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            http,
            url: config.generate_url(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ModelBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = json!({
            "model": self.model,
            "prompt": request.prompt,
            "stream": false,
        });

        let response = self.http.post(&self.url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(ScoutError::Status {
                service: self.name().to_string(),
                status: response.status().as_u16(),
            });
        }

        let reply = response.json::<Value>().await?;
        Ok(reply
            .get("response")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }
}

/// Hosted chat-completion endpoint (`POST /v1/chat/completions`)
pub struct OpenAiBackend {
    http: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
    temperature: f32,
}

impl OpenAiBackend {
    /// Fails when no API key is configured
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                ScoutError::Config("hosted model backend requires an API key (OPENAI_API_KEY)".into())
            })?;
        let http = reqwest::Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            http,
            url: config.chat_url(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature.unwrap_or(self.temperature),
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ScoutError::Status {
                service: self.name().to_string(),
                status: response.status().as_u16(),
            });
        }

        let reply = response.json::<Value>().await?;
        reply
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .ok_or_else(|| ScoutError::Model("chat completion reply had no content".into()))
    }
}

/// Build the backend named in the configuration
pub fn backend_for(config: &ModelConfig) -> Result<Box<dyn ModelBackend>> {
    Ok(match config.backend {
        BackendKind::Ollama => Box::new(OllamaBackend::new(config)?),
        BackendKind::OpenAi => Box::new(OpenAiBackend::new(config)?),
    })
}

/// Model client with rate limiting, retries and structured output.
///
/// `generate` and `generate_structured` never fail: exhausted retries come back as an
/// `"Error: ..."` string and unparsable JSON as an error-tagged mapping.
pub struct ModelClient {
    backend: Box<dyn ModelBackend>,
    max_retries: u32,
    retry_delay: Duration,
    rate_limit: Duration,
    last_request: Mutex<Option<Instant>>,
    request_count: AtomicU64,
    debug_dir: Option<PathBuf>,
    /// Recent decisions per named context, shared by every component on this client
    memories: std::sync::Mutex<ContextManager>,
}

impl ModelClient {
    /// Build a client for the configured backend. `debug_dir` is only used when
    /// debug mode is on.
    pub fn from_config(config: &ModelConfig, debug_dir: Option<PathBuf>) -> Result<Self> {
        let backend = backend_for(config)?;
        ::log::info!("Using {} backend with model {}", backend.name(), config.model);
        let mut client = Self::with_backend(backend, config);
        if config.debug {
            client.debug_dir = debug_dir;
        }
        Ok(client)
    }

    pub fn with_backend(backend: Box<dyn ModelBackend>, config: &ModelConfig) -> Self {
        Self {
            backend,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            rate_limit: config.rate_limit(),
            last_request: Mutex::new(None),
            request_count: AtomicU64::new(0),
            debug_dir: None,
            memories: std::sync::Mutex::new(ContextManager::new()),
        }
    }

    /// Rendered history of the named memory
    pub fn recall(&self, name: &str, capacity: usize) -> String {
        match self.memories.lock() {
            Ok(mut memories) => memories.get_memory(name, capacity).get_context(),
            Err(_) => "No previous context.".to_string(),
        }
    }

    /// Add an entry to the named memory
    pub fn remember(&self, name: &str, capacity: usize, entry: impl Into<String>) {
        if let Ok(mut memories) = self.memories.lock() {
            memories.get_memory(name, capacity).add(entry);
        }
    }

    /// Number of backend calls made so far, failed ones included
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Generate text for a prompt
    pub async fn generate(&self, prompt: &str) -> String {
        self.generate_with(CompletionRequest::new(prompt)).await
    }

    /// Generate text for a full request, rendering failures as `"Error: ..."`
    pub async fn generate_with(&self, request: CompletionRequest) -> String {
        match self.complete(&request).await {
            Ok(text) => text,
            Err(e) => format!("Error: {}", e),
        }
    }

    /// Run a request with rate limiting and exponential backoff
    pub async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.write_debug("prompt", &request.prompt).await;

        let mut attempt = 0;
        loop {
            self.wait_for_rate_limit().await;
            ::log::debug!(
                "Sending prompt to {} ({} chars)",
                self.backend.name(),
                request.prompt.len()
            );

            let started = Instant::now();
            let outcome = self.backend.complete(request).await;
            self.request_count.fetch_add(1, Ordering::Relaxed);
            *self.last_request.lock().await = Some(Instant::now());

            match outcome {
                Ok(text) => {
                    ::log::debug!(
                        "{} replied with {} chars in {:.2}s",
                        self.backend.name(),
                        text.len(),
                        started.elapsed().as_secs_f64()
                    );
                    self.write_debug("response", &text).await;
                    return Ok(text);
                }
                Err(e) => {
                    ::log::error!("Error from {} backend: {}", self.backend.name(), e);
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(e);
                    }
                    let wait = self.retry_delay * 2u32.pow(attempt - 1);
                    ::log::info!("Retrying in {:.1} seconds...", wait.as_secs_f64());
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Generate a JSON mapping validated against `schema`
    pub async fn generate_structured(&self, prompt: &str, schema: &Schema) -> Value {
        let full_prompt = format!("{}\n\n{}", prompt, schema.format_instructions());
        let response = self.generate(&full_prompt).await;
        ::log::debug!("Raw structured response: {}", truncate_chars(&response, 500));

        match parse_structured(&response, schema) {
            Ok(value) => value,
            Err(e) => {
                ::log::error!("Failed to parse structured output for {}: {}", schema.name, e);
                json!({
                    "is_product": false,
                    "raw_response": truncate_chars(&response, 500),
                    "error": format!("JSON parsing failed: {}", e),
                })
            }
        }
    }

    async fn wait_for_rate_limit(&self) {
        let last = *self.last_request.lock().await;
        if let Some(last) = last {
            let elapsed = last.elapsed();
            if elapsed < self.rate_limit {
                let wait = self.rate_limit - elapsed;
                ::log::debug!("Rate limiting: waiting {}ms", wait.as_millis());
                tokio::time::sleep(wait).await;
            }
        }
    }

    async fn write_debug(&self, kind: &str, text: &str) {
        let Some(dir) = &self.debug_dir else { return };
        let path = dir.join(format!(
            "{}_{:04}_{}.txt",
            kind,
            self.request_count(),
            chrono::Local::now().format("%H%M%S%3f")
        ));
        match tokio::fs::write(&path, text).await {
            Ok(()) => ::log::debug!("Saved {} to {}", kind, path.display()),
            Err(e) => ::log::warn!("Could not save debug {}: {}", kind, e),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ai::schema::{LINK_SELECTION, PRODUCT_DATA};
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;

    /// Backend that replays canned replies and records prompts
    #[derive(Clone, Default)]
    pub(crate) struct ScriptedBackend {
        replies: Arc<StdMutex<VecDeque<Result<String>>>>,
        pub prompts: Arc<StdMutex<Vec<String>>>,
    }

    impl ScriptedBackend {
        pub(crate) fn new<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            let backend = Self::default();
            backend
                .replies
                .lock()
                .unwrap()
                .extend(replies.into_iter().map(|r| Ok(r.into())));
            backend
        }

        pub(crate) fn push_error(&self, status: u16) {
            self.replies.lock().unwrap().push_back(Err(ScoutError::Status {
                service: "scripted".into(),
                status,
            }));
        }

        pub(crate) fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ScoutError::Model("script exhausted".into())))
        }
    }

    pub(crate) fn fast_config() -> ModelConfig {
        ModelConfig {
            retry_delay_ms: 1,
            rate_limit_ms: 0,
            ..ModelConfig::default()
        }
    }

    pub(crate) fn scripted_client(backend: &ScriptedBackend) -> ModelClient {
        ModelClient::with_backend(Box::new(backend.clone()), &fast_config())
    }

    #[tokio::test]
    async fn test_generate_returns_reply() {
        let backend = ScriptedBackend::new(["hello"]);
        let client = scripted_client(&backend);
        assert_eq!(client.generate("hi").await, "hello");
        assert_eq!(client.request_count(), 1);
        assert_eq!(backend.prompts(), vec!["hi"]);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let backend = ScriptedBackend::default();
        backend.push_error(500);
        backend.push_error(503);
        backend.replies.lock().unwrap().push_back(Ok("third time".into()));

        let client = scripted_client(&backend);
        assert_eq!(client.generate("hi").await, "third time");
        assert_eq!(client.request_count(), 3);
    }

    #[tokio::test]
    async fn test_error_string_after_exhaustion() {
        let backend = ScriptedBackend::default();
        for _ in 0..4 {
            backend.push_error(500);
        }
        let client = scripted_client(&backend);

        let reply = client.generate("hi").await;
        assert!(reply.starts_with("Error: "), "got {}", reply);
        assert!(reply.contains("500"));
        // first attempt plus three retries
        assert_eq!(client.request_count(), 4);
    }

    #[tokio::test]
    async fn test_rate_limit_spaces_requests() {
        let backend = ScriptedBackend::new(["a", "b"]);
        let config = ModelConfig {
            rate_limit_ms: 50,
            ..fast_config()
        };
        let client = ModelClient::with_backend(Box::new(backend), &config);

        let started = Instant::now();
        client.generate("one").await;
        client.generate("two").await;
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_structured_appends_instructions_and_validates() {
        let backend = ScriptedBackend::new([
            "```json\n{\"selection\": 2, \"reason\": \"looks like a product\", \"is_product_page\": true, \"x\": 1}\n```",
        ]);
        let client = scripted_client(&backend);

        let value = client.generate_structured("Pick a link", &LINK_SELECTION).await;
        assert_eq!(
            value,
            json!({"selection": 2, "reason": "looks like a product", "is_product_page": true})
        );
        assert!(backend.prompts()[0].contains("\"is_product_page\""));
    }

    #[tokio::test]
    async fn test_structured_unparsable_reply() {
        let long_reply = format!("I am not JSON {}", "z".repeat(600));
        let backend = ScriptedBackend::new([long_reply]);
        let client = scripted_client(&backend);

        let value = client.generate_structured("Extract", &PRODUCT_DATA).await;
        assert_eq!(value["is_product"], json!(false));
        assert_eq!(value["raw_response"].as_str().unwrap().chars().count(), 500);
        assert!(value["error"].as_str().unwrap().starts_with("JSON parsing failed"));
    }

    #[tokio::test]
    async fn test_debug_mode_writes_prompt_and_response() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(["reply"]);
        let mut client = scripted_client(&backend);
        client.debug_dir = Some(dir.path().to_path_buf());

        client.generate("prompt text").await;
        let names = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        assert!(names.iter().any(|n| n.starts_with("prompt_")));
        assert!(names.iter().any(|n| n.starts_with("response_")));
    }

    #[test]
    fn test_named_memories_are_separate() {
        let client = scripted_client(&ScriptedBackend::default());
        client.remember("page_analysis", 2, "first");
        client.remember("page_analysis", 2, "second");
        client.remember("page_analysis", 2, "third");

        assert_eq!(client.recall("page_analysis", 2), "- second\n- third");
        assert_eq!(client.recall("link_selection", 10), "No previous context.");
    }

    #[test]
    fn test_hosted_backend_requires_key() {
        let config = ModelConfig {
            backend: BackendKind::OpenAi,
            api_key: None,
            ..ModelConfig::default()
        };
        assert!(matches!(
            ModelClient::from_config(&config, None),
            Err(ScoutError::Config(_))
        ));
    }
}
