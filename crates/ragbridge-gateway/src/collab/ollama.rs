//! Ollama HTTP client for embeddings (`/api/embed`) and generation
//! (`/api/generate`).
//!
//! Uses `reqwest::blocking`; the client is built lazily on first use so it
//! is always created on a blocking thread, never inside the async runtime.

use std::sync::OnceLock;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use ragbridge_core::error::{BridgeError, Result};

use crate::collab::{Embedder, LlmProvider};
use crate::config::RagSection;

pub struct OllamaClient {
    url: String,
    embed_model: String,
    llm_model: String,
    timeout: Duration,
    http: OnceLock<reqwest::blocking::Client>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(cfg: &RagSection) -> Self {
        Self {
            url: cfg.ollama_url.trim_end_matches('/').to_string(),
            embed_model: cfg.embed_model.clone(),
            llm_model: cfg.llm_model.clone(),
            timeout: Duration::from_millis(cfg.request_timeout_ms),
            http: OnceLock::new(),
        }
    }

    fn http(&self) -> Result<&reqwest::blocking::Client> {
        if let Some(c) = self.http.get() {
            return Ok(c);
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| BridgeError::HandlerFailure(format!("ollama client build failed: {e}")))?;
        Ok(self.http.get_or_init(|| client))
    }

    fn post<T: for<'de> Deserialize<'de>>(&self, path: &str, body: &serde_json::Value) -> Result<T> {
        let url = format!("{}{}", self.url, path);
        let resp = self
            .http()?
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| {
                BridgeError::HandlerFailure(format!("ollama connection error ({url}): {e}"))
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(BridgeError::HandlerFailure(format!(
                "ollama api error {status}: {text}"
            )));
        }
        resp.json::<T>()
            .map_err(|e| BridgeError::HandlerFailure(format!("invalid ollama response: {e}")))
    }
}

impl Embedder for OllamaClient {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = json!({ "model": self.embed_model, "input": texts });
        let resp: EmbedResponse = self.post("/api/embed", &body)?;
        if resp.embeddings.len() != texts.len() {
            return Err(BridgeError::HandlerFailure(format!(
                "ollama returned {} embeddings for {} inputs",
                resp.embeddings.len(),
                texts.len()
            )));
        }
        Ok(resp.embeddings)
    }
}

impl LlmProvider for OllamaClient {
    fn invoke(&self, prompt: &str, model: Option<&str>) -> Result<String> {
        let model = model.filter(|m| !m.is_empty()).unwrap_or(&self.llm_model);
        let body = json!({ "model": model, "prompt": prompt, "stream": false });
        let resp: GenerateResponse = self.post("/api/generate", &body)?;
        Ok(resp.response)
    }
}
