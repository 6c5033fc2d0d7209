//! A streaming Ollama-compatible LLM backend: issues a single composed
//! prompt, forwards tokens to a bounded channel as they arrive, and
//! abandons the read loop the instant `cancel` fires.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use voice_agent_core::{Error as CoreError, GenerateRequest, LlmStreamer};

use crate::LlmError;

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Clone)]
pub struct OllamaBackend {
    client: Client,
    config: OllamaConfig,
}

impl OllamaBackend {
    pub fn new(config: OllamaConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.config.endpoint, path)
    }
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    repeat_penalty: f32,
    num_predict: u32,
    stop: Vec<String>,
}

#[derive(Deserialize)]
struct OllamaGenerateChunk {
    response: String,
    #[serde(default)]
    done: bool,
}

#[async_trait]
impl LlmStreamer for OllamaBackend {
    async fn generate_stream(
        &self,
        request: GenerateRequest,
        tokens: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> Result<String, CoreError> {
        let body = OllamaGenerateRequest {
            model: &request.model,
            prompt: &request.prompt,
            stream: true,
            options: OllamaOptions {
                temperature: request.options.temperature,
                top_p: request.options.top_p,
                top_k: request.options.top_k,
                repeat_penalty: request.options.repeat_penalty,
                num_predict: request.options.num_predict,
                stop: request.options.stop.clone(),
            },
        };

        let response = self
            .client
            .post(self.api_url("/generate"))
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::TransientExternal(format!("llm request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(CoreError::TransientExternal(format!("llm returned {status}: {text}")));
        }

        let mut stream = response.bytes_stream();
        let mut full = String::new();
        let mut buf = Vec::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("llm generation cancelled by interrupt");
                    break;
                }
                next = stream.next() => {
                    let Some(chunk) = next else { break };
                    let chunk = chunk.map_err(|e| CoreError::TransientExternal(e.to_string()))?;
                    buf.extend_from_slice(&chunk);

                    while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                        let line: Vec<u8> = buf.drain(..=pos).collect();
                        let line = &line[..line.len().saturating_sub(1)];
                        if line.is_empty() {
                            continue;
                        }
                        let parsed: OllamaGenerateChunk = match serde_json::from_slice(line) {
                            Ok(p) => p,
                            Err(e) => {
                                tracing::warn!(error = %e, "skipping malformed llm stream chunk");
                                continue;
                            }
                        };
                        if !parsed.response.is_empty() {
                            full.push_str(&parsed.response);
                            if tokens.send(parsed.response).await.is_err() {
                                // Receiver dropped (shaper gave up); stop pulling more tokens.
                                return Ok(full);
                            }
                        }
                        if parsed.done {
                            return Ok(full);
                        }
                    }
                }
            }
        }

        Ok(full)
    }
}
