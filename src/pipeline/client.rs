//! Annotation client: one batch in, one decision per item out.
//!
//! Transport failures (connection refused, timeout, non-2xx) are retried
//! forever with a fixed delay — the run is long-lived and the service is
//! expected to recover; an external supervisor owns the kill decision.
//! A malformed envelope on a delivered response, or a body that defeats
//! the whole recovery ladder, optionally degrades to per-item requests;
//! items still unresolved after that default to discard. `annotate`
//! therefore never fails: a poisoned batch costs its own items, never
//! the run.

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::prompt::{build_user_content, system_prompt};
use super::recover::recover_decisions;
use super::types::{Batch, Decision, ResponseFormat};

/// Attempts per item on the fallback path.
const SINGLE_ITEM_ATTEMPTS: u32 = 3;

#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failure or timeout before a response arrived.
    #[error("request failed: {0}")]
    Request(String),

    /// Non-success HTTP status. Body is truncated for the log.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// 2xx response whose envelope is not the expected chat completion.
    #[error("malformed response envelope: {0}")]
    Envelope(String),
}

/// The one seam the pipeline has on the annotation service: send a system
/// and user message, get the model's raw text back.
pub trait ChatTransport: Send + Sync {
    fn chat(&self, system: &str, user: &str) -> Result<String, TransportError>;
}

impl<T: ChatTransport + ?Sized> ChatTransport for &T {
    fn chat(&self, system: &str, user: &str) -> Result<String, TransportError> {
        (**self).chat(system, user)
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: String,
}

/// Blocking HTTP transport for an OpenAI-compatible `/chat/completions`
/// endpoint with bearer-token auth.
pub struct OpenAiTransport {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl OpenAiTransport {
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
        }
    }
}

impl ChatTransport for OpenAiTransport {
    fn chat(&self, system: &str, user: &str) -> Result<String, TransportError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let head: String = body.chars().take(200).collect();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: head,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| TransportError::Envelope(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| TransportError::Envelope("response has no choices".into()))
    }
}

/// Issues the request for one batch and turns the response into a full
/// `local_id -> Decision` mapping.
pub struct AnnotationClient<T> {
    transport: T,
    format: ResponseFormat,
    per_item_fallback: bool,
    retry_delay: Duration,
}

impl<T: ChatTransport> AnnotationClient<T> {
    pub fn new(
        transport: T,
        format: ResponseFormat,
        per_item_fallback: bool,
        retry_delay: Duration,
    ) -> Self {
        Self {
            transport,
            format,
            per_item_fallback,
            retry_delay,
        }
    }

    /// Annotate one batch. Always returns exactly one decision per item;
    /// anything the service failed to address comes back as discard.
    pub fn annotate(&self, batch: &Batch) -> HashMap<usize, Decision> {
        let user = build_user_content(&batch.items, self.format);

        let recovered = self
            .send_batch(&user)
            .map_err(|e| e.to_string())
            .and_then(|raw| {
                recover_decisions(&raw, batch.len(), self.format).map_err(|e| e.to_string())
            });

        let mut decisions = match recovered {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(items = batch.len(), error = %e, "batch-level recovery failed");
                if self.per_item_fallback {
                    tracing::warn!("falling back to per-item evaluation");
                    self.annotate_per_item(batch)
                } else {
                    tracing::warn!(items = batch.len(), "batch marked failed, all items discarded");
                    HashMap::new()
                }
            }
        };

        for local_id in 0..batch.len() {
            decisions.entry(local_id).or_insert_with(Decision::discard);
        }
        decisions
    }

    /// Deliver one batch request. Connection failures, timeouts and
    /// non-success statuses are retried forever; a malformed envelope on
    /// a delivered 2xx response is NOT — a proxy serving an HTML page
    /// would otherwise stall the run, so it fails this batch and moves
    /// on through the fallback path.
    fn send_batch(&self, user: &str) -> Result<String, TransportError> {
        let system = system_prompt(self.format);
        loop {
            match self.transport.chat(system, user) {
                Ok(raw) => return Ok(raw),
                Err(e @ TransportError::Envelope(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, delay_secs = self.retry_delay.as_secs(), "annotation request failed, retrying");
                    thread::sleep(self.retry_delay);
                }
            }
        }
    }

    /// Sequential one-item requests, up to `SINGLE_ITEM_ATTEMPTS` each
    /// with a short linear backoff. Unresolved items become discard.
    fn annotate_per_item(&self, batch: &Batch) -> HashMap<usize, Decision> {
        let system = system_prompt(self.format);
        let mut out = HashMap::new();

        for item in &batch.items {
            let user = build_user_content(std::slice::from_ref(item), self.format);
            let mut resolved = None;

            for attempt in 1..=SINGLE_ITEM_ATTEMPTS {
                match self.transport.chat(system, &user) {
                    Ok(raw) => {
                        if let Ok(map) = recover_decisions(&raw, 1, self.format) {
                            if let Some(d) = map.get(&0) {
                                resolved = Some(d.clone());
                                break;
                            }
                        }
                        tracing::debug!(local_id = item.local_id, attempt, "single-item response unusable");
                    }
                    Err(e) => {
                        tracing::debug!(local_id = item.local_id, attempt, error = %e, "single-item request failed");
                    }
                }
                thread::sleep(self.retry_delay / 5 * attempt);
            }

            if resolved.is_none() {
                tracing::warn!(local_id = item.local_id, "item unresolved after fallback, discarded");
            }
            out.insert(item.local_id, resolved.unwrap_or_default());
        }
        out
    }
}
