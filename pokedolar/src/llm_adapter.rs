use crate::config::FetchConfig;
use crate::fetcher::build_client;
use crate::traits::TextModel;
use crate::types::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Serialize)]
struct ConverseRequest<'a> {
    prompt: &'a str,
    variables: &'a BTreeMap<String, String>,
}

/// Text model reached over HTTP with a converse-style envelope:
/// the reply text is at `output.message.content[0].text`.
pub struct HttpTextModel {
    client: Client,
    endpoint: String,
}

impl HttpTextModel {
    pub fn new(endpoint: String, fetch_config: &FetchConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(fetch_config)?,
            endpoint,
        })
    }
}

#[async_trait]
impl TextModel for HttpTextModel {
    fn model_name(&self) -> String {
        format!("HTTP text model ({})", self.endpoint)
    }

    async fn complete(&self, prompt: &str, variables: &BTreeMap<String, String>) -> Result<String> {
        info!("Sending {} prompt to text model", prompt);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&ConverseRequest { prompt, variables })
            .send()
            .await
            .map_err(|e| PipelineError::CaptionGeneration(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::CaptionGeneration(format!(
                "text model returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::CaptionGeneration(e.to_string()))?;

        let text = body
            .pointer("/output/message/content/0/text")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PipelineError::CaptionGeneration("text model reply has no text".to_string())
            })?;

        debug!("Text model replied with {} characters", text.len());
        Ok(text.to_string())
    }
}

/// Canned replies for development and testing; records every call.
pub struct MockTextModel {
    name: String,
    replies: BTreeMap<String, std::result::Result<String, String>>,
    calls: Mutex<Vec<(String, BTreeMap<String, String>)>>,
}

impl MockTextModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            replies: BTreeMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(mut self, prompt: impl Into<String>, reply: impl Into<String>) -> Self {
        self.replies.insert(prompt.into(), Ok(reply.into()));
        self
    }

    pub fn with_failure(mut self, prompt: impl Into<String>, message: impl Into<String>) -> Self {
        self.replies.insert(prompt.into(), Err(message.into()));
        self
    }

    pub fn calls(&self) -> Vec<(String, BTreeMap<String, String>)> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TextModel for MockTextModel {
    fn model_name(&self) -> String {
        format!("Mock text model ({})", self.name)
    }

    async fn complete(&self, prompt: &str, variables: &BTreeMap<String, String>) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((prompt.to_string(), variables.clone()));
        }

        match self.replies.get(prompt) {
            Some(Ok(reply)) => Ok(reply.clone()),
            Some(Err(message)) => Err(PipelineError::CaptionGeneration(message.clone())),
            None => Err(PipelineError::CaptionGeneration(format!(
                "no reply configured for prompt {}",
                prompt
            ))),
        }
    }
}
