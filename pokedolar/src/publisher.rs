//! Container lifecycle against the social platform.
//!
//! `Created -> PendingReady -> Ready -> Published`, with `Failed` reachable from
//! any non-terminal state. Media without asynchronous processing skips straight
//! from `Created` to publication.

use crate::config::{FetchConfig, PollConfig};
use crate::fetcher::build_client;
use crate::traits::{MediaPlatform, MediaSource, SecretStore};
use crate::types::{MediaKind, PipelineError, Result, RunContext};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

pub const INSTAGRAM_ACCESS_TOKEN_SECRET: &str = "instagram_access_token";

/// Status the platform reports once a container can be published.
pub const READY_STATUS: &str = "FINISHED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    PendingReady,
    Ready,
    Published,
    Failed,
}

impl ContainerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ContainerState::Published | ContainerState::Failed)
    }
}

/// Graph-style container API: `/{account}/media`, `/{container}` and `/{account}/media_publish`.
pub struct GraphApiPlatform {
    client: Client,
    base_url: String,
    account_id: String,
}

impl GraphApiPlatform {
    pub fn new(base_url: String, account_id: String, fetch_config: &FetchConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(fetch_config)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            account_id,
        })
    }

    async fn post_for_id(
        &self,
        url: &str,
        access_token: &str,
        body: &Value,
        fail: fn(String) -> PipelineError,
    ) -> Result<String> {
        let response = self
            .client
            .post(url)
            .query(&[("access_token", access_token)])
            .json(body)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        let status = response.status();
        let reply: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let message = reply
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("no error message");
            return Err(fail(format!("HTTP {}: {}", status.as_u16(), message)));
        }

        reply
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| fail("response has no id".to_string()))
    }
}

#[async_trait]
impl MediaPlatform for GraphApiPlatform {
    async fn create_container(
        &self,
        media: &MediaSource,
        caption: &str,
        access_token: &str,
    ) -> Result<String> {
        let url = format!("{}/{}/media", self.base_url, self.account_id);
        let body = match media.kind {
            MediaKind::Image => json!({ "image_url": media.url.as_str(), "caption": caption }),
            MediaKind::Video => json!({
                "video_url": media.url.as_str(),
                "caption": caption,
                "media_type": "REELS"
            }),
        };
        self.post_for_id(&url, access_token, &body, PipelineError::ContainerCreation)
            .await
    }

    async fn container_status(&self, container_id: &str, access_token: &str) -> Result<String> {
        let url = format!("{}/{}", self.base_url, container_id);
        let response = self
            .client
            .get(&url)
            .query(&[("fields", "status_code"), ("access_token", access_token)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Upstream(format!(
                "status of container {} returned HTTP {}",
                container_id,
                status.as_u16()
            )));
        }

        let reply: Value = response.json().await?;
        reply
            .get("status_code")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PipelineError::Upstream("status response has no status_code".to_string()))
    }

    async fn publish_container(&self, container_id: &str, access_token: &str) -> Result<String> {
        let url = format!("{}/{}/media_publish", self.base_url, self.account_id);
        let body = json!({ "creation_id": container_id });
        self.post_for_id(&url, access_token, &body, PipelineError::Publish)
            .await
    }
}

pub struct Publisher {
    platform: Arc<dyn MediaPlatform>,
    secrets: Arc<dyn SecretStore>,
    poll: PollConfig,
    cancel: Option<watch::Receiver<bool>>,
}

impl Publisher {
    pub fn new(
        platform: Arc<dyn MediaPlatform>,
        secrets: Arc<dyn SecretStore>,
        poll: PollConfig,
    ) -> Self {
        Self {
            platform,
            secrets,
            poll,
            cancel: None,
        }
    }

    /// Abandon any poll loop once `true` is sent on the paired sender.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Create, optionally wait for, and publish a container. Returns the published media id.
    pub async fn publish_media(
        &self,
        ctx: &RunContext,
        media: &MediaSource,
        caption: &str,
    ) -> Result<String> {
        let access_token = self.secrets.get_secret(INSTAGRAM_ACCESS_TOKEN_SECRET).await?;

        let container_id = self
            .platform
            .create_container(media, caption, &access_token)
            .await
            .map_err(|e| match e {
                PipelineError::ContainerCreation(_) => e,
                other => PipelineError::ContainerCreation(other.to_string()),
            })?;
        let mut state = ContainerState::Created;
        info!("Created media container {} for run {}", container_id, ctx.request_id);

        if media.kind.requires_processing() {
            state = transition(&container_id, state, ContainerState::PendingReady);
            if !self.wait_until_ready(&container_id, &access_token).await {
                transition(&container_id, state, ContainerState::Failed);
                return Err(PipelineError::MediaNotReady {
                    container_id,
                    attempts: self.poll.max_attempts,
                });
            }
            state = transition(&container_id, state, ContainerState::Ready);
        }

        let media_id = match self
            .platform
            .publish_container(&container_id, &access_token)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                transition(&container_id, state, ContainerState::Failed);
                return Err(match e {
                    PipelineError::Publish(_) => e,
                    other => PipelineError::Publish(other.to_string()),
                });
            }
        };

        transition(&container_id, state, ContainerState::Published);
        info!("Published media {}", media_id);
        Ok(media_id)
    }

    /// Poll until the container reports ready, up to `max_attempts` times.
    ///
    /// A failed status request counts as "not ready". The full interval is
    /// slept between attempts; cancellation returns `false` without touching
    /// the remote container.
    pub async fn wait_until_ready(&self, container_id: &str, access_token: &str) -> bool {
        let mut cancel = self.cancel.clone();

        for attempt in 1..=self.poll.max_attempts {
            if is_cancelled(&cancel) {
                info!("Polling of container {} cancelled", container_id);
                return false;
            }

            match self.platform.container_status(container_id, access_token).await {
                Ok(status) if status == READY_STATUS => {
                    info!("Container {} ready after {} attempt(s)", container_id, attempt);
                    return true;
                }
                Ok(status) => {
                    debug!(
                        "Container {} status {} (attempt {}/{})",
                        container_id, status, attempt, self.poll.max_attempts
                    );
                }
                Err(e) => {
                    warn!(
                        "Status check for container {} failed (attempt {}/{}): {}",
                        container_id, attempt, self.poll.max_attempts, e
                    );
                }
            }

            if attempt < self.poll.max_attempts && self.sleep_or_cancel(&mut cancel).await {
                info!("Polling of container {} cancelled", container_id);
                return false;
            }
        }

        warn!(
            "Container {} not ready after {} attempts",
            container_id, self.poll.max_attempts
        );
        false
    }

    /// Sleep one poll interval; `true` if cancellation arrived first.
    async fn sleep_or_cancel(&self, cancel: &mut Option<watch::Receiver<bool>>) -> bool {
        let deadline = Instant::now() + self.poll.interval;
        let Some(rx) = cancel.as_mut() else {
            sleep_until(deadline).await;
            return false;
        };

        loop {
            let changed = tokio::select! {
                _ = sleep_until(deadline) => None,
                changed = rx.changed() => Some(changed.is_ok()),
            };

            match changed {
                None => return false,
                Some(true) if *rx.borrow() => return true,
                Some(true) => continue,
                // Sender dropped: nobody can cancel any more.
                Some(false) => {
                    sleep_until(deadline).await;
                    return false;
                }
            }
        }
    }
}

fn is_cancelled(cancel: &Option<watch::Receiver<bool>>) -> bool {
    cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
}

fn transition(container_id: &str, from: ContainerState, to: ContainerState) -> ContainerState {
    debug!("Container {}: {:?} -> {:?}", container_id, from, to);
    to
}
