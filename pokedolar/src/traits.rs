use crate::types::{CatalogEntry, MediaKind, PublicationRecord, Result, RunContext};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// Source of the current exchange rate, already formatted with a `,` decimal separator.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Human-readable name for this provider
    fn source_name(&self) -> String;

    async fn fetch_rate(&self, request_id: Uuid) -> Result<String>;
}

/// Lookup of descriptive data for one catalog index.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn lookup(&self, index: u32) -> Result<CatalogEntry>;
}

/// Append-only store of publications, newest first.
#[async_trait]
pub trait PublicationLedger: Send + Sync {
    /// Rate of the most recent publication, if any.
    async fn last_rate(&self) -> Result<Option<String>>;

    /// The last `limit` publications, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<PublicationRecord>>;

    /// Publications of `pokemon` with a special asset at or after `since`.
    async fn special_since(
        &self,
        pokemon: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PublicationRecord>>;

    async fn record(&self, record: &PublicationRecord) -> Result<()>;
}

/// Generative text model driven by a named prompt and a bag of variables.
#[async_trait]
pub trait TextModel: Send + Sync {
    fn model_name(&self) -> String;

    async fn complete(&self, prompt: &str, variables: &BTreeMap<String, String>) -> Result<String>;
}

/// Parameters handed to the rendering backend.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub base_image: Vec<u8>,
    pub dollar_rate: String,
    pub dollar_up: bool,
    pub pokedex_number: u32,
    pub pokemon_name: String,
    pub special_image: bool,
    pub background_description: Option<String>,
    pub media_kind: MediaKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderedAsset {
    Image(Vec<u8>),
    /// The renderer stored the video itself under the media kind's output key.
    Video,
}

#[async_trait]
pub trait AssetRenderer: Send + Sync {
    async fn render(&self, ctx: &RunContext, request: &RenderRequest) -> Result<RenderedAsset>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, key: &str) -> Result<Vec<u8>>;

    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// Time-limited public GET URL for `key`.
    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<Url>;
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, name: &str) -> Result<String>;
}

/// Media handed to the platform for a new container.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSource {
    pub url: Url,
    pub kind: MediaKind,
}

/// Raw transport to the social platform's container API.
#[async_trait]
pub trait MediaPlatform: Send + Sync {
    async fn create_container(
        &self,
        media: &MediaSource,
        caption: &str,
        access_token: &str,
    ) -> Result<String>;

    /// Current processing status of a container (e.g. `IN_PROGRESS`, `FINISHED`).
    async fn container_status(&self, container_id: &str, access_token: &str) -> Result<String>;

    async fn publish_container(&self, container_id: &str, access_token: &str) -> Result<String>;
}

/// Uniform draws for the probabilistic parts of a run.
pub trait RandomSource: Send + Sync {
    /// A value in `[0, 100)`.
    fn percent(&self) -> f64;

    /// An index in `[0, len)`; `len` is never zero.
    fn pick(&self, len: usize) -> usize;
}
