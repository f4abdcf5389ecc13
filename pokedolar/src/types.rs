use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One entry of the creature catalog, looked up by the index derived from the rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub number: u32,
    pub name: String,
    pub types: Vec<String>,
    pub descriptions: Vec<String>,
    pub habitat: Option<String>,
    pub is_final_stage: bool,
}

/// A successful publication as persisted in the ledger. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicationRecord {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub pokedex_number: u32,
    pub pokemon: String,
    pub dollar_rate: String,
    pub caption: String,
    pub special_image: bool,
}

/// Per-run state owned by the orchestrator and threaded through every stage.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub request_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub rate: String,
    pub index: u32,
    pub last_rate: Option<String>,
}

impl RunContext {
    pub fn new(request_id: Uuid, rate: String, index: u32, last_rate: Option<String>) -> Self {
        Self {
            request_id,
            started_at: Utc::now(),
            rate,
            index,
            last_rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Whether the platform processes this media asynchronously before it can be published.
    pub fn requires_processing(&self) -> bool {
        matches!(self, MediaKind::Video)
    }

    pub fn output_key(&self) -> &'static str {
        match self {
            MediaKind::Image => "lastPublishedPokemonImage.png",
            MediaKind::Video => "lastPublishedPokemonVideo.mp4",
        }
    }
}

impl std::str::FromStr for MediaKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            other => Err(PipelineError::Config(format!("unknown media kind: {}", other))),
        }
    }
}

/// What the orchestrator did on a given invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The rate has not moved since the last publication.
    Skipped { rate: String, index: u32 },
    Published(PublicationRecord),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to fetch exchange rate: {0}")]
    RateFetch(String),

    #[error("Malformed exchange rate: {rate:?}")]
    MalformedRate { rate: String },

    #[error("Catalog lookup failed for #{index}: {message}")]
    CatalogLookup { index: u32, message: String },

    #[error("Asset rendering failed: {0}")]
    AssetRender(String),

    #[error("Caption generation failed: {0}")]
    CaptionGeneration(String),

    #[error("Failed to create media container: {0}")]
    ContainerCreation(String),

    #[error("Media container {container_id} not ready after {attempts} attempts")]
    MediaNotReady { container_id: String, attempts: u32 },

    #[error("Failed to publish media container: {0}")]
    Publish(String),

    #[error("Failed to read publication ledger: {0}")]
    LedgerRead(String),

    #[error("Failed to write publication ledger: {0}")]
    LedgerWrite(String),

    #[error("Object storage error: {0}")]
    ObjectStorage(String),

    #[error("Secret {name} unavailable: {message}")]
    Secret { name: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl PipelineError {
    /// Attribute a transport-level failure to the stage that hit it; stage errors pass through.
    pub fn in_stage(self, wrap: impl FnOnce(String) -> PipelineError) -> PipelineError {
        match self {
            PipelineError::Upstream(_)
            | PipelineError::Http(_)
            | PipelineError::Database(_)
            | PipelineError::Serialization(_)
            | PipelineError::InvalidUrl(_) => wrap(self.to_string()),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
