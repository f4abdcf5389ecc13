pub mod caption;
pub mod catalog;
pub mod config;
pub mod fetcher;
pub mod ledger;
pub mod llm_adapter;
pub mod pipeline;
pub mod publisher;
pub mod rate;
pub mod renderer;
pub mod scene;
pub mod secrets;
pub mod selector;
pub mod sources;
pub mod storage;
pub mod traits;
pub mod types;

pub use caption::CaptionService;
pub use catalog::PokeApiCatalog;
pub use config::{FetchConfig, PipelineConfig, PollConfig, RateSourceKind, SelectorConfig};
pub use fetcher::Fetcher;
pub use ledger::{MemoryLedger, PgLedger};
pub use llm_adapter::{HttpTextModel, MockTextModel};
pub use pipeline::{PipelineBuilder, PublicationPipeline};
pub use publisher::{ContainerState, GraphApiPlatform, Publisher};
pub use renderer::HttpRenderer;
pub use secrets::{EnvSecretStore, StaticSecretStore};
pub use selector::{OsRandom, SpecialAssetDecision, SpecialAssetSelector};
pub use storage::{HttpObjectStore, MemoryObjectStore};
pub use traits::*;
pub use types::*;
