use crate::caption::CaptionService;
use crate::config::PipelineConfig;
use crate::ledger::new_record;
use crate::publisher::Publisher;
use crate::rate::{derive_index, should_proceed, RateVariation};
use crate::scene::SceneOptions;
use crate::selector::{OsRandom, SpecialAssetSelector};
use crate::traits::{
    AssetRenderer, CatalogLookup, MediaPlatform, MediaSource, ObjectStore, PublicationLedger,
    RandomSource, RateSource, RenderRequest, RenderedAsset, SecretStore, TextModel,
};
use crate::types::{MediaKind, PipelineError, Result, RunContext, RunOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Runs one publication end to end: rate, gate, catalog, selection, caption,
/// rendering, publication, ledger. Stages run strictly in sequence and the
/// first failure aborts the run without writing a record.
pub struct PublicationPipeline {
    rate_source: Arc<dyn RateSource>,
    ledger: Arc<dyn PublicationLedger>,
    catalog: Arc<dyn CatalogLookup>,
    selector: SpecialAssetSelector,
    random: Arc<dyn RandomSource>,
    captions: CaptionService,
    renderer: Arc<dyn AssetRenderer>,
    storage: Arc<dyn ObjectStore>,
    publisher: Publisher,
    media_kind: MediaKind,
    caption_history: usize,
    presign_ttl: Duration,
}

impl PublicationPipeline {
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    /// One invocation with a fresh correlation id.
    pub async fn run(&self) -> Result<RunOutcome> {
        self.run_with_id(Uuid::new_v4()).await
    }

    pub async fn run_with_id(&self, request_id: Uuid) -> Result<RunOutcome> {
        let span = info_span!("run", request_id = %request_id);
        let result = self.run_stages(request_id).instrument(span.clone()).await;

        if let Err(e) = &result {
            span.in_scope(|| error!("Run failed: {}", e));
        }
        result
    }

    async fn run_stages(&self, request_id: Uuid) -> Result<RunOutcome> {
        info!("Starting publication run with {}", self.rate_source.source_name());

        let rate = self
            .rate_source
            .fetch_rate(request_id)
            .await
            .map_err(|e| e.in_stage(PipelineError::RateFetch))?
            .trim()
            .to_string();
        let index = derive_index(&rate)?;

        let last_rate = self
            .ledger
            .last_rate()
            .await
            .map_err(|e| e.in_stage(PipelineError::LedgerRead))?;

        if !should_proceed(last_rate.as_deref(), &rate) {
            info!("Rate {} unchanged since last publication; nothing to do", rate);
            return Ok(RunOutcome::Skipped { rate, index });
        }

        let ctx = RunContext::new(request_id, rate, index, last_rate);
        info!(
            "Rate moved from {:?} to {}; publishing #{}",
            ctx.last_rate, ctx.rate, ctx.index
        );

        let entry = self.catalog.lookup(index).await.map_err(|e| {
            e.in_stage(|message| PipelineError::CatalogLookup { index, message })
        })?;

        let variation = RateVariation::between(ctx.last_rate.as_deref(), &ctx.rate)?;

        let since = ctx.started_at - chrono::Duration::days(self.selector.window_days());
        let recent_specials = self
            .ledger
            .special_since(&entry.name, since)
            .await
            .map_err(|e| e.in_stage(PipelineError::LedgerRead))?;

        let decision = self.selector.decide(
            &entry.name,
            entry.is_final_stage,
            variation.amount,
            &recent_specials,
        );

        let background_description = if decision.special {
            let scene = SceneOptions::random(self.random.as_ref());
            self.captions.background_description(&entry, &scene).await
        } else {
            None
        };

        let history: Vec<String> = self
            .ledger
            .recent(self.caption_history)
            .await
            .map_err(|e| e.in_stage(PipelineError::LedgerRead))?
            .into_iter()
            .map(|record| record.caption)
            .collect();
        let caption = self
            .captions
            .generate_caption(&ctx, &entry, &variation, &history)
            .await;

        let base_image = self
            .storage
            .get_object(&format!("pokemon/{}.png", index))
            .await
            .map_err(|e| e.in_stage(PipelineError::ObjectStorage))?;

        let request = RenderRequest {
            base_image,
            dollar_rate: ctx.rate.clone(),
            dollar_up: variation.up,
            pokedex_number: entry.number,
            pokemon_name: entry.name.clone(),
            special_image: decision.special,
            background_description,
            media_kind: self.media_kind,
        };
        let asset = self
            .renderer
            .render(&ctx, &request)
            .await
            .map_err(|e| e.in_stage(PipelineError::AssetRender))?;

        let key = self.media_kind.output_key();
        match (self.media_kind, asset) {
            (MediaKind::Image, RenderedAsset::Image(bytes)) => {
                self.storage
                    .put_object(key, bytes, "image/png")
                    .await
                    .map_err(|e| e.in_stage(PipelineError::ObjectStorage))?;
            }
            (MediaKind::Video, RenderedAsset::Video) => {}
            (kind, _) => {
                return Err(PipelineError::AssetRender(format!(
                    "renderer returned a different media kind than {:?}",
                    kind
                )));
            }
        }

        let url = self
            .storage
            .presign_get(key, self.presign_ttl)
            .await
            .map_err(|e| e.in_stage(PipelineError::ObjectStorage))?;

        let media = MediaSource {
            url,
            kind: self.media_kind,
        };
        let media_id = self.publisher.publish_media(&ctx, &media, &caption).await?;

        let record = new_record(
            ctx.request_id,
            entry.number,
            &entry.name,
            &ctx.rate,
            &caption,
            decision.special,
        );
        self.ledger
            .record(&record)
            .await
            .map_err(|e| e.in_stage(PipelineError::LedgerWrite))?;

        info!(
            "Published {} as media {} (rate {}, special: {})",
            record.pokemon, media_id, record.dollar_rate, record.special_image
        );
        Ok(RunOutcome::Published(record))
    }
}

/// Wires a [`PublicationPipeline`] from its collaborators.
pub struct PipelineBuilder {
    config: PipelineConfig,
    rate_source: Option<Arc<dyn RateSource>>,
    ledger: Option<Arc<dyn PublicationLedger>>,
    catalog: Option<Arc<dyn CatalogLookup>>,
    text_model: Option<Arc<dyn TextModel>>,
    renderer: Option<Arc<dyn AssetRenderer>>,
    storage: Option<Arc<dyn ObjectStore>>,
    platform: Option<Arc<dyn MediaPlatform>>,
    secrets: Option<Arc<dyn SecretStore>>,
    random: Arc<dyn RandomSource>,
    cancel: Option<watch::Receiver<bool>>,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            rate_source: None,
            ledger: None,
            catalog: None,
            text_model: None,
            renderer: None,
            storage: None,
            platform: None,
            secrets: None,
            random: Arc::new(OsRandom),
            cancel: None,
        }
    }

    pub fn rate_source(mut self, rate_source: Arc<dyn RateSource>) -> Self {
        self.rate_source = Some(rate_source);
        self
    }

    pub fn ledger(mut self, ledger: Arc<dyn PublicationLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn catalog(mut self, catalog: Arc<dyn CatalogLookup>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn text_model(mut self, text_model: Arc<dyn TextModel>) -> Self {
        self.text_model = Some(text_model);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn AssetRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn ObjectStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn platform(mut self, platform: Arc<dyn MediaPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn secrets(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    pub fn random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn build(self) -> Result<PublicationPipeline> {
        self.config.validate()?;

        let mut publisher = Publisher::new(
            require(self.platform, "media platform")?,
            require(self.secrets, "secret store")?,
            self.config.poll.clone(),
        );
        if let Some(cancel) = self.cancel {
            publisher = publisher.with_cancellation(cancel);
        }

        Ok(PublicationPipeline {
            rate_source: require(self.rate_source, "rate source")?,
            ledger: require(self.ledger, "publication ledger")?,
            catalog: require(self.catalog, "catalog")?,
            selector: SpecialAssetSelector::new(self.config.selector.clone(), self.random.clone()),
            random: self.random,
            captions: CaptionService::new(
                require(self.text_model, "text model")?,
                self.config.caption_prompt.clone(),
                self.config.background_prompt.clone(),
            ),
            renderer: require(self.renderer, "asset renderer")?,
            storage: require(self.storage, "object store")?,
            publisher,
            media_kind: self.config.media_kind,
            caption_history: self.config.caption_history,
            presign_ttl: self.config.presign_ttl,
        })
    }
}

fn require<T>(component: Option<T>, name: &str) -> Result<T> {
    component.ok_or_else(|| PipelineError::Config(format!("pipeline has no {}", name)))
}
