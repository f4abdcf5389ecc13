mod common;

use chrono::Duration as ChronoDuration;
use common::*;
use pokedolar::{
    MediaKind, MemoryLedger, MemoryObjectStore, MockTextModel, PipelineConfig, PipelineError,
    PublicationPipeline, PublicationRecord, Result, RunOutcome, StaticSecretStore,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

const CAPTION_REPLY: &str = "\"O dólar subiu 1 centavo! Bulbasaur agradece.\"";
const BACKGROUND_REPLY: &str = "A misty forest clearing at dawn";

struct Harness {
    rate: Arc<FixedRate>,
    catalog: Arc<FakeCatalog>,
    model: Arc<MockTextModel>,
    renderer: Arc<FakeRenderer>,
    storage: Arc<MemoryObjectStore>,
    platform: Arc<FakePlatform>,
    ledger: Arc<MemoryLedger>,
    config: PipelineConfig,
    draw: f64,
}

impl Harness {
    fn new(rate: &str, ledger: MemoryLedger) -> Self {
        let mut config = PipelineConfig::default();
        config.selector.base_chance = 0.0;
        config.poll.interval = Duration::from_millis(1);

        Self {
            rate: Arc::new(FixedRate::new(rate)),
            catalog: Arc::new(FakeCatalog::new("BULBASAUR", false)),
            model: Arc::new(
                MockTextModel::new("test")
                    .with_reply("caption", CAPTION_REPLY)
                    .with_reply("background", BACKGROUND_REPLY),
            ),
            renderer: Arc::new(FakeRenderer::new()),
            storage: Arc::new(
                MemoryObjectStore::new(Url::parse("http://bucket.local/").unwrap())
                    .with_object("pokemon/524.png", b"base artwork".to_vec())
                    .with_object("pokemon/523.png", b"base artwork".to_vec()),
            ),
            platform: Arc::new(FakePlatform::ready_on(1)),
            ledger: Arc::new(ledger),
            config,
            draw: 0.0,
        }
    }

    fn pipeline(&self) -> PublicationPipeline {
        PublicationPipeline::builder(self.config.clone())
            .rate_source(self.rate.clone())
            .ledger(self.ledger.clone())
            .catalog(self.catalog.clone())
            .text_model(self.model.clone())
            .renderer(self.renderer.clone())
            .storage(self.storage.clone())
            .platform(self.platform.clone())
            .secrets(Arc::new(
                StaticSecretStore::new().with_secret("instagram_access_token", "token"),
            ))
            .random(Arc::new(FixedRandom(self.draw)))
            .build()
            .unwrap()
    }

    fn prompts(&self) -> Vec<String> {
        self.model.calls().into_iter().map(|(prompt, _)| prompt).collect()
    }
}

fn published(outcome: RunOutcome) -> PublicationRecord {
    match outcome {
        RunOutcome::Published(record) => record,
        other => panic!("expected a publication, got {:?}", other),
    }
}

fn ledger_with_last_rate(rate: &str) -> MemoryLedger {
    MemoryLedger::with_records(vec![record("IVYSAUR", rate, false, ChronoDuration::days(1))])
}

#[tokio::test]
async fn unchanged_rate_touches_nothing_downstream() -> Result<()> {
    init_tracing();
    let harness = Harness::new("5,23", ledger_with_last_rate("5,23"));

    let outcome = harness.pipeline().run().await?;

    assert_eq!(
        outcome,
        RunOutcome::Skipped {
            rate: "5,23".to_string(),
            index: 523
        }
    );
    assert_eq!(harness.rate.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.catalog.calls.load(Ordering::SeqCst), 0);
    assert!(harness.model.calls().is_empty());
    assert_eq!(harness.renderer.count(), 0);
    assert_eq!(harness.platform.create_count(), 0);
    assert_eq!(harness.ledger.records().len(), 1);
    Ok(())
}

#[tokio::test]
async fn changed_rate_publishes_default_asset() -> Result<()> {
    init_tracing();
    let harness = Harness::new("5,24", ledger_with_last_rate("5,23"));

    let outcome = harness.pipeline().run().await?;

    let record = published(outcome);
    info!("Published record: {:?}", record);
    assert_eq!(record.pokemon, "BULBASAUR");
    assert_eq!(record.pokedex_number, 524);
    assert_eq!(record.dollar_rate, "5,24");
    assert!(!record.special_image);
    assert_eq!(record.caption, "O dólar subiu 1 centavo! Bulbasaur agradece.");

    // Only the caption prompt; the default asset needs no background.
    assert_eq!(harness.prompts(), vec!["caption".to_string()]);

    let request = harness.renderer.last().expect("renderer was called");
    assert_eq!(request.base_image, b"base artwork".to_vec());
    assert!(request.dollar_up);
    assert!(!request.special_image);
    assert_eq!(request.background_description, None);

    assert_eq!(
        harness.storage.object("lastPublishedPokemonImage.png"),
        Some(b"rendered".to_vec())
    );
    assert_eq!(harness.platform.create_count(), 1);
    assert_eq!(harness.platform.status_count(), 0);
    assert_eq!(harness.platform.publish_count(), 1);

    let records = harness.ledger.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0], record);
    Ok(())
}

#[tokio::test]
async fn caption_history_is_passed_to_the_model() -> Result<()> {
    init_tracing();
    let harness = Harness::new("5,24", ledger_with_last_rate("5,23"));

    harness.pipeline().run().await?;

    let calls = harness.model.calls();
    let variables = &calls[0].1;
    assert_eq!(variables["dollar_price"], "5,24");
    assert_eq!(variables["dollar_variation"], "subiu 1 centavos");
    assert_eq!(variables["captions_history"], "[\"caption for 5,23\"]");
    Ok(())
}

#[tokio::test]
async fn caption_failure_falls_back_to_default_caption() -> Result<()> {
    init_tracing();
    let mut harness = Harness::new("5,24", ledger_with_last_rate("5,23"));
    harness.model = Arc::new(MockTextModel::new("broken").with_failure("caption", "throttled"));

    let outcome = harness.pipeline().run().await?;

    let record = published(outcome);
    assert_eq!(record.caption, "#524 - BULBASAUR");
    assert_eq!(harness.platform.created.lock().unwrap()[0].1, "#524 - BULBASAUR");
    Ok(())
}

#[tokio::test]
async fn first_run_publishes_then_repeat_is_skipped() -> Result<()> {
    init_tracing();
    let harness = Harness::new("5,24", MemoryLedger::new());
    let pipeline = harness.pipeline();

    assert!(matches!(pipeline.run().await?, RunOutcome::Published(_)));
    assert!(matches!(pipeline.run().await?, RunOutcome::Skipped { .. }));

    assert_eq!(harness.ledger.records().len(), 1);
    assert_eq!(harness.platform.publish_count(), 1);
    Ok(())
}

#[tokio::test]
async fn special_asset_requests_background() -> Result<()> {
    init_tracing();
    let mut harness = Harness::new("5,24", ledger_with_last_rate("5,23"));
    harness.config.selector.base_chance = 100.0;

    let outcome = harness.pipeline().run().await?;

    let record = published(outcome);
    assert!(record.special_image);
    assert_eq!(
        harness.prompts(),
        vec!["background".to_string(), "caption".to_string()]
    );

    let request = harness.renderer.last().expect("renderer was called");
    assert!(request.special_image);
    assert_eq!(request.background_description.as_deref(), Some(BACKGROUND_REPLY));
    Ok(())
}

#[tokio::test]
async fn recent_special_suppresses_special_asset() -> Result<()> {
    init_tracing();
    let ledger = MemoryLedger::with_records(vec![
        record("BULBASAUR", "5,20", true, ChronoDuration::days(3)),
        record("IVYSAUR", "5,23", false, ChronoDuration::days(1)),
    ]);
    let mut harness = Harness::new("5,24", ledger);
    harness.config.selector.base_chance = 100.0;
    harness.config.selector.always_special = true;

    let outcome = harness.pipeline().run().await?;

    let record = published(outcome);
    assert!(!record.special_image);
    assert_eq!(harness.prompts(), vec!["caption".to_string()]);
    Ok(())
}

#[tokio::test]
async fn publish_failure_writes_no_record() {
    init_tracing();
    let mut harness = Harness::new("5,24", ledger_with_last_rate("5,23"));
    harness.platform = Arc::new(FakePlatform::ready_on(1).failing_publish());

    let result = harness.pipeline().run().await;

    assert!(matches!(result, Err(PipelineError::Publish(_))));
    assert_eq!(harness.ledger.records().len(), 1);
}

#[tokio::test]
async fn render_failure_stops_before_publishing() {
    init_tracing();
    let mut harness = Harness::new("5,24", ledger_with_last_rate("5,23"));
    harness.renderer = Arc::new(FakeRenderer::failing());

    let result = harness.pipeline().run().await;

    assert!(matches!(result, Err(PipelineError::AssetRender(_))));
    assert_eq!(harness.platform.create_count(), 0);
    assert_eq!(harness.ledger.records().len(), 1);
}

#[tokio::test]
async fn malformed_rate_aborts_before_ledger_and_catalog() {
    init_tracing();
    let harness = Harness::new("5,2a", ledger_with_last_rate("5,23"));

    let result = harness.pipeline().run().await;

    assert!(matches!(result, Err(PipelineError::MalformedRate { .. })));
    assert_eq!(harness.catalog.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn ledger_read_failure_aborts_run() {
    init_tracing();
    let harness = Harness::new("5,24", MemoryLedger::new());
    let pipeline = PublicationPipeline::builder(harness.config.clone())
        .rate_source(harness.rate.clone())
        .ledger(Arc::new(BrokenLedger))
        .catalog(harness.catalog.clone())
        .text_model(harness.model.clone())
        .renderer(harness.renderer.clone())
        .storage(harness.storage.clone())
        .platform(harness.platform.clone())
        .secrets(Arc::new(StaticSecretStore::new()))
        .build()
        .unwrap();

    let result = pipeline.run().await;

    assert!(matches!(result, Err(PipelineError::LedgerRead(_))));
    assert_eq!(harness.catalog.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn ledger_write_failure_after_publish_is_reported() {
    init_tracing();
    let harness = Harness::new("5,24", MemoryLedger::new());
    let ledger = Arc::new(ReadOnlyLedger::new(ledger_with_last_rate("5,23")));
    let pipeline = PublicationPipeline::builder(harness.config.clone())
        .rate_source(harness.rate.clone())
        .ledger(ledger.clone())
        .catalog(harness.catalog.clone())
        .text_model(harness.model.clone())
        .renderer(harness.renderer.clone())
        .storage(harness.storage.clone())
        .platform(harness.platform.clone())
        .secrets(Arc::new(
            StaticSecretStore::new().with_secret("instagram_access_token", "token"),
        ))
        .random(Arc::new(FixedRandom(0.0)))
        .build()
        .unwrap();

    let result = pipeline.run().await;

    // The post is live, so the failure must surface instead of a success.
    assert!(matches!(result, Err(PipelineError::LedgerWrite(_))));
    assert_eq!(harness.platform.publish_count(), 1);
    assert_eq!(ledger.write_attempts.load(Ordering::SeqCst), 1);
    let records = ledger.inner.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].dollar_rate, "5,23");
}

#[tokio::test]
async fn video_waits_for_container_before_publishing() -> Result<()> {
    init_tracing();
    let mut harness = Harness::new("5,24", ledger_with_last_rate("5,23"));
    harness.config.media_kind = MediaKind::Video;
    harness.platform = Arc::new(FakePlatform::ready_on(2));

    let outcome = harness.pipeline().run().await?;

    assert!(matches!(outcome, RunOutcome::Published(_)));
    assert_eq!(harness.platform.status_count(), 2);
    assert_eq!(harness.storage.object("lastPublishedPokemonImage.png"), None);

    let created = harness.platform.created.lock().unwrap();
    assert_eq!(created[0].0.kind, MediaKind::Video);
    assert_eq!(created[0].0.url.path(), "/lastPublishedPokemonVideo.mp4");
    Ok(())
}

#[tokio::test]
async fn video_never_ready_is_not_recorded() {
    init_tracing();
    let mut harness = Harness::new("5,24", ledger_with_last_rate("5,23"));
    harness.config.media_kind = MediaKind::Video;
    harness.platform = Arc::new(FakePlatform::never_ready());

    let result = harness.pipeline().run().await;

    match result {
        Err(PipelineError::MediaNotReady { attempts, .. }) => assert_eq!(attempts, 10),
        other => panic!("expected MediaNotReady, got {:?}", other),
    }
    assert_eq!(harness.platform.status_count(), 10);
    assert_eq!(harness.platform.publish_count(), 0);
    assert_eq!(harness.ledger.records().len(), 1);
}

#[tokio::test]
async fn builder_requires_every_collaborator() {
    let result = PublicationPipeline::builder(PipelineConfig::default()).build();
    assert!(matches!(result, Err(PipelineError::Config(_))));
}
