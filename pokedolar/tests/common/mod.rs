#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pokedolar::{
    AssetRenderer, CatalogEntry, CatalogLookup, MediaPlatform, MediaSource, MemoryLedger,
    PipelineError,
    PublicationLedger, PublicationRecord, RandomSource, RateSource, RenderRequest, RenderedAsset,
    Result, RunContext,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn record(pokemon: &str, rate: &str, special: bool, age: chrono::Duration) -> PublicationRecord {
    PublicationRecord {
        request_id: Uuid::new_v4(),
        timestamp: Utc::now() - age,
        pokedex_number: 1,
        pokemon: pokemon.to_string(),
        dollar_rate: rate.to_string(),
        caption: format!("caption for {}", rate),
        special_image: special,
    }
}

pub struct FixedRate {
    rate: String,
    pub calls: AtomicUsize,
}

impl FixedRate {
    pub fn new(rate: &str) -> Self {
        Self {
            rate: rate.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RateSource for FixedRate {
    fn source_name(&self) -> String {
        "fixed".to_string()
    }

    async fn fetch_rate(&self, _request_id: Uuid) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rate.clone())
    }
}

/// Answers every index with the same creature, numbered after the index.
pub struct FakeCatalog {
    name: String,
    is_final_stage: bool,
    pub calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn new(name: &str, is_final_stage: bool) -> Self {
        Self {
            name: name.to_string(),
            is_final_stage,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CatalogLookup for FakeCatalog {
    async fn lookup(&self, index: u32) -> Result<CatalogEntry> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CatalogEntry {
            number: index,
            name: self.name.clone(),
            types: vec!["grass".to_string(), "poison".to_string()],
            descriptions: vec!["A strange seed was planted on its back at birth.".to_string()],
            habitat: Some("grassland".to_string()),
            is_final_stage: self.is_final_stage,
        })
    }
}

pub struct FakeRenderer {
    pub requests: Mutex<Vec<RenderRequest>>,
    fail: bool,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<RenderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl AssetRenderer for FakeRenderer {
    async fn render(&self, _ctx: &RunContext, request: &RenderRequest) -> Result<RenderedAsset> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(PipelineError::AssetRender("renderer is down".to_string()));
        }
        Ok(match request.media_kind {
            pokedolar::MediaKind::Image => RenderedAsset::Image(b"rendered".to_vec()),
            pokedolar::MediaKind::Video => RenderedAsset::Video,
        })
    }
}

/// Replays a scripted list of status results; the last entry repeats.
pub struct FakePlatform {
    statuses: Mutex<VecDeque<Result<String>>>,
    fail_publish: bool,
    pub created: Mutex<Vec<(MediaSource, String)>>,
    pub status_calls: AtomicUsize,
    pub publish_calls: AtomicUsize,
}

impl FakePlatform {
    pub fn new(statuses: Vec<Result<String>>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            fail_publish: false,
            created: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
            publish_calls: AtomicUsize::new(0),
        }
    }

    /// Ready on attempt `n`, "IN_PROGRESS" before it.
    pub fn ready_on(n: usize) -> Self {
        let mut statuses: Vec<Result<String>> =
            (1..n).map(|_| Ok("IN_PROGRESS".to_string())).collect();
        statuses.push(Ok("FINISHED".to_string()));
        Self::new(statuses)
    }

    pub fn never_ready() -> Self {
        Self::new(vec![Ok("IN_PROGRESS".to_string())])
    }

    pub fn failing_publish(mut self) -> Self {
        self.fail_publish = true;
        self
    }

    pub fn create_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn status_count(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn publish_count(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaPlatform for FakePlatform {
    async fn create_container(
        &self,
        media: &MediaSource,
        caption: &str,
        _access_token: &str,
    ) -> Result<String> {
        self.created
            .lock()
            .unwrap()
            .push((media.clone(), caption.to_string()));
        Ok("container-1".to_string())
    }

    async fn container_status(&self, _container_id: &str, _access_token: &str) -> Result<String> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let mut statuses = self.statuses.lock().unwrap();
        let next = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().map(|s| match s {
                Ok(status) => Ok(status.clone()),
                Err(e) => Err(PipelineError::Upstream(e.to_string())),
            })
        };
        next.unwrap_or_else(|| Err(PipelineError::Upstream("no status scripted".to_string())))
    }

    async fn publish_container(&self, container_id: &str, _access_token: &str) -> Result<String> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_publish {
            return Err(PipelineError::Publish("HTTP 400: media expired".to_string()));
        }
        Ok(format!("media-for-{}", container_id))
    }
}

/// Ledger whose reads always fail.
pub struct BrokenLedger;

#[async_trait]
impl PublicationLedger for BrokenLedger {
    async fn last_rate(&self) -> Result<Option<String>> {
        Err(PipelineError::LedgerRead("connection refused".to_string()))
    }

    async fn recent(&self, _limit: usize) -> Result<Vec<PublicationRecord>> {
        Err(PipelineError::LedgerRead("connection refused".to_string()))
    }

    async fn special_since(
        &self,
        _pokemon: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<PublicationRecord>> {
        Err(PipelineError::LedgerRead("connection refused".to_string()))
    }

    async fn record(&self, _record: &PublicationRecord) -> Result<()> {
        Err(PipelineError::LedgerWrite("connection refused".to_string()))
    }
}

/// Ledger that reads through to a [`MemoryLedger`] but rejects every write.
pub struct ReadOnlyLedger {
    pub inner: MemoryLedger,
    pub write_attempts: AtomicUsize,
}

impl ReadOnlyLedger {
    pub fn new(inner: MemoryLedger) -> Self {
        Self {
            inner,
            write_attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PublicationLedger for ReadOnlyLedger {
    async fn last_rate(&self) -> Result<Option<String>> {
        self.inner.last_rate().await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<PublicationRecord>> {
        self.inner.recent(limit).await
    }

    async fn special_since(
        &self,
        pokemon: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PublicationRecord>> {
        self.inner.special_since(pokemon, since).await
    }

    async fn record(&self, _record: &PublicationRecord) -> Result<()> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        Err(PipelineError::LedgerWrite("read-only transaction".to_string()))
    }
}

pub struct FixedRandom(pub f64);

impl RandomSource for FixedRandom {
    fn percent(&self) -> f64 {
        self.0
    }

    fn pick(&self, _len: usize) -> usize {
        0
    }
}
