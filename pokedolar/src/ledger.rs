use crate::traits::PublicationLedger;
use crate::types::{PipelineError, PublicationRecord, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Pool, Postgres, Row};
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Every publication shares one partition value, ordered by timestamp.
pub const PARTITION: &str = "posts";

pub struct PgLedger {
    db: Pool<Postgres>,
}

impl PgLedger {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db = PgPool::connect(database_url).await?;
        Ok(Self { db })
    }

    pub fn from_pool(db: Pool<Postgres>) -> Self {
        Self { db }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS publications (
                context_id TEXT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL,
                request_id UUID NOT NULL,
                pokedex_number INTEGER NOT NULL,
                pokemon TEXT NOT NULL,
                dollar_rate TEXT NOT NULL,
                caption TEXT NOT NULL,
                special_image BOOLEAN NOT NULL DEFAULT false,
                PRIMARY KEY (context_id, timestamp)
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_publications_pokemon ON publications (pokemon, timestamp DESC)",
        )
        .execute(&self.db)
        .await?;

        info!("Publication ledger schema is ready");
        Ok(())
    }
}

fn read_error(e: sqlx::Error) -> PipelineError {
    PipelineError::LedgerRead(e.to_string())
}

fn row_to_record(row: &PgRow) -> std::result::Result<PublicationRecord, sqlx::Error> {
    let pokedex_number: i32 = row.try_get("pokedex_number")?;
    Ok(PublicationRecord {
        request_id: row.try_get("request_id")?,
        timestamp: row.try_get("timestamp")?,
        pokedex_number: pokedex_number.max(0) as u32,
        pokemon: row.try_get("pokemon")?,
        dollar_rate: row.try_get("dollar_rate")?,
        caption: row.try_get("caption")?,
        special_image: row.try_get("special_image")?,
    })
}

#[async_trait]
impl PublicationLedger for PgLedger {
    async fn last_rate(&self) -> Result<Option<String>> {
        let rate = sqlx::query_scalar::<_, String>(
            r#"
            SELECT dollar_rate FROM publications
            WHERE context_id = $1
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
        )
        .bind(PARTITION)
        .fetch_optional(&self.db)
        .await
        .map_err(read_error)?;

        debug!("Last published rate: {:?}", rate);
        Ok(rate)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<PublicationRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT request_id, timestamp, pokedex_number, pokemon, dollar_rate, caption, special_image
            FROM publications
            WHERE context_id = $1
            ORDER BY timestamp DESC
            LIMIT $2
            "#,
        )
        .bind(PARTITION)
        .bind(limit as i64)
        .fetch_all(&self.db)
        .await
        .map_err(read_error)?;

        rows.iter()
            .map(row_to_record)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(read_error)
    }

    async fn special_since(
        &self,
        pokemon: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PublicationRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT request_id, timestamp, pokedex_number, pokemon, dollar_rate, caption, special_image
            FROM publications
            WHERE context_id = $1 AND pokemon = $2 AND special_image AND timestamp >= $3
            ORDER BY timestamp DESC
            "#,
        )
        .bind(PARTITION)
        .bind(pokemon)
        .bind(since)
        .fetch_all(&self.db)
        .await
        .map_err(read_error)?;

        rows.iter()
            .map(row_to_record)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(read_error)
    }

    async fn record(&self, record: &PublicationRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO publications
                (context_id, timestamp, request_id, pokedex_number, pokemon, dollar_rate, caption, special_image)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(PARTITION)
        .bind(record.timestamp)
        .bind(record.request_id)
        .bind(record.pokedex_number as i32)
        .bind(&record.pokemon)
        .bind(&record.dollar_rate)
        .bind(&record.caption)
        .bind(record.special_image)
        .execute(&self.db)
        .await
        .map_err(|e| PipelineError::LedgerWrite(e.to_string()))?;

        info!(
            "Recorded publication of {} at rate {}",
            record.pokemon, record.dollar_rate
        );
        Ok(())
    }
}

/// In-process ledger with the same ordering rules as [`PgLedger`].
#[derive(Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<PublicationRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<PublicationRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    /// Every stored record, newest first.
    pub fn records(&self) -> Vec<PublicationRecord> {
        self.snapshot().unwrap_or_default()
    }

    fn snapshot(&self) -> Result<Vec<PublicationRecord>> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| PipelineError::LedgerRead("ledger lock poisoned".to_string()))?
            .clone();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }
}

#[async_trait]
impl PublicationLedger for MemoryLedger {
    async fn last_rate(&self) -> Result<Option<String>> {
        Ok(self.snapshot()?.into_iter().next().map(|r| r.dollar_rate))
    }

    async fn recent(&self, limit: usize) -> Result<Vec<PublicationRecord>> {
        Ok(self.snapshot()?.into_iter().take(limit).collect())
    }

    async fn special_since(
        &self,
        pokemon: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PublicationRecord>> {
        Ok(self
            .snapshot()?
            .into_iter()
            .filter(|r| r.special_image && r.pokemon == pokemon && r.timestamp >= since)
            .collect())
    }

    async fn record(&self, record: &PublicationRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| PipelineError::LedgerWrite("ledger lock poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }
}

/// A fresh record stamped now.
pub fn new_record(
    request_id: Uuid,
    pokedex_number: u32,
    pokemon: &str,
    dollar_rate: &str,
    caption: &str,
    special_image: bool,
) -> PublicationRecord {
    PublicationRecord {
        request_id,
        timestamp: Utc::now(),
        pokedex_number,
        pokemon: pokemon.to_string(),
        dollar_rate: dollar_rate.to_string(),
        caption: caption.to_string(),
        special_image,
    }
}
