use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// One answered question, kept per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consultation {
    pub id: Uuid,
    pub user_id: String,
    pub question: String,
    pub answer: String,
    pub destination: Option<String>,
    pub travel_date: Option<String>,
    pub budget: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Consultation {
    pub fn new(user_id: impl Into<String>, question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            question: question.into(),
            answer: answer.into(),
            destination: None,
            travel_date: None,
            budget: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationCount {
    pub destination: String,
    pub consultations: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub day: String,
    pub consultations: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub total_consultations: u64,
    pub top_destinations: Vec<DestinationCount>,
    pub consultations_per_day: Vec<DailyCount>,
}

pub trait ConsultationRepository: Send + Sync {
    async fn record_consultation(&self, consultation: &Consultation) -> Result<()>;
    /// Newest first.
    async fn recent_consultations(&self, user_id: &str, limit: usize) -> Result<Vec<Consultation>>;
    async fn usage_summary(&self, top_n: usize) -> Result<UsageSummary>;
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    consultations: Arc<RwLock<Vec<Consultation>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConsultationRepository for MemoryStore {
    async fn record_consultation(&self, consultation: &Consultation) -> Result<()> {
        self.consultations.write().push(consultation.clone());
        Ok(())
    }

    async fn recent_consultations(&self, user_id: &str, limit: usize) -> Result<Vec<Consultation>> {
        let mut items = self
            .consultations
            .read()
            .iter()
            .filter(|item| item.user_id == user_id)
            .cloned()
            .collect::<Vec<_>>();

        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(limit);
        Ok(items)
    }

    async fn usage_summary(&self, top_n: usize) -> Result<UsageSummary> {
        let guard = self.consultations.read();

        let mut destinations: BTreeMap<String, u64> = BTreeMap::new();
        let mut days: BTreeMap<String, u64> = BTreeMap::new();
        for item in guard.iter() {
            if let Some(destination) = item
                .destination
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
            {
                *destinations.entry(destination.to_string()).or_default() += 1;
            }
            *days
                .entry(item.created_at.format("%Y-%m-%d").to_string())
                .or_default() += 1;
        }

        let mut top_destinations = destinations
            .into_iter()
            .map(|(destination, consultations)| DestinationCount {
                destination,
                consultations,
            })
            .collect::<Vec<_>>();
        // BTreeMap order already sorts names; the stable sort keeps it for ties.
        top_destinations.sort_by(|a, b| b.consultations.cmp(&a.consultations));
        top_destinations.truncate(top_n);

        Ok(UsageSummary {
            total_consultations: guard.len() as u64,
            top_destinations,
            consultations_per_day: days
                .into_iter()
                .map(|(day, consultations)| DailyCount { day, consultations })
                .collect(),
        })
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        // Every connection to an in-memory database gets its own empty database.
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(database_url)
                .await
        } else {
            SqlitePool::connect(database_url).await
        }
        .with_context(|| format!("failed connecting to sqlite at {}", database_url))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS consultations (
              id TEXT PRIMARY KEY,
              user_id TEXT NOT NULL,
              question TEXT NOT NULL,
              answer TEXT NOT NULL,
              destination TEXT,
              travel_date TEXT,
              budget TEXT,
              created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_consultations_user_created
              ON consultations (user_id, created_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl ConsultationRepository for SqliteStore {
    async fn record_consultation(&self, consultation: &Consultation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO consultations
              (id, user_id, question, answer, destination, travel_date, budget, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(consultation.id.to_string())
        .bind(&consultation.user_id)
        .bind(&consultation.question)
        .bind(&consultation.answer)
        .bind(&consultation.destination)
        .bind(&consultation.travel_date)
        .bind(&consultation.budget)
        .bind(
            consultation
                .created_at
                .to_rfc3339_opts(SecondsFormat::Micros, true),
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_consultations(&self, user_id: &str, limit: usize) -> Result<Vec<Consultation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, question, answer, destination, travel_date, budget, created_at
            FROM consultations
            WHERE user_id = ?1
            ORDER BY created_at DESC
            LIMIT ?2
            "#,
        )
        .bind(user_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(|row| Consultation {
                id: row
                    .get::<String, _>("id")
                    .parse()
                    .unwrap_or_else(|_| Uuid::nil()),
                user_id: row.get("user_id"),
                question: row.get("question"),
                answer: row.get("answer"),
                destination: row.get("destination"),
                travel_date: row.get("travel_date"),
                budget: row.get("budget"),
                created_at: row
                    .get::<String, _>("created_at")
                    .parse()
                    .unwrap_or_else(|_| Utc::now()),
            })
            .collect();

        Ok(items)
    }

    async fn usage_summary(&self, top_n: usize) -> Result<UsageSummary> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM consultations")
            .fetch_one(&self.pool)
            .await?
            .get("total");

        let destination_rows = sqlx::query(
            r#"
            SELECT TRIM(destination) AS destination, COUNT(*) AS consultations
            FROM consultations
            WHERE destination IS NOT NULL AND TRIM(destination) != ''
            GROUP BY TRIM(destination)
            ORDER BY consultations DESC, destination ASC
            LIMIT ?1
            "#,
        )
        .bind(i64::try_from(top_n).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let day_rows = sqlx::query(
            r#"
            SELECT substr(created_at, 1, 10) AS day, COUNT(*) AS consultations
            FROM consultations
            GROUP BY day
            ORDER BY day ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(UsageSummary {
            total_consultations: total.max(0) as u64,
            top_destinations: destination_rows
                .into_iter()
                .map(|row| DestinationCount {
                    destination: row.get("destination"),
                    consultations: row.get::<i64, _>("consultations").max(0) as u64,
                })
                .collect(),
            consultations_per_day: day_rows
                .into_iter()
                .map(|row| DailyCount {
                    day: row.get("day"),
                    consultations: row.get::<i64, _>("consultations").max(0) as u64,
                })
                .collect(),
        })
    }
}

#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl Store {
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub async fn sqlite(database_url: &str) -> Result<Self> {
        let sqlite = SqliteStore::connect(database_url).await?;
        Ok(Self::Sqlite(sqlite))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Store::Memory(_) => "memory",
            Store::Sqlite(_) => "sqlite",
        }
    }
}

impl ConsultationRepository for Store {
    async fn record_consultation(&self, consultation: &Consultation) -> Result<()> {
        match self {
            Store::Memory(store) => store.record_consultation(consultation).await,
            Store::Sqlite(store) => store.record_consultation(consultation).await,
        }
    }

    async fn recent_consultations(&self, user_id: &str, limit: usize) -> Result<Vec<Consultation>> {
        match self {
            Store::Memory(store) => store.recent_consultations(user_id, limit).await,
            Store::Sqlite(store) => store.recent_consultations(user_id, limit).await,
        }
    }

    async fn usage_summary(&self, top_n: usize) -> Result<UsageSummary> {
        match self {
            Store::Memory(store) => store.usage_summary(top_n).await,
            Store::Sqlite(store) => store.usage_summary(top_n).await,
        }
    }
}
