use crate::chat::{ChatMessage, ChatSession, Language, MessageRole};
use crate::intent::Intent;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    ConnectOptions, FromRow, Row, SqlitePool,
};
use std::{path::Path, str::FromStr};

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Business {
    pub name: String,
    pub district: String,
    pub category: String,
    pub phone: Option<String>,
    pub is_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Job {
    pub title: String,
    pub company: String,
    pub location: String,
    #[sqlx(rename = "type")]
    pub job_type: String,
    pub salary_range: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct HealthFacility {
    pub name: String,
    #[sqlx(rename = "type")]
    pub facility_type: String,
    pub district: String,
    pub services: Option<String>,
    pub emergency_services: bool,
}

/// Outcome of [`Store::insert_session_if_absent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSlot {
    pub owner: String,
    pub created: bool,
}

#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Create a new Store instance.
    /// This will automatically create the database file if it doesn't exist.
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let db_url = format!("sqlite://{}", db_path.to_string_lossy());

        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .log_statements(tracing::log::LevelFilter::Trace);

        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        Ok(Self { pool })
    }

    /// Private in-memory database. Held on a single connection so every
    /// query sees the same data.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .log_statements(tracing::log::LevelFilter::Trace);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory SQLite database")?;

        Ok(Self { pool })
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS businesses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                district TEXT NOT NULL,
                category TEXT NOT NULL,
                phone TEXT,
                is_verified BOOLEAN NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                company TEXT NOT NULL,
                location TEXT NOT NULL,
                type TEXT NOT NULL,
                salary_range TEXT,
                is_active BOOLEAN NOT NULL DEFAULT 1
            );
            CREATE INDEX IF NOT EXISTS idx_jobs_active ON jobs(is_active);

            CREATE TABLE IF NOT EXISTS health_facilities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                type TEXT NOT NULL,
                district TEXT NOT NULL,
                services TEXT,
                emergency_services BOOLEAN NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS chat_sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                context_type TEXT NOT NULL,
                title TEXT NOT NULL,
                created_at DATETIME NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chat_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES chat_sessions(id),
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                language TEXT NOT NULL,
                intent TEXT,
                context_data TEXT,
                created_at DATETIME NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chat_messages_session ON chat_messages(session_id, id);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialize database schema")?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Businesses whose name contains `term`, ignoring case. Verified
    /// businesses are listed first.
    pub async fn search_businesses(&self, term: &str, limit: i64) -> Result<Vec<Business>> {
        let rows = sqlx::query_as::<_, Business>(
            r#"
            SELECT name, district, category, phone, is_verified
            FROM businesses
            WHERE LOWER(name) LIKE '%' || ? || '%' ESCAPE '\'
            ORDER BY is_verified DESC, id ASC
            LIMIT ?
            "#,
        )
        .bind(escape_like(&term.to_lowercase()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to search businesses")?;

        Ok(rows)
    }

    /// Active postings, newest first, optionally restricted to locations
    /// mentioning `district`.
    pub async fn active_jobs(&self, district: Option<&str>, limit: i64) -> Result<Vec<Job>> {
        let district = district.map(|d| escape_like(&d.to_lowercase()));
        let rows = sqlx::query_as::<_, Job>(
            r#"
            SELECT title, company, location, type, salary_range, is_active
            FROM jobs
            WHERE is_active = 1
              AND (?1 IS NULL OR LOWER(location) LIKE '%' || ?1 || '%' ESCAPE '\')
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )
        .bind(district)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch jobs")?;

        Ok(rows)
    }

    pub async fn health_facilities(&self, limit: i64) -> Result<Vec<HealthFacility>> {
        let rows = sqlx::query_as::<_, HealthFacility>(
            r#"
            SELECT name, type, district, services, emergency_services
            FROM health_facilities
            ORDER BY id ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch health facilities")?;

        Ok(rows)
    }

    pub async fn insert_business(&self, business: &Business) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO businesses (name, district, category, phone, is_verified)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&business.name)
        .bind(&business.district)
        .bind(&business.category)
        .bind(&business.phone)
        .bind(business.is_verified)
        .execute(&self.pool)
        .await
        .context("Failed to insert business")?;

        Ok(())
    }

    pub async fn insert_job(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (title, company, location, type, salary_range, is_active)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.title)
        .bind(&job.company)
        .bind(&job.location)
        .bind(&job.job_type)
        .bind(&job.salary_range)
        .bind(job.is_active)
        .execute(&self.pool)
        .await
        .context("Failed to insert job")?;

        Ok(())
    }

    pub async fn insert_health_facility(&self, facility: &HealthFacility) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO health_facilities (name, type, district, services, emergency_services)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&facility.name)
        .bind(&facility.facility_type)
        .bind(&facility.district)
        .bind(&facility.services)
        .bind(facility.emergency_services)
        .execute(&self.pool)
        .await
        .context("Failed to insert health facility")?;

        Ok(())
    }

    /// Creates the session unless a row with the same id exists, in one
    /// statement, and reports who owns the row afterwards.
    pub async fn insert_session_if_absent(&self, session: &ChatSession) -> Result<SessionSlot> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO chat_sessions (id, user_id, context_type, title, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.context_type)
        .bind(&session.title)
        .bind(session.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert chat session")?
        .rows_affected();

        let owner: String = sqlx::query_scalar("SELECT user_id FROM chat_sessions WHERE id = ?")
            .bind(&session.id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to read chat session owner")?;

        Ok(SessionSlot {
            owner,
            created: inserted == 1,
        })
    }

    /// Appends both rows of one turn, user first, atomically.
    pub async fn append_exchange(&self, user: &ChatMessage, assistant: &ChatMessage) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        for msg in [user, assistant] {
            let context_data = msg
                .context_data
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            sqlx::query(
                r#"
                INSERT INTO chat_messages
                    (session_id, role, content, language, intent, context_data, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&msg.session_id)
            .bind(msg.role.as_str())
            .bind(&msg.content)
            .bind(msg.language.as_str())
            .bind(msg.intent.map(|i| i.as_str()))
            .bind(context_data)
            .bind(msg.created_at)
            .execute(&mut *tx)
            .await
            .context("Failed to save chat message")?;
        }

        tx.commit().await.context("Failed to commit chat messages")?;
        Ok(())
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<ChatSession>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, context_type, title, created_at
            FROM chat_sessions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch chat session")?;

        row.map(|row| -> Result<ChatSession> {
            Ok(ChatSession {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                context_type: row.try_get("context_type")?,
                title: row.try_get("title")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    pub async fn count_sessions(&self) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM chat_sessions")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count chat sessions")?;
        Ok(count)
    }

    /// Messages of a session in write order.
    pub async fn session_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT session_id, role, content, language, intent, context_data, created_at
            FROM chat_messages
            WHERE session_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch chat messages")?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let role: String = row.try_get("role")?;
            let language: String = row.try_get("language")?;
            let intent: Option<String> = row.try_get("intent")?;
            let context_data: Option<String> = row.try_get("context_data")?;
            let created_at: DateTime<Utc> = row.try_get("created_at")?;

            messages.push(ChatMessage {
                session_id: row.try_get("session_id")?,
                role: parse_label::<MessageRole>(&role)?,
                content: row.try_get("content")?,
                language: parse_label::<Language>(&language)?,
                intent: intent.as_deref().map(parse_label::<Intent>).transpose()?,
                context_data: context_data
                    .as_deref()
                    .map(serde_json::from_str)
                    .transpose()
                    .context("Invalid context_data column")?,
                created_at,
            });
        }

        Ok(messages)
    }
}

/// Decodes a stored enum label with the type's serde names.
fn parse_label<T: DeserializeOwned>(label: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(label.to_string()))
        .with_context(|| format!("Unknown stored label {:?}", label))
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
