use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::error::AppError;
use crate::models::{Credential, User};

/// What survives a restart: the bearer credential and the profile it was
/// issued for.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCredential {
    pub credential: Credential,
    pub user: User,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<StoredCredential>, AppError>;
    async fn save(&self, stored: &StoredCredential) -> Result<(), AppError>;
    async fn clear(&self) -> Result<(), AppError>;
}

/// SQLite-backed store holding at most one credential.
pub struct SqliteCredentialStore {
    db: SqlitePool,
}

impl SqliteCredentialStore {
    pub async fn open(database_url: &str) -> Result<Self, AppError> {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&db).await?;
        Ok(Self { db })
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn load(&self) -> Result<Option<StoredCredential>, AppError> {
        let row = sqlx::query_as::<_, (String, String, String, String)>(
            "SELECT token, user_id, email, name FROM credentials WHERE slot = 1",
        )
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|(token, id, email, name)| StoredCredential {
            credential: Credential::new(token),
            user: User { id, email, name },
        }))
    }

    async fn save(&self, stored: &StoredCredential) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO credentials (slot, token, user_id, email, name, saved_at)
            VALUES (1, ?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(slot) DO UPDATE SET
                token = excluded.token,
                user_id = excluded.user_id,
                email = excluded.email,
                name = excluded.name,
                saved_at = excluded.saved_at
            "#,
        )
        .bind(stored.credential.expose())
        .bind(&stored.user.id)
        .bind(&stored.user.email)
        .bind(&stored.user.name)
        .bind(now)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), AppError> {
        sqlx::query("DELETE FROM credentials")
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

/// Process-local store for tests and offline runs.
#[derive(Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<StoredCredential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<StoredCredential>, AppError> {
        Ok(self.slot.lock().clone())
    }

    async fn save(&self, stored: &StoredCredential) -> Result<(), AppError> {
        *self.slot.lock() = Some(stored.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), AppError> {
        *self.slot.lock() = None;
        Ok(())
    }
}
