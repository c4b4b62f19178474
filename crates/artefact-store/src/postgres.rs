//! PostgreSQL identity store.
//!
//! All queries operate on the `artefactid` table. An empty `url` column
//! means "no URL".

use artefact_core::{ArtefactId, ArtefactIdentity, NewArtefactIdentity};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::{IdentityFilter, IdentityStore, StoreError};

const COLUMNS: &str = "id, domain, name, url, created_at";

/// [`IdentityStore`] backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    /// Wrap an existing pool. Migrations are not run.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `url` and apply the embedded migrations.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(url)
            .await?;
        tracing::info!("Connected to PostgreSQL");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(sqlx::Error::from)?;
        tracing::info!("Database migrations applied");

        Ok(Self { pool })
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn by_name(&self, name: &str) -> Result<Vec<ArtefactIdentity>, StoreError> {
        let rows = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {COLUMNS} FROM artefactid WHERE name = $1 ORDER BY id"
        ))
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(IdentityRow::into_identity).collect()
    }

    async fn by_id(&self, id: ArtefactId) -> Result<ArtefactIdentity, StoreError> {
        let raw = i64::try_from(id.get()).map_err(|_| StoreError::NotFound(id))?;
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {COLUMNS} FROM artefactid WHERE id = $1"
        ))
        .bind(raw)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::NotFound(id))?.into_identity()
    }

    async fn save(&self, identity: &NewArtefactIdentity) -> Result<ArtefactIdentity, StoreError> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "INSERT INTO artefactid (domain, name, url) VALUES ($1, $2, $3) RETURNING {COLUMNS}"
        ))
        .bind(&identity.domain)
        .bind(&identity.name)
        .bind(identity.url.as_deref().unwrap_or(""))
        .fetch_one(&self.pool)
        .await?;

        let saved = row.into_identity()?;
        tracing::info!(
            artefact_id = %saved.id,
            domain = %saved.domain,
            artefact = %saved.name,
            "created artefact identity"
        );
        Ok(saved)
    }

    async fn update(&self, identity: &ArtefactIdentity) -> Result<(), StoreError> {
        let raw = i64::try_from(identity.id.get()).map_err(|_| StoreError::NotFound(identity.id))?;
        let result = sqlx::query("UPDATE artefactid SET url = $1 WHERE id = $2")
            .bind(identity.url.as_deref().unwrap_or(""))
            .bind(raw)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(identity.id));
        }
        Ok(())
    }

    async fn find(&self, filter: &IdentityFilter) -> Result<Vec<ArtefactIdentity>, StoreError> {
        let rows = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {COLUMNS} FROM artefactid WHERE {} = $1 ORDER BY id",
            filter.column.as_sql()
        ))
        .bind(&filter.value)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(IdentityRow::into_identity).collect()
    }
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct IdentityRow {
    id: i64,
    domain: String,
    name: String,
    url: String,
    created_at: DateTime<Utc>,
}

impl IdentityRow {
    fn into_identity(self) -> Result<ArtefactIdentity, StoreError> {
        let id = u64::try_from(self.id).map_err(|_| StoreError::Corrupt {
            id: self.id,
            reason: "negative id".into(),
        })?;
        Ok(ArtefactIdentity {
            id: ArtefactId::new(id),
            domain: self.domain,
            name: self.name,
            url: (!self.url.is_empty()).then_some(self.url),
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_url_column_reads_as_none() {
        let row = IdentityRow {
            id: 3,
            domain: "example.com".into(),
            name: "firmware".into(),
            url: String::new(),
            created_at: Utc::now(),
        };
        let identity = row.into_identity().unwrap();
        assert_eq!(identity.id, ArtefactId::new(3));
        assert_eq!(identity.url, None);
    }

    #[test]
    fn negative_id_is_corrupt() {
        let row = IdentityRow {
            id: -1,
            domain: String::new(),
            name: String::new(),
            url: String::new(),
            created_at: Utc::now(),
        };
        assert!(matches!(row.into_identity(), Err(StoreError::Corrupt { id: -1, .. })));
    }
}
