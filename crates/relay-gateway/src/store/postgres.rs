//! PostgreSQL metadata source.
//!
//! Reads the tables maintained by the administrative surface:
//!
//! | Table | Columns used |
//! |-------|--------------|
//! | `api_routes` | `path`, `maxcache`, `status` |
//! | `channels` | `name`, `base_url`, `auth_url`, `api_key`, `status` |
//! | `blocklist_entries` | `type`, `value` |
//!
//! `status` may be a text column or a Postgres enum; it is compared as text.

use async_trait::async_trait;
use relay_kernel::{
    BlockKind, BlocklistEntry, Channel, MetadataSource, RecordStatus, RouteTemplate, StoreError,
    StoreResult,
};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use tracing::warn;

pub struct PostgresMetadataSource {
    pool: PgPool,
}

impl PostgresMetadataSource {
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn parse_channel_row(row: &PgRow) -> StoreResult<Channel> {
        Ok(Channel {
            name: row.try_get("name").map_err(decode_err)?,
            base_url: row
                .try_get::<Option<String>, _>("base_url")
                .map_err(decode_err)?
                .unwrap_or_default(),
            auth_url: row
                .try_get::<Option<String>, _>("auth_url")
                .map_err(decode_err)?
                .unwrap_or_default(),
            api_key: row
                .try_get::<Option<String>, _>("api_key")
                .map_err(decode_err)?
                .unwrap_or_default(),
            status: RecordStatus::Active,
        })
    }
}

fn query_err(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreError::Connection(e.to_string())
        }
        other => StoreError::Query(other.to_string()),
    }
}

fn decode_err(e: sqlx::Error) -> StoreError {
    StoreError::Decode(e.to_string())
}

#[async_trait]
impl MetadataSource for PostgresMetadataSource {
    async fn active_route_templates(&self) -> StoreResult<Vec<RouteTemplate>> {
        let rows = sqlx::query(
            "SELECT path, maxcache FROM api_routes WHERE status::text = 'active'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_err)?;

        rows.iter()
            .map(|row| {
                let path: String = row.try_get("path").map_err(decode_err)?;
                let maxcache: Option<i32> = row.try_get("maxcache").map_err(decode_err)?;
                Ok(RouteTemplate {
                    path_template: path,
                    max_cache_seconds: maxcache.map(|v| u64::try_from(v).unwrap_or(0)),
                    status: RecordStatus::Active,
                })
            })
            .collect()
    }

    async fn channel_by_name(&self, name: &str) -> StoreResult<Option<Channel>> {
        let row = sqlx::query(
            "SELECT name, base_url, auth_url, api_key FROM channels \
             WHERE name = $1 AND status::text = 'active' LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err)?;

        row.as_ref().map(Self::parse_channel_row).transpose()
    }

    async fn blocklist_entries(&self) -> StoreResult<Vec<BlocklistEntry>> {
        let rows = sqlx::query("SELECT type::text AS kind, value FROM blocklist_entries")
            .fetch_all(&self.pool)
            .await
            .map_err(query_err)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let kind: String = row.try_get("kind").map_err(decode_err)?;
            let value: Option<String> = row.try_get("value").map_err(decode_err)?;
            let Some(value) = value.filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            match BlockKind::parse(&kind) {
                Some(kind) => entries.push(BlocklistEntry { kind, value }),
                None => warn!(kind = %kind, "ignoring blocklist row with unknown type"),
            }
        }
        Ok(entries)
    }
}
