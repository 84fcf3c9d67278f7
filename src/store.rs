use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use sqlx::{
    PgPool,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::exchange_rate::{Currency, RateSnapshot, SNAPSHOT_KEY, UpstreamQuote};
use crate::token::AccessToken;

/// Holder of the single current-rates row.
///
/// Writes stamp `updated_at` with the caller's `at`, so freshness is judged on
/// the same clock that wrote the row.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// The live snapshot, if one has been written.
    async fn current(&self) -> Result<Option<RateSnapshot>, StoreError>;

    /// Creates the snapshot row, or overwrites every rate field of it.
    async fn upsert_quote(
        &self,
        quote: &UpstreamQuote,
        at: DateTime<Utc>,
    ) -> Result<RateSnapshot, StoreError>;

    /// Overwrites one rate field of the existing row.
    async fn set_rate(
        &self,
        currency: Currency,
        value: f64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_token(&self, value: &str) -> Result<AccessToken, StoreError>;

    async fn token_exists(&self, value: &str) -> Result<bool, StoreError>;

    async fn list_tokens(&self) -> Result<Vec<AccessToken>, StoreError>;
}

const SNAPSHOT_COLUMNS: &str =
    "id, eur, gbp, jpy, krw, pln, rub, usd, created_at, updated_at, deleted_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self, StoreError> {
        let options = PgConnectOptions::new()
            .host(&cfg.host)
            .port(cfg.port)
            .database(&cfg.name)
            .username(&cfg.user)
            .password(&cfg.password)
            .options([("timezone", cfg.timezone.as_str())]);

        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .connect_with(options)
            .await?;

        info!(
            "connected to postgres at {}:{}/{}",
            cfg.host, cfg.port, cfg.name
        );

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl RateStore for PgStore {
    async fn current(&self) -> Result<Option<RateSnapshot>, StoreError> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM rate_snapshots WHERE id = $1 AND deleted_at IS NULL"
        );
        let snapshot = sqlx::query_as::<_, RateSnapshot>(&sql)
            .bind(SNAPSHOT_KEY)
            .fetch_optional(&self.pool)
            .await?;

        Ok(snapshot)
    }

    async fn upsert_quote(
        &self,
        quote: &UpstreamQuote,
        at: DateTime<Utc>,
    ) -> Result<RateSnapshot, StoreError> {
        let sql = format!(
            "INSERT INTO rate_snapshots \
                (id, eur, gbp, jpy, krw, pln, rub, usd, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9) \
             ON CONFLICT (id) DO UPDATE SET \
                eur = EXCLUDED.eur, gbp = EXCLUDED.gbp, jpy = EXCLUDED.jpy, \
                krw = EXCLUDED.krw, pln = EXCLUDED.pln, rub = EXCLUDED.rub, \
                usd = EXCLUDED.usd, updated_at = EXCLUDED.updated_at, deleted_at = NULL \
             RETURNING {SNAPSHOT_COLUMNS}"
        );
        let rates = &quote.rates;
        let snapshot = sqlx::query_as::<_, RateSnapshot>(&sql)
            .bind(SNAPSHOT_KEY)
            .bind(rates.eur)
            .bind(rates.gbp)
            .bind(rates.jpy)
            .bind(rates.krw)
            .bind(rates.pln)
            .bind(rates.rub)
            .bind(rates.usd)
            .bind(at)
            .fetch_one(&self.pool)
            .await?;

        Ok(snapshot)
    }

    async fn set_rate(
        &self,
        currency: Currency,
        value: f64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        // Column names come from the closed Currency enum only.
        let sql = format!(
            "UPDATE rate_snapshots SET {} = $1, updated_at = $3 \
             WHERE id = $2 AND deleted_at IS NULL",
            currency.column()
        );
        let result = sqlx::query(&sql)
            .bind(value)
            .bind(SNAPSHOT_KEY)
            .bind(at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::MissingSnapshot);
        }

        Ok(())
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn insert_token(&self, value: &str) -> Result<AccessToken, StoreError> {
        let token = sqlx::query_as::<_, AccessToken>(
            "INSERT INTO access_tokens (id, token) VALUES ($1, $2) \
             RETURNING id, token, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(value)
        .fetch_one(&self.pool)
        .await?;

        Ok(token)
    }

    async fn token_exists(&self, value: &str) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM access_tokens WHERE token = $1)",
        )
        .bind(value)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn list_tokens(&self) -> Result<Vec<AccessToken>, StoreError> {
        let tokens = sqlx::query_as::<_, AccessToken>(
            "SELECT id, token, created_at FROM access_tokens ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(tokens)
    }
}
