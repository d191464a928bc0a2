// Private module declaration
mod store;

// Re-export for public API
pub use store::{InsertOutcome, OrderStore, PgOrderStore, StoreError};

#[cfg(test)]
pub(crate) use store::mock;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Config;

/// Open the Postgres pool. `connect` performs a round trip, so a bad host
/// or credential pair fails here rather than on first use.
pub async fn connect(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url())
        .await
}

/// Idempotent bootstrap of the four order tables.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS order_info (
        id BIGSERIAL PRIMARY KEY,
        order_uid TEXT NOT NULL UNIQUE,
        track_number TEXT NOT NULL,
        entry TEXT NOT NULL,
        locale TEXT NOT NULL,
        internal_signature TEXT NOT NULL,
        customer_id TEXT NOT NULL,
        delivery_service TEXT NOT NULL,
        shardkey TEXT NOT NULL,
        sm_id BIGINT NOT NULL,
        date_created TIMESTAMPTZ NOT NULL,
        oof_shard TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS delivery (
        id BIGSERIAL PRIMARY KEY,
        order_id BIGINT NOT NULL REFERENCES order_info (id) ON DELETE CASCADE,
        d_name TEXT NOT NULL,
        phone TEXT NOT NULL,
        zip TEXT NOT NULL,
        city TEXT NOT NULL,
        address TEXT NOT NULL,
        region TEXT NOT NULL,
        email TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS payment (
        id BIGSERIAL PRIMARY KEY,
        order_id BIGINT NOT NULL REFERENCES order_info (id) ON DELETE CASCADE,
        p_transaction TEXT NOT NULL,
        request_id TEXT NOT NULL,
        currency TEXT NOT NULL,
        provider TEXT NOT NULL,
        amount BIGINT NOT NULL,
        payment_dt BIGINT NOT NULL,
        bank TEXT NOT NULL,
        delivery_cost BIGINT NOT NULL,
        goods_total BIGINT NOT NULL,
        custom_fee BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS items (
        id BIGSERIAL PRIMARY KEY,
        order_id BIGINT NOT NULL REFERENCES order_info (id) ON DELETE CASCADE,
        chrt_id BIGINT NOT NULL,
        track_number TEXT NOT NULL,
        price BIGINT NOT NULL,
        rid TEXT NOT NULL,
        i_name TEXT NOT NULL,
        sale BIGINT NOT NULL,
        i_size TEXT NOT NULL,
        total_price BIGINT NOT NULL,
        nm_id BIGINT NOT NULL,
        brand TEXT NOT NULL,
        status BIGINT NOT NULL
    )",
];
