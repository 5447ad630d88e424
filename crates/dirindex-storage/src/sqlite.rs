//! SQLite storage backend.
//!
//! Persists the directory schema to a single SQLite file via `sqlx` with WAL
//! mode enabled. Every logical operation acquires one pooled connection and
//! releases it on return; idempotency comes from `ON CONFLICT` clauses on
//! the natural keys and tx-id unique indexes, not from transactions.
//!
//! # Usage
//! ```rust,no_run
//! use dirindex_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStore::open("./directory.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use dirindex_core::{
    BondAmount, BondProviderEvent, CloseContractEvent, ContractSettlementEvent, ContractType,
    ModProviderEvent, OpenContractEvent, ProviderStatus,
};

use crate::entities::{Checkpoint, Contract, Provider};
use crate::error::StoreError;
use crate::DirectoryStore;

/// SQLite-backed directory store.
pub struct SqliteStore {
    pool: SqlitePool,
}

fn db_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Database(e.to_string())
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./directory.db"`) or a full
    /// SQLite URL (`"sqlite:./directory.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(db_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database. Ideal for tests.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePool::connect("sqlite::memory:").await.map_err(db_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        for ddl in [
            "CREATE TABLE IF NOT EXISTS providers (
                id                    INTEGER PRIMARY KEY AUTOINCREMENT,
                pubkey                TEXT    NOT NULL,
                chain                 TEXT    NOT NULL,
                bond                  TEXT    NOT NULL,
                metadata_uri          TEXT    NOT NULL DEFAULT '',
                metadata_nonce        INTEGER NOT NULL DEFAULT 0,
                status                TEXT    NOT NULL DEFAULT 'Offline',
                min_contract_duration INTEGER NOT NULL DEFAULT 0,
                max_contract_duration INTEGER NOT NULL DEFAULT 0,
                subscription_rate     INTEGER NOT NULL DEFAULT 0,
                paygo_rate            INTEGER NOT NULL DEFAULT 0,
                UNIQUE (pubkey, chain)
            );",
            "CREATE TABLE IF NOT EXISTS contracts (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                provider_id     INTEGER NOT NULL,
                delegate_pubkey TEXT    NOT NULL,
                client_pubkey   TEXT    NOT NULL,
                contract_type   TEXT    NOT NULL,
                duration        INTEGER NOT NULL,
                rate            INTEGER NOT NULL,
                open_cost       INTEGER NOT NULL,
                height          INTEGER NOT NULL,
                UNIQUE (provider_id, delegate_pubkey)
            );",
            "CREATE TABLE IF NOT EXISTS bond_provider_events (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                provider_id INTEGER NOT NULL,
                height      INTEGER NOT NULL,
                txid        TEXT    NOT NULL UNIQUE,
                bond_rel    TEXT,
                bond_abs    TEXT
            );",
            "CREATE TABLE IF NOT EXISTS mod_provider_events (
                id                    INTEGER PRIMARY KEY AUTOINCREMENT,
                provider_id           INTEGER NOT NULL,
                height                INTEGER NOT NULL,
                txid                  TEXT    NOT NULL UNIQUE,
                metadata_uri          TEXT    NOT NULL,
                metadata_nonce        INTEGER NOT NULL,
                status                TEXT    NOT NULL,
                min_contract_duration INTEGER NOT NULL,
                max_contract_duration INTEGER NOT NULL,
                subscription_rate     INTEGER NOT NULL,
                paygo_rate            INTEGER NOT NULL
            );",
            "CREATE TABLE IF NOT EXISTS open_contract_events (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                contract_id   INTEGER NOT NULL,
                client_pubkey TEXT    NOT NULL,
                contract_type TEXT    NOT NULL,
                height        INTEGER NOT NULL,
                txid          TEXT    NOT NULL UNIQUE,
                duration      INTEGER NOT NULL,
                rate          INTEGER NOT NULL,
                open_cost     INTEGER NOT NULL
            );",
            "CREATE TABLE IF NOT EXISTS close_contract_events (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                contract_id     INTEGER NOT NULL,
                client_pubkey   TEXT    NOT NULL,
                delegate_pubkey TEXT    NOT NULL,
                height          INTEGER NOT NULL,
                txid            TEXT    NOT NULL UNIQUE
            );",
            "CREATE TABLE IF NOT EXISTS contract_settlement_events (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                contract_id   INTEGER NOT NULL,
                txid          TEXT    NOT NULL UNIQUE,
                client_pubkey TEXT    NOT NULL,
                height        INTEGER NOT NULL,
                nonce         INTEGER NOT NULL,
                paid          INTEGER NOT NULL,
                reserve       INTEGER NOT NULL
            );",
            "CREATE TABLE IF NOT EXISTS provider_metadata (
                provider_id INTEGER NOT NULL,
                nonce       INTEGER NOT NULL,
                document    TEXT    NOT NULL,
                created_at  INTEGER NOT NULL,
                PRIMARY KEY (provider_id, nonce)
            );",
            "CREATE TABLE IF NOT EXISTS checkpoints (
                id         TEXT    PRIMARY KEY,
                height     INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        ] {
            sqlx::query(ddl).execute(&self.pool).await.map_err(db_err)?;
        }

        Ok(())
    }
}

fn provider_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Provider, StoreError> {
    let bond: String = row.get("bond");
    let status: String = row.get("status");
    Ok(Provider {
        id: row.get("id"),
        pubkey: row.get("pubkey"),
        chain: row.get("chain"),
        bond: BondAmount::parse(&bond).map_err(db_err)?,
        metadata_uri: row.get("metadata_uri"),
        metadata_nonce: row.get::<i64, _>("metadata_nonce") as u64,
        status: ProviderStatus::from_str(&status).map_err(db_err)?,
        min_contract_duration: row.get("min_contract_duration"),
        max_contract_duration: row.get("max_contract_duration"),
        subscription_rate: row.get("subscription_rate"),
        pay_as_you_go_rate: row.get("paygo_rate"),
    })
}

fn contract_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Contract, StoreError> {
    let contract_type: String = row.get("contract_type");
    Ok(Contract {
        id: row.get("id"),
        provider_id: row.get("provider_id"),
        delegate_pubkey: row.get("delegate_pubkey"),
        client_pubkey: row.get("client_pubkey"),
        contract_type: ContractType::from_str(&contract_type).map_err(db_err)?,
        duration: row.get("duration"),
        rate: row.get("rate"),
        open_cost: row.get("open_cost"),
        height: row.get::<i64, _>("height") as u64,
    })
}

#[async_trait]
impl DirectoryStore for SqliteStore {
    async fn find_provider(
        &self,
        pubkey: &str,
        chain: &str,
    ) -> Result<Option<Provider>, StoreError> {
        let row = sqlx::query(
            "SELECT id, pubkey, chain, bond, metadata_uri, metadata_nonce, status,
                    min_contract_duration, max_contract_duration, subscription_rate, paygo_rate
             FROM providers WHERE pubkey = ? AND chain = ?",
        )
        .bind(pubkey)
        .bind(chain)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(provider_from_row).transpose()
    }

    async fn insert_provider(&self, provider: &Provider) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO providers (pubkey, chain, bond) VALUES (?, ?, ?)
             ON CONFLICT (pubkey, chain) DO NOTHING",
        )
        .bind(&provider.pubkey)
        .bind(&provider.chain)
        .bind(provider.bond.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() > 0 {
            debug!(pubkey = %provider.pubkey, chain = %provider.chain, "provider inserted");
        }

        let row = sqlx::query("SELECT id FROM providers WHERE pubkey = ? AND chain = ?")
            .bind(&provider.pubkey)
            .bind(&provider.chain)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.get("id"))
    }

    async fn update_provider(&self, provider: &Provider) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE providers SET bond = ?, metadata_uri = ?, metadata_nonce = ?, status = ?,
                    min_contract_duration = ?, max_contract_duration = ?,
                    subscription_rate = ?, paygo_rate = ?
             WHERE pubkey = ? AND chain = ?",
        )
        .bind(provider.bond.as_str())
        .bind(&provider.metadata_uri)
        .bind(provider.metadata_nonce as i64)
        .bind(provider.status.as_str())
        .bind(provider.min_contract_duration)
        .bind(provider.max_contract_duration)
        .bind(provider.subscription_rate)
        .bind(provider.pay_as_you_go_rate)
        .bind(&provider.pubkey)
        .bind(&provider.chain)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Database(format!(
                "no provider {} {}",
                provider.pubkey, provider.chain
            )));
        }
        Ok(())
    }

    async fn find_contract(
        &self,
        provider_id: i64,
        delegate_pubkey: &str,
    ) -> Result<Option<Contract>, StoreError> {
        let row = sqlx::query(
            "SELECT id, provider_id, delegate_pubkey, client_pubkey, contract_type,
                    duration, rate, open_cost, height
             FROM contracts WHERE provider_id = ? AND delegate_pubkey = ?",
        )
        .bind(provider_id)
        .bind(delegate_pubkey)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(contract_from_row).transpose()
    }

    async fn find_contract_by_keys(
        &self,
        chain: &str,
        provider_pubkey: &str,
        delegate_pubkey: &str,
    ) -> Result<Option<Contract>, StoreError> {
        let row = sqlx::query(
            "SELECT c.id, c.provider_id, c.delegate_pubkey, c.client_pubkey, c.contract_type,
                    c.duration, c.rate, c.open_cost, c.height
             FROM providers p JOIN contracts c ON p.id = c.provider_id
             WHERE p.chain = ? AND p.pubkey = ? AND c.delegate_pubkey = ?",
        )
        .bind(chain)
        .bind(provider_pubkey)
        .bind(delegate_pubkey)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(contract_from_row).transpose()
    }

    async fn upsert_contract(
        &self,
        provider_id: i64,
        event: &OpenContractEvent,
    ) -> Result<i64, StoreError> {
        sqlx::query(
            "INSERT INTO contracts
                (provider_id, delegate_pubkey, client_pubkey, contract_type,
                 duration, rate, open_cost, height)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (provider_id, delegate_pubkey) DO UPDATE SET
                client_pubkey = excluded.client_pubkey,
                contract_type = excluded.contract_type,
                duration      = excluded.duration,
                rate          = excluded.rate,
                open_cost     = excluded.open_cost,
                height        = excluded.height",
        )
        .bind(provider_id)
        .bind(&event.delegate_pubkey)
        .bind(&event.client_pubkey)
        .bind(event.contract_type.as_str())
        .bind(event.duration)
        .bind(event.rate)
        .bind(event.open_cost)
        .bind(event.height as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let row = sqlx::query(
            "SELECT id FROM contracts WHERE provider_id = ? AND delegate_pubkey = ?",
        )
        .bind(provider_id)
        .bind(&event.delegate_pubkey)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.get("id"))
    }

    async fn insert_bond_provider_event(
        &self,
        provider_id: i64,
        event: &BondProviderEvent,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO bond_provider_events (provider_id, height, txid, bond_rel, bond_abs)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (txid) DO NOTHING",
        )
        .bind(provider_id)
        .bind(event.height as i64)
        .bind(&event.tx_id)
        .bind(event.bond_relative.as_ref().map(|b| b.as_str()))
        .bind(event.bond_absolute.as_ref().map(|b| b.as_str()))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_mod_provider_event(
        &self,
        provider_id: i64,
        event: &ModProviderEvent,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO mod_provider_events
                (provider_id, height, txid, metadata_uri, metadata_nonce, status,
                 min_contract_duration, max_contract_duration, subscription_rate, paygo_rate)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (txid) DO NOTHING",
        )
        .bind(provider_id)
        .bind(event.height as i64)
        .bind(&event.tx_id)
        .bind(&event.metadata_uri)
        .bind(event.metadata_nonce as i64)
        .bind(event.status.as_str())
        .bind(event.min_contract_duration)
        .bind(event.max_contract_duration)
        .bind(event.subscription_rate)
        .bind(event.pay_as_you_go_rate)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_open_contract_event(
        &self,
        contract_id: i64,
        event: &OpenContractEvent,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO open_contract_events
                (contract_id, client_pubkey, contract_type, height, txid, duration, rate, open_cost)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (txid) DO NOTHING",
        )
        .bind(contract_id)
        .bind(&event.client_pubkey)
        .bind(event.contract_type.as_str())
        .bind(event.height as i64)
        .bind(&event.tx_id)
        .bind(event.duration)
        .bind(event.rate)
        .bind(event.open_cost)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_close_contract_event(
        &self,
        contract_id: i64,
        event: &CloseContractEvent,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO close_contract_events
                (contract_id, client_pubkey, delegate_pubkey, height, txid)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (txid) DO NOTHING",
        )
        .bind(contract_id)
        .bind(&event.client_pubkey)
        .bind(&event.delegate_pubkey)
        .bind(event.height as i64)
        .bind(&event.tx_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_settlement_event(
        &self,
        contract_id: i64,
        event: &ContractSettlementEvent,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO contract_settlement_events
                (contract_id, txid, client_pubkey, height, nonce, paid, reserve)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (txid) DO NOTHING",
        )
        .bind(contract_id)
        .bind(&event.tx_id)
        .bind(&event.client_pubkey)
        .bind(event.height as i64)
        .bind(event.nonce)
        .bind(event.paid)
        .bind(event.reserve)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_provider_metadata(
        &self,
        provider_id: i64,
        nonce: u64,
        document: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let doc = serde_json::to_string(document)?;
        sqlx::query(
            "INSERT INTO provider_metadata (provider_id, nonce, document, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (provider_id, nonce) DO NOTHING",
        )
        .bind(provider_id)
        .bind(nonce as i64)
        .bind(doc)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn find_checkpoint(&self, id: &str) -> Result<Option<Checkpoint>, StoreError> {
        let row = sqlx::query("SELECT id, height, updated_at FROM checkpoints WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(row.map(|r| Checkpoint {
            id: r.get("id"),
            height: r.get::<i64, _>("height") as u64,
            updated_at: r.get("updated_at"),
        }))
    }

    async fn upsert_checkpoint(&self, id: &str, height: u64) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO checkpoints (id, height, updated_at) VALUES (?, ?, ?)",
        )
        .bind(id)
        .bind(height as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!(id, height, "checkpoint saved");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
