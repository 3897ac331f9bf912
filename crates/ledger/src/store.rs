//! SQLite store for users, models, and the power ledger.
//!
//! Uses a single SQLite database file with three tables:
//! - `users` — accounts with live balance and admin flag
//! - `ai_models` — admin-managed upstream model catalogue
//! - `power_ledger` — append-only audit trail of balance changes
//!
//! Balance mutations run inside transactions with a conditional
//! `UPDATE ... WHERE power_balance >= amount` as the serialization point,
//! so two concurrent requests on the same user cannot lose an update:
//! the cumulative sum of ledger `change` values always equals the live
//! balance.

use async_trait::async_trait;
use chrono::Utc;
use powergate_core::error::{LedgerError, StoreError};
use powergate_core::ledger::{CreditLedger, LedgerEntry, LedgerReason, ModelStore, UserAccount};
use powergate_core::model::ModelConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// The production SQLite store. Cheap to clone via the inner pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the store at `path`.
    ///
    /// All tables and indexes are created automatically, a default admin
    /// account is provisioned, and the model catalogue is seeded when
    /// empty. Pass `"sqlite::memory:"` for an ephemeral database in tests.
    pub async fn new(path: &str) -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| LedgerError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("busy_timeout", "5000")
            .pragma("foreign_keys", "ON");

        // Single writer connection: transactions queue on the pool, which
        // keeps per-user balance updates linearizable without upgrade
        // deadlocks between deferred write transactions.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| LedgerError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        store.seed().await?;
        info!("SQLite ledger store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                username      TEXT UNIQUE NOT NULL,
                is_admin      INTEGER NOT NULL DEFAULT 0,
                power_balance INTEGER NOT NULL DEFAULT 0,
                created_at    TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::MigrationFailed(format!("users table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ai_models (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                name           TEXT NOT NULL,
                model_id       TEXT NOT NULL,
                provider       TEXT NOT NULL,
                api_url        TEXT NOT NULL,
                api_key        TEXT NOT NULL DEFAULT '',
                power_cost     INTEGER NOT NULL DEFAULT 15,
                context_length INTEGER NOT NULL DEFAULT 4096,
                enabled        INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::MigrationFailed(format!("ai_models table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS power_ledger (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id       INTEGER NOT NULL,
                change        INTEGER NOT NULL,
                balance_after INTEGER NOT NULL,
                reason        TEXT NOT NULL,
                model_id      INTEGER,
                request_id    TEXT,
                created_at    TEXT NOT NULL,
                FOREIGN KEY(user_id) REFERENCES users(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::MigrationFailed(format!("power_ledger table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_power_ledger_user ON power_ledger(user_id, id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::MigrationFailed(format!("ledger index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Provision the default admin account and seed the model catalogue
    /// when the tables are empty.
    async fn seed(&self) -> Result<(), LedgerError> {
        let admin_exists = sqlx::query("SELECT id FROM users WHERE username = 'admin'")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| LedgerError::QueryFailed(format!("admin lookup: {e}")))?;
        if admin_exists.is_none() {
            self.create_user("admin", true, 0).await?;
        }

        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM ai_models")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| LedgerError::QueryFailed(format!("model count: {e}")))?;
        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| LedgerError::QueryFailed(format!("cnt column: {e}")))?;
        if cnt == 0 {
            let defaults = [
                ("GPT-3.5 Turbo", "gpt-3.5-turbo", "openai", "https://api.openai.com/v1", 15i64, 16385i64),
                ("GPT-4o", "gpt-4o", "openai", "https://api.openai.com/v1", 150, 128000),
                ("DeepSeek Chat", "deepseek-chat", "deepseek", "https://api.deepseek.com", 10, 32000),
            ];
            for (name, model_id, provider, api_url, power_cost, context_length) in defaults {
                sqlx::query(
                    r#"
                    INSERT INTO ai_models (name, model_id, provider, api_url, api_key, power_cost, context_length)
                    VALUES (?1, ?2, ?3, ?4, '', ?5, ?6)
                    "#,
                )
                .bind(name)
                .bind(model_id)
                .bind(provider)
                .bind(api_url)
                .bind(power_cost)
                .bind(context_length)
                .execute(&self.pool)
                .await
                .map_err(|e| LedgerError::Storage(format!("model seed: {e}")))?;
            }
            debug!("Seeded default model catalogue");
        }

        Ok(())
    }

    /// Create a user with a starting balance.
    ///
    /// The balance grant and its `init` ledger entry commit in one
    /// transaction.
    pub async fn create_user(
        &self,
        username: &str,
        is_admin: bool,
        initial_balance: i64,
    ) -> Result<UserAccount, LedgerError> {
        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::Storage(format!("begin: {e}")))?;

        let result = sqlx::query(
            "INSERT INTO users (username, is_admin, power_balance, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(username)
        .bind(is_admin)
        .bind(initial_balance)
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| LedgerError::Storage(format!("INSERT user: {e}")))?;

        let user_id = result.last_insert_rowid();

        sqlx::query(
            r#"
            INSERT INTO power_ledger (user_id, change, balance_after, reason, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(user_id)
        .bind(initial_balance)
        .bind(initial_balance)
        .bind(LedgerReason::Init.as_str())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| LedgerError::Storage(format!("init ledger entry: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| LedgerError::Storage(format!("commit: {e}")))?;

        debug!(user_id, username, "Created user");
        Ok(UserAccount {
            id: user_id,
            username: username.to_string(),
            power_balance: initial_balance,
            is_admin,
            created_at: now,
        })
    }

    /// Insert a model into the catalogue. Used by tests and provisioning.
    pub async fn insert_model(&self, model: &ModelConfig) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO ai_models (name, model_id, provider, api_url, api_key, power_cost, context_length, enabled)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&model.name)
        .bind(&model.model_id)
        .bind(&model.provider)
        .bind(&model.api_url)
        .bind(&model.api_key)
        .bind(model.power_cost)
        .bind(model.context_length)
        .bind(model.enabled)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT model: {e}")))?;

        Ok(result.last_insert_rowid())
    }

    fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<UserAccount, LedgerError> {
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| LedgerError::QueryFailed(format!("created_at column: {e}")))?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(UserAccount {
            id: row
                .try_get("id")
                .map_err(|e| LedgerError::QueryFailed(format!("id column: {e}")))?,
            username: row
                .try_get("username")
                .map_err(|e| LedgerError::QueryFailed(format!("username column: {e}")))?,
            power_balance: row
                .try_get("power_balance")
                .map_err(|e| LedgerError::QueryFailed(format!("power_balance column: {e}")))?,
            is_admin: row
                .try_get("is_admin")
                .map_err(|e| LedgerError::QueryFailed(format!("is_admin column: {e}")))?,
            created_at,
        })
    }

    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<LedgerEntry, LedgerError> {
        let reason_str: String = row
            .try_get("reason")
            .map_err(|e| LedgerError::QueryFailed(format!("reason column: {e}")))?;
        let reason = LedgerReason::parse(&reason_str)
            .ok_or_else(|| LedgerError::CorruptEntry(format!("unknown reason: {reason_str}")))?;

        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| LedgerError::QueryFailed(format!("created_at column: {e}")))?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(LedgerEntry {
            id: row
                .try_get("id")
                .map_err(|e| LedgerError::QueryFailed(format!("id column: {e}")))?,
            user_id: row
                .try_get("user_id")
                .map_err(|e| LedgerError::QueryFailed(format!("user_id column: {e}")))?,
            change: row
                .try_get("change")
                .map_err(|e| LedgerError::QueryFailed(format!("change column: {e}")))?,
            balance_after: row
                .try_get("balance_after")
                .map_err(|e| LedgerError::QueryFailed(format!("balance_after column: {e}")))?,
            reason,
            model_id: row.try_get("model_id").ok(),
            request_id: row.try_get("request_id").ok(),
            created_at,
        })
    }

    fn row_to_model(row: &sqlx::sqlite::SqliteRow) -> Result<ModelConfig, StoreError> {
        Ok(ModelConfig {
            id: row
                .try_get("id")
                .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?,
            name: row
                .try_get("name")
                .map_err(|e| StoreError::QueryFailed(format!("name column: {e}")))?,
            model_id: row
                .try_get("model_id")
                .map_err(|e| StoreError::QueryFailed(format!("model_id column: {e}")))?,
            provider: row
                .try_get("provider")
                .map_err(|e| StoreError::QueryFailed(format!("provider column: {e}")))?,
            api_url: row
                .try_get("api_url")
                .map_err(|e| StoreError::QueryFailed(format!("api_url column: {e}")))?,
            api_key: row
                .try_get("api_key")
                .map_err(|e| StoreError::QueryFailed(format!("api_key column: {e}")))?,
            power_cost: row
                .try_get("power_cost")
                .map_err(|e| StoreError::QueryFailed(format!("power_cost column: {e}")))?,
            context_length: row
                .try_get("context_length")
                .map_err(|e| StoreError::QueryFailed(format!("context_length column: {e}")))?,
            enabled: row
                .try_get("enabled")
                .map_err(|e| StoreError::QueryFailed(format!("enabled column: {e}")))?,
        })
    }
}

#[async_trait]
impl CreditLedger for SqliteStore {
    async fn debit(
        &self,
        user_id: i64,
        amount: i64,
        reason: LedgerReason,
        model_id: Option<i64>,
    ) -> Result<bool, LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::Storage(format!("begin: {e}")))?;

        let row = sqlx::query("SELECT is_admin FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| LedgerError::QueryFailed(format!("user lookup: {e}")))?;
        let is_admin: bool = match row {
            Some(ref r) => r
                .try_get("is_admin")
                .map_err(|e| LedgerError::QueryFailed(format!("is_admin column: {e}")))?,
            None => return Err(LedgerError::UserNotFound(user_id)),
        };

        // Admin bypass: success with no balance mutation and no entry.
        if is_admin {
            return Ok(true);
        }

        // Conditional decrement is the serialization point: it only
        // succeeds when the balance still covers the amount at commit.
        let result = sqlx::query(
            "UPDATE users SET power_balance = power_balance - ?1 WHERE id = ?2 AND power_balance >= ?1",
        )
        .bind(amount)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| LedgerError::Storage(format!("debit UPDATE: {e}")))?;

        if result.rows_affected() == 0 {
            // Insufficient balance: no mutation, no entry.
            return Ok(false);
        }

        let row = sqlx::query("SELECT power_balance FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| LedgerError::QueryFailed(format!("balance read: {e}")))?;
        let balance_after: i64 = row
            .try_get("power_balance")
            .map_err(|e| LedgerError::QueryFailed(format!("power_balance column: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO power_ledger (user_id, change, balance_after, reason, model_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(user_id)
        .bind(-amount)
        .bind(balance_after)
        .bind(reason.as_str())
        .bind(model_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| LedgerError::Storage(format!("debit ledger entry: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| LedgerError::Storage(format!("commit: {e}")))?;

        debug!(user_id, amount, balance_after, reason = reason.as_str(), "Debited");
        Ok(true)
    }

    async fn credit(
        &self,
        user_id: i64,
        amount: i64,
        reason: LedgerReason,
        request_id: Option<&str>,
    ) -> Result<i64, LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::Storage(format!("begin: {e}")))?;

        let result = sqlx::query("UPDATE users SET power_balance = power_balance + ?1 WHERE id = ?2")
            .bind(amount)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| LedgerError::Storage(format!("credit UPDATE: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::UserNotFound(user_id));
        }

        let row = sqlx::query("SELECT power_balance FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| LedgerError::QueryFailed(format!("balance read: {e}")))?;
        let balance_after: i64 = row
            .try_get("power_balance")
            .map_err(|e| LedgerError::QueryFailed(format!("power_balance column: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO power_ledger (user_id, change, balance_after, reason, request_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .bind(balance_after)
        .bind(reason.as_str())
        .bind(request_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| LedgerError::Storage(format!("credit ledger entry: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| LedgerError::Storage(format!("commit: {e}")))?;

        debug!(user_id, amount, balance_after, reason = reason.as_str(), "Credited");
        Ok(balance_after)
    }

    async fn balance_of(&self, user_id: i64) -> Result<i64, LedgerError> {
        let row = sqlx::query("SELECT power_balance FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| LedgerError::QueryFailed(format!("balance read: {e}")))?;

        match row {
            Some(ref r) => r
                .try_get("power_balance")
                .map_err(|e| LedgerError::QueryFailed(format!("power_balance column: {e}"))),
            None => Err(LedgerError::UserNotFound(user_id)),
        }
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<UserAccount>, LedgerError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| LedgerError::QueryFailed(format!("user lookup: {e}")))?;

        match row {
            Some(ref r) => Ok(Some(Self::row_to_user(r)?)),
            None => Ok(None),
        }
    }

    async fn list_entries(&self, user_id: i64) -> Result<Vec<LedgerEntry>, LedgerError> {
        let rows = sqlx::query("SELECT * FROM power_ledger WHERE user_id = ?1 ORDER BY id ASC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LedgerError::QueryFailed(format!("ledger read: {e}")))?;

        rows.iter().map(Self::row_to_entry).collect()
    }
}

#[async_trait]
impl ModelStore for SqliteStore {
    async fn get_model_by_id(&self, id: i64) -> Result<Option<ModelConfig>, StoreError> {
        let row = sqlx::query("SELECT * FROM ai_models WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("model lookup: {e}")))?;

        match row {
            Some(ref r) => Ok(Some(Self::row_to_model(r)?)),
            None => Ok(None),
        }
    }

    async fn list_enabled(&self) -> Result<Vec<ModelConfig>, StoreError> {
        let rows = sqlx::query("SELECT * FROM ai_models WHERE enabled = 1 ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("model listing: {e}")))?;

        rows.iter().map(Self::row_to_model).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    async fn user_with_balance(store: &SqliteStore, balance: i64) -> i64 {
        store
            .create_user("alice", false, balance)
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn create_user_writes_init_entry() {
        let store = test_store().await;
        let user = store.create_user("bob", false, 500).await.unwrap();
        assert_eq!(user.power_balance, 500);
        assert!(!user.is_admin);

        let entries = store.list_entries(user.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, LedgerReason::Init);
        assert_eq!(entries[0].change, 500);
        assert_eq!(entries[0].balance_after, 500);
    }

    #[tokio::test]
    async fn debit_decrements_and_appends_entry() {
        let store = test_store().await;
        let id = user_with_balance(&store, 200).await;

        let ok = store
            .debit(id, 50, LedgerReason::Chat, Some(7))
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(store.balance_of(id).await.unwrap(), 150);

        let entries = store.list_entries(id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].change, -50);
        assert_eq!(entries[1].balance_after, 150);
        assert_eq!(entries[1].reason, LedgerReason::Chat);
        assert_eq!(entries[1].model_id, Some(7));
    }

    #[tokio::test]
    async fn insufficient_balance_leaves_no_trace() {
        let store = test_store().await;
        let id = user_with_balance(&store, 100).await;

        let ok = store
            .debit(id, 150, LedgerReason::Chat, None)
            .await
            .unwrap();
        assert!(!ok);
        assert_eq!(store.balance_of(id).await.unwrap(), 100);
        assert_eq!(store.list_entries(id).await.unwrap().len(), 1); // init only
    }

    #[tokio::test]
    async fn admin_debit_is_a_noop_success() {
        let store = test_store().await;
        let admin = store.create_user("root", true, 10).await.unwrap();

        let ok = store
            .debit(admin.id, 1_000_000, LedgerReason::Chat, None)
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(store.balance_of(admin.id).await.unwrap(), 10);
        // No chat entry recorded for the bypass
        let entries = store.list_entries(admin.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, LedgerReason::Init);
    }

    #[tokio::test]
    async fn debit_unknown_user_errors() {
        let store = test_store().await;
        let err = store
            .debit(9999, 10, LedgerReason::Chat, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::UserNotFound(9999)));
    }

    #[tokio::test]
    async fn credit_returns_new_balance() {
        let store = test_store().await;
        let id = user_with_balance(&store, 30).await;

        let balance = store
            .credit(id, 70, LedgerReason::Recharge, Some("CODE-1"))
            .await
            .unwrap();
        assert_eq!(balance, 100);

        let entries = store.list_entries(id).await.unwrap();
        assert_eq!(entries[1].request_id.as_deref(), Some("CODE-1"));
    }

    #[tokio::test]
    async fn debit_then_refund_restores_exact_balance() {
        let store = test_store().await;
        let id = user_with_balance(&store, 200).await;

        assert!(store.debit(id, 50, LedgerReason::Chat, Some(1)).await.unwrap());
        let balance = store
            .credit(id, 50, LedgerReason::RefundError, None)
            .await
            .unwrap();
        assert_eq!(balance, 200);

        let entries = store.list_entries(id).await.unwrap();
        assert_eq!(entries.len(), 3); // init + chat + refund
        assert_eq!(entries[1].change, -50);
        assert_eq!(entries[2].change, 50);
        assert_eq!(entries[2].reason, LedgerReason::RefundError);
    }

    #[tokio::test]
    async fn ledger_is_internally_consistent() {
        let store = test_store().await;
        let id = user_with_balance(&store, 1000).await;

        store.debit(id, 100, LedgerReason::Chat, None).await.unwrap();
        store.credit(id, 40, LedgerReason::Recharge, None).await.unwrap();
        store.debit(id, 200, LedgerReason::Chat, None).await.unwrap();
        store
            .credit(id, 200, LedgerReason::RefundStreamCrash, None)
            .await
            .unwrap();

        let entries = store.list_entries(id).await.unwrap();
        let mut running = 0;
        for entry in &entries {
            running += entry.change;
            assert_eq!(entry.balance_after, running);
        }
        assert_eq!(store.balance_of(id).await.unwrap(), running);
    }

    #[tokio::test]
    async fn concurrent_debits_never_lose_updates() {
        // File-backed store so all tasks share one database.
        let dir = tempfile::tempdir().unwrap();
        let path = format!("sqlite://{}/ledger.db", dir.path().display());
        let store = SqliteStore::new(&path).await.unwrap();
        let id = store.create_user("carol", false, 1000).await.unwrap().id;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.debit(id, 10, LedgerReason::Chat, None).await.unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        assert_eq!(store.balance_of(id).await.unwrap(), 800);
        let entries = store.list_entries(id).await.unwrap();
        assert_eq!(entries.len(), 21);
        let mut running = 0;
        for entry in &entries {
            running += entry.change;
            assert_eq!(entry.balance_after, running);
        }
    }

    #[tokio::test]
    async fn concurrent_overdraw_stops_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("sqlite://{}/ledger.db", dir.path().display());
        let store = SqliteStore::new(&path).await.unwrap();
        let id = store.create_user("dave", false, 50).await.unwrap().id;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.debit(id, 10, LedgerReason::Chat, None).await.unwrap()
            }));
        }
        let successes = {
            let mut n = 0;
            for handle in handles {
                if handle.await.unwrap() {
                    n += 1;
                }
            }
            n
        };

        assert_eq!(successes, 5);
        assert_eq!(store.balance_of(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn default_models_are_seeded() {
        let store = test_store().await;
        let models = store.list_enabled().await.unwrap();
        assert_eq!(models.len(), 3);
        assert!(models.iter().any(|m| m.model_id == "gpt-4o"));
        assert!(models.iter().all(|m| m.enabled));
    }

    #[tokio::test]
    async fn admin_account_is_provisioned() {
        let store = test_store().await;
        // Seeded admin takes id 1
        let admin = store.get_user(1).await.unwrap().unwrap();
        assert_eq!(admin.username, "admin");
        assert!(admin.is_admin);
    }

    #[tokio::test]
    async fn get_model_by_id_and_missing() {
        let store = test_store().await;
        let model = store.get_model_by_id(1).await.unwrap().unwrap();
        assert!(!model.name.is_empty());
        assert!(store.get_model_by_id(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn disabled_models_excluded_from_listing() {
        let store = test_store().await;
        let id = store
            .insert_model(&ModelConfig {
                id: 0,
                name: "Hidden".into(),
                model_id: "hidden-1".into(),
                provider: "openai".into(),
                api_url: "https://api.example.com/v1".into(),
                api_key: "sk-secret".into(),
                power_cost: 5,
                context_length: 8192,
                enabled: false,
            })
            .await
            .unwrap();

        let models = store.list_enabled().await.unwrap();
        assert!(models.iter().all(|m| m.id != id));
        // Still resolvable by id — the proxy rejects it as disabled
        assert!(!store.get_model_by_id(id).await.unwrap().unwrap().enabled);
    }

    #[tokio::test]
    async fn balance_of_unknown_user() {
        let store = test_store().await;
        assert!(matches!(
            store.balance_of(424242).await.unwrap_err(),
            LedgerError::UserNotFound(_)
        ));
    }
}
