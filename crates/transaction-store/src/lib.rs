use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use checkers_domain::{MinorUnits, Operator, RoomId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransactionStoreError {
    #[error("store lock poisoned")]
    LockPoisoned,
    #[error("database error: {0}")]
    Database(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Bet,
    Win,
    Refund,
}

impl TransactionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bet => "bet",
            Self::Win => "win",
            Self::Refund => "refund",
        }
    }
}

/// One row per wallet movement. The round id doubles as the wallet
/// idempotency key, so (session, kind, round) identifies a movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub session_id: SessionId,
    pub kind: TransactionKind,
    pub amount: MinorUnits,
    pub currency: String,
    pub operator_name: String,
    pub game_name: String,
    pub status: String,
    pub description: Option<String>,
    pub round_id: RoomId,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn insert_transaction(
        &self,
        record: &TransactionRecord,
    ) -> Result<(), TransactionStoreError>;
}

/// Read access to the per-operator configuration rows. The worker only
/// consults this at bootstrap to decide which wallets to register.
#[async_trait]
pub trait OperatorRepository: Send + Sync {
    async fn fetch_operator(&self, name: &str) -> Result<Option<Operator>, TransactionStoreError>;
}

#[derive(Debug, Default)]
pub struct NoopTransactionRepository;

#[async_trait]
impl TransactionRepository for NoopTransactionRepository {
    async fn insert_transaction(
        &self,
        _record: &TransactionRecord,
    ) -> Result<(), TransactionStoreError> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryTransactionRepository {
    pub records: Arc<Mutex<Vec<TransactionRecord>>>,
}

impl InMemoryTransactionRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn records_of_kind(&self, kind: TransactionKind) -> Vec<TransactionRecord> {
        self.records
            .lock()
            .expect("records lock")
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn insert_transaction(
        &self,
        record: &TransactionRecord,
    ) -> Result<(), TransactionStoreError> {
        self.records
            .lock()
            .map_err(|_| TransactionStoreError::LockPoisoned)?
            .push(record.clone());
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryOperatorRepository {
    pub operators: Arc<Mutex<HashMap<String, Operator>>>,
}

impl InMemoryOperatorRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, operator: Operator) {
        self.operators
            .lock()
            .expect("operators lock")
            .insert(operator.name.clone(), operator);
    }
}

#[async_trait]
impl OperatorRepository for InMemoryOperatorRepository {
    async fn fetch_operator(&self, name: &str) -> Result<Option<Operator>, TransactionStoreError> {
        Ok(self
            .operators
            .lock()
            .map_err(|_| TransactionStoreError::LockPoisoned)?
            .get(name)
            .cloned())
    }
}

#[derive(Debug, Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn insert_transaction(
        &self,
        record: &TransactionRecord,
    ) -> Result<(), TransactionStoreError> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                session_id, kind, amount, currency, operator_name, game_name,
                status, description, round_id, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.session_id.as_str())
        .bind(record.kind.as_str())
        .bind(record.amount)
        .bind(&record.currency)
        .bind(&record.operator_name)
        .bind(&record.game_name)
        .bind(&record.status)
        .bind(&record.description)
        .bind(record.round_id.0)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| TransactionStoreError::Database(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl OperatorRepository for PostgresTransactionRepository {
    async fn fetch_operator(&self, name: &str) -> Result<Option<Operator>, TransactionStoreError> {
        let row = sqlx::query(
            r#"
            SELECT name, active, wallet_base_url, win_factor
            FROM operators
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TransactionStoreError::Database(e.to_string()))?;
        row.map(|row| {
            Ok(Operator {
                name: row
                    .try_get("name")
                    .map_err(|e| TransactionStoreError::Database(e.to_string()))?,
                active: row
                    .try_get("active")
                    .map_err(|e| TransactionStoreError::Database(e.to_string()))?,
                wallet_base_url: row
                    .try_get("wallet_base_url")
                    .map_err(|e| TransactionStoreError::Database(e.to_string()))?,
                win_factor: row
                    .try_get("win_factor")
                    .map_err(|e| TransactionStoreError::Database(e.to_string()))?,
            })
        })
        .transpose()
    }
}
