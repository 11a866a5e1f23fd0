pub mod keys;
mod memory;
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use checkers_domain::{MinorUnits, Player, PlayerId, Room, RoomId, Session, SessionId, Stake};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::InMemoryMatchStore;
pub use redis_store::RedisMatchStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("kv error: {0}")]
    Kv(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// An unsettled credit-back owed to a player after a half-failed debit
/// pair. Durable: lives on the `wallet_compensations` list until a drainer
/// lands it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationEntry {
    pub session_id: SessionId,
    pub operator_name: String,
    pub amount: MinorUnits,
    pub round_id: RoomId,
    pub currency: String,
    pub attempts: u32,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// The coordination port every worker runs against. The KV store is
/// authoritative for players and rooms; ownership of a queued player is
/// transferred by the dequeue itself, so there is no per-entity locking.
#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn get_player(&self, id: &PlayerId) -> Result<Option<Player>, StoreError>;
    async fn put_player(&self, player: &Player) -> Result<(), StoreError>;

    async fn get_room(&self, id: RoomId) -> Result<Option<Room>, StoreError>;
    async fn put_room(&self, room: &Room) -> Result<(), StoreError>;
    async fn remove_room(&self, id: RoomId) -> Result<(), StoreError>;

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, StoreError>;

    /// Blocking left-pop of a serialized player. `None` timeout blocks
    /// until an entry arrives; `Some` returns `Ok(None)` on expiry.
    async fn pop_player(
        &self,
        queue: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<Player>, StoreError>;

    /// Right-push (queue tail).
    async fn push_player(&self, queue: &str, player: &Player) -> Result<(), StoreError>;

    /// Hands a paired, debited room over to the game worker.
    async fn push_room_for_game(&self, room: &Room) -> Result<(), StoreError>;

    async fn publish_to_player(
        &self,
        player_id: &PlayerId,
        payload: &[u8],
    ) -> Result<(), StoreError>;

    async fn increment_queue_count(&self, stake: Stake) -> Result<i64, StoreError>;
    async fn decrement_queue_count(&self, stake: Stake) -> Result<i64, StoreError>;
    async fn queue_count(&self, stake: Stake) -> Result<i64, StoreError>;

    async fn register_waiting_room(&self, room: &Room) -> Result<(), StoreError>;
    async fn claim_waiting_room(&self, stake: Stake) -> Result<Option<Room>, StoreError>;

    async fn push_compensation(&self, entry: &CompensationEntry) -> Result<(), StoreError>;
    async fn pop_compensation(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Option<CompensationEntry>, StoreError>;
}

pub(crate) fn encode_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Serialization(e.to_string()))
}
