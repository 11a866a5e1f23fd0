use std::time::Duration;

use async_trait::async_trait;
use checkers_domain::{Player, PlayerId, Room, RoomId, Session, SessionId, Stake};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::keys;
use crate::{decode_json, encode_json, CompensationEntry, MatchStore, StoreError};

/// Redis-backed coordination store. Non-blocking commands share one
/// multiplexed connection; blocking pops open their own so a parked
/// `BLPOP` cannot stall the rest of the worker.
#[derive(Clone)]
pub struct RedisMatchStore {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl RedisMatchStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(kv_err)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(kv_err)?;
        Ok(Self { client, conn })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }

    async fn blocking_conn(&self) -> Result<MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(kv_err)
    }

    async fn get_value<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let raw: Option<String> = self.conn().get(key).await.map_err(kv_err)?;
        raw.as_deref().map(decode_json).transpose()
    }

    async fn set_value<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = encode_json(value)?;
        let _: () = self.conn().set(key, raw).await.map_err(kv_err)?;
        Ok(())
    }

    async fn pop_raw(
        &self,
        queue: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<String>, StoreError> {
        let mut conn = self.blocking_conn().await?;
        // BLPOP timeout 0 blocks until an entry arrives.
        let timeout_secs = timeout.map_or(0.0, |t| t.as_secs_f64());
        let popped: Option<(String, String)> =
            conn.blpop(queue, timeout_secs).await.map_err(kv_err)?;
        Ok(popped.map(|(_, raw)| raw))
    }
}

fn kv_err(err: redis::RedisError) -> StoreError {
    StoreError::Kv(err.to_string())
}

#[async_trait]
impl MatchStore for RedisMatchStore {
    async fn get_player(&self, id: &PlayerId) -> Result<Option<Player>, StoreError> {
        self.get_value(&keys::player_key(id)).await
    }

    async fn put_player(&self, player: &Player) -> Result<(), StoreError> {
        self.set_value(&keys::player_key(&player.id), player).await
    }

    async fn get_room(&self, id: RoomId) -> Result<Option<Room>, StoreError> {
        self.get_value(&keys::room_key(id)).await
    }

    async fn put_room(&self, room: &Room) -> Result<(), StoreError> {
        self.set_value(&keys::room_key(room.id), room).await
    }

    async fn remove_room(&self, id: RoomId) -> Result<(), StoreError> {
        let _: () = self.conn().del(keys::room_key(id)).await.map_err(kv_err)?;
        Ok(())
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        self.get_value(&keys::session_key(id)).await
    }

    async fn pop_player(
        &self,
        queue: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<Player>, StoreError> {
        let raw = self.pop_raw(queue, timeout).await?;
        raw.as_deref().map(decode_json).transpose()
    }

    async fn push_player(&self, queue: &str, player: &Player) -> Result<(), StoreError> {
        let raw = encode_json(player)?;
        let _: () = self.conn().rpush(queue, raw).await.map_err(kv_err)?;
        Ok(())
    }

    async fn push_room_for_game(&self, room: &Room) -> Result<(), StoreError> {
        let raw = encode_json(room)?;
        let _: () = self
            .conn()
            .rpush(keys::CREATE_GAME_QUEUE, raw)
            .await
            .map_err(kv_err)?;
        Ok(())
    }

    async fn publish_to_player(
        &self,
        player_id: &PlayerId,
        payload: &[u8],
    ) -> Result<(), StoreError> {
        let _: () = self
            .conn()
            .publish(keys::player_channel(player_id), payload)
            .await
            .map_err(kv_err)?;
        Ok(())
    }

    async fn increment_queue_count(&self, stake: Stake) -> Result<i64, StoreError> {
        self.conn()
            .incr(keys::queue_count_key(stake), 1i64)
            .await
            .map_err(kv_err)
    }

    async fn decrement_queue_count(&self, stake: Stake) -> Result<i64, StoreError> {
        self.conn()
            .decr(keys::queue_count_key(stake), 1i64)
            .await
            .map_err(kv_err)
    }

    async fn queue_count(&self, stake: Stake) -> Result<i64, StoreError> {
        let count: Option<i64> = self
            .conn()
            .get(keys::queue_count_key(stake))
            .await
            .map_err(kv_err)?;
        Ok(count.unwrap_or(0))
    }

    async fn register_waiting_room(&self, room: &Room) -> Result<(), StoreError> {
        let _: () = self
            .conn()
            .sadd(keys::waiting_rooms_key(room.stake), room.id.to_string())
            .await
            .map_err(kv_err)?;
        Ok(())
    }

    async fn claim_waiting_room(&self, stake: Stake) -> Result<Option<Room>, StoreError> {
        // Popped index entries may be stale (room already torn down); skip
        // them until a live room or an empty set.
        loop {
            let popped: Option<String> = self
                .conn()
                .spop(keys::waiting_rooms_key(stake))
                .await
                .map_err(kv_err)?;
            let Some(raw_id) = popped else {
                return Ok(None);
            };
            let room_id = raw_id
                .parse()
                .map(RoomId)
                .map_err(|e: uuid::Error| StoreError::Serialization(e.to_string()))?;
            match self.get_room(room_id).await? {
                Some(room) if room.is_waiting() => return Ok(Some(room)),
                _ => {}
            }
        }
    }

    async fn push_compensation(&self, entry: &CompensationEntry) -> Result<(), StoreError> {
        let raw = encode_json(entry)?;
        let _: () = self
            .conn()
            .rpush(keys::COMPENSATION_QUEUE, raw)
            .await
            .map_err(kv_err)?;
        Ok(())
    }

    async fn pop_compensation(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Option<CompensationEntry>, StoreError> {
        let raw = self.pop_raw(keys::COMPENSATION_QUEUE, timeout).await?;
        raw.as_deref().map(decode_json).transpose()
    }
}
