use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use checkers_domain::{Player, PlayerId, Room, RoomId, Session, SessionId, Stake};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::keys;
use crate::{decode_json, encode_json, CompensationEntry, MatchStore, StoreError};

/// Test double for the KV store. Queues, counters and the pub/sub fan-out
/// are all observable through the inner maps.
#[derive(Default, Clone)]
pub struct InMemoryMatchStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    players: Mutex<HashMap<PlayerId, Player>>,
    rooms: Mutex<HashMap<RoomId, Room>>,
    sessions: Mutex<HashMap<SessionId, Session>>,
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    counters: Mutex<HashMap<String, i64>>,
    waiting_rooms: Mutex<HashMap<String, Vec<RoomId>>>,
    published: Mutex<HashMap<String, Vec<Vec<u8>>>>,
    queue_notify: Notify,
}

impl InMemoryMatchStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_session(&self, session: Session) {
        self.inner
            .sessions
            .lock()
            .expect("sessions lock")
            .insert(session.id.clone(), session);
    }

    #[must_use]
    pub fn published_to(&self, player_id: &PlayerId) -> Vec<Vec<u8>> {
        self.inner
            .published
            .lock()
            .expect("published lock")
            .get(&keys::player_channel(player_id))
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn queue_len(&self, queue: &str) -> usize {
        self.inner
            .queues
            .lock()
            .expect("queues lock")
            .get(queue)
            .map_or(0, VecDeque::len)
    }

    fn push_raw(&self, queue: &str, raw: String) {
        self.inner
            .queues
            .lock()
            .expect("queues lock")
            .entry(queue.to_string())
            .or_default()
            .push_back(raw);
        self.inner.queue_notify.notify_waiters();
    }

    fn pop_front(&self, queue: &str) -> Option<String> {
        self.inner
            .queues
            .lock()
            .expect("queues lock")
            .get_mut(queue)
            .and_then(VecDeque::pop_front)
    }

    async fn pop_raw(
        &self,
        queue: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<String>, StoreError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            // Register for wakeups before checking, so a push between the
            // check and the await is not lost.
            let notified = self.inner.queue_notify.notified();
            if let Some(raw) = self.pop_front(queue) {
                return Ok(Some(raw));
            }
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    tokio::select! {
                        () = notified => {}
                        () = tokio::time::sleep(deadline - now) => return Ok(None),
                    }
                }
                None => notified.await,
            }
        }
    }
}

#[async_trait]
impl MatchStore for InMemoryMatchStore {
    async fn get_player(&self, id: &PlayerId) -> Result<Option<Player>, StoreError> {
        Ok(self
            .inner
            .players
            .lock()
            .expect("players lock")
            .get(id)
            .cloned())
    }

    async fn put_player(&self, player: &Player) -> Result<(), StoreError> {
        self.inner
            .players
            .lock()
            .expect("players lock")
            .insert(player.id.clone(), player.clone());
        Ok(())
    }

    async fn get_room(&self, id: RoomId) -> Result<Option<Room>, StoreError> {
        Ok(self.inner.rooms.lock().expect("rooms lock").get(&id).cloned())
    }

    async fn put_room(&self, room: &Room) -> Result<(), StoreError> {
        self.inner
            .rooms
            .lock()
            .expect("rooms lock")
            .insert(room.id, room.clone());
        Ok(())
    }

    async fn remove_room(&self, id: RoomId) -> Result<(), StoreError> {
        self.inner.rooms.lock().expect("rooms lock").remove(&id);
        Ok(())
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        Ok(self
            .inner
            .sessions
            .lock()
            .expect("sessions lock")
            .get(id)
            .cloned())
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
        self.push_raw(queue, encode_json(player)?);
        Ok(())
    }

    async fn push_room_for_game(&self, room: &Room) -> Result<(), StoreError> {
        self.push_raw(keys::CREATE_GAME_QUEUE, encode_json(room)?);
        Ok(())
    }

    async fn publish_to_player(
        &self,
        player_id: &PlayerId,
        payload: &[u8],
    ) -> Result<(), StoreError> {
        self.inner
            .published
            .lock()
            .expect("published lock")
            .entry(keys::player_channel(player_id))
            .or_default()
            .push(payload.to_vec());
        Ok(())
    }

    async fn increment_queue_count(&self, stake: Stake) -> Result<i64, StoreError> {
        let mut counters = self.inner.counters.lock().expect("counters lock");
        let count = counters.entry(keys::queue_count_key(stake)).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn decrement_queue_count(&self, stake: Stake) -> Result<i64, StoreError> {
        let mut counters = self.inner.counters.lock().expect("counters lock");
        let count = counters.entry(keys::queue_count_key(stake)).or_insert(0);
        *count -= 1;
        Ok(*count)
    }

    async fn queue_count(&self, stake: Stake) -> Result<i64, StoreError> {
        Ok(self
            .inner
            .counters
            .lock()
            .expect("counters lock")
            .get(&keys::queue_count_key(stake))
            .copied()
            .unwrap_or(0))
    }

    async fn register_waiting_room(&self, room: &Room) -> Result<(), StoreError> {
        self.inner
            .waiting_rooms
            .lock()
            .expect("waiting rooms lock")
            .entry(keys::waiting_rooms_key(room.stake))
            .or_default()
            .push(room.id);
        Ok(())
    }

    async fn claim_waiting_room(&self, stake: Stake) -> Result<Option<Room>, StoreError> {
        loop {
            let claimed = {
                let mut waiting = self.inner.waiting_rooms.lock().expect("waiting rooms lock");
                waiting
                    .get_mut(&keys::waiting_rooms_key(stake))
                    .and_then(Vec::pop)
            };
            let Some(room_id) = claimed else {
                return Ok(None);
            };
            match self.get_room(room_id).await? {
                Some(room) if room.is_waiting() => return Ok(Some(room)),
                _ => {}
            }
        }
    }

    async fn push_compensation(&self, entry: &CompensationEntry) -> Result<(), StoreError> {
        self.push_raw(keys::COMPENSATION_QUEUE, encode_json(entry)?);
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

#[cfg(test)]
mod tests {
    use super::*;
    use checkers_domain::{OperatorIdentifier, PlayerStatus};

    fn player(id: &str) -> Player {
        Player {
            id: PlayerId::from(id),
            token: String::new(),
            room_id: None,
            game_id: None,
            session_id: SessionId::from(id),
            currency: "EUR".to_string(),
            status: PlayerStatus::InQueue,
            selected_stake: Stake(5.0),
            name: id.to_string(),
            operator_identifier: OperatorIdentifier::default(),
            disconnected_at: None,
        }
    }

    #[tokio::test]
    async fn queue_pops_preserve_fifo_order() {
        let store = InMemoryMatchStore::new();
        let queue = keys::queue_key(Stake(5.0));
        store.push_player(&queue, &player("a")).await.expect("push");
        store.push_player(&queue, &player("b")).await.expect("push");

        let first = store
            .pop_player(&queue, Some(Duration::from_millis(10)))
            .await
            .expect("pop")
            .expect("entry");
        let second = store
            .pop_player(&queue, Some(Duration::from_millis(10)))
            .await
            .expect("pop")
            .expect("entry");
        assert_eq!(first.id, PlayerId::from("a"));
        assert_eq!(second.id, PlayerId::from("b"));
    }

    #[tokio::test]
    async fn bounded_pop_times_out_on_empty_queue() {
        let store = InMemoryMatchStore::new();
        let popped = store
            .pop_player("ready_queue", Some(Duration::from_millis(20)))
            .await
            .expect("pop");
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn blocking_pop_wakes_on_push() {
        let store = InMemoryMatchStore::new();
        let waiter = store.clone();
        let handle =
            tokio::spawn(async move { waiter.pop_player("ready_queue", None).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        store
            .push_player("ready_queue", &player("late"))
            .await
            .expect("push");

        let popped = handle.await.expect("join").expect("pop").expect("entry");
        assert_eq!(popped.id, PlayerId::from("late"));
    }

    #[tokio::test]
    async fn counters_track_increments_and_decrements() {
        let store = InMemoryMatchStore::new();
        assert_eq!(store.increment_queue_count(Stake(1.0)).await.expect("incr"), 1);
        assert_eq!(store.increment_queue_count(Stake(1.0)).await.expect("incr"), 2);
        assert_eq!(store.decrement_queue_count(Stake(1.0)).await.expect("decr"), 1);
        assert_eq!(store.queue_count(Stake(1.0)).await.expect("count"), 1);
        // Other stakes are independent.
        assert_eq!(store.queue_count(Stake(5.0)).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn claim_waiting_room_skips_torn_down_rooms() {
        let store = InMemoryMatchStore::new();
        let gone = Room::waiting(player("a"));
        let live = Room::waiting(player("b"));
        store.put_room(&live).await.expect("put");
        store.register_waiting_room(&gone).await.expect("register");
        store.register_waiting_room(&live).await.expect("register");

        let claimed = store
            .claim_waiting_room(Stake(5.0))
            .await
            .expect("claim")
            .expect("room");
        assert_eq!(claimed.id, live.id);
        assert!(store
            .claim_waiting_room(Stake(5.0))
            .await
            .expect("claim")
            .is_none());
    }

    #[tokio::test]
    async fn compensation_queue_round_trips_entries() {
        let store = InMemoryMatchStore::new();
        let entry = CompensationEntry {
            session_id: SessionId::from("s1"),
            operator_name: "acme".to_string(),
            amount: 500,
            round_id: RoomId::new(),
            currency: "EUR".to_string(),
            attempts: 1,
            reason: "debit reversal".to_string(),
            created_at: chrono::Utc::now(),
        };
        store.push_compensation(&entry).await.expect("push");
        let popped = store
            .pop_compensation(Some(Duration::from_millis(10)))
            .await
            .expect("pop")
            .expect("entry");
        assert_eq!(popped, entry);
    }
}
