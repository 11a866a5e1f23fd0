use checkers_domain::{PlayerId, RoomId, SessionId, Stake};

pub const CREATE_ROOM_QUEUE: &str = "create_room";
pub const JOIN_ROOM_QUEUE: &str = "join_room";
pub const READY_QUEUE: &str = "ready_queue";
pub const LEAVE_ROOM_QUEUE: &str = "leave_room";
pub const CREATE_GAME_QUEUE: &str = "create_game";
pub const COMPENSATION_QUEUE: &str = "wallet_compensations";

#[must_use]
pub fn player_key(id: &PlayerId) -> String {
    format!("player:{id}")
}

// The per-player pub/sub channel shares the player key name.
#[must_use]
pub fn player_channel(id: &PlayerId) -> String {
    player_key(id)
}

#[must_use]
pub fn room_key(id: RoomId) -> String {
    format!("room:{id}")
}

#[must_use]
pub fn session_key(id: &SessionId) -> String {
    format!("session:{id}")
}

// Stake display is fixed at six fractional digits, so `queue:1.000000`.
#[must_use]
pub fn queue_key(stake: Stake) -> String {
    format!("queue:{stake}")
}

#[must_use]
pub fn queue_count_key(stake: Stake) -> String {
    format!("queue_count:{stake}")
}

#[must_use]
pub fn waiting_rooms_key(stake: Stake) -> String {
    format!("waiting_rooms:{stake}")
}
