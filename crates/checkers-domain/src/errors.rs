use thiserror::Error;

use crate::ids::{PlayerId, RoomId};
use crate::player::PlayerStatus;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: PlayerStatus,
        to: PlayerStatus,
    },
    #[error("player is already in status {0}")]
    SelfTransition(PlayerStatus),
    #[error("player {player} is not seated in room {room}")]
    PlayerNotInRoom { player: PlayerId, room: RoomId },
    #[error("room {0} has no second seat")]
    RoomNotPaired(RoomId),
    #[error("players do not share currency and stake")]
    MismatchedSeats,
}
