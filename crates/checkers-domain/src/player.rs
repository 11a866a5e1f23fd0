use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::ids::{GameId, PlayerId, RoomId, SessionId};
use crate::money::Stake;
use crate::session::OperatorIdentifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerStatus {
    Offline,
    Online,
    InQueue,
    InRoom,
    InRoomReady,
    InGame,
}

impl PlayerStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "OFFLINE",
            Self::Online => "ONLINE",
            Self::InQueue => "IN_QUEUE",
            Self::InRoom => "IN_ROOM",
            Self::InRoomReady => "IN_ROOM_READY",
            Self::InGame => "IN_GAME",
        }
    }

    // The full transition table. Anything not listed here is rejected.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Offline, Self::Online)
                | (Self::Online, Self::Offline)
                | (Self::Online, Self::InQueue)
                | (Self::InQueue, Self::Online)
                | (Self::InQueue, Self::InRoom)
                | (Self::InRoom, Self::Online)
                | (Self::InRoom, Self::InRoomReady)
                | (Self::InRoomReady, Self::InRoom)
                | (Self::InRoomReady, Self::InGame)
                | (Self::InGame, Self::Online)
                | (Self::InGame, Self::Offline)
        )
    }
}

impl std::fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub token: String,
    #[serde(default)]
    pub room_id: Option<RoomId>,
    #[serde(default)]
    pub game_id: Option<GameId>,
    pub session_id: SessionId,
    pub currency: String,
    pub status: PlayerStatus,
    pub selected_stake: Stake,
    pub name: String,
    pub operator_identifier: OperatorIdentifier,
    #[serde(default)]
    pub disconnected_at: Option<i64>,
}

impl Player {
    /// Guarded status mutation. Rejection is a programmer error at the
    /// call site, never a user error.
    pub fn set_status(&mut self, next: PlayerStatus) -> Result<(), DomainError> {
        if self.status == next {
            return Err(DomainError::SelfTransition(next));
        }
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    #[must_use]
    pub fn eligible_for_queue(&self) -> bool {
        self.status == PlayerStatus::InQueue
    }

    /// Walks back to `ONLINE` through permitted transitions and clears any
    /// room/game association. No-op when already online.
    pub fn reset_to_online(&mut self) -> Result<(), DomainError> {
        if self.status == PlayerStatus::InRoomReady {
            self.set_status(PlayerStatus::InRoom)?;
        }
        if self.status != PlayerStatus::Online {
            self.set_status(PlayerStatus::Online)?;
        }
        self.room_id = None;
        self.game_id = None;
        Ok(())
    }

    /// Puts the player back into queueable shape: `ONLINE` first, then
    /// `IN_QUEUE`, room and game references cleared.
    pub fn reset_for_queue(&mut self) -> Result<(), DomainError> {
        self.reset_to_online()?;
        self.set_status(PlayerStatus::InQueue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(status: PlayerStatus) -> Player {
        Player {
            id: PlayerId::from("p1"),
            token: "tok".to_string(),
            room_id: None,
            game_id: None,
            session_id: SessionId::from("s1"),
            currency: "EUR".to_string(),
            status,
            selected_stake: Stake(5.0),
            name: "Alice".to_string(),
            operator_identifier: OperatorIdentifier::default(),
            disconnected_at: None,
        }
    }

    #[test]
    fn accepted_transitions_follow_the_table() {
        let mut p = player(PlayerStatus::Offline);
        for next in [
            PlayerStatus::Online,
            PlayerStatus::InQueue,
            PlayerStatus::InRoom,
            PlayerStatus::InRoomReady,
            PlayerStatus::InGame,
            PlayerStatus::Online,
        ] {
            p.set_status(next).expect("transition");
        }
        assert_eq!(p.status, PlayerStatus::Online);
    }

    #[test]
    fn self_transition_is_rejected() {
        let mut p = player(PlayerStatus::Online);
        assert_eq!(
            p.set_status(PlayerStatus::Online),
            Err(DomainError::SelfTransition(PlayerStatus::Online))
        );
    }

    #[test]
    fn room_to_queue_is_not_a_direct_edge() {
        let mut p = player(PlayerStatus::InRoom);
        assert!(matches!(
            p.set_status(PlayerStatus::InQueue),
            Err(DomainError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn reset_to_online_steps_down_from_ready() {
        let mut p = player(PlayerStatus::InRoomReady);
        p.room_id = Some(RoomId::new());
        p.reset_to_online().expect("reset");
        assert_eq!(p.status, PlayerStatus::Online);
        assert!(p.room_id.is_none());
    }

    #[test]
    fn reset_for_queue_lands_in_queue_from_any_room_state() {
        for start in [PlayerStatus::InRoom, PlayerStatus::InRoomReady] {
            let mut p = player(start);
            p.room_id = Some(RoomId::new());
            p.reset_for_queue().expect("requeue");
            assert_eq!(p.status, PlayerStatus::InQueue);
            assert!(p.room_id.is_none());
            assert!(p.eligible_for_queue());
        }
    }

    #[test]
    fn status_serializes_screaming_snake() {
        let json = serde_json::to_string(&PlayerStatus::InRoomReady).expect("serialize");
        assert_eq!(json, "\"IN_ROOM_READY\"");
    }
}
