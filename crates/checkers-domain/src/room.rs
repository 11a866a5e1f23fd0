use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::ids::{PlayerId, RoomId};
use crate::money::Stake;
use crate::player::Player;
use crate::session::OperatorIdentifier;

/// A two-seat container scheduled for a match. Either *waiting* (second
/// seat empty, solo create path) or *paired*.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub player1: Player,
    #[serde(default)]
    pub player2: Option<Player>,
    pub start_date: DateTime<Utc>,
    pub currency: String,
    pub stake: Stake,
    pub operator_identifier: OperatorIdentifier,
    /// Holder of color 1, assigned by the pairing coin flip. Moves first.
    #[serde(default)]
    pub current_player_id: Option<PlayerId>,
}

impl Room {
    #[must_use]
    pub fn waiting(player1: Player) -> Self {
        let currency = player1.currency.clone();
        let stake = player1.selected_stake;
        let operator_identifier = player1.operator_identifier.clone();
        Self {
            id: RoomId::new(),
            player1,
            player2: None,
            start_date: Utc::now(),
            currency,
            stake,
            operator_identifier,
            current_player_id: None,
        }
    }

    pub fn paired(player1: Player, player2: Player) -> Result<Self, DomainError> {
        let mut room = Self::waiting(player1);
        room.seat_player2(player2)?;
        Ok(room)
    }

    /// Fills the second seat. Both seats must hold distinct players at the
    /// same currency and stake.
    pub fn seat_player2(&mut self, player2: Player) -> Result<(), DomainError> {
        if player2.id == self.player1.id
            || player2.currency != self.currency
            || player2.selected_stake != self.stake
        {
            return Err(DomainError::MismatchedSeats);
        }
        self.player2 = Some(player2);
        Ok(())
    }

    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.player2.is_none()
    }

    pub fn opponent_id(&self, player_id: &PlayerId) -> Result<PlayerId, DomainError> {
        let player2 = self
            .player2
            .as_ref()
            .ok_or(DomainError::RoomNotPaired(self.id))?;
        if *player_id == self.player1.id {
            Ok(player2.id.clone())
        } else if *player_id == player2.id {
            Ok(self.player1.id.clone())
        } else {
            Err(DomainError::PlayerNotInRoom {
                player: player_id.clone(),
                room: self.id,
            })
        }
    }
}
