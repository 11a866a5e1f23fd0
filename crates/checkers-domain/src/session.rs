use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::SessionId;
use crate::money::MinorUnits;

/// Which third-party wallet this traffic belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorIdentifier {
    pub operator_name: String,
    pub operator_game_name: String,
    pub game_name: String,
}

/// Wallet-linked session minted at game launch. Read-only to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub token: String,
    pub player_name: String,
    pub balance: MinorUnits,
    pub currency: String,
    pub operator_base_url: String,
    pub created_at: DateTime<Utc>,
    pub operator_identifier: OperatorIdentifier,
}

/// Per-operator configuration row. Read-only to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operator {
    pub name: String,
    pub active: bool,
    pub wallet_base_url: String,
    pub win_factor: f64,
}
