use serde::{Deserialize, Serialize};

/// Wallet-facing amounts are integer minor units (cents).
pub type MinorUnits = i64;

/// The per-match wager, in decimal major units of the room currency.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stake(pub f64);

/// The only stakes the matchmaker runs queues for.
pub const VALID_STAKES: [Stake; 8] = [
    Stake(0.5),
    Stake(1.0),
    Stake(3.0),
    Stake(5.0),
    Stake(10.0),
    Stake(25.0),
    Stake(50.0),
    Stake(100.0),
];

impl Stake {
    #[must_use]
    pub fn major(self) -> f64 {
        self.0
    }

    #[must_use]
    pub fn minor_units(self) -> MinorUnits {
        (self.0 * 100.0).round() as MinorUnits
    }

    #[must_use]
    pub fn is_permitted(self) -> bool {
        VALID_STAKES.iter().any(|s| s.0 == self.0)
    }
}

impl std::fmt::Display for Stake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

#[must_use]
pub fn to_major(minor: MinorUnits) -> f64 {
    minor as f64 / 100.0
}
