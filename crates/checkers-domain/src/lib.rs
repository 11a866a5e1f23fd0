pub mod errors;
pub mod ids;
pub mod money;
pub mod player;
pub mod room;
pub mod session;

pub use errors::DomainError;
pub use ids::{GameId, PlayerId, RoomId, SessionId};
pub use money::{to_major, MinorUnits, Stake, VALID_STAKES};
pub use player::{Player, PlayerStatus};
pub use room::Room;
pub use session::{Operator, OperatorIdentifier, Session};
