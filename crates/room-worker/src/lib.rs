pub mod compensation;
pub mod leave;
pub mod matchmaker;
pub mod ready;
pub mod solo;

use std::sync::Arc;

use checkers_domain::{
    DomainError, MinorUnits, Player, PlayerId, Room, RoomId, Session, SessionId,
};
use chrono::Utc;
use match_store::{keys, MatchStore, StoreError};
use thiserror::Error;
use tracing::{info, warn};
use transaction_store::{
    OperatorRepository, TransactionKind, TransactionRecord, TransactionRepository,
    TransactionStoreError,
};
use wallet_adapter::{OperatorRegistry, WalletAdapter, WalletError};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Protocol(#[from] match_protocol::ProtocolError),
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Transactions(#[from] TransactionStoreError),
    #[error("player {0} carries no room reference")]
    NoRoomReference(PlayerId),
    #[error("room {0} is gone")]
    RoomGone(RoomId),
    #[error("player {0} is gone")]
    PlayerGone(PlayerId),
    #[error("session {0} is gone")]
    SessionGone(SessionId),
}

/// Handles shared by every worker task in this process.
#[derive(Clone)]
pub struct WorkerContext {
    pub store: Arc<dyn MatchStore>,
    pub wallets: Arc<OperatorRegistry>,
    pub transactions: Arc<dyn TransactionRepository>,
}

/// Bootstrap step: registers the HTTP wallet adapter for each configured
/// operator whose relational row exists and is active. Inactive or
/// unknown names never reach the registry, so their handshakes fail at
/// the adapter lookup.
pub async fn register_http_operators(
    registry: &mut OperatorRegistry,
    operators: &dyn OperatorRepository,
    names: &[String],
    adapter: Arc<dyn WalletAdapter>,
) -> Result<usize, WorkerError> {
    let mut registered = 0;
    for name in names {
        match operators.fetch_operator(name).await? {
            Some(operator) if operator.active => {
                info!(
                    operator = %operator.name,
                    wallet = %operator.wallet_base_url,
                    "wallet adapter registered"
                );
                registry.register(operator.name.clone(), adapter.clone());
                registered += 1;
            }
            Some(operator) => {
                warn!(operator = %operator.name, "operator inactive, wallet adapter not registered");
            }
            None => {
                warn!(operator = %name, "operator not found in relational store, skipped");
            }
        }
    }
    Ok(registered)
}

/// One Bernoulli bit decides turn order: the color-1 holder moves first.
pub(crate) fn flip_colors() -> (u8, u8) {
    let color1 = u8::from(rand::random::<bool>());
    (color1, 1 - color1)
}

/// Refreshes the seat copies held inside the room record so the game
/// worker receives the players as last persisted.
pub(crate) fn refresh_seats(room: &mut Room, updated: &[&Player]) {
    for player in updated {
        if room.player1.id == player.id {
            room.player1 = (*player).clone();
        } else if room.player2.as_ref().is_some_and(|p| p.id == player.id) {
            room.player2 = Some((*player).clone());
        }
    }
}

/// The one path back into blind matchmaking: reset, persist, tail-push,
/// count, confirm. Used for first queueing and for every re-queue.
pub(crate) async fn requeue_player(
    ctx: &WorkerContext,
    mut player: Player,
) -> Result<(), WorkerError> {
    player.reset_for_queue()?;
    ctx.store.put_player(&player).await?;
    ctx.store
        .push_player(&keys::queue_key(player.selected_stake), &player)
        .await?;
    ctx.store
        .increment_queue_count(player.selected_stake)
        .await?;
    let confirm = match_protocol::queue_confirmation_message(true)?;
    ctx.store.publish_to_player(&player.id, &confirm).await?;
    Ok(())
}

pub(crate) async fn record_wallet_movement(
    ctx: &WorkerContext,
    session: &Session,
    kind: TransactionKind,
    amount: MinorUnits,
    round_id: RoomId,
    status: &str,
    description: Option<String>,
) -> Result<(), WorkerError> {
    ctx.transactions
        .insert_transaction(&TransactionRecord {
            session_id: session.id.clone(),
            kind,
            amount,
            currency: session.currency.clone(),
            operator_name: session.operator_identifier.operator_name.clone(),
            game_name: session.operator_identifier.game_name.clone(),
            status: status.to_string(),
            description,
            round_id,
            created_at: Utc::now(),
        })
        .await?;
    Ok(())
}


#[cfg(test)]
pub(crate) mod testkit {
    use std::sync::Arc;

    use checkers_domain::{
        OperatorIdentifier, Player, PlayerId, PlayerStatus, Session, SessionId, Stake,
    };
    use match_store::InMemoryMatchStore;
    use serde_json::Value;
    use transaction_store::InMemoryTransactionRepository;
    use wallet_adapter::{MockWalletAdapter, OperatorRegistry};

    use super::WorkerContext;

    pub const OPERATOR: &str = "acme";

    pub struct TestRig {
        pub ctx: WorkerContext,
        pub store: InMemoryMatchStore,
        pub wallet: Arc<MockWalletAdapter>,
        pub transactions: InMemoryTransactionRepository,
    }

    pub fn rig() -> TestRig {
        let store = InMemoryMatchStore::new();
        let wallet = Arc::new(MockWalletAdapter::new());
        let transactions = InMemoryTransactionRepository::new();
        let mut wallets = OperatorRegistry::new();
        wallets.register(OPERATOR, wallet.clone());
        let ctx = WorkerContext {
            store: Arc::new(store.clone()),
            wallets: Arc::new(wallets),
            transactions: Arc::new(transactions.clone()),
        };
        TestRig {
            ctx,
            store,
            wallet,
            transactions,
        }
    }

    pub fn operator_identifier() -> OperatorIdentifier {
        OperatorIdentifier {
            operator_name: OPERATOR.to_string(),
            operator_game_name: "acme_checkers".to_string(),
            game_name: "checkers".to_string(),
        }
    }

    pub fn player(id: &str, status: PlayerStatus, stake: Stake) -> Player {
        Player {
            id: PlayerId::from(id),
            token: format!("token-{id}"),
            room_id: None,
            game_id: None,
            session_id: SessionId(format!("session-{id}")),
            currency: "EUR".to_string(),
            status,
            selected_stake: stake,
            name: format!("name-{id}"),
            operator_identifier: operator_identifier(),
            disconnected_at: None,
        }
    }

    pub fn session_for(player: &Player, balance: i64) -> Session {
        Session {
            id: player.session_id.clone(),
            token: player.token.clone(),
            player_name: player.name.clone(),
            balance,
            currency: player.currency.clone(),
            operator_base_url: "http://wallet.test".to_string(),
            created_at: chrono::Utc::now(),
            operator_identifier: player.operator_identifier.clone(),
        }
    }

    /// Decodes the frames published to one player into (command, value).
    pub fn frames_for(store: &InMemoryMatchStore, player_id: &PlayerId) -> Vec<(String, Value)> {
        store
            .published_to(player_id)
            .iter()
            .map(|raw| {
                let message = match_protocol::decode_raw(raw).expect("published frame decodes");
                (message.command, message.value)
            })
            .collect()
    }

    pub fn commands_for(store: &InMemoryMatchStore, player_id: &PlayerId) -> Vec<String> {
        frames_for(store, player_id)
            .into_iter()
            .map(|(command, _)| command)
            .collect()
    }
}
