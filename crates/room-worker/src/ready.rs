use std::time::Duration;

use checkers_domain::{to_major, Player, PlayerStatus, Room, Session};
use chrono::Utc;
use match_store::{keys, CompensationEntry};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use transaction_store::TransactionKind;
use wallet_adapter::WalletAdapter;

use crate::{
    record_wallet_movement, refresh_seats, requeue_player, WorkerContext, WorkerError,
};

pub fn spawn_ready_loop(ctx: WorkerContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(err) = ready_round(&ctx, None).await {
                warn!(
                    pid = std::process::id(),
                    error = %err,
                    "ready round failed"
                );
            }
        }
    })
}

/// Drains one entry from `ready_queue`. The gateway writes the player's
/// post-click status into the entry: `IN_ROOM_READY` means "clicked
/// ready", `IN_ROOM` means "unclicked".
pub async fn ready_round(
    ctx: &WorkerContext,
    timeout: Option<Duration>,
) -> Result<(), WorkerError> {
    let Some(entry) = ctx.store.pop_player(keys::READY_QUEUE, timeout).await? else {
        return Ok(());
    };
    match entry.status {
        PlayerStatus::InRoomReady => handle_ready(ctx, entry).await,
        PlayerStatus::InRoom => handle_unready(ctx, entry).await,
        other => {
            error!(player = %entry.id, status = %other, "unexpected status on ready queue");
            Ok(())
        }
    }
}

struct RoomSides {
    room: Room,
    opponent: Player,
}

async fn resolve_sides(ctx: &WorkerContext, entry: &Player) -> Result<RoomSides, WorkerError> {
    let room_id = entry
        .room_id
        .ok_or_else(|| WorkerError::NoRoomReference(entry.id.clone()))?;
    let room = ctx
        .store
        .get_room(room_id)
        .await?
        .ok_or(WorkerError::RoomGone(room_id))?;
    let opponent_id = room.opponent_id(&entry.id)?;
    let opponent = ctx
        .store
        .get_player(&opponent_id)
        .await?
        .ok_or(WorkerError::PlayerGone(opponent_id))?;
    Ok(RoomSides { room, opponent })
}

async fn handle_unready(ctx: &WorkerContext, entry: Player) -> Result<(), WorkerError> {
    let sides = resolve_sides(ctx, &entry).await?;

    let not_ready = match_protocol::opponent_ready_message(false)?;
    ctx.store
        .publish_to_player(&sides.opponent.id, &not_ready)
        .await?;

    // Confirm the regression back to the actor when neither side is
    // ready any more.
    if sides.opponent.status != PlayerStatus::InRoomReady {
        ctx.store.publish_to_player(&entry.id, &not_ready).await?;
    }
    Ok(())
}

async fn handle_ready(ctx: &WorkerContext, entry: Player) -> Result<(), WorkerError> {
    let sides = resolve_sides(ctx, &entry).await?;
    let room = sides.room;
    let opponent = sides.opponent;

    let ready = match_protocol::opponent_ready_message(true)?;
    ctx.store.publish_to_player(&opponent.id, &ready).await?;

    if opponent.status != PlayerStatus::InRoomReady {
        let not_ready = match_protocol::opponent_ready_message(false)?;
        ctx.store.publish_to_player(&entry.id, &not_ready).await?;
        return Ok(());
    }

    // Both sides claim ready. Re-read the actor: the store is
    // authoritative, and a replayed entry (or a room already handed off)
    // must not reach the wallet again.
    let actor = ctx
        .store
        .get_player(&entry.id)
        .await?
        .ok_or_else(|| WorkerError::PlayerGone(entry.id.clone()))?;
    if actor.status != PlayerStatus::InRoomReady {
        info!(
            player = %actor.id,
            status = %actor.status,
            "stale ready entry, wallet step skipped"
        );
        return Ok(());
    }

    // Missing adapter fails the handshake but keeps the room: the
    // players may retry or walk away on their own.
    let adapter = ctx
        .wallets
        .get(&room.operator_identifier.operator_name)?;

    let session1 = ctx
        .store
        .get_session(&actor.session_id)
        .await?
        .ok_or_else(|| WorkerError::SessionGone(actor.session_id.clone()))?;
    let session2 = ctx
        .store
        .get_session(&opponent.session_id)
        .await?
        .ok_or_else(|| WorkerError::SessionGone(opponent.session_id.clone()))?;

    let amount = room.stake.minor_units();

    let balance1 = match adapter.post_bet(&session1, amount, room.id).await {
        Ok(balance) => balance,
        Err(err) => {
            // The actor's debit never landed: tear the room down and send
            // the innocent opponent back to the queue.
            warn!(
                pid = std::process::id(),
                room = %room.id,
                session = %session1.id,
                error = %err,
                "first debit failed"
            );
            record_wallet_movement(
                ctx,
                &session1,
                TransactionKind::Bet,
                amount,
                room.id,
                "failed",
                Some(err.to_string()),
            )
            .await?;
            teardown_after_debit_failure(ctx, &room, actor, opponent, &err.to_string()).await?;
            return Ok(());
        }
    };

    let balance2 = match adapter.post_bet(&session2, amount, room.id).await {
        Ok(balance) => balance,
        Err(err) => {
            // Half-failed pair: the first debit landed, the second did
            // not. Reverse the first before anything else.
            warn!(
                pid = std::process::id(),
                room = %room.id,
                session = %session2.id,
                error = %err,
                "second debit failed"
            );
            record_wallet_movement(
                ctx,
                &session1,
                TransactionKind::Bet,
                amount,
                room.id,
                "confirmed",
                None,
            )
            .await?;
            record_wallet_movement(
                ctx,
                &session2,
                TransactionKind::Bet,
                amount,
                room.id,
                "failed",
                Some(err.to_string()),
            )
            .await?;
            compensate_first_debit(ctx, adapter.as_ref(), &room, &actor, &session1, amount)
                .await?;
            teardown_after_debit_failure(ctx, &room, opponent, actor, &err.to_string()).await?;
            return Ok(());
        }
    };

    record_wallet_movement(
        ctx,
        &session1,
        TransactionKind::Bet,
        amount,
        room.id,
        "confirmed",
        None,
    )
    .await?;
    record_wallet_movement(
        ctx,
        &session2,
        TransactionKind::Bet,
        amount,
        room.id,
        "confirmed",
        None,
    )
    .await?;

    let update1 = match_protocol::balance_update_message(to_major(balance1))?;
    let update2 = match_protocol::balance_update_message(to_major(balance2))?;
    ctx.store.publish_to_player(&actor.id, &update1).await?;
    ctx.store.publish_to_player(&opponent.id, &update2).await?;

    let mut actor = actor;
    let mut opponent = opponent;
    actor.set_status(PlayerStatus::InGame)?;
    opponent.set_status(PlayerStatus::InGame)?;
    ctx.store.put_player(&actor).await?;
    ctx.store.put_player(&opponent).await?;

    let mut room = room;
    refresh_seats(&mut room, &[&actor, &opponent]);
    ctx.store.push_room_for_game(&room).await?;
    ctx.store.remove_room(room.id).await?;

    info!(
        pid = std::process::id(),
        room = %room.id,
        "both debits landed, room handed to game creation"
    );
    Ok(())
}

/// Shared teardown for a failed debit: `failed` is the player whose debit
/// was rejected, `innocent` the counterparty whose money is (now) safe.
async fn teardown_after_debit_failure(
    ctx: &WorkerContext,
    room: &Room,
    mut failed: Player,
    innocent: Player,
    reason: &str,
) -> Result<(), WorkerError> {
    failed.reset_to_online()?;
    ctx.store.put_player(&failed).await?;
    let error_frame = match_protocol::error_message(reason)?;
    ctx.store.publish_to_player(&failed.id, &error_frame).await?;

    ctx.store.remove_room(room.id).await?;

    let left = match_protocol::opponent_left_room_message()?;
    ctx.store.publish_to_player(&innocent.id, &left).await?;
    requeue_player(ctx, innocent).await
}

/// Best-effort immediate credit-back; on failure the obligation goes to
/// the durable compensation queue for the drainer.
async fn compensate_first_debit(
    ctx: &WorkerContext,
    adapter: &dyn WalletAdapter,
    room: &Room,
    debited: &Player,
    session: &Session,
    amount: i64,
) -> Result<(), WorkerError> {
    match adapter.post_win(session, amount, room.id).await {
        Ok(balance) => {
            record_wallet_movement(
                ctx,
                session,
                TransactionKind::Refund,
                amount,
                room.id,
                "confirmed",
                Some("debit reversal after failed pairing debit".to_string()),
            )
            .await?;
            let update = match_protocol::balance_update_message(to_major(balance))?;
            ctx.store.publish_to_player(&debited.id, &update).await?;
        }
        Err(err) => {
            error!(
                pid = std::process::id(),
                room = %room.id,
                session = %session.id,
                error = %err,
                "immediate credit-back failed, queueing compensation"
            );
            ctx.store
                .push_compensation(&CompensationEntry {
                    session_id: session.id.clone(),
                    operator_name: room.operator_identifier.operator_name.clone(),
                    amount,
                    round_id: room.id,
                    currency: room.currency.clone(),
                    attempts: 0,
                    reason: err.to_string(),
                    created_at: Utc::now(),
                })
                .await?;
        }
    }
    Ok(())
}
