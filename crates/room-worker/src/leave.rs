use std::time::Duration;

use match_store::keys;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{requeue_player, WorkerContext, WorkerError};

pub fn spawn_leave_loop(ctx: WorkerContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(err) = leave_round(&ctx, None).await {
                warn!(
                    pid = std::process::id(),
                    error = %err,
                    "leave round failed"
                );
            }
        }
    })
}

/// A player walked out of their room: notify and re-queue the opponent,
/// reset the leaver, clear the room.
pub async fn leave_round(
    ctx: &WorkerContext,
    timeout: Option<Duration>,
) -> Result<(), WorkerError> {
    let Some(entry) = ctx.store.pop_player(keys::LEAVE_ROOM_QUEUE, timeout).await? else {
        return Ok(());
    };
    let room_id = entry
        .room_id
        .ok_or_else(|| WorkerError::NoRoomReference(entry.id.clone()))?;
    let room = ctx
        .store
        .get_room(room_id)
        .await?
        .ok_or(WorkerError::RoomGone(room_id))?;

    if !room.is_waiting() {
        let opponent_id = room.opponent_id(&entry.id)?;
        let opponent = ctx
            .store
            .get_player(&opponent_id)
            .await?
            .ok_or(WorkerError::PlayerGone(opponent_id))?;
        let left = match_protocol::opponent_left_room_message()?;
        ctx.store.publish_to_player(&opponent.id, &left).await?;
        requeue_player(ctx, opponent).await?;
    }

    let mut leaver = ctx
        .store
        .get_player(&entry.id)
        .await?
        .ok_or_else(|| WorkerError::PlayerGone(entry.id.clone()))?;
    leaver.reset_to_online()?;
    ctx.store.put_player(&leaver).await?;

    ctx.store.remove_room(room.id).await?;
    ctx.store
        .decrement_queue_count(leaver.selected_stake)
        .await?;
    info!(
        pid = std::process::id(),
        room = %room.id,
        leaver = %leaver.id,
        "room cleared after leave"
    );
    Ok(())
}
