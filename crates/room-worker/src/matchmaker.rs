use std::time::Duration;

use checkers_domain::{Player, PlayerStatus, Room, Stake, VALID_STAKES};
use match_store::keys;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{flip_colors, refresh_seats, WorkerContext, WorkerError};

#[derive(Debug, Clone, Copy)]
pub struct MatchmakerSettings {
    /// Bounded wait for the second player of a pair.
    pub second_pop_timeout: Duration,
    /// Breather before a lone player is pushed back to the tail.
    pub requeue_backoff: Duration,
}

impl Default for MatchmakerSettings {
    fn default() -> Self {
        Self {
            second_pop_timeout: Duration::from_secs(5),
            requeue_backoff: Duration::from_secs(3),
        }
    }
}

/// One independent pairing task per permitted stake.
pub fn spawn_stake_loops(ctx: &WorkerContext) -> Vec<JoinHandle<()>> {
    VALID_STAKES
        .iter()
        .map(|stake| {
            let ctx = ctx.clone();
            let stake = *stake;
            tokio::spawn(async move {
                let settings = MatchmakerSettings::default();
                loop {
                    if let Err(err) = pairing_round(&ctx, stake, &settings).await {
                        warn!(
                            pid = std::process::id(),
                            stake = %stake,
                            error = %err,
                            "pairing round failed"
                        );
                    }
                }
            })
        })
        .collect()
}

/// One pass over the stake queue: pop one player, try to pop a second,
/// pair them. Counter rule: a popped entry that is re-pushed costs
/// nothing; a popped entry that leaves the queue decrements once.
pub async fn pairing_round(
    ctx: &WorkerContext,
    stake: Stake,
    settings: &MatchmakerSettings,
) -> Result<(), WorkerError> {
    let queue = keys::queue_key(stake);
    let Some(entry1) = ctx.store.pop_player(&queue, None).await? else {
        return Ok(());
    };

    // The queue entry is a snapshot; the KV record is authoritative.
    let player1 = match ctx.store.get_player(&entry1.id).await? {
        Some(player) if player.eligible_for_queue() => player,
        _ => {
            info!(player = %entry1.id, stake = %stake, "evicting ineligible entry");
            ctx.store.decrement_queue_count(stake).await?;
            return Ok(());
        }
    };

    let entry2 = match ctx
        .store
        .pop_player(&queue, Some(settings.second_pop_timeout))
        .await
    {
        Ok(Some(entry)) => entry,
        Ok(None) => {
            tokio::time::sleep(settings.requeue_backoff).await;
            ctx.store.push_player(&queue, &player1).await?;
            return Ok(());
        }
        Err(err) => {
            warn!(stake = %stake, error = %err, "second pop failed, re-queueing player one");
            tokio::time::sleep(settings.requeue_backoff).await;
            ctx.store.push_player(&queue, &player1).await?;
            return Ok(());
        }
    };

    if entry2.id == player1.id {
        // The same player was enqueued twice; put one copy back and
        // correct the double count.
        ctx.store.push_player(&queue, &player1).await?;
        ctx.store.decrement_queue_count(stake).await?;
        return Ok(());
    }

    let player2 = match ctx.store.get_player(&entry2.id).await? {
        Some(player) if player.eligible_for_queue() => player,
        _ => {
            info!(player = %entry2.id, stake = %stake, "evicting ineligible second entry");
            tokio::time::sleep(settings.requeue_backoff).await;
            ctx.store.push_player(&queue, &player1).await?;
            ctx.store.decrement_queue_count(stake).await?;
            return Ok(());
        }
    };

    pair_players(ctx, player1, player2).await?;
    // Both popped entries left the queue for good.
    ctx.store.decrement_queue_count(stake).await?;
    ctx.store.decrement_queue_count(stake).await?;
    Ok(())
}

/// Seats two eligible players in a fresh room, flips for color, persists
/// everything, and notifies both.
pub(crate) async fn pair_players(
    ctx: &WorkerContext,
    mut player1: Player,
    mut player2: Player,
) -> Result<(), WorkerError> {
    let mut room = Room::paired(player1.clone(), player2.clone())?;
    let (color1, color2) = flip_colors();
    room.current_player_id = Some(if color1 == 1 {
        player1.id.clone()
    } else {
        player2.id.clone()
    });

    player1.set_status(PlayerStatus::InRoom)?;
    player1.room_id = Some(room.id);
    player2.set_status(PlayerStatus::InRoom)?;
    player2.room_id = Some(room.id);
    refresh_seats(&mut room, &[&player1, &player2]);

    ctx.store.put_room(&room).await?;
    ctx.store.put_player(&player1).await?;
    ctx.store.put_player(&player2).await?;

    let frame1 = match_protocol::paired_message(color1, &player2.name, room.id)?;
    let frame2 = match_protocol::paired_message(color2, &player1.name, room.id)?;
    ctx.store.publish_to_player(&player1.id, &frame1).await?;
    ctx.store.publish_to_player(&player2.id, &frame2).await?;

    info!(
        pid = std::process::id(),
        room = %room.id,
        player1 = %player1.id,
        player2 = %player2.id,
        stake = %room.stake,
        "players paired"
    );
    Ok(())
}
