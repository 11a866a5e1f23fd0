use std::time::Duration;

use checkers_domain::{PlayerStatus, Room};
use match_store::keys;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{flip_colors, refresh_seats, requeue_player, WorkerContext, WorkerError};

pub fn spawn_create_loop(ctx: WorkerContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(err) = create_round(&ctx, None).await {
                warn!(
                    pid = std::process::id(),
                    error = %err,
                    "create-room round failed"
                );
            }
        }
    })
}

pub fn spawn_join_loop(ctx: WorkerContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(err) = join_round(&ctx, None).await {
                warn!(
                    pid = std::process::id(),
                    error = %err,
                    "join-room round failed"
                );
            }
        }
    })
}

/// Solo path: the player opens a one-seat waiting room at their stake
/// instead of blind-matching.
pub async fn create_round(
    ctx: &WorkerContext,
    timeout: Option<Duration>,
) -> Result<(), WorkerError> {
    let Some(entry) = ctx.store.pop_player(keys::CREATE_ROOM_QUEUE, timeout).await? else {
        return Ok(());
    };
    let mut creator = ctx
        .store
        .get_player(&entry.id)
        .await?
        .ok_or_else(|| WorkerError::PlayerGone(entry.id.clone()))?;

    creator.set_status(PlayerStatus::InRoom)?;
    let mut room = Room::waiting(creator.clone());
    creator.room_id = Some(room.id);
    refresh_seats(&mut room, &[&creator]);

    ctx.store.put_room(&room).await?;
    ctx.store.put_player(&creator).await?;
    ctx.store.register_waiting_room(&room).await?;

    let frame = match_protocol::room_created_message(&room)?;
    ctx.store.publish_to_player(&creator.id, &frame).await?;
    info!(
        pid = std::process::id(),
        room = %room.id,
        creator = %creator.id,
        stake = %room.stake,
        "waiting room opened"
    );
    Ok(())
}

/// Solo path: claim a waiting room at the same stake and pair with its
/// creator. Falls back to blind matchmaking when none is open.
pub async fn join_round(
    ctx: &WorkerContext,
    timeout: Option<Duration>,
) -> Result<(), WorkerError> {
    let Some(entry) = ctx.store.pop_player(keys::JOIN_ROOM_QUEUE, timeout).await? else {
        return Ok(());
    };
    let mut joiner = ctx
        .store
        .get_player(&entry.id)
        .await?
        .ok_or_else(|| WorkerError::PlayerGone(entry.id.clone()))?;
    if !joiner.eligible_for_queue() {
        info!(player = %joiner.id, status = %joiner.status, "dropping ineligible join request");
        return Ok(());
    }

    let Some(mut room) = ctx.store.claim_waiting_room(joiner.selected_stake).await? else {
        info!(
            player = %joiner.id,
            stake = %joiner.selected_stake,
            "no waiting room open, falling back to blind queue"
        );
        return requeue_player(ctx, joiner).await;
    };

    let creator = match ctx.store.get_player(&room.player1.id).await? {
        Some(creator) => creator,
        None => {
            // The creator record vanished; drop the husk and send the
            // joiner to the blind queue.
            ctx.store.remove_room(room.id).await?;
            return requeue_player(ctx, joiner).await;
        }
    };

    joiner.set_status(PlayerStatus::InRoom)?;
    joiner.room_id = Some(room.id);
    room.seat_player2(joiner.clone())?;

    let (creator_color, joiner_color) = flip_colors();
    room.current_player_id = Some(if creator_color == 1 {
        creator.id.clone()
    } else {
        joiner.id.clone()
    });
    refresh_seats(&mut room, &[&creator, &joiner]);

    ctx.store.put_room(&room).await?;
    ctx.store.put_player(&joiner).await?;
    ctx.store.put_player(&creator).await?;

    let frame_creator = match_protocol::paired_message(creator_color, &joiner.name, room.id)?;
    let frame_joiner = match_protocol::paired_message(joiner_color, &creator.name, room.id)?;
    ctx.store
        .publish_to_player(&creator.id, &frame_creator)
        .await?;
    ctx.store
        .publish_to_player(&joiner.id, &frame_joiner)
        .await?;

    info!(
        pid = std::process::id(),
        room = %room.id,
        creator = %creator.id,
        joiner = %joiner.id,
        "waiting room filled"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{frames_for, player, rig};
    use checkers_domain::Stake;
    use match_protocol::{PairedValue, RoomCreatedValue};

    const STAKE: Stake = Stake(3.0);

    #[tokio::test]
    async fn create_opens_a_waiting_room_and_notifies_the_creator() {
        let rig = rig();
        let a = player("a", PlayerStatus::InQueue, STAKE);
        rig.ctx.store.put_player(&a).await.expect("put");
        rig.ctx
            .store
            .push_player(keys::CREATE_ROOM_QUEUE, &a)
            .await
            .expect("push");

        create_round(&rig.ctx, Some(Duration::from_millis(10)))
            .await
            .expect("round");

        let frames = frames_for(&rig.store, &a.id);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0, "room_created");
        let value: RoomCreatedValue =
            serde_json::from_value(frames[0].1.clone()).expect("room created value");
        assert_eq!(value.player, a.name);
        assert_eq!(value.bet_value, STAKE.major());

        let stored_a = rig
            .ctx
            .store
            .get_player(&a.id)
            .await
            .expect("get")
            .expect("player");
        assert_eq!(stored_a.status, PlayerStatus::InRoom);
        let room = rig
            .ctx
            .store
            .get_room(value.id)
            .await
            .expect("get")
            .expect("room");
        assert!(room.is_waiting());
    }

    #[tokio::test]
    async fn join_fills_the_waiting_room_with_flipped_colors() {
        let rig = rig();
        let a = player("a", PlayerStatus::InQueue, STAKE);
        rig.ctx.store.put_player(&a).await.expect("put");
        rig.ctx
            .store
            .push_player(keys::CREATE_ROOM_QUEUE, &a)
            .await
            .expect("push");
        create_round(&rig.ctx, Some(Duration::from_millis(10)))
            .await
            .expect("create");

        let b = player("b", PlayerStatus::InQueue, STAKE);
        rig.ctx.store.put_player(&b).await.expect("put");
        rig.ctx
            .store
            .push_player(keys::JOIN_ROOM_QUEUE, &b)
            .await
            .expect("push");
        join_round(&rig.ctx, Some(Duration::from_millis(10)))
            .await
            .expect("join");

        let frames_a = frames_for(&rig.store, &a.id);
        let paired_a: PairedValue =
            serde_json::from_value(frames_a[1].1.clone()).expect("paired value");
        let frames_b = frames_for(&rig.store, &b.id);
        let paired_b: PairedValue =
            serde_json::from_value(frames_b[0].1.clone()).expect("paired value");
        assert_eq!(paired_a.room_id, paired_b.room_id);
        assert_eq!(paired_a.color + paired_b.color, 1);

        let room = rig
            .ctx
            .store
            .get_room(paired_a.room_id)
            .await
            .expect("get")
            .expect("room");
        assert!(!room.is_waiting());
        let stored_b = rig
            .ctx
            .store
            .get_player(&b.id)
            .await
            .expect("get")
            .expect("player");
        assert_eq!(stored_b.status, PlayerStatus::InRoom);
        assert_eq!(stored_b.room_id, Some(room.id));

        // The room is no longer claimable.
        assert!(rig
            .ctx
            .store
            .claim_waiting_room(STAKE)
            .await
            .expect("claim")
            .is_none());
    }

    #[tokio::test]
    async fn join_without_a_waiting_room_falls_back_to_blind_queue() {
        let rig = rig();
        let b = player("b", PlayerStatus::InQueue, STAKE);
        rig.ctx.store.put_player(&b).await.expect("put");
        rig.ctx
            .store
            .push_player(keys::JOIN_ROOM_QUEUE, &b)
            .await
            .expect("push");

        join_round(&rig.ctx, Some(Duration::from_millis(10)))
            .await
            .expect("join");

        assert_eq!(rig.store.queue_len(&keys::queue_key(STAKE)), 1);
        assert_eq!(rig.ctx.store.queue_count(STAKE).await.expect("count"), 1);
        let frames = frames_for(&rig.store, &b.id);
        assert_eq!(frames[0].0, "queue_confirmation");
    }
}
