use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use transaction_store::TransactionKind;

use crate::{record_wallet_movement, WorkerContext, WorkerError};

pub fn spawn_compensation_loop(ctx: WorkerContext, backoff: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(err) = compensation_round(&ctx, Some(backoff)).await {
                warn!(
                    pid = std::process::id(),
                    error = %err,
                    "compensation round failed"
                );
                // The entry went back to the queue; give the wallet some
                // air before the next attempt.
                tokio::time::sleep(backoff).await;
            }
        }
    })
}

/// Retries one queued credit-back. A failed attempt re-pushes the entry
/// with its attempt counter bumped; the debt is never silently dropped
/// while its session resolves.
pub async fn compensation_round(
    ctx: &WorkerContext,
    timeout: Option<Duration>,
) -> Result<(), WorkerError> {
    let Some(mut entry) = ctx.store.pop_compensation(timeout).await? else {
        return Ok(());
    };

    let Some(session) = ctx.store.get_session(&entry.session_id).await? else {
        // The session record expired under the debt; all that is left is
        // to hand the case to the operator via the log.
        error!(
            session = %entry.session_id,
            round = %entry.round_id,
            amount = entry.amount,
            attempts = entry.attempts,
            "dropping compensation for vanished session"
        );
        return Ok(());
    };

    let adapter = match ctx.wallets.get(&entry.operator_name) {
        Ok(adapter) => adapter,
        Err(err) => {
            entry.attempts += 1;
            ctx.store.push_compensation(&entry).await?;
            return Err(err.into());
        }
    };

    match adapter.post_win(&session, entry.amount, entry.round_id).await {
        Ok(_balance) => {
            record_wallet_movement(
                ctx,
                &session,
                TransactionKind::Refund,
                entry.amount,
                entry.round_id,
                "confirmed",
                Some(format!("compensation after {} retries", entry.attempts)),
            )
            .await?;
            info!(
                pid = std::process::id(),
                session = %session.id,
                round = %entry.round_id,
                amount = entry.amount,
                "compensation credit landed"
            );
            Ok(())
        }
        Err(err) => {
            entry.attempts += 1;
            ctx.store.push_compensation(&entry).await?;
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{player, rig, session_for};
    use checkers_domain::{PlayerStatus, RoomId, Stake};
    use chrono::Utc;
    use match_store::CompensationEntry;

    fn entry_for(session_id: checkers_domain::SessionId, amount: i64) -> CompensationEntry {
        CompensationEntry {
            session_id,
            operator_name: crate::testkit::OPERATOR.to_string(),
            amount,
            round_id: RoomId::new(),
            currency: "EUR".to_string(),
            attempts: 0,
            reason: "debit reversal".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn failed_retry_goes_back_with_a_bumped_counter() {
        let rig = rig();
        let a = player("a", PlayerStatus::Online, Stake(5.0));
        let session = session_for(&a, 0);
        rig.store.insert_session(session.clone());
        rig.wallet.fail_credits_for(session.id.clone(), "still down");

        rig.ctx
            .store
            .push_compensation(&entry_for(session.id.clone(), 500))
            .await
            .expect("push");

        let err = compensation_round(&rig.ctx, Some(Duration::from_millis(10)))
            .await
            .expect_err("credit still failing");
        assert!(matches!(err, WorkerError::Wallet(_)));

        let requeued = rig
            .ctx
            .store
            .pop_compensation(Some(Duration::from_millis(10)))
            .await
            .expect("pop")
            .expect("entry");
        assert_eq!(requeued.attempts, 1);
    }

    #[tokio::test]
    async fn retry_lands_once_the_wallet_recovers() {
        let rig = rig();
        let a = player("a", PlayerStatus::Online, Stake(5.0));
        let session = session_for(&a, 0);
        rig.store.insert_session(session.clone());
        rig.wallet.set_balance(session.id.clone(), 0);

        rig.ctx
            .store
            .push_compensation(&entry_for(session.id.clone(), 500))
            .await
            .expect("push");
        compensation_round(&rig.ctx, Some(Duration::from_millis(10)))
            .await
            .expect("round");

        assert_eq!(rig.wallet.balance(&session.id), 500);
        assert_eq!(
            rig.transactions
                .records_of_kind(TransactionKind::Refund)
                .len(),
            1
        );
        assert!(rig
            .ctx
            .store
            .pop_compensation(Some(Duration::from_millis(10)))
            .await
            .expect("pop")
            .is_none());
    }

    #[tokio::test]
    async fn vanished_session_is_dropped_with_a_log_trail() {
        let rig = rig();
        rig.ctx
            .store
            .push_compensation(&entry_for(checkers_domain::SessionId::from("ghost"), 500))
            .await
            .expect("push");

        compensation_round(&rig.ctx, Some(Duration::from_millis(10)))
            .await
            .expect("round");
        assert!(rig
            .ctx
            .store
            .pop_compensation(Some(Duration::from_millis(10)))
            .await
            .expect("pop")
            .is_none());
    }
}
