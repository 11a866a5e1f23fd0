use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use match_store::{MatchStore, RedisMatchStore};
use observability::init_tracing_with_filter;
use platform_core::AppConfig;
use room_worker::{
    compensation, leave, matchmaker, ready, register_http_operators, solo, WorkerContext,
};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use transaction_store::PostgresTransactionRepository;
use wallet_adapter::{HttpWalletAdapter, OperatorRegistry};

const COMPENSATION_BACKOFF: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing_with_filter(&config.app.service_name, &config.observability.log_filter);

    let store = Arc::new(RedisMatchStore::connect(&config.redis.url()).await?);
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&config.postgres.connection_string())
        .await?;
    let transactions = Arc::new(PostgresTransactionRepository::new(pool));

    let mut wallets = OperatorRegistry::new();
    let http_adapter = Arc::new(HttpWalletAdapter::new());
    let registered = register_http_operators(
        &mut wallets,
        transactions.as_ref(),
        &config.operators.http,
        http_adapter,
    )
    .await?;
    info!(registered, "operator wallets registered");

    let ctx = WorkerContext {
        store: store.clone() as Arc<dyn MatchStore>,
        wallets: Arc::new(wallets),
        transactions,
    };

    let mut workers = matchmaker::spawn_stake_loops(&ctx);
    workers.push(ready::spawn_ready_loop(ctx.clone()));
    workers.push(leave::spawn_leave_loop(ctx.clone()));
    workers.push(solo::spawn_create_loop(ctx.clone()));
    workers.push(solo::spawn_join_loop(ctx.clone()));
    workers.push(compensation::spawn_compensation_loop(
        ctx.clone(),
        COMPENSATION_BACKOFF,
    ));
    info!(
        pid = std::process::id(),
        workers = workers.len(),
        "room worker loops running"
    );

    let listener = tokio::net::TcpListener::bind(&config.ops_http.bind_addr).await?;
    info!(bind_addr = %config.ops_http.bind_addr, "ops http listening");
    axum::serve(listener, ops_http::build_router(store as Arc<dyn MatchStore>)).await?;
    Ok(())
}
