use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use checkers_domain::VALID_STAKES;
use match_store::MatchStore;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueGauge {
    pub stake: f64,
    pub queued: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueuesResponse {
    pub queues: Vec<QueueGauge>,
}

pub fn build_router(store: Arc<dyn MatchStore>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/queues", get(queues))
        .with_state(store)
}

async fn health() -> Json<HealthResponse> {
    info!(route = "/health", "ops http request");
    Json(HealthResponse {
        ok: true,
        service: "room-worker",
    })
}

// Counter reads are approximate gauges, not exact membership.
async fn queues(State(store): State<Arc<dyn MatchStore>>) -> Json<QueuesResponse> {
    info!(route = "/queues", "ops http request");
    let mut gauges = Vec::with_capacity(VALID_STAKES.len());
    for stake in VALID_STAKES {
        let queued = store.queue_count(stake).await.unwrap_or(0);
        gauges.push(QueueGauge {
            stake: stake.major(),
            queued,
        });
    }
    Json(QueuesResponse { queues: gauges })
}
