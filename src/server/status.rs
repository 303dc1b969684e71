use super::ServerState;
use crate::aggregate::{Aggregator, GlobalAggregate, aggregate_store};
use crate::scheduler::QueueProgress;

use axum::{Extension, Json, Router, http::StatusCode, routing::get};
use serde::{Deserialize, Serialize};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub progress: QueueProgress,
    pub complete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregateResponse {
    pub aggregate: Option<GlobalAggregate>,
    pub error: Option<String>,
}

pub fn router(shared: Arc<ServerState>) -> Router {
    Router::new()
        .route("/status", get(handle_status))
        .route("/aggregate", get(handle_aggregate))
        .layer(Extension(shared))
}

/// Binds `addr` and serves the status routes in the background.
pub async fn spawn(addr: SocketAddr, shared: Arc<ServerState>) -> io::Result<JoinHandle<()>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Status endpoint listening on {}", listener.local_addr()?);

    let app = router(shared);
    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Status endpoint failed: {}", e);
        }
    }))
}

pub async fn handle_status(
    Extension(shared): Extension<Arc<ServerState>>,
) -> (StatusCode, Json<StatusResponse>) {
    let progress = shared.queue.progress();
    (
        StatusCode::OK,
        Json(StatusResponse {
            progress,
            complete: progress.is_complete(),
        }),
    )
}

/// The aggregate over whatever is stored right now; partial while the run is in progress.
pub async fn handle_aggregate(
    Extension(shared): Extension<Arc<ServerState>>,
) -> (StatusCode, Json<AggregateResponse>) {
    let total = shared.queue.progress().total as u32;
    let aggregator = Aggregator::with_expected_chunks(total);

    match aggregate_store(shared.store.clone(), &aggregator).await {
        Ok(aggregate) => (
            StatusCode::OK,
            Json(AggregateResponse {
                aggregate: Some(aggregate),
                error: None,
            }),
        ),
        Err(e) => {
            tracing::error!("Failed to aggregate stored results: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AggregateResponse {
                    aggregate: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}
