use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::post;
use axum::{Json, Router};
use futures::{Stream, StreamExt};

use super::handler::run_job;
use super::types::{JobEnvelope, JobEvent};
use crate::app_state::AppState;

/// Platform-facing job endpoints.
pub fn worker_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/run", post(run_stream))
        .route("/runsync", post(run_sync))
        .with_state(state)
}

/// Stream events as they are emitted.
async fn run_stream(
    State(state): State<Arc<AppState>>,
    Json(job): Json<JobEnvelope>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let (tx, rx) = async_channel::bounded(16);
    tokio::spawn(run_job(state, job, tx));

    let stream = rx.map(|event: JobEvent| Event::default().json_data(&event));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Run the job to completion and answer with the aggregated event sequence.
async fn run_sync(
    State(state): State<Arc<AppState>>,
    Json(job): Json<JobEnvelope>,
) -> Json<Vec<JobEvent>> {
    let (tx, rx) = async_channel::unbounded();
    run_job(state, job, tx).await;

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    Json(events)
}
