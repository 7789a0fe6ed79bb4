use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::instrument;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod app_state;
mod config;
mod consts;
mod encode;
mod error;
mod fetch;
mod model;
mod upload;
mod worker;

use crate::config::AppConfig;
use app_state::AppState;

async fn main_impl() -> Result<()> {
    let conf = AppConfig::load()?;
    let shared_state = Arc::new(AppState::new(conf.clone()));

    let router = Router::new()
        .route("/healthz", get(health_handler))
        .merge(worker::worker_router(shared_state))
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], conf.port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!("listening on {addr}");

    axum::serve(listener, router).await?;

    Ok(())
}

/// One-shot local mode: run a literal job payload against the production
/// collaborators and print every emitted event.
async fn run_test(raw: &str) -> Result<()> {
    let job: worker::JobEnvelope = match serde_json::from_str(raw) {
        Ok(job) => job,
        Err(_) => {
            println!("Error: Invalid JSON in test_input");
            return Ok(());
        }
    };

    let conf = AppConfig::load()?;
    let state = Arc::new(AppState::new(conf));

    let (tx, rx) = async_channel::unbounded();
    let task = tokio::spawn(worker::run_job(state, job, tx));

    while let Ok(event) = rx.recv().await {
        println!("{}", serde_json::to_string_pretty(&event)?);
    }
    task.await?;

    Ok(())
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // Default to info level, with warn for noisy crates
                format!(
                    "{}=info,tower_http=warn,axum::rejection=warn,hyper=warn,reqwest=warn",
                    env!("CARGO_CRATE_NAME")
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async {
            match args.iter().position(|arg| arg == "--test_input") {
                Some(index) => match args.get(index + 1) {
                    Some(raw) => run_test(raw).await.unwrap(),
                    None => println!("Error: --test_input requires a JSON string argument"),
                },
                None => main_impl().await.unwrap(),
            }
        });
}

#[instrument]
async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
