mod api_util;
mod state_actor;

use api_util::ApiError;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Deserialize;
use state_actor::StateActorHandle;
use std::collections::BTreeMap;
use tower_http::trace::TraceLayer;
use tracing::info;
use upwatch::{sla, Service, ServiceSummary, Status, StatusEvent};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let state_actor_handle = StateActorHandle::new(BTreeMap::new());

    let app = Router::new()
        .route("/services", get(list_services).post(create_service))
        .route("/services/:name/status", get(get_status).post(post_status))
        .route("/services/:name/history", get(get_history))
        .route("/services/:name/sla", get(get_sla))
        .layer(TraceLayer::new_for_http())
        .with_state(state_actor_handle);

    let cli = Cli::parse();

    info!("Binding to {}", cli.address);
    let listener = tokio::net::TcpListener::bind(cli.address)
        .await
        .expect("Couldn't create TCP listener");
    info!("Starting API server");
    axum::serve(listener, app)
        .await
        .expect("Couldn't start API server");
}

#[derive(Deserialize)]
struct CreateService {
    name: String,
    description: String,
}

async fn create_service(
    State(state_actor_handle): State<StateActorHandle>,
    Json(body): Json<CreateService>,
) -> Result<(StatusCode, Json<ServiceSummary>), ApiError> {
    let summary = state_actor_handle
        .create_service(body.name, body.description)
        .await?;
    Ok((StatusCode::OK, Json(summary)))
}

async fn list_services(
    State(state_actor_handle): State<StateActorHandle>,
) -> (StatusCode, Json<Vec<ServiceSummary>>) {
    let summaries = state_actor_handle.list_services().await;
    (StatusCode::OK, Json(summaries))
}

#[derive(Deserialize)]
struct StatusUpdate {
    status: Status,
    /// Event time; the server clock is used when omitted.
    timestamp: Option<DateTime<Utc>>,
}

async fn post_status(
    State(state_actor_handle): State<StateActorHandle>,
    Path(name): Path<String>,
    Query(update): Query<StatusUpdate>,
) -> Result<(StatusCode, Json<StatusEvent>), ApiError> {
    let time = update.timestamp.unwrap_or_else(Utc::now);
    let event = state_actor_handle
        .append_event(name, update.status, time)
        .await?;
    Ok((StatusCode::OK, Json(event)))
}

async fn get_status(
    State(state_actor_handle): State<StateActorHandle>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<Status>), ApiError> {
    let latest = state_actor_handle.latest_event(name).await?;
    let status = latest.map_or(Status::Working, |e| e.status);
    Ok((StatusCode::OK, Json(status)))
}

async fn get_history(
    State(state_actor_handle): State<StateActorHandle>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<Service>), ApiError> {
    let service = state_actor_handle.history(name).await?;
    Ok((StatusCode::OK, Json(service)))
}

#[derive(Deserialize)]
struct SlaWindow {
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
}

async fn get_sla(
    State(state_actor_handle): State<StateActorHandle>,
    Path(name): Path<String>,
    Query(window): Query<SlaWindow>,
) -> Result<(StatusCode, Json<sla::SlaReport>), ApiError> {
    let events = state_actor_handle
        .events_in_range(name, window.start_date, window.end_date)
        .await?;
    let report = sla::compute_sla(&events, window.start_date, window.end_date)?;
    Ok((StatusCode::OK, Json(report)))
}

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Listening address for the API
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    address: String,
}
