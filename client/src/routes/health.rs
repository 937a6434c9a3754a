use crate::client::ChatClient;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    build_id: String,
    connected: bool,
}

pub fn routes() -> Router<Arc<ChatClient>> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(client): State<Arc<ChatClient>>) -> Json<HealthResponse> {
    let state = client.state();
    Json(HealthResponse {
        status: "ok",
        build_id: state.build_id().to_string(),
        connected: state.read(|view| view.connected).await,
    })
}
