use super::ApiError;
use crate::client::ChatClient;
use crate::contract::TxHash;
use crate::state::TxState;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chainchat_messaging::ChatMessage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Serialize)]
pub struct MessageView {
    id: String,
    sender: String,
    sender_display: String,
    content: String,
    timestamp: u64,
    display_timestamp: String,
    simulated: bool,
}

impl From<&ChatMessage> for MessageView {
    fn from(message: &ChatMessage) -> Self {
        Self {
            id: message.id.to_string(),
            sender: message.sender.to_string(),
            sender_display: message.sender_display.clone(),
            content: message.content.clone(),
            timestamp: message.timestamp,
            display_timestamp: message.display_timestamp.clone(),
            simulated: message.is_simulated(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    messages: Vec<MessageView>,
    loading: bool,
    ai_thinking: bool,
    can_send: bool,
    send_state: TxState,
    username_state: TxState,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct UsernameRequest {
    pub name: String,
}

/// `tx` is absent when the input was blank and nothing was submitted.
#[derive(Debug, Serialize)]
pub struct TxResponse {
    tx: Option<TxHash>,
    state: TxState,
}

pub fn routes() -> Router<Arc<ChatClient>> {
    Router::new()
        .route("/messages", get(list).post(send))
        .route("/username", post(set_username))
}

async fn list(State(client): State<Arc<ChatClient>>) -> Json<MessagesResponse> {
    let response = client
        .state()
        .read(|view| MessagesResponse {
            messages: view.messages.iter().map(MessageView::from).collect(),
            loading: view.loading_messages,
            ai_thinking: view.ai_thinking(),
            can_send: view.can_send(),
            send_state: view.send_state,
            username_state: view.username_state,
            error: view.error.clone(),
        })
        .await;
    Json(response)
}

async fn send(
    State(client): State<Arc<ChatClient>>,
    Json(request): Json<SendRequest>,
) -> Result<Json<TxResponse>, ApiError> {
    debug!(len = request.text.len(), "send request");
    let tx = client.send_message(&request.text).await?;
    let state = client.state().read(|view| view.send_state).await;
    Ok(Json(TxResponse { tx, state }))
}

async fn set_username(
    State(client): State<Arc<ChatClient>>,
    Json(request): Json<UsernameRequest>,
) -> Result<Json<TxResponse>, ApiError> {
    let tx = client.set_username(&request.name).await?;
    let state = client.state().read(|view| view.username_state).await;
    Ok(Json(TxResponse { tx, state }))
}
