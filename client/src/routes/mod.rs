pub mod health;
pub mod messages;
pub mod session;

use crate::client::{ChatClient, ClientError};
use crate::messaging::ChatError;
use crate::wallet::WalletError;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use http::StatusCode;
use serde_json::json;
use std::sync::Arc;

pub fn router(client: Arc<ChatClient>) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(session::routes())
        .merge(messages::routes())
        .with_state(client)
}

/// Maps client failures onto HTTP responses with a JSON `error` body.
#[derive(Debug)]
pub struct ApiError(ClientError);

impl<E: Into<ClientError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            ClientError::Wallet(WalletError::ProviderUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
            ClientError::Wallet(WalletError::UserRejected(_)) => StatusCode::FORBIDDEN,
            ClientError::Wallet(WalletError::Connection(_)) => StatusCode::BAD_GATEWAY,
            ClientError::Chat(ChatError::Fetch(_) | ChatError::Send { .. }) => StatusCode::BAD_GATEWAY,
            ClientError::Chat(
                ChatError::NotConnected | ChatError::InProgress | ChatError::ReplyPending,
            ) => StatusCode::CONFLICT,
            ClientError::Chat(ChatError::UsernameTooLong { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
