use super::ApiError;
use crate::client::ChatClient;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chainchat_messaging::Address;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    account: Option<Address>,
    short_account: Option<String>,
    connected: bool,
    connecting: bool,
    nickname: String,
    error: Option<String>,
    reloads: u64,
}

pub fn routes() -> Router<Arc<ChatClient>> {
    Router::new()
        .route("/session", get(current))
        .route("/session/connect", post(connect))
        .route("/session/disconnect", post(disconnect))
}

async fn current(State(client): State<Arc<ChatClient>>) -> Json<SessionResponse> {
    Json(describe(&client).await)
}

async fn connect(
    State(client): State<Arc<ChatClient>>,
) -> Result<Json<SessionResponse>, ApiError> {
    client.connect().await?;
    Ok(Json(describe(&client).await))
}

async fn disconnect(State(client): State<Arc<ChatClient>>) -> Json<SessionResponse> {
    client.disconnect().await;
    Json(describe(&client).await)
}

async fn describe(client: &ChatClient) -> SessionResponse {
    client
        .state()
        .read(|view| SessionResponse {
            short_account: view.account.as_ref().map(Address::short),
            account: view.account.clone(),
            connected: view.connected,
            connecting: view.connecting,
            nickname: view.nickname.clone(),
            error: view.error.clone(),
            reloads: view.reloads,
        })
        .await
}

#[cfg(test)]
mod tests {
    use crate::client::ChatClient;
    use crate::config::AppConfig;
    use crate::devnet::dev_accounts;
    use crate::routes::testing::{call, devnet_client};
    use crate::state::AppState;
    use http::StatusCode;

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let (client, _chain) = devnet_client();

        let (status, body) = call(&client, "POST", "/session/connect", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connected"], true);
        assert_eq!(body["account"], dev_accounts()[0].as_str());
        assert_eq!(body["short_account"], dev_accounts()[0].short());

        let (status, body) = call(&client, "POST", "/session/disconnect", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connected"], false);
        assert!(body["account"].is_null());
    }

    #[tokio::test]
    async fn test_connect_without_wallet() {
        let client = ChatClient::new(AppState::new(AppConfig::default()), None);

        let (status, body) = call(&client, "POST", "/session/connect", None).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("no Ethereum wallet"));

        let (_, session) = call(&client, "GET", "/session", None).await;
        assert_eq!(session["connected"], false);
        assert!(session["error"].is_string());
    }

    #[tokio::test]
    async fn test_rejected_connection_is_forbidden() {
        let (client, chain) = devnet_client();
        chain.reject_connections(true);

        let (status, _) = call(&client, "POST", "/session/connect", None).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
