use axum::serve;
use chainchat_client::devnet::LocalChain;
use chainchat_client::wallet::WalletProvider;
use chainchat_client::{init_tracing, router, AppConfig, AppState, ChatClient, ProviderKind};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env()?;
    let provider: Option<Arc<dyn WalletProvider>> = match config.provider {
        ProviderKind::Devnet => Some(Arc::new(LocalChain::with_dev_accounts())),
        ProviderKind::None => {
            warn!("no wallet provider configured; connections will be refused");
            None
        }
    };

    let state = AppState::new(config.clone());
    let client = ChatClient::new(state, provider);
    let app = router(client);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!(
        %local_addr,
        build_id = %config.build_id,
        contract = %config.contract_address,
        "starting ChainChat client service"
    );

    serve(listener, app).await?;
    Ok(())
}
