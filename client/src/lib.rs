pub mod client;
pub mod config;
pub mod contract;
pub mod devnet;
pub mod messaging;
pub mod routes;
pub mod state;
pub mod wallet;

pub use client::{ChatClient, ClientError};
pub use config::{AppConfig, ProviderKind};
pub use routes::router;
pub use state::AppState;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
