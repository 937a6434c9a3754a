use anyhow::{bail, Context};
use chainchat_messaging::Address;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Contract address used when none is configured: the first deployment on a
/// fresh local development chain.
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

/// Which wallet provider the service injects at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// In-memory chain with pre-funded development accounts.
    Devnet,
    /// No provider; connecting fails as if no wallet were installed.
    None,
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "devnet" | "local" => Ok(Self::Devnet),
            "none" | "" => Ok(Self::None),
            other => bail!("unknown wallet provider {other:?} (expected devnet or none)"),
        }
    }
}

/// Runtime configuration for the chat service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub build_id: String,
    pub contract_address: Address,
    pub provider: ProviderKind,
    /// Lower bound of the simulated reply delay.
    pub reply_delay_min: Duration,
    /// Upper bound (exclusive) of the simulated reply delay.
    pub reply_delay_max: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = lookup("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let build_id = lookup("CHAINCHAT_BUILD_ID").unwrap_or_else(|| Uuid::new_v4().to_string());

        let raw_contract = lookup("CHAINCHAT_CONTRACT_ADDRESS")
            .unwrap_or_else(|| DEFAULT_CONTRACT_ADDRESS.to_string());
        let contract_address = Address::parse(&raw_contract)
            .with_context(|| "CHAINCHAT_CONTRACT_ADDRESS is not a valid address")?;

        let provider = match lookup("CHAINCHAT_PROVIDER") {
            Some(raw) => raw.parse()?,
            None => ProviderKind::Devnet,
        };

        let reply_delay_min = millis(&lookup, "CHAINCHAT_REPLY_DELAY_MIN_MS", 1500)?;
        let reply_delay_max = millis(&lookup, "CHAINCHAT_REPLY_DELAY_MAX_MS", 2500)?;
        if reply_delay_min > reply_delay_max {
            bail!(
                "reply delay range is inverted: {}ms > {}ms",
                reply_delay_min.as_millis(),
                reply_delay_max.as_millis()
            );
        }

        Ok(Self {
            host,
            port,
            build_id,
            contract_address,
            provider,
            reply_delay_min,
            reply_delay_max,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            build_id: "dev".to_string(),
            contract_address: Address::new_unchecked(DEFAULT_CONTRACT_ADDRESS),
            provider: ProviderKind::Devnet,
            reply_delay_min: Duration::from_millis(1500),
            reply_delay_max: Duration::from_millis(2500),
        }
    }
}

fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> anyhow::Result<Duration> {
    match lookup(key) {
        Some(raw) => {
            let ms: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{key} must be a whole number of milliseconds"))?;
            Ok(Duration::from_millis(ms))
        }
        None => Ok(Duration::from_millis(default)),
    }
}
