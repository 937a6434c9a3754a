//! Chat message models shared by the ChainChat client and its local devnet.

pub mod autoreply;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// Longest display name the chat contract accepts, in characters.
pub const MAX_USERNAME_LEN: usize = 32;

/// An account address as reported by the wallet provider or the contract.
///
/// The original casing is preserved so message identities match what the
/// contract reports; use [`Address::matches`] for account comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Parse a `0x`-prefixed, 20-byte hex address.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let digits = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .ok_or_else(|| MessagingError::InvalidAddress(raw.to_string()))?;
        if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MessagingError::InvalidAddress(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Wrap a string without validating it. Used for synthetic senders.
    pub fn new_unchecked(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison, so checksummed and lowercase forms match.
    pub fn matches(&self, other: &Address) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }

    /// Truncated form used when no display name is registered: `0x1234...abcd`.
    pub fn short(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 10 {
            return self.0.clone();
        }
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a message in the local list.
///
/// On-chain messages are keyed by sender and block timestamp; the same
/// event delivered twice yields the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageId {
    OnChain { sender: Address, timestamp: u64 },
    Simulated(Uuid),
}

impl MessageId {
    pub fn on_chain(sender: &Address, timestamp: u64) -> Self {
        Self::OnChain {
            sender: sender.clone(),
            timestamp,
        }
    }

    pub fn simulated() -> Self {
        Self::Simulated(Uuid::new_v4())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::OnChain { sender, timestamp } => write!(f, "{sender}-{timestamp}"),
            MessageId::Simulated(id) => write!(f, "ai-{id}"),
        }
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Where a message in the local list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageOrigin {
    OnChain,
    Simulated,
}

/// A message record as stored by the chat contract.
///
/// The `MessageSent` event carries the same three fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnChainMessage {
    pub sender: Address,
    pub content: String,
    /// Block timestamp in seconds.
    pub timestamp: u64,
}

/// Payload of the contract's `MessageSent` event.
pub type MessageSent = OnChainMessage;

/// Payload of the contract's `UsernameSet` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameSet {
    pub account: Address,
    pub username: String,
}

/// A message in the local, presentation-ready list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender: Address,
    pub sender_display: String,
    pub content: String,
    pub timestamp: u64,
    pub display_timestamp: String,
    pub origin: MessageOrigin,
}

impl ChatMessage {
    /// Decorate a contract record with the sender's resolved display name.
    pub fn from_chain(record: &OnChainMessage, sender_display: String) -> Self {
        Self {
            id: MessageId::on_chain(&record.sender, record.timestamp),
            sender: record.sender.clone(),
            sender_display,
            content: record.content.clone(),
            timestamp: record.timestamp,
            display_timestamp: display_timestamp(record.timestamp),
            origin: MessageOrigin::OnChain,
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.origin == MessageOrigin::Simulated
    }
}

/// Registered name if there is one, otherwise the truncated address.
pub fn resolve_display_name(registered: &str, sender: &Address) -> String {
    if registered.is_empty() {
        sender.short()
    } else {
        registered.to_string()
    }
}

/// Render a block timestamp (seconds) for display.
pub fn display_timestamp(seconds: u64) -> String {
    i64::try_from(seconds)
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .map(format_time)
        .unwrap_or_else(|| seconds.to_string())
}

pub(crate) fn format_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Messaging-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, MessagingError>;
