//! Chat channel adapters.
//!
//! Each adapter decodes its platform's webhook payload into
//! [`InboundMessage`]s and knows how to send text back.  The relay only talks
//! to the [`ChannelAdapter`] trait, so both platforms share one pipeline.

pub mod line;
pub mod messenger;

pub use line::LineChannel;
pub use messenger::MessengerChannel;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("channel API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed channel payload: {0}")]
    Decode(String),
}

/// Platform tag, also written to the profile sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Line,
    Messenger,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Line => "line",
            Platform::Messenger => "messenger",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "line" => Some(Platform::Line),
            "messenger" => Some(Platform::Messenger),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a reply to an inbound message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyDestination {
    /// LINE single-use reply token.
    ReplyToken(String),
    /// Platform user id to message directly.
    Recipient(String),
}

/// One decoded text message from a webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub user_id: String,
    pub text: String,
    /// Platform event time, kept as text for duplicate detection.
    pub channel_timestamp: String,
    pub destination: ReplyDestination,
}

#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Answer an inbound message.
    async fn send(&self, destination: &ReplyDestination, text: &str) -> Result<(), ChannelError>;

    /// Unsolicited message to `user_id`, used by the follow-up job.
    async fn push(&self, user_id: &str, text: &str) -> Result<(), ChannelError>;

    /// The user's display name, if the platform reports one.
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<String>, ChannelError>;
}

/// Turn a non-2xx response into [`ChannelError::Status`].
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ChannelError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(ChannelError::Status { status, body })
}

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("relay-server/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn platform_tags_round_trip() {
        for p in [Platform::Line, Platform::Messenger] {
            assert_eq!(Platform::parse(p.as_str()), Some(p));
        }
        assert_eq!(Platform::parse(" LINE "), Some(Platform::Line));
        assert_eq!(Platform::parse("whatsapp"), None);
        assert_eq!(Platform::Messenger.to_string(), "messenger");
    }
}
