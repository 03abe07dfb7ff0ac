//! LINE Messaging API adapter.
//!
//! Webhooks arrive at `POST /callback` signed with
//! `X-Line-Signature: base64(HMAC-SHA256(channel_secret, body))`.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::debug;
use uuid::Uuid;

use super::{
    check_status, http_client, ChannelAdapter, ChannelError, InboundMessage, Platform,
    ReplyDestination,
};

pub const DEFAULT_BASE_URL: &str = "https://api.line.me";
pub const SIGNATURE_HEADER: &str = "x-line-signature";

#[derive(Debug, Deserialize)]
struct WebhookBody {
    #[serde(default)]
    events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Event {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    reply_token: Option<String>,
    #[serde(default)]
    source: Option<Source>,
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default)]
    message: Option<EventMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Source {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    display_name: String,
}

#[derive(Debug, Clone)]
pub struct LineChannel {
    base_url: String,
    access_token: String,
    channel_secret: String,
    client: reqwest::Client,
}

impl LineChannel {
    pub fn new(access_token: impl Into<String>, channel_secret: impl Into<String>) -> Self {
        Self::with_base_url(access_token, channel_secret, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        access_token: impl Into<String>,
        channel_secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            access_token: access_token.into(),
            channel_secret: channel_secret.into(),
            client: http_client(),
        }
    }

    /// Check `X-Line-Signature` against the raw request body.
    pub fn verify_signature(&self, signature_header: Option<&str>, body: &[u8]) -> bool {
        verify_signature(&self.channel_secret, signature_header, body)
    }

    async fn post_messages(
        &self,
        path: &str,
        payload: Value,
        retry_key: Option<Uuid>,
    ) -> Result<(), ChannelError> {
        let mut req = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.access_token)
            .json(&payload);
        if let Some(key) = retry_key {
            req = req.header("X-Line-Retry-Key", key.to_string());
        }
        check_status(req.send().await?).await?;
        Ok(())
    }
}

/// `{base}/v2/bot/profile/{user_id}`, with `user_id` percent-encoded.
fn profile_url(base_url: &str, user_id: &str) -> Result<Url, ChannelError> {
    let mut url = Url::parse(base_url).map_err(|e| ChannelError::Decode(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| ChannelError::Decode(format!("{base_url} cannot be a base URL")))?
        .pop_if_empty()
        .extend(["v2", "bot", "profile", user_id]);
    Ok(url)
}

pub fn verify_signature(secret: &str, signature_header: Option<&str>, body: &[u8]) -> bool {
    let Some(signature) = signature_header.map(str::trim).filter(|s| !s.is_empty()) else {
        return false;
    };
    let Ok(signature_bytes) = STANDARD.decode(signature) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature_bytes).is_ok()
}

/// Text message events from a webhook body.  Other event and message types
/// are skipped.
pub fn decode_events(body: &[u8]) -> Result<Vec<InboundMessage>, ChannelError> {
    let parsed: WebhookBody =
        serde_json::from_slice(body).map_err(|e| ChannelError::Decode(e.to_string()))?;

    Ok(parsed
        .events
        .into_iter()
        .filter_map(|event| {
            if event.kind != "message" {
                debug!(kind = %event.kind, "ignoring non-message LINE event");
                return None;
            }
            let message = event.message?;
            if message.kind != "text" {
                debug!(kind = %message.kind, "ignoring non-text LINE message");
                return None;
            }
            Some(InboundMessage {
                user_id: event.source?.user_id?,
                text: message.text.unwrap_or_default(),
                channel_timestamp: event.timestamp.map(timestamp_text).unwrap_or_default(),
                destination: ReplyDestination::ReplyToken(event.reply_token?),
            })
        })
        .collect())
}

/// Numbers print without quotes, strings pass through.
fn timestamp_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn text_messages(text: &str) -> Value {
    json!([{ "type": "text", "text": text }])
}

#[async_trait]
impl ChannelAdapter for LineChannel {
    fn platform(&self) -> Platform {
        Platform::Line
    }

    async fn send(&self, destination: &ReplyDestination, text: &str) -> Result<(), ChannelError> {
        match destination {
            ReplyDestination::ReplyToken(token) => {
                self.post_messages(
                    "/v2/bot/message/reply",
                    json!({ "replyToken": token, "messages": text_messages(text) }),
                    None,
                )
                .await
            }
            ReplyDestination::Recipient(user_id) => self.push(user_id, text).await,
        }
    }

    async fn push(&self, user_id: &str, text: &str) -> Result<(), ChannelError> {
        self.post_messages(
            "/v2/bot/message/push",
            json!({ "to": user_id, "messages": text_messages(text) }),
            Some(Uuid::new_v4()),
        )
        .await
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<String>, ChannelError> {
        let resp = self
            .client
            .get(profile_url(&self.base_url, user_id)?)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let profile: Profile = check_status(resp).await?.json().await?;
        Ok(Some(profile.display_name).filter(|n| !n.is_empty()))
    }
}
