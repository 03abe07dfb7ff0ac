//! Facebook Messenger (Graph API) adapter.
//!
//! `GET /webhook` answers the subscription handshake; `POST /webhook`
//! carries `page` objects whose `entry[].messaging[]` hold the events.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::debug;

use super::{
    check_status, http_client, ChannelAdapter, ChannelError, InboundMessage, Platform,
    ReplyDestination,
};

pub const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/v2.6";
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

#[derive(Debug, Deserialize)]
struct WebhookBody {
    #[serde(default)]
    object: String,
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    messaging: Vec<MessagingEvent>,
}

#[derive(Debug, Deserialize)]
struct MessagingEvent {
    sender: Party,
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default)]
    message: Option<EventMessage>,
}

#[derive(Debug, Deserialize)]
struct Party {
    id: String,
}

#[derive(Debug, Deserialize)]
struct EventMessage {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    is_echo: bool,
}

#[derive(Debug, Deserialize)]
struct Profile {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MessengerChannel {
    base_url: String,
    page_access_token: String,
    verify_token: String,
    app_secret: Option<String>,
    client: reqwest::Client,
}

impl MessengerChannel {
    pub fn new(
        page_access_token: impl Into<String>,
        verify_token: impl Into<String>,
        app_secret: Option<String>,
    ) -> Self {
        Self::with_base_url(page_access_token, verify_token, app_secret, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        page_access_token: impl Into<String>,
        verify_token: impl Into<String>,
        app_secret: Option<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            page_access_token: page_access_token.into(),
            verify_token: verify_token.into(),
            app_secret,
            client: http_client(),
        }
    }

    /// Subscription handshake.  Returns the challenge to echo on success.
    pub fn verify_subscription<'a>(
        &self,
        mode: Option<&str>,
        token: Option<&str>,
        challenge: Option<&'a str>,
    ) -> Option<&'a str> {
        let challenge = challenge.filter(|c| !c.is_empty())?;
        (mode == Some("subscribe")
            && !self.verify_token.is_empty()
            && token == Some(self.verify_token.as_str()))
        .then_some(challenge)
    }

    /// Check `X-Hub-Signature-256`.  Always passes when no app secret is set.
    pub fn verify_signature(&self, signature_header: Option<&str>, body: &[u8]) -> bool {
        match &self.app_secret {
            Some(secret) => verify_signature(secret, signature_header, body),
            None => true,
        }
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, ChannelError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| ChannelError::Decode(e.to_string()))?;
        url.query_pairs_mut()
            .extend_pairs(params)
            .append_pair("access_token", &self.page_access_token);
        Ok(url)
    }

    async fn send_to(&self, recipient: &str, text: &str) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.url("/me/messages", &[])?)
            .json(&json!({
                "recipient": { "id": recipient },
                "message": { "text": text },
                "messaging_type": "UPDATE",
            }))
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }
}

pub fn verify_signature(app_secret: &str, signature_header: Option<&str>, body: &[u8]) -> bool {
    let signature = signature_header.unwrap_or("").trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature).trim();
    if signature.is_empty() {
        return false;
    }
    let Ok(signature_bytes) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature_bytes).is_ok()
}

/// Text messages from a `page` webhook body.  Other objects yield nothing.
pub fn decode_events(body: &[u8]) -> Result<Vec<InboundMessage>, ChannelError> {
    let parsed: WebhookBody =
        serde_json::from_slice(body).map_err(|e| ChannelError::Decode(e.to_string()))?;
    if parsed.object != "page" {
        debug!(object = %parsed.object, "ignoring non-page webhook");
        return Ok(Vec::new());
    }

    Ok(parsed
        .entry
        .into_iter()
        .flat_map(|entry| entry.messaging)
        .filter_map(|event| {
            let message = event.message?;
            if message.is_echo {
                return None;
            }
            Some(InboundMessage {
                destination: ReplyDestination::Recipient(event.sender.id.clone()),
                user_id: event.sender.id,
                text: message.text.unwrap_or_default(),
                channel_timestamp: event
                    .timestamp
                    .map(|v| match v {
                        Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .unwrap_or_default(),
            })
        })
        .collect())
}

#[async_trait]
impl ChannelAdapter for MessengerChannel {
    fn platform(&self) -> Platform {
        Platform::Messenger
    }

    async fn send(&self, destination: &ReplyDestination, text: &str) -> Result<(), ChannelError> {
        match destination {
            ReplyDestination::Recipient(id) => self.send_to(id, text).await,
            ReplyDestination::ReplyToken(_) => Err(ChannelError::Decode(
                "Messenger cannot answer with a reply token".to_owned(),
            )),
        }
    }

    async fn push(&self, user_id: &str, text: &str) -> Result<(), ChannelError> {
        self.send_to(user_id, text).await
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<String>, ChannelError> {
        let resp = self
            .client
            .get(self.url(&format!("/{user_id}"), &[("fields", "name")])?)
            .send()
            .await?;
        let profile: Profile = check_status(resp).await?.json().await?;
        Ok(profile.name.filter(|n| !n.is_empty()))
    }
}
