//! Inbound message pipeline.
//!
//! For every decoded webhook event: drop empty text, reload history, drop
//! redeliveries (same channel timestamp as the last stored turn), ask the
//! agent, reply, then persist both turns and refresh the contact's profile.
//! Steps are not transactional; a failure aborts the remaining steps for
//! that event only.

pub mod hours;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use relay_agent::{AgentError, AgentFactory, ChatMessage, Role};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::channels::{ChannelAdapter, ChannelError, InboundMessage};
use crate::entities::{AnyStore, ChatStore, HistoryEntry, UserRecord, UserStore};
use crate::sheets::{contacts, ProfileDirectory, SettingsSheet, SheetError};
use hours::WorkingHours;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Sheet(#[from] SheetError),
}

/// How an inbound event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Replied,
    /// Same channel timestamp as the last stored turn.
    Duplicate,
    /// Blank message text.
    Empty,
    /// Outside working hours: user turn stored, nothing sent.
    OutOfHours,
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct Relay {
    store: Arc<AnyStore>,
    agents: AgentFactory,
    profiles: ProfileDirectory,
    settings: Option<SettingsSheet>,
    hours: Option<WorkingHours>,
    tz: Tz,
    clock: Clock,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("agents", &self.agents)
            .field("profiles", &self.profiles)
            .field("hours", &self.hours)
            .field("tz", &self.tz)
            .finish_non_exhaustive()
    }
}

impl Relay {
    pub fn new(
        store: Arc<AnyStore>,
        agents: AgentFactory,
        profiles: ProfileDirectory,
        tz: Tz,
    ) -> Self {
        Self {
            store,
            agents,
            profiles,
            settings: None,
            hours: None,
            tz,
            clock: Arc::new(Utc::now),
        }
    }

    /// Working hours from configuration.  Overridden per event by the
    /// settings sheet when one is attached.
    pub fn with_working_hours(mut self, hours: Option<WorkingHours>) -> Self {
        self.hours = hours;
        self
    }

    pub fn with_settings(mut self, settings: SettingsSheet) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    async fn is_open(&self) -> bool {
        let hours = match &self.settings {
            Some(sheet) => sheet.load_or_default().await.working_hours(self.hours),
            None => self.hours,
        };
        hours.is_none_or(|h| h.contains_instant((self.clock)(), self.tz))
    }

    /// Display name for the profile sheet, falling back to the user id.
    async fn display_name(&self, channel: &dyn ChannelAdapter, user_id: &str) -> String {
        match channel.fetch_profile(user_id).await {
            Ok(Some(name)) => name,
            Ok(None) => user_id.to_owned(),
            Err(e) => {
                warn!(user_id, error = %e, "profile lookup failed; using user id");
                user_id.to_owned()
            }
        }
    }

    pub async fn handle(
        &self,
        channel: &dyn ChannelAdapter,
        message: InboundMessage,
    ) -> Result<RelayOutcome, RelayError> {
        if message.text.trim().is_empty() {
            debug!("dropping empty message");
            return Ok(RelayOutcome::Empty);
        }

        let user_id = message.user_id.as_str();
        let timestamp = message.channel_timestamp.as_str();

        let history = self.store.get_history(user_id).await?;
        if history.last().is_some_and(|last| last.same_delivery(timestamp)) {
            info!(timestamp, "duplicate delivery; skipping");
            return Ok(RelayOutcome::Duplicate);
        }

        if !self.is_open().await {
            info!("outside working hours; storing message without reply");
            let name = self.display_name(channel, user_id).await;
            self.store.upsert_user(&UserRecord::new(user_id, &name)).await?;
            self.store
                .insert_turn(user_id, Role::User, &message.text, Some(timestamp))
                .await?;
            self.profiles.touch(&name, user_id, channel.platform()).await?;
            return Ok(RelayOutcome::OutOfHours);
        }

        let mut context: Vec<ChatMessage> = history.iter().map(HistoryEntry::to_message).collect();
        context.push(ChatMessage::user(message.text.clone()));

        let reply = self
            .agents
            .build()
            .complete_with_tool(&context, contacts::TOOL_NAME)
            .await?;

        channel.send(&message.destination, &reply).await?;

        let name = self.display_name(channel, user_id).await;
        self.store.upsert_user(&UserRecord::new(user_id, &name)).await?;
        self.store
            .insert_turn(user_id, Role::User, &message.text, Some(timestamp))
            .await?;
        self.store
            .insert_turn(user_id, Role::Assistant, &reply, Some(timestamp))
            .await?;

        let touched = self.profiles.touch(&name, user_id, channel.platform()).await?;
        debug!(profile = %name, ?touched, "profile updated");
        Ok(RelayOutcome::Replied)
    }

    /// Handle one webhook delivery's events in order.  Each event is
    /// independent: a failure is logged and the next event still runs.
    pub async fn handle_batch(&self, channel: Arc<dyn ChannelAdapter>, messages: Vec<InboundMessage>) {
        for message in messages {
            let span = info_span!(
                "relay_event",
                platform = %channel.platform(),
                user_id = %message.user_id,
                timestamp = %message.channel_timestamp,
            );
            async {
                match self.handle(channel.as_ref(), message).await {
                    Ok(outcome) => info!(?outcome, "event handled"),
                    Err(e) => error!(error = %e, "event failed"),
                }
            }
            .instrument(span)
            .await;
        }
    }

    /// Process a delivery in the background so the webhook can be
    /// acknowledged immediately.
    pub fn spawn_batch(&self, channel: Arc<dyn ChannelAdapter>, messages: Vec<InboundMessage>) {
        if messages.is_empty() {
            return;
        }
        let relay = self.clone();
        tokio::spawn(async move { relay.handle_batch(channel, messages).await });
    }
}
