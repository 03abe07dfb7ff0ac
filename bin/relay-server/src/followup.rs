//! One-shot follow-up run: remind contacts who have gone quiet.
//!
//! Invoked as `relay-server follow-up`, typically from an external
//! scheduler.  Each stale profile is messaged through the adapter matching
//! its platform tag; a failure for one contact does not stop the rest.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::channels::{ChannelAdapter, Platform};
use crate::sheets::{Profile, ProfileDirectory, SettingsSheet, SheetError};

pub fn follow_up_message(name: &str) -> String {
    format!(
        "Hello {name}, this is a follow-up message regarding your last contact with us. \
         If you have any questions or need assistance, feel free to reach out!"
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FollowUpReport {
    pub sent: usize,
    pub failed: usize,
    /// Unknown platform tag, no adapter configured, or no user id.
    pub skipped: usize,
}

pub struct FollowUpJob {
    profiles: ProfileDirectory,
    channels: HashMap<Platform, Arc<dyn ChannelAdapter>>,
    settings: Option<SettingsSheet>,
    default_days: i64,
}

impl FollowUpJob {
    pub fn new(profiles: ProfileDirectory, default_days: i64) -> Self {
        Self {
            profiles,
            channels: HashMap::new(),
            settings: None,
            default_days,
        }
    }

    pub fn with_channel(mut self, channel: Arc<dyn ChannelAdapter>) -> Self {
        self.channels.insert(channel.platform(), channel);
        self
    }

    pub fn with_settings(mut self, settings: SettingsSheet) -> Self {
        self.settings = Some(settings);
        self
    }

    async fn threshold_days(&self) -> i64 {
        match &self.settings {
            Some(sheet) => sheet.load_or_default().await.follow_up_days(self.default_days),
            None => self.default_days,
        }
    }

    pub async fn run(&self) -> Result<FollowUpReport, SheetError> {
        let threshold = self.threshold_days().await;
        let stale = self.profiles.list_stale(threshold).await?;
        info!(threshold, contacts = stale.len(), "starting follow-up run");
        let report = self.notify(stale).await;
        info!(sent = report.sent, failed = report.failed, skipped = report.skipped, "follow-up run finished");
        Ok(report)
    }

    pub(crate) async fn notify(&self, profiles: Vec<Profile>) -> FollowUpReport {
        let mut report = FollowUpReport::default();
        for profile in profiles {
            let Some(channel) = Platform::parse(&profile.platform).and_then(|p| self.channels.get(&p))
            else {
                warn!(profile = %profile.name, platform = %profile.platform, "no channel for platform; skipping");
                report.skipped += 1;
                continue;
            };
            if profile.user_id.trim().is_empty() {
                warn!(profile = %profile.name, row = profile.row, "profile has no user id; skipping");
                report.skipped += 1;
                continue;
            }

            match channel.push(&profile.user_id, &follow_up_message(&profile.name)).await {
                Ok(()) => {
                    info!(profile = %profile.name, platform = %profile.platform, "follow-up sent");
                    report.sent += 1;
                }
                Err(e) => {
                    error!(profile = %profile.name, user_id = %profile.user_id, error = %e, "follow-up failed");
                    report.failed += 1;
                }
            }
        }
        report
    }
}
