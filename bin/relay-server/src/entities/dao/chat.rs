use chrono::{DateTime, Utc};
use relay_agent::{ChatMessage, Role};

/// A single row in the `chat_history` table.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub id: i64,
    pub user_uuid: String,
    /// `"user"`, `"assistant"`, or `"system"`.
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Platform event time; only used to drop redelivered webhooks.
    pub channel_timestamp: Option<String>,
}

/// A `user` or `assistant` turn as fed back to the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
    pub channel_timestamp: Option<String>,
}

impl HistoryEntry {
    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::new(self.role, self.content.clone())
    }

    /// True when `timestamp` equals this entry's channel timestamp after
    /// trimming both sides.
    pub fn same_delivery(&self, timestamp: &str) -> bool {
        self.channel_timestamp
            .as_deref()
            .is_some_and(|ts| ts.trim() == timestamp.trim())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn entry(ts: Option<&str>) -> HistoryEntry {
        HistoryEntry {
            role: Role::User,
            content: "hi".into(),
            channel_timestamp: ts.map(str::to_owned),
        }
    }

    #[test]
    fn same_delivery_trims_both_sides() {
        assert!(entry(Some(" 100")).same_delivery("100 "));
        assert!(!entry(Some("100")).same_delivery("101"));
        assert!(!entry(None).same_delivery("100"));
    }
}
