use crate::entities::ChatTurn;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TurnResponse {
    pub id: i64,
    pub user_uuid: String,
    pub role: String,
    pub content: String,
    /// RFC 3339.
    pub created_at: String,
    pub channel_timestamp: Option<String>,
}

impl ChatTurn {
    pub fn to_response(&self) -> TurnResponse {
        TurnResponse {
            id: self.id,
            user_uuid: self.user_uuid.clone(),
            role: self.role.clone(),
            content: self.content.clone(),
            created_at: self.created_at.to_rfc3339(),
            channel_timestamp: self.channel_timestamp.clone(),
        }
    }
}
