/// A row in the `"user"` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Opaque channel-scoped id (LINE user id or Messenger PSID).
    pub user_uuid: String,
    pub user_name: String,
    /// Free-form text, `"{}"` unless something else is known.
    pub user_metadata: String,
}

impl UserRecord {
    pub fn new(user_uuid: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_uuid: user_uuid.into(),
            user_name: user_name.into(),
            user_metadata: "{}".to_owned(),
        }
    }
}
