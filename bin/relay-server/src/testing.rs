//! In-memory fakes shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use relay_agent::{
    AgentFactory, BackendError, Completion, CompletionBackend, CompletionRequest, ToolRegistry,
    ToolSchema,
};

use crate::channels::{
    ChannelAdapter, ChannelError, LineChannel, MessengerChannel, Platform, ReplyDestination,
};
use crate::config::Config;
use crate::relay::Relay;
use crate::sheets::{contacts, ContactSheet, ProfileDirectory, SheetBackend, SheetError};
use crate::state::AppState;

/// Spreadsheet held in a map of sheet name to rows.
#[derive(Default)]
pub struct MemorySheet {
    sheets: Mutex<HashMap<String, Vec<Vec<String>>>>,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemorySheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, sheet: &str, rows: &[&[&str]]) {
        let rows = rows
            .iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();
        self.sheets.lock().unwrap().insert(sheet.to_owned(), rows);
    }

    pub fn rows(&self, sheet: &str) -> Vec<Vec<String>> {
        self.sheets.lock().unwrap().get(sheet).cloned().unwrap_or_default()
    }

    /// 1-based row.
    pub fn row(&self, sheet: &str, row: usize) -> Vec<String> {
        self.rows(sheet)[row - 1].clone()
    }

    /// Number of `update_cell` calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn unavailable() -> SheetError {
        SheetError::Status {
            status: 503,
            body: "unavailable".into(),
        }
    }
}

#[async_trait]
impl SheetBackend for MemorySheet {
    async fn read_rows(&self, sheet: &str) -> Result<Vec<Vec<String>>, SheetError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(self.rows(sheet))
    }

    async fn append_row(&self, sheet: &str, row: Vec<String>) -> Result<(), SheetError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.sheets
            .lock()
            .unwrap()
            .entry(sheet.to_owned())
            .or_default()
            .push(row);
        Ok(())
    }

    async fn update_cell(
        &self,
        sheet: &str,
        row: usize,
        column: usize,
        value: &str,
    ) -> Result<(), SheetError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        let mut sheets = self.sheets.lock().unwrap();
        let rows = sheets.entry(sheet.to_owned()).or_default();
        if rows.len() < row {
            rows.resize(row, Vec::new());
        }
        let cells = &mut rows[row - 1];
        if cells.len() < column {
            cells.resize(column, String::new());
        }
        cells[column - 1] = value.to_owned();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// What a [`RecordingChannel`] was asked to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Reply { destination: ReplyDestination, text: String },
    Push { user_id: String, text: String },
}

/// Channel adapter that records outbound messages instead of sending them.
pub struct RecordingChannel {
    platform: Platform,
    display_name: Option<String>,
    sent: Mutex<Vec<Sent>>,
    /// Push fails for these user ids.
    failing_users: Vec<String>,
}

impl RecordingChannel {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            display_name: None,
            sent: Mutex::new(Vec::new()),
            failing_users: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, name: &str) -> Self {
        self.display_name = Some(name.to_owned());
        self
    }

    pub fn failing_for(mut self, user_id: &str) -> Self {
        self.failing_users.push(user_id.to_owned());
        self
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelAdapter for RecordingChannel {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn send(&self, destination: &ReplyDestination, text: &str) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(Sent::Reply {
            destination: destination.clone(),
            text: text.to_owned(),
        });
        Ok(())
    }

    async fn push(&self, user_id: &str, text: &str) -> Result<(), ChannelError> {
        if self.failing_users.iter().any(|u| u == user_id) {
            return Err(ChannelError::Status {
                status: 400,
                body: "invalid user".into(),
            });
        }
        self.sent.lock().unwrap().push(Sent::Push {
            user_id: user_id.to_owned(),
            text: text.to_owned(),
        });
        Ok(())
    }

    async fn fetch_profile(&self, _user_id: &str) -> Result<Option<String>, ChannelError> {
        Ok(self.display_name.clone())
    }
}

/// Completion backend that replays canned completions in order and records
/// every request.  Runs out into an error.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Completion>>,
    seen: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Completion>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, BackendError> {
        self.seen.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| BackendError::InvalidResponse("script exhausted".into()))
    }
}

pub const LINE_SECRET: &str = "line-secret";
pub const MESSENGER_VERIFY_TOKEN: &str = "verify-me";

/// Application state over in-memory fakes.  Channel adapters point at an
/// unroutable address, so tests must not trigger outbound sends.
pub async fn test_state() -> Arc<AppState> {
    build_test_state(None, UNROUTABLE, Vec::new()).await
}

pub async fn test_state_with_admin_token(token: &str) -> Arc<AppState> {
    build_test_state(Some(token.to_owned()), UNROUTABLE, Vec::new()).await
}

/// Application state whose LINE adapter talks to `line_base_url` and whose
/// model answers with `replies` in order.
pub async fn relay_test_state(line_base_url: &str, replies: Vec<Completion>) -> Arc<AppState> {
    build_test_state(None, line_base_url, replies).await
}

const UNROUTABLE: &str = "http://127.0.0.1:9";

/// Local stand-in for the LINE Messaging API: accepts replies and answers
/// profile lookups with `display_name`.  Returns its base URL.
pub async fn mock_line_api(display_name: &'static str) -> String {
    use axum::extract::Path;
    use axum::routing::{get, post};
    use axum::Json;
    use serde_json::json;

    let app = axum::Router::new()
        .route("/v2/bot/message/reply", post(|| async { Json(json!({})) }))
        .route(
            "/v2/bot/profile/{user_id}",
            get(move |Path(user_id): Path<String>| async move {
                Json(json!({ "userId": user_id, "displayName": display_name }))
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

async fn build_test_state(
    admin_token: Option<String>,
    line_base_url: &str,
    replies: Vec<Completion>,
) -> Arc<AppState> {
    let config = Config {
        admin_token,
        line_channel_access_token: Some("line-token".into()),
        line_channel_secret: Some(LINE_SECRET.into()),
        messenger_page_access_token: Some("page-token".into()),
        messenger_verify_token: Some(MESSENGER_VERIFY_TOKEN.into()),
        spreadsheet_id: Some("sheet".into()),
        ..Config::default()
    };
    let store = Arc::new(crate::entities::memory_store().await);
    let sheet = Arc::new(MemorySheet::new());

    let mut tools = ToolRegistry::new();
    tools.register(
        ToolSchema {
            name: contacts::TOOL_NAME.into(),
            description: "Save contact details".into(),
            parameters: serde_json::json!({"type": "object"}),
        },
        Arc::new(ContactSheet::new(sheet.clone(), config.contact_sheet.clone())),
    );
    let agents = AgentFactory::new(
        Arc::new(ScriptedBackend::new(replies)),
        Arc::new(tools),
        config.model.clone(),
        config.temperature,
    );
    let profiles = ProfileDirectory::new(sheet, config.profile_sheet.clone(), chrono_tz::Asia::Bangkok);
    let relay = Relay::new(store.clone(), agents, profiles, chrono_tz::Asia::Bangkok);

    Arc::new(AppState {
        line: Some(Arc::new(LineChannel::with_base_url(
            "line-token",
            LINE_SECRET,
            line_base_url,
        ))),
        messenger: Some(Arc::new(MessengerChannel::with_base_url(
            "page-token",
            MESSENGER_VERIFY_TOKEN,
            None,
            UNROUTABLE,
        ))),
        config: Arc::new(config),
        store,
        relay,
    })
}
