//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::channels::{LineChannel, MessengerChannel};
use crate::config::Config;
use crate::entities::AnyStore;
use crate::relay::Relay;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Conversation history and users.
    pub store: Arc<AnyStore>,
    /// Inbound message pipeline.
    pub relay: Relay,
    /// `None` when the channel is not configured; its webhook answers 404.
    pub line: Option<Arc<LineChannel>>,
    pub messenger: Option<Arc<MessengerChannel>>,
}
