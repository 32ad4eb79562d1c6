//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the shared,
//! clonable resources every handler and WebSocket session needs.

use crate::{config::Config, interview::DocumentStore};
use interviewer_core::{InterviewPreparer, UpstreamConnector};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub documents: Arc<DocumentStore>,
    pub connector: Arc<dyn UpstreamConnector>,
    pub preparer: Arc<dyn InterviewPreparer>,
}
