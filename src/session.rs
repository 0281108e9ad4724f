use crate::page::state::PageLifecycleState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusMessageKind {
    Info,
    Warning,
}

/// A message shown once on the next rendered page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub kind: StatusMessageKind,
    pub text: String,
}

impl StatusMessage {
    pub fn new(kind: StatusMessageKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(StatusMessageKind::Info, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(StatusMessageKind::Warning, text)
    }
}

/// State that survives between requests of one browser session
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Lifecycle state carried to the next request for this page type
    transfer_state: Option<(String, PageLifecycleState)>,
    pub status_messages: Vec<StatusMessage>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_transfer_state(&mut self, page_type: &str, state: PageLifecycleState) {
        self.transfer_state = Some((page_type.to_string(), state));
    }

    /// Take the stored state if it was saved for `page_type`
    ///
    /// State saved for another page type is discarded.
    pub fn take_transfer_state(&mut self, page_type: &str) -> Option<PageLifecycleState> {
        match self.transfer_state.take() {
            Some((saved_for, state)) if saved_for == page_type => Some(state),
            _ => None,
        }
    }

    pub fn has_transfer_state(&self) -> bool {
        self.transfer_state.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.transfer_state.is_none() && self.status_messages.is_empty()
    }
}
