use super::form::PostBackValues;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub type PageData = BTreeMap<String, serde_json::Value>;

/// Everything the lifecycle knows about one page view
///
/// Carried across transfers in the request and across redirects in the
/// session. Only `page_data` and the form value hash travel in the hidden
/// page-state field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageLifecycleState {
    pub page_data: PageData,

    /// Set on post-backs; kept through an error transfer so fields show
    /// what the user typed
    #[serde(skip)]
    pub post_back_values: Option<PostBackValues>,

    pub control_with_focus_id: Option<String>,
    pub scroll_position: Option<String>,

    /// Error-variant hash saved when a post-back ended with errors
    pub static_form_value_hash: Option<String>,

    pub modification_errors_by_display: BTreeMap<String, Vec<String>>,
    pub top_modification_errors: Vec<String>,
}

impl PageLifecycleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restored(page_data: PageData, scroll_position: Option<String>) -> Self {
        Self {
            page_data,
            scroll_position,
            ..Self::default()
        }
    }

    pub fn modification_errors_exist(&self) -> bool {
        !self.top_modification_errors.is_empty()
            || self
                .modification_errors_by_display
                .values()
                .any(|messages| !messages.is_empty())
    }

    pub fn errors_for_display(&self, key: &str) -> &[String] {
        self.modification_errors_by_display
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[derive(Error, Debug)]
pub enum PageStateError {
    #[error("Page state is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Page state could not be decoded: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("Page state could not be encoded: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Page state has no form value hash")]
    MissingHash,
}

/// Serialize page data and the form value hash for the hidden field
pub fn encode_page_state(page_data: &PageData, form_value_hash: &str) -> Result<String, PageStateError> {
    let bytes = rmp_serde::to_vec(&(page_data, [form_value_hash]))?;
    Ok(STANDARD.encode(bytes))
}

pub fn decode_page_state(blob: &str) -> Result<(PageData, String), PageStateError> {
    let bytes = STANDARD.decode(blob.trim())?;
    let (page_data, hashes): (PageData, Vec<String>) = rmp_serde::from_slice(&bytes)?;
    let hash = hashes.into_iter().next().ok_or(PageStateError::MissingHash)?;
    Ok((page_data, hash))
}
