// ============================================================================
// Pages
// ============================================================================
//
// A page is identified from query parameters, checks access, loads a tree
// of controls and then runs the post-back lifecycle in `lifecycle`. Pages
// are created per request from a `PageCatalog`.
//
// ============================================================================

pub mod controls;
pub mod destination;
pub mod form;
pub mod hash;
pub mod lifecycle;
pub mod registry;
pub mod state;

pub use controls::{Checkbox, Container, Control, PostBackButton, TextField};
pub use destination::{Destination, EntityInfo, Navigation, PageInfo, Parameters};
pub use lifecycle::{execute_page, LifecycleOutcome, LifecycleStage, PageRequest};
pub use registry::{ControlRegistry, LoadContext};
pub use state::PageLifecycleState;

use crate::core::{FrameworkError, Result};
use crate::request::RequestState;
use crate::session::StatusMessage;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// The entity a group of pages belongs to
pub trait EntitySetup {
    fn user_can_access(&self, _request: &mut RequestState) -> Result<bool> {
        Ok(true)
    }

    fn load_data(&mut self, _ctx: &mut LoadContext<'_>) -> Result<()> {
        Ok(())
    }
}

pub trait Page {
    /// Identify the page from its query parameters
    ///
    /// The user cannot be read during this call.
    fn resolve_info(&mut self, parameters: &Parameters, request: &mut RequestState) -> Result<PageInfo>;

    fn entity_setup(&mut self) -> Option<&mut dyn EntitySetup> {
        None
    }

    fn user_can_access(&self, _info: &PageInfo, _request: &mut RequestState) -> Result<bool> {
        Ok(true)
    }

    /// Load page data and return the top-level controls
    fn load_data(&mut self, ctx: &mut LoadContext<'_>) -> Result<Vec<Box<dyn Control>>>;

    /// Where a successful post-back goes when nothing else was requested
    fn info_from_new_parameter_values(&self, current: &PageInfo) -> PageInfo {
        current.clone()
    }

    /// Modifications that happen simply because the page was requested
    fn execute_initial_request_modifications(&mut self, _request: &mut RequestState) -> Result<()> {
        Ok(())
    }
}

pub type PageFactory = Arc<dyn Fn() -> Box<dyn Page> + Send + Sync>;

/// Every page type an application serves
#[derive(Clone, Default)]
pub struct PageCatalog {
    factories: HashMap<String, PageFactory>,
}

impl PageCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, page_type: &str, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Page> + Send + Sync + 'static,
    {
        self.factories.insert(page_type.to_string(), Arc::new(factory));
        self
    }

    pub fn contains(&self, page_type: &str) -> bool {
        self.factories.contains_key(page_type)
    }

    pub fn create(&self, page_type: &str) -> Result<Box<dyn Page>> {
        self.factories
            .get(page_type)
            .map(|factory| factory())
            .ok_or_else(|| FrameworkError::developer(format!("No page is registered for type '{}'.", page_type)))
    }

    pub fn page_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedField {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedButton {
    pub id: String,
    pub submit: bool,
}

/// View model of a rendered page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedPage {
    pub page_type: String,
    pub url: String,
    /// Value for the hidden page-state field
    pub page_state: String,
    pub fields: Vec<RenderedField>,
    pub buttons: Vec<RenderedButton>,
    pub top_errors: Vec<String>,
    pub errors_by_display: BTreeMap<String, Vec<String>>,
    pub status_messages: Vec<StatusMessage>,
    pub display_states: BTreeMap<String, bool>,
    pub focus: Option<String>,
    pub scroll_position: Option<String>,
}

impl RenderedPage {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.key == key)
            .map(|f| f.value.as_str())
    }
}
