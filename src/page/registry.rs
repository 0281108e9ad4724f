// ============================================================================
// Control registry
// ============================================================================
//
// Controls register what they contribute while their data loads: form
// values, post-back handlers, error displays, display links, ethereal
// controls, focus candidates and tree validations. The lifecycle only ever
// reads these typed collections; it never inspects the control tree.
//
// ============================================================================

use super::controls::Control;
use super::form::{FormValue, PostBackValues};
use super::hash::{form_value_hash, form_value_hash_with_errors};
use super::state::{PageData, PageLifecycleState};
use crate::core::Result;
use crate::modification::{DataModification, ValidationId};
use crate::request::RequestState;
use std::collections::{BTreeMap, HashSet, VecDeque};

pub type ControlTreeValidation = Box<dyn FnOnce() -> Result<()>>;

/// A control that can be the target of an event post-back
pub struct PostBackHandler {
    pub type_name: &'static str,
    pub unique_id: String,
    pub uses_submit_behavior: bool,
    pub modification: DataModification,
}

/// Shows a set of controls only while a form value has a given value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLink {
    pub form_value_key: String,
    pub shown_when: String,
    pub control_ids: Vec<String>,
}

#[derive(Default)]
pub struct ControlRegistry {
    form_values: Vec<FormValue>,
    handlers: Vec<PostBackHandler>,
    error_displays: BTreeMap<ValidationId, Vec<String>>,
    error_display_keys: Vec<String>,
    display_links: Vec<DisplayLink>,
    tree_validations: Vec<ControlTreeValidation>,
    ethereal_controls: VecDeque<Box<dyn Control>>,
    focusable: Vec<String>,
    post_back_modification: DataModification,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn form_values(&self) -> &[FormValue] {
        &self.form_values
    }

    pub fn active_form_values(&self) -> impl Iterator<Item = &FormValue> {
        self.form_values.iter().filter(|v| v.is_active())
    }

    pub fn is_expected_key(&self, key: &str) -> bool {
        self.active_form_values().any(|v| v.key() == key)
    }

    pub fn handlers(&self) -> &[PostBackHandler] {
        &self.handlers
    }

    pub fn handler_mut(&mut self, unique_id: &str) -> Option<&mut PostBackHandler> {
        self.handlers.iter_mut().find(|h| h.unique_id == unique_id)
    }

    pub fn has_handler(&self, unique_id: &str) -> bool {
        self.handlers.iter().any(|h| h.unique_id == unique_id)
    }

    pub fn submit_button_ids(&self) -> Vec<&str> {
        self.handlers
            .iter()
            .filter(|h| h.uses_submit_behavior)
            .map(|h| h.unique_id.as_str())
            .collect()
    }

    pub fn error_displays(&self) -> &BTreeMap<ValidationId, Vec<String>> {
        &self.error_displays
    }

    pub fn display_links(&self) -> &[DisplayLink] {
        &self.display_links
    }

    pub fn first_focusable(&self) -> Option<&str> {
        self.focusable.first().map(String::as_str)
    }

    pub fn take_post_back_modification(&mut self) -> DataModification {
        std::mem::take(&mut self.post_back_modification)
    }

    pub fn post_back_modification(&self) -> &DataModification {
        &self.post_back_modification
    }

    pub(crate) fn next_ethereal_control(&mut self) -> Option<Box<dyn Control>> {
        self.ethereal_controls.pop_front()
    }

    pub(crate) fn take_tree_validations(&mut self) -> Vec<ControlTreeValidation> {
        std::mem::take(&mut self.tree_validations)
    }

    /// Active keys registered more than once, in first-duplicate order
    pub fn duplicate_keys(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut duplicates: Vec<&str> = Vec::new();
        for key in self.active_form_values().map(FormValue::key) {
            if !seen.insert(key) && !duplicates.contains(&key) {
                duplicates.push(key);
            }
        }
        duplicates
    }

    /// The hash compared against the one stored in the page state
    pub fn concurrency_hash(&self) -> String {
        form_value_hash(&self.form_values)
    }

    /// The hash kept across the round trip that follows a failed post-back
    pub fn static_hash(&self, modification_errors_exist: bool) -> String {
        if !modification_errors_exist {
            return self.concurrency_hash();
        }
        form_value_hash_with_errors(
            &self.form_values,
            self.error_display_keys.iter().map(String::as_str),
            self.handlers
                .iter()
                .map(|h| (h.type_name, h.unique_id.as_str())),
        )
    }

    /// Which linked controls are visible for the current values
    pub fn display_states(&self, values: Option<&PostBackValues>) -> BTreeMap<String, bool> {
        let empty = PostBackValues::new();
        let values = values.unwrap_or(&empty);
        let mut states = BTreeMap::new();
        for link in &self.display_links {
            let current = self
                .form_values
                .iter()
                .find(|v| v.key() == link.form_value_key)
                .map(|v| v.value(values));
            let shown = current == Some(link.shown_when.as_str());
            for id in &link.control_ids {
                states.insert(id.clone(), shown);
            }
        }
        states
    }
}

/// What a control sees while its data loads
pub struct LoadContext<'a> {
    pub request: &'a mut RequestState,
    state: &'a mut PageLifecycleState,
    registry: &'a mut ControlRegistry,
}

impl<'a> LoadContext<'a> {
    pub fn new(
        request: &'a mut RequestState,
        state: &'a mut PageLifecycleState,
        registry: &'a mut ControlRegistry,
    ) -> Self {
        Self {
            request,
            state,
            registry,
        }
    }

    /// Persistent per-page data carried in the page-state field
    pub fn page_data(&mut self) -> &mut PageData {
        &mut self.state.page_data
    }

    /// Only set on the re-render that follows a failed post-back
    pub fn post_back_values(&self) -> Option<&PostBackValues> {
        self.state.post_back_values.as_ref()
    }

    pub fn modification_errors_exist(&self) -> bool {
        self.state.modification_errors_exist()
    }

    /// Register a form value and get back a handle sharing its validity check
    pub fn add_form_value(&mut self, form_value: FormValue) -> FormValue {
        self.registry.form_values.push(form_value.clone());
        form_value
    }

    pub fn add_post_back_handler(&mut self, handler: PostBackHandler) {
        self.registry.handlers.push(handler);
    }

    /// Route the validation's errors to `control_id + key_suffix`
    ///
    /// Returns the errors already recorded for that display.
    pub fn add_modification_error_display(
        &mut self,
        control_id: &str,
        key_suffix: &str,
        validation: ValidationId,
    ) -> Vec<String> {
        let key = format!("{}{}", control_id, key_suffix);
        self.registry
            .error_displays
            .entry(validation)
            .or_default()
            .push(key.clone());
        let errors = self.state.errors_for_display(&key).to_vec();
        self.registry.error_display_keys.push(key);
        errors
    }

    pub fn add_display_link(&mut self, link: DisplayLink) {
        self.registry.display_links.push(link);
    }

    pub fn add_control_tree_validation<F>(&mut self, validation: F)
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        self.registry.tree_validations.push(Box::new(validation));
    }

    /// Load `control` after the main tree, outside the normal pass
    pub fn add_ethereal_control(&mut self, control: Box<dyn Control>) {
        self.registry.ethereal_controls.push_back(control);
    }

    pub fn add_focusable(&mut self, control_id: &str) {
        self.registry.focusable.push(control_id.to_string());
    }

    pub(crate) fn next_ethereal_control(&mut self) -> Option<Box<dyn Control>> {
        self.registry.next_ethereal_control()
    }

    /// The modification that runs on every post-back that changes a value
    pub fn post_back_modification(&mut self) -> &mut DataModification {
        &mut self.registry.post_back_modification
    }
}
