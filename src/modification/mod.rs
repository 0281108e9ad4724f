// ============================================================================
// Data modifications
// ============================================================================
//
// A DataModification is a bundle of validations and mutations. Executing it
// runs every validation, routing errors to their displays, and applies the
// mutations only if no validation reported an error.
//
// ============================================================================

pub mod validation;

pub use validation::{BasicValidationList, ValidationFn, ValidationId, ValidationList, Validator};

use crate::core::Result;
use crate::data_access::DataAccessState;
use crate::page::destination::Destination;
use crate::page::form::{FormValue, PostBackValues};
use crate::request::RequestState;
use crate::session::StatusMessage;
use std::collections::BTreeMap;

pub const PLEASE_CORRECT_ERRORS: &str = "Please correct the errors shown below.";

pub type Mutation = Box<dyn FnOnce(&mut ModificationContext<'_>) -> Result<()>>;

/// What a mutation can touch
pub struct ModificationContext<'a> {
    pub request: &'a mut RequestState,
    pub values: &'a PostBackValues,
    redirect: &'a mut Option<Destination>,
    status_messages: &'a mut Vec<StatusMessage>,
    focus: &'a mut Option<String>,
}

impl<'a> ModificationContext<'a> {
    pub fn new(
        request: &'a mut RequestState,
        values: &'a PostBackValues,
        redirect: &'a mut Option<Destination>,
        status_messages: &'a mut Vec<StatusMessage>,
        focus: &'a mut Option<String>,
    ) -> Self {
        Self {
            request,
            values,
            redirect,
            status_messages,
            focus,
        }
    }

    pub fn data_access(&mut self) -> &mut DataAccessState {
        self.request.data_access()
    }

    pub fn value<'v>(&'v self, form_value: &'v FormValue) -> &'v str {
        form_value.value(self.values)
    }

    /// Send the user elsewhere once the post-back succeeds
    pub fn redirect_to(&mut self, destination: Destination) {
        *self.redirect = Some(destination);
    }

    pub fn add_status_message(&mut self, message: StatusMessage) {
        self.status_messages.push(message);
    }

    pub fn set_focus(&mut self, control_id: impl Into<String>) {
        *self.focus = Some(control_id.into());
    }
}

/// Where validation errors end up
pub struct ErrorSink<'a> {
    displays: &'a BTreeMap<ValidationId, Vec<String>>,
    errors_by_display: &'a mut BTreeMap<String, Vec<String>>,
    top_errors: &'a mut Vec<String>,
}

impl<'a> ErrorSink<'a> {
    pub fn new(
        displays: &'a BTreeMap<ValidationId, Vec<String>>,
        errors_by_display: &'a mut BTreeMap<String, Vec<String>>,
        top_errors: &'a mut Vec<String>,
    ) -> Self {
        Self {
            displays,
            errors_by_display,
            top_errors,
        }
    }

    /// File messages under every display registered for the validation
    ///
    /// Returns the messages back when the validation has no display.
    fn route(&mut self, id: ValidationId, messages: Vec<String>) -> Option<Vec<String>> {
        match self.displays.get(&id) {
            Some(keys) if !keys.is_empty() => {
                for key in keys {
                    self.errors_by_display
                        .entry(key.clone())
                        .or_default()
                        .extend(messages.iter().cloned());
                }
                None
            }
            _ => Some(messages),
        }
    }

    pub fn add_top_errors(&mut self, messages: impl IntoIterator<Item = String>) {
        self.top_errors.extend(messages);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModificationOutcome {
    /// Nothing was applied
    ValidationFailed,
    Applied,
}

/// Validations plus the mutations they guard
#[derive(Default)]
pub struct DataModification {
    validations: Vec<(ValidationId, ValidationFn)>,
    mutations: Vec<Mutation>,
}

impl DataModification {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_modification<F>(&mut self, mutation: F)
    where
        F: FnOnce(&mut ModificationContext<'_>) -> Result<()> + 'static,
    {
        self.mutations.push(Box::new(mutation));
    }

    /// Adds all validations from the specified list
    pub fn add_validations(&mut self, list: &BasicValidationList) {
        self.validations
            .extend(list.validations().iter().cloned());
    }

    pub fn contains_work(&self) -> bool {
        !self.validations.is_empty() || !self.mutations.is_empty()
    }

    pub fn validation_count(&self) -> usize {
        self.validations.len()
    }

    /// Validate everything, then apply the mutations if nothing failed
    ///
    /// Validation failures go to `sink`. An error returned by a mutation
    /// propagates; the caller owns rolling back what earlier mutations did.
    pub fn execute(
        self,
        context: &mut ModificationContext<'_>,
        sink: &mut ErrorSink<'_>,
    ) -> Result<ModificationOutcome> {
        let mut failed = false;
        let mut undisplayed = Vec::new();
        for (id, validation) in &self.validations {
            let mut validator = Validator::new();
            validation(context.values, &mut validator);
            if validator.errors_occurred() {
                failed = true;
                if let Some(messages) = sink.route(*id, validator.into_messages()) {
                    undisplayed.extend(messages);
                }
            }
        }

        if failed {
            sink.add_top_errors(std::iter::once(PLEASE_CORRECT_ERRORS.to_string()).chain(undisplayed));
            return Ok(ModificationOutcome::ValidationFailed);
        }

        for mutation in self.mutations {
            mutation(context)?;
        }
        Ok(ModificationOutcome::Applied)
    }
}

impl ValidationList for DataModification {
    fn push_validation(&mut self, id: ValidationId, validation: ValidationFn) {
        self.validations.push((id, validation));
    }
}
