use crate::page::form::PostBackValues;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_VALIDATION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a validation so its errors can be routed to displays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValidationId(u64);

impl ValidationId {
    pub fn new() -> Self {
        ValidationId(NEXT_VALIDATION_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for ValidationId {
    fn default() -> Self {
        Self::new()
    }
}

pub type ValidationFn = Rc<dyn Fn(&PostBackValues, &mut Validator)>;

/// Collects error messages while reading user input
#[derive(Debug, Default, Clone)]
pub struct Validator {
    errors: Vec<String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn errors_occurred(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error_messages(&self) -> &[String] {
        &self.errors
    }

    pub fn into_messages(self) -> Vec<String> {
        self.errors
    }

    /// Trimmed text, noting an error when empty or longer than `max_length`
    pub fn get_string(
        &mut self,
        value: &str,
        label: &str,
        allow_empty: bool,
        max_length: usize,
    ) -> String {
        let trimmed = value.trim();
        if trimmed.is_empty() && !allow_empty {
            self.note_error(format!("Please enter the {}.", label));
        } else if trimmed.chars().count() > max_length {
            self.note_error(format!(
                "The {} is too long. It must be {} characters or fewer.",
                label, max_length
            ));
        }
        trimmed.to_string()
    }

    pub fn get_int(&mut self, value: &str, label: &str, min: i64, max: i64) -> Option<i64> {
        match value.trim().parse::<i64>() {
            Ok(number) if (min..=max).contains(&number) => Some(number),
            Ok(_) => {
                self.note_error(format!(
                    "The {} must be between {} and {}.",
                    label, min, max
                ));
                None
            }
            Err(_) => {
                self.note_error(format!("Please enter a valid {}.", label));
                None
            }
        }
    }

    pub fn get_email(&mut self, value: &str, label: &str, allow_empty: bool) -> String {
        let email = self.get_string(value, label, allow_empty, 254);
        if email.is_empty() {
            return email;
        }

        let valid = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'));
        if !valid {
            self.note_error(format!("Please enter a valid {}.", label));
        }
        email
    }
}

/// Something validations can be added to
pub trait ValidationList {
    fn push_validation(&mut self, id: ValidationId, validation: ValidationFn);

    fn add_validation<F>(&mut self, validation: F) -> ValidationId
    where
        F: Fn(&PostBackValues, &mut Validator) + 'static,
        Self: Sized,
    {
        let id = ValidationId::new();
        self.push_validation(id, Rc::new(validation));
        id
    }
}

/// Validations collected ahead of time for one or more data modifications
#[derive(Clone, Default)]
pub struct BasicValidationList {
    validations: Vec<(ValidationId, ValidationFn)>,
}

impl BasicValidationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds all validations from the specified list
    pub fn add_validations(&mut self, list: &BasicValidationList) {
        self.validations.extend(list.validations.iter().cloned());
    }

    pub fn validations(&self) -> &[(ValidationId, ValidationFn)] {
        &self.validations
    }

    pub fn len(&self) -> usize {
        self.validations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validations.is_empty()
    }
}

impl ValidationList for BasicValidationList {
    fn push_validation(&mut self, id: ValidationId, validation: ValidationFn) {
        self.validations.push((id, validation));
    }
}
