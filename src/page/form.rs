use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Hidden fields the host adds to every form
pub const EVENT_TARGET_FIELD: &str = "__EVENTTARGET";
pub const EVENT_ARGUMENT_FIELD: &str = "__EVENTARGUMENT";
pub const PAGE_STATE_FIELD: &str = "__PAGESTATE";
pub const SCROLL_POSITION_FIELD: &str = "__SCROLLPOSITION";
pub const FOCUS_FIELD: &str = "__LASTFOCUS";

/// `__EVENTARGUMENT` value marking a post-back raised by an event handler
pub const EVENT_POST_BACK_ARGUMENT: &str = "event";

pub const RESERVED_FIELDS: [&str; 5] = [
    EVENT_TARGET_FIELD,
    EVENT_ARGUMENT_FIELD,
    PAGE_STATE_FIELD,
    SCROLL_POSITION_FIELD,
    FOCUS_FIELD,
];

/// Values posted back for the page's active form values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostBackValues {
    values: BTreeMap<String, String>,
}

impl PostBackValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the posted fields the page expects
    ///
    /// Returns the values and whether any unexpected, non-ignored field was
    /// posted.
    pub fn from_posted<'a>(
        posted: impl IntoIterator<Item = (&'a String, &'a String)>,
        is_expected: impl Fn(&str) -> bool,
        is_ignored: impl Fn(&str) -> bool,
    ) -> (Self, bool) {
        let mut values = BTreeMap::new();
        let mut extra_exist = false;
        for (key, value) in posted {
            if RESERVED_FIELDS.contains(&key.as_str()) || is_ignored(key) {
                continue;
            }
            if is_expected(key) {
                values.insert(key.clone(), value.clone());
            } else {
                extra_exist = true;
            }
        }
        (Self { values }, extra_exist)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PostBackValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A piece of form state the page round-trips through post-backs
///
/// The key is derived from the owning control's id. An empty key marks an
/// inactive value that takes no part in post-backs. Clones share the
/// validity check.
#[derive(Clone)]
pub struct FormValue {
    key: String,
    durable_value: String,
    is_valid: Rc<dyn Fn(&str) -> bool>,
}

impl FormValue {
    pub fn new(key: impl Into<String>, durable_value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            durable_value: durable_value.into(),
            is_valid: Rc::new(|_| true),
        }
    }

    /// Reject posted representations the owning control could never produce
    pub fn with_validity_check(mut self, check: impl Fn(&str) -> bool + 'static) -> Self {
        self.is_valid = Rc::new(check);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_active(&self) -> bool {
        !self.key.is_empty()
    }

    pub fn durable_value(&self) -> &str {
        &self.durable_value
    }

    /// The posted value, or the durable value when nothing was posted
    pub fn value<'a>(&'a self, values: &'a PostBackValues) -> &'a str {
        values.get(&self.key).unwrap_or(&self.durable_value)
    }

    /// An absent posted value counts as valid
    pub fn posted_value_is_valid(&self, values: &PostBackValues) -> bool {
        values.get(&self.key).is_none_or(|posted| (self.is_valid)(posted))
    }

    pub fn value_changed(&self, values: &PostBackValues) -> bool {
        self.value(values) != self.durable_value
    }
}

impl fmt::Debug for FormValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormValue")
            .field("key", &self.key)
            .field("durable_value", &self.durable_value)
            .finish()
    }
}
