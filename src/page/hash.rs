use super::form::FormValue;
use sha2::{Digest, Sha256};

fn hash_form_values<'a>(hasher: &mut Sha256, form_values: impl IntoIterator<Item = &'a FormValue>) {
    for form_value in form_values.into_iter().filter(|v| v.is_active()) {
        hasher.update(form_value.key().as_bytes());
        hasher.update(form_value.durable_value().as_bytes());
    }
}

fn finish(hasher: Sha256) -> String {
    format!("{:x}", hasher.finalize())
}

/// Hash of every active form value's key and durable value, in tree order
pub fn form_value_hash<'a>(form_values: impl IntoIterator<Item = &'a FormValue>) -> String {
    let mut hasher = Sha256::new();
    hash_form_values(&mut hasher, form_values);
    finish(hasher)
}

/// The hash kept while modification errors are pending
///
/// Also covers the error display keys and the post-back handlers, which must
/// not change between the failed post-back and the re-rendered page.
pub fn form_value_hash_with_errors<'a, 'b>(
    form_values: impl IntoIterator<Item = &'a FormValue>,
    error_display_keys: impl IntoIterator<Item = &'b str>,
    handlers: impl IntoIterator<Item = (&'b str, &'b str)>,
) -> String {
    let mut hasher = Sha256::new();
    hash_form_values(&mut hasher, form_values);
    for key in error_display_keys {
        hasher.update(key.as_bytes());
        hasher.update(b" ");
    }
    for (type_name, unique_id) in handlers {
        hasher.update(type_name.as_bytes());
        hasher.update(unique_id.as_bytes());
    }
    finish(hasher)
}
