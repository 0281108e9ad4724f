use crate::core::Result;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use tracing::warn;

// Named regions shared by every thread of the process
lazy_static! {
    static ref REGIONS: Mutex<HashMap<String, Arc<Mutex<()>>>> = Mutex::new(HashMap::new());
}

fn region(name: &str) -> Arc<Mutex<()>> {
    let mut regions = REGIONS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    Arc::clone(regions.entry(name.to_string()).or_default())
}

fn abandoned<'a>(name: &str, guard: MutexGuard<'a, ()>) -> MutexGuard<'a, ()> {
    warn!(region = name, "critical region was abandoned by a previous holder");
    guard
}

/// Run `f` while holding the process-wide region called `name`
///
/// With `skip_if_owned`, returns `Ok(false)` without running `f` when another
/// holder owns the region; otherwise waits for it. A region whose previous
/// holder panicked is taken over. The region is released however `f` exits.
pub fn execute_as_critical_region<F>(name: &str, skip_if_owned: bool, f: F) -> Result<bool>
where
    F: FnOnce() -> Result<()>,
{
    let region = region(name);
    let _guard = if skip_if_owned {
        match region.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Ok(false),
            Err(TryLockError::Poisoned(poisoned)) => abandoned(name, poisoned.into_inner()),
        }
    } else {
        match region.lock() {
            Ok(guard) => guard,
            Err(poisoned) => abandoned(name, poisoned.into_inner()),
        }
    };

    f()?;
    Ok(true)
}
