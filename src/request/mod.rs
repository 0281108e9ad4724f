// ============================================================================
// Request State
// ============================================================================
//
// One RequestState exists per inbound request. It owns the data access
// state for the request, the queue of side effects that must wait for a
// successful commit, the memoized user, and the error to report at the end.
//
// cleanup() runs exactly once: explicitly from the host, or from Drop.
//
// ============================================================================

pub mod telemetry;

pub use telemetry::{
    report_developer_error, CollectingReporter, ErrorReport, ErrorReporter, LogReporter,
};

use crate::config::{InstallationConfig, SLOW_REQUEST_THRESHOLD};
use crate::connection::identity::{IdentityProvider, NoUserManagement, User};
use crate::connection::DatabaseRegistry;
use crate::core::{FrameworkError, Result};
use crate::data_access::{DataAccessState, TransactionOutcome};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type SideEffect = Box<dyn FnOnce() -> anyhow::Result<()>>;

/// Services shared by every request of an application
#[derive(Clone)]
pub struct RequestEnvironment {
    pub installation: Arc<InstallationConfig>,
    pub databases: DatabaseRegistry,
    pub identity: Arc<dyn IdentityProvider>,
    pub reporter: Arc<dyn ErrorReporter>,
}

impl RequestEnvironment {
    pub fn new(installation: InstallationConfig, databases: DatabaseRegistry) -> Self {
        Self {
            installation: Arc::new(installation),
            databases,
            identity: Arc::new(NoUserManagement),
            reporter: Arc::new(LogReporter),
        }
    }

    /// Set the identity provider
    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = identity;
        self
    }

    /// Set the error reporter
    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }
}

pub struct RequestState {
    id: Uuid,
    started: Instant,
    begin_time: DateTime<Utc>,
    url: String,
    is_secure: bool,
    session_token: Option<String>,
    data_access: DataAccessState,
    side_effects: Vec<SideEffect>,
    rollback_forced: bool,
    error: Option<(String, FrameworkError)>,
    user_enabled: bool,
    user_disabled_by_page: bool,
    user: Option<Option<User>>,
    installation: Arc<InstallationConfig>,
    identity: Arc<dyn IdentityProvider>,
    reporter: Arc<dyn ErrorReporter>,
    cleaned_up: bool,
}

impl RequestState {
    pub fn new(
        environment: &RequestEnvironment,
        url: &str,
        is_secure: bool,
        session_token: Option<String>,
    ) -> Self {
        let id = Uuid::new_v4();
        debug!(request_id = %id, url, is_secure, "request started");
        Self {
            id,
            started: Instant::now(),
            begin_time: Utc::now(),
            url: url.to_string(),
            is_secure,
            session_token,
            data_access: DataAccessState::new(environment.databases.clone()),
            side_effects: Vec::new(),
            rollback_forced: false,
            error: None,
            user_enabled: false,
            user_disabled_by_page: false,
            user: None,
            installation: Arc::clone(&environment.installation),
            identity: Arc::clone(&environment.identity),
            reporter: Arc::clone(&environment.reporter),
            cleaned_up: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_secure(&self) -> bool {
        self.is_secure
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    pub fn begin_time(&self) -> DateTime<Utc> {
        self.begin_time
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn installation(&self) -> &InstallationConfig {
        &self.installation
    }

    pub fn identity(&self) -> &dyn IdentityProvider {
        self.identity.as_ref()
    }

    pub fn reporter(&self) -> &dyn ErrorReporter {
        self.reporter.as_ref()
    }

    pub fn data_access(&mut self) -> &mut DataAccessState {
        &mut self.data_access
    }

    // ------------------------------------------------------------------
    // Transactions and side effects
    // ------------------------------------------------------------------

    /// Queue work that must only happen once every transaction commits
    pub fn add_deferred_side_effect<F>(&mut self, side_effect: F)
    where
        F: FnOnce() -> anyhow::Result<()> + 'static,
    {
        self.side_effects.push(Box::new(side_effect));
    }

    pub fn pending_side_effect_count(&self) -> usize {
        self.side_effects.len()
    }

    /// Commit or roll back every open connection
    ///
    /// After a successful commit the deferred side effects run with the
    /// query cache disabled. Every side effect runs even if an earlier one
    /// fails; the first failure is returned. The queue is always emptied.
    pub fn finalize_transaction(&mut self, commit: bool) -> Result<()> {
        let result = if commit {
            self.commit_and_run_side_effects()
        } else {
            self.rollback_forced = true;
            self.side_effects.clear();
            self.data_access.rollback_all().map_err(FrameworkError::from)
        };
        self.rollback_forced = false;
        result
    }

    fn commit_and_run_side_effects(&mut self) -> Result<()> {
        let side_effects = std::mem::take(&mut self.side_effects);

        let outcome = self.data_access.commit_all();
        if let TransactionOutcome::RolledBack { failed, error, .. } = &outcome {
            warn!(request_id = %self.id, database = %failed, %error, "commit failed; skipping deferred side effects");
            self.rollback_forced = true;
        }
        if self.rollback_forced {
            return outcome.into_result();
        }

        let _fresh = self.data_access.disable_cache();
        let mut first_error = None;
        for side_effect in side_effects {
            if let Err(err) = side_effect() {
                error!(request_id = %self.id, error = %format!("{:#}", err), "deferred side effect failed");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            None => Ok(()),
            Some(err) => Err(FrameworkError::SideEffect(err)),
        }
    }

    /// Capture the error to report when the request ends
    ///
    /// Only the first error is kept.
    pub fn record_error(&mut self, prefix: impl Into<String>, error: FrameworkError) {
        if let Some((existing, _)) = &self.error {
            warn!(request_id = %self.id, first = %existing, %error, "error already recorded for request");
            return;
        }
        self.error = Some((prefix.into(), error));
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    // ------------------------------------------------------------------
    // User
    // ------------------------------------------------------------------

    /// Allow access to the user from this point of the lifecycle on
    pub fn enable_user(&mut self) {
        self.user_enabled = true;
    }

    /// Run `f` with user access disabled
    pub fn with_user_disabled<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let previous = std::mem::replace(&mut self.user_disabled_by_page, true);
        let result = f(self);
        self.user_disabled_by_page = previous;
        result
    }

    /// Whether the user may be read over this connection
    pub fn user_accessible(&self) -> bool {
        !self.installation.supports_secure_connections || self.is_secure
    }

    /// The user making the request, loaded once per request
    pub fn current_user(&mut self) -> Result<Option<User>> {
        if !self.user_enabled {
            return Err(FrameworkError::UserAccessDenied(
                "User cannot be accessed this early in the request life cycle.".into(),
            ));
        }
        if self.user_disabled_by_page {
            return Err(FrameworkError::UserAccessDenied(
                "User cannot be accessed while the page is being identified.".into(),
            ));
        }
        if !self.user_accessible() {
            return Err(FrameworkError::UserAccessDenied(
                "User cannot be accessed from a nonsecure connection in an application that supports secure connections.".into(),
            ));
        }

        if let Some(user) = &self.user {
            return Ok(user.clone());
        }
        let user = if self.identity.is_user_management_enabled() {
            match self.identity.current_user_id(self.session_token.as_deref())? {
                Some(user_id) => self.identity.get_user(user_id)?,
                None => None,
            }
        } else {
            None
        };
        self.user = Some(user.clone());
        Ok(user)
    }

    pub fn clear_user(&mut self) {
        self.user = None;
    }

    /// For log-in and log-out logic
    pub fn set_user(&mut self, user: Option<User>) {
        self.user = Some(user);
    }

    pub fn intermediate_user_exists(&self) -> bool {
        self.identity
            .intermediate_user_exists(self.session_token.as_deref())
    }

    // ------------------------------------------------------------------
    // End of request
    // ------------------------------------------------------------------

    /// Close every connection and report what needs reporting
    ///
    /// Deferred side effects never run here. Leftover transactions are
    /// committed only when no error was recorded.
    pub fn cleanup(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;
        self.side_effects.clear();

        if self.error.is_none() {
            if let Err(err) = self.data_access.commit_all().into_result() {
                self.reporter
                    .report_error("Failed to commit leftover transactions.", Some(&err));
            }
        } else if let Err(err) = self.data_access.rollback_all() {
            warn!(request_id = %self.id, error = %err, "rollback during cleanup failed");
        }

        let elapsed = self.elapsed();
        if let Some((prefix, error)) = self.error.take() {
            error!(request_id = %self.id, %prefix, %error, "request failed");
            self.reporter.report_error(&prefix, Some(&error));
        } else if elapsed > SLOW_REQUEST_THRESHOLD && !self.installation.is_development() {
            self.reporter.report_error(
                &format!(
                    "Request took {:.1} seconds to process. The threshold is {} seconds.",
                    elapsed.as_secs_f64(),
                    SLOW_REQUEST_THRESHOLD.as_secs()
                ),
                None,
            );
        }

        info!(request_id = %self.id, url = %self.url, elapsed_ms = elapsed.as_millis() as u64, "request finished");
    }

    #[cfg(test)]
    fn backdate(&mut self, by: Duration) {
        if let Some(started) = self.started.checked_sub(by) {
            self.started = started;
        }
    }
}

impl Drop for RequestState {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstallationType;
    use crate::connection::identity::{InMemoryIdentityProvider, Role};
    use crate::core::{DataModificationError, DatabaseId};
    use crate::storage::MemoryDatabase;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Fixture {
        main: MemoryDatabase,
        reporter: Arc<CollectingReporter>,
        environment: RequestEnvironment,
    }

    fn fixture(installation: InstallationConfig) -> Fixture {
        let main = MemoryDatabase::new("main");
        let reporter = Arc::new(CollectingReporter::new());
        let databases = DatabaseRegistry::new()
            .with_database(DatabaseId::Primary, Arc::new(main.clone()), true)
            .unwrap();
        let environment =
            RequestEnvironment::new(installation, databases).reporter(reporter.clone());
        Fixture {
            main,
            reporter,
            environment,
        }
    }

    fn new_request(fixture: &Fixture) -> RequestState {
        RequestState::new(&fixture.environment, "http://localhost/pages/home", false, None)
    }

    #[test]
    fn test_side_effects_run_after_commit() {
        let f = fixture(InstallationConfig::development("test"));
        let mut request = new_request(&f);
        let log = Rc::new(RefCell::new(Vec::new()));

        request.data_access().put(None, "k", "v").unwrap();
        let seen = log.clone();
        let main = f.main.clone();
        request.add_deferred_side_effect(move || {
            seen.borrow_mut().push(main.committed_value("k")?);
            Ok(())
        });

        request.finalize_transaction(true).unwrap();
        assert_eq!(*log.borrow(), vec![Some("v".to_string())]);
        assert_eq!(request.pending_side_effect_count(), 0);
    }

    #[test]
    fn test_side_effects_discarded_on_rollback() {
        let f = fixture(InstallationConfig::development("test"));
        let mut request = new_request(&f);
        let ran = Rc::new(RefCell::new(false));

        request.data_access().put(None, "k", "v").unwrap();
        let flag = ran.clone();
        request.add_deferred_side_effect(move || {
            *flag.borrow_mut() = true;
            Ok(())
        });

        request.finalize_transaction(false).unwrap();
        assert!(!*ran.borrow());
        assert_eq!(request.pending_side_effect_count(), 0);
        assert_eq!(f.main.committed_value("k").unwrap(), None);
    }

    #[test]
    fn test_side_effects_skipped_when_commit_fails() {
        let f = fixture(InstallationConfig::development("test"));
        let mut request = new_request(&f);
        let ran = Rc::new(RefCell::new(false));

        request.data_access().put(None, "k", "v").unwrap();
        f.main.fail_next_commit("lost connection").unwrap();
        let flag = ran.clone();
        request.add_deferred_side_effect(move || {
            *flag.borrow_mut() = true;
            Ok(())
        });

        let err = request.finalize_transaction(true).unwrap_err();
        assert!(matches!(err, FrameworkError::Commit { .. }));
        assert!(!*ran.borrow());
    }

    #[test]
    fn test_every_side_effect_runs_and_first_error_wins() {
        let f = fixture(InstallationConfig::development("test"));
        let mut request = new_request(&f);
        let count = Rc::new(RefCell::new(0));

        for i in 0..3 {
            let count = count.clone();
            request.add_deferred_side_effect(move || {
                *count.borrow_mut() += 1;
                if i > 0 {
                    anyhow::bail!("side effect {} failed", i);
                }
                Ok(())
            });
        }

        let err = request.finalize_transaction(true).unwrap_err();
        assert_eq!(*count.borrow(), 3);
        assert!(err.to_string().contains("side effect 1 failed"));
    }

    #[test]
    fn test_cleanup_reports_error_once_and_rolls_back() {
        let f = fixture(InstallationConfig::development("test"));
        let mut request = new_request(&f);
        request.data_access().put(None, "k", "v").unwrap();
        request.record_error("Page failed.", FrameworkError::developer("boom"));
        request.record_error("Ignored.", FrameworkError::developer("second"));

        request.cleanup();
        request.cleanup();
        drop(request);

        let reports = f.reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].prefix, "Page failed.");
        assert_eq!(f.main.committed_value("k").unwrap(), None);
    }

    #[test]
    fn test_cleanup_commits_leftovers_without_side_effects() {
        let f = fixture(InstallationConfig::development("test"));
        let ran = Rc::new(RefCell::new(false));
        {
            let mut request = new_request(&f);
            request.data_access().put(None, "k", "v").unwrap();
            let flag = ran.clone();
            request.add_deferred_side_effect(move || {
                *flag.borrow_mut() = true;
                Ok(())
            });
        }
        assert_eq!(f.main.committed_value("k").unwrap(), Some("v".into()));
        assert!(!*ran.borrow());
        assert_eq!(f.main.stats().open_sessions, 0);
    }

    #[test]
    fn test_cleanup_does_not_commit_vetoed_leftovers() {
        let f = fixture(InstallationConfig::development("test"));
        {
            let mut request = new_request(&f);
            request.data_access().put(None, "k", "v").unwrap();
            request
                .data_access()
                .get_connection(None)
                .unwrap()
                .add_commit_time_validation(|_| Err(DataModificationError::single("Vetoed.")));
        }
        assert_eq!(f.main.committed_value("k").unwrap(), None);
        let reports = f.reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].prefix, "Failed to commit leftover transactions.");
    }

    #[test]
    fn test_slow_request_reported_outside_development() {
        let f = fixture(InstallationConfig::new("test", InstallationType::Live));
        let mut request = new_request(&f);
        request.backdate(Duration::from_secs(31));
        request.cleanup();

        let reports = f.reporter.reports();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].prefix.starts_with("Request took"));

        let f = fixture(InstallationConfig::development("test"));
        let mut request = new_request(&f);
        request.backdate(Duration::from_secs(31));
        request.cleanup();
        assert!(f.reporter.reports().is_empty());
    }

    #[test]
    fn test_current_user_gates() {
        let f = fixture(InstallationConfig::development("test").supports_secure_connections(true));
        let identity = Arc::new(InMemoryIdentityProvider::with_cost(4 /* bcrypt minimum cost; bcrypt::MIN_COST is private */));
        let user_id = identity
            .create_user("erin@example.com", "password123", Role::Standard)
            .unwrap();
        identity.bind_session("token", user_id).unwrap();
        let environment = f.environment.clone().identity(identity.clone());

        let mut insecure =
            RequestState::new(&environment, "http://localhost/", false, Some("token".into()));
        assert!(insecure.current_user().is_err());
        insecure.enable_user();
        assert!(insecure.current_user().unwrap_err().is_access_denied());

        let mut secure =
            RequestState::new(&environment, "https://localhost/", true, Some("token".into()));
        secure.enable_user();
        assert!(secure.with_user_disabled(|r| r.current_user()).is_err());

        let user = secure.current_user().unwrap().unwrap();
        assert_eq!(user.user_id(), user_id);

        // Memoized until cleared
        identity.log_out("token").unwrap();
        assert!(secure.current_user().unwrap().is_some());
        secure.clear_user();
        assert!(secure.current_user().unwrap().is_none());
    }
}
