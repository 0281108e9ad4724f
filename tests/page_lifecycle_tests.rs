use ewfcore::config::InstallationType;
use ewfcore::modification::PLEASE_CORRECT_ERRORS;
use ewfcore::page::form::{EVENT_ARGUMENT_FIELD, EVENT_POST_BACK_ARGUMENT, EVENT_TARGET_FIELD, PAGE_STATE_FIELD};
use ewfcore::page::lifecycle::{ANOTHER_USER_MODIFIED_PAGE, COULD_NOT_INTERPRET_ACTION};
use ewfcore::page::state::decode_page_state;
use ewfcore::page::{Container, Control, Destination, LoadContext, Parameters, PostBackButton, TextField};
use ewfcore::request::CollectingReporter;
use ewfcore::{
    DataModificationError, DatabaseId, DatabaseRegistry, FrameworkError, InstallationConfig, LifecycleOutcome, MemoryDatabase, Page,
    PageCatalog, PageInfo, PageRequest, RenderedPage, RequestEnvironment, RequestState, Result, SessionState,
    StatusMessage, execute_page,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct SideEffectLog(Arc<Mutex<Vec<String>>>);

impl SideEffectLog {
    fn push(&self, entry: String) {
        self.0.lock().expect("log lock").push(entry);
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().expect("log lock").clone()
    }
}

/// Edits an account name; every save also writes an audit row and queues a
/// notification side effect.
struct AccountPage {
    account: String,
    log: SideEffectLog,
}

impl Page for AccountPage {
    fn resolve_info(&mut self, parameters: &Parameters, _request: &mut RequestState) -> Result<PageInfo> {
        self.account = parameters.get("account").cloned().unwrap_or_else(|| "1".into());
        Ok(PageInfo::new("account").parameter("account", &self.account))
    }

    fn load_data(&mut self, ctx: &mut LoadContext<'_>) -> Result<Vec<Box<dyn Control>>> {
        let name_key = format!("account:{}:name", self.account);
        let nickname_key = format!("account:{}:nickname", self.account);
        let name = ctx.request.data_access().query(None, &name_key)?.unwrap_or_default();
        let nickname = ctx.request.data_access().query(None, &nickname_key)?.unwrap_or_default();

        let (account, log) = (self.account.clone(), self.log.clone());
        let name_field = TextField::new("name", "name", &name)
            .required(true)
            .on_save(move |m, value| {
                m.data_access().put(None, &name_key, value)?;
                m.data_access()
                    .put(Some("audit"), &format!("audit:{}", account), &format!("name={}", value))?;
                let (log, entry) = (log.clone(), format!("notify {}", value));
                m.request.add_deferred_side_effect(move || {
                    log.push(entry);
                    Ok(())
                });
                Ok(())
            });
        let nickname_field = TextField::new("nickname", "nickname", &nickname)
            .max_length(5)
            .on_save(move |m, value| m.data_access().put(None, &nickname_key, value));

        let next_account = (self.account.parse::<u32>().unwrap_or(1) + 1).to_string();
        let save = PostBackButton::new("save").submit().action(|m| {
            m.add_status_message(StatusMessage::info("Account saved."));
            Ok(())
        });
        let next = PostBackButton::new("next").action(move |m| {
            m.redirect_to(Destination::Page(PageInfo::new("account").parameter("account", &next_account)));
            Ok(())
        });
        let home = PostBackButton::new("home").action(|m| {
            m.redirect_to(Destination::Page(PageInfo::new("home")));
            Ok(())
        });

        Ok(vec![Box::new(
            Container::new("account_form")
                .child(name_field)
                .child(nickname_field)
                .child(save)
                .child(next)
                .child(home),
        )])
    }
}

struct HomePage;

impl Page for HomePage {
    fn resolve_info(&mut self, _: &Parameters, _: &mut RequestState) -> Result<PageInfo> {
        Ok(PageInfo::new("home"))
    }

    fn load_data(&mut self, _: &mut LoadContext<'_>) -> Result<Vec<Box<dyn Control>>> {
        Ok(Vec::new())
    }
}

/// Two buttons that both claim the enter key
struct TwoSubmitButtonsPage;

impl Page for TwoSubmitButtonsPage {
    fn resolve_info(&mut self, _: &Parameters, _: &mut RequestState) -> Result<PageInfo> {
        Ok(PageInfo::new("buttons"))
    }

    fn load_data(&mut self, _: &mut LoadContext<'_>) -> Result<Vec<Box<dyn Control>>> {
        Ok(vec![
            Box::new(PostBackButton::new("ok").submit()),
            Box::new(PostBackButton::new("apply").submit()),
        ])
    }
}

struct DuplicateKeyPage;

impl Page for DuplicateKeyPage {
    fn resolve_info(&mut self, _: &Parameters, _: &mut RequestState) -> Result<PageInfo> {
        Ok(PageInfo::new("duplicates"))
    }

    fn load_data(&mut self, _: &mut LoadContext<'_>) -> Result<Vec<Box<dyn Control>>> {
        Ok(vec![
            Box::new(TextField::new("city", "city", "")),
            Box::new(TextField::new("city", "city", "")),
        ])
    }
}

struct SecurePage;

impl Page for SecurePage {
    fn resolve_info(&mut self, _: &Parameters, _: &mut RequestState) -> Result<PageInfo> {
        Ok(PageInfo::new("secure").secure(true))
    }

    fn load_data(&mut self, _: &mut LoadContext<'_>) -> Result<Vec<Box<dyn Control>>> {
        Ok(Vec::new())
    }
}

const SEAT_TAKEN: &str = "That seat was just taken.";
const COUNTER_FROZEN: &str = "The view counter is frozen.";

/// Bumps a counter on every load; the bump is always vetoed at commit
struct CounterPage;

impl Page for CounterPage {
    fn resolve_info(&mut self, _: &Parameters, _: &mut RequestState) -> Result<PageInfo> {
        Ok(PageInfo::new("counter"))
    }

    fn load_data(&mut self, ctx: &mut LoadContext<'_>) -> Result<Vec<Box<dyn Control>>> {
        let data = ctx.request.data_access();
        data.put(None, "view_counter", "bumped")?;
        data.get_connection(None)?
            .add_commit_time_validation(|_| Err(DataModificationError::single(COUNTER_FROZEN)));
        Ok(vec![
            Box::new(TextField::new("name", "name", "Kim").required(true)),
            Box::new(PostBackButton::new("save").submit()),
        ])
    }
}

/// Reserving writes the seat, then a commit-time check rejects it
struct SeatPage;

impl Page for SeatPage {
    fn resolve_info(&mut self, _: &Parameters, _: &mut RequestState) -> Result<PageInfo> {
        Ok(PageInfo::new("seats"))
    }

    fn load_data(&mut self, _: &mut LoadContext<'_>) -> Result<Vec<Box<dyn Control>>> {
        let reserve = PostBackButton::new("reserve").submit().action(|m| {
            m.data_access().put(None, "seat:12a", "reserved")?;
            m.data_access()
                .get_connection(None)?
                .add_commit_time_validation(|_| Err(DataModificationError::single(SEAT_TAKEN)));
            m.add_status_message(StatusMessage::info("Seat reserved."));
            Ok(())
        });
        Ok(vec![Box::new(reserve)])
    }
}

/// Shows an extra field only while modification errors exist
struct ShiftingPage;

impl Page for ShiftingPage {
    fn resolve_info(&mut self, _: &Parameters, _: &mut RequestState) -> Result<PageInfo> {
        Ok(PageInfo::new("shifting"))
    }

    fn load_data(&mut self, ctx: &mut LoadContext<'_>) -> Result<Vec<Box<dyn Control>>> {
        let mut controls: Vec<Box<dyn Control>> = vec![
            Box::new(TextField::new("code", "code", "").max_length(3)),
            Box::new(PostBackButton::new("save").submit()),
        ];
        if ctx.modification_errors_exist() {
            controls.push(Box::new(TextField::new("hint", "hint", "")));
        }
        Ok(controls)
    }
}

/// The comment box is added as an ethereal control
struct CommentPage;

impl Page for CommentPage {
    fn resolve_info(&mut self, _: &Parameters, _: &mut RequestState) -> Result<PageInfo> {
        Ok(PageInfo::new("comments"))
    }

    fn load_data(&mut self, ctx: &mut LoadContext<'_>) -> Result<Vec<Box<dyn Control>>> {
        let existing = ctx.request.data_access().query(None, "comment")?.unwrap_or_default();
        ctx.add_ethereal_control(Box::new(
            TextField::new("comment", "comment", &existing)
                .max_length(20)
                .on_save(|m, value| m.data_access().put(None, "comment", value)),
        ));
        Ok(vec![Box::new(PostBackButton::new("send").submit())])
    }
}

struct Fixture {
    primary: MemoryDatabase,
    audit: MemoryDatabase,
    environment: RequestEnvironment,
    catalog: PageCatalog,
    reporter: Arc<CollectingReporter>,
    log: SideEffectLog,
    session: SessionState,
}

impl Fixture {
    fn new() -> Self {
        Self::with_installation(InstallationConfig::development("accounts"))
    }

    fn with_installation(installation: InstallationConfig) -> Self {
        let primary = MemoryDatabase::new("main");
        let audit = MemoryDatabase::new("audit");
        primary.seed("account:1:name", "Alice").expect("seed");

        let databases = DatabaseRegistry::new()
            .with_database(DatabaseId::Primary, Arc::new(primary.clone()), true)
            .and_then(|r| r.with_database(DatabaseId::Secondary("audit".into()), Arc::new(audit.clone()), true))
            .expect("registry");
        let reporter = Arc::new(CollectingReporter::new());
        let environment = RequestEnvironment::new(installation, databases).reporter(reporter.clone());

        let log = SideEffectLog::default();
        let page_log = log.clone();
        let catalog = PageCatalog::new()
            .register("account", move || {
                Box::new(AccountPage {
                    account: String::new(),
                    log: page_log.clone(),
                })
            })
            .register("home", || Box::new(HomePage))
            .register("buttons", || Box::new(TwoSubmitButtonsPage))
            .register("duplicates", || Box::new(DuplicateKeyPage))
            .register("secure", || Box::new(SecurePage))
            .register("counter", || Box::new(CounterPage))
            .register("seats", || Box::new(SeatPage))
            .register("shifting", || Box::new(ShiftingPage))
            .register("comments", || Box::new(CommentPage));

        Self {
            primary,
            audit,
            environment,
            catalog,
            reporter,
            log,
            session: SessionState::new(),
        }
    }

    fn run(&mut self, page_type: &str, form: Option<BTreeMap<String, String>>) -> Result<LifecycleOutcome> {
        let url = format!("http://localhost/pages/{}", page_type);
        let mut request = RequestState::new(&self.environment, &url, false, None);
        let outcome = execute_page(
            &self.catalog,
            &mut request,
            &mut self.session,
            PageRequest {
                page_type: page_type.into(),
                parameters: Parameters::new(),
                form,
            },
        );
        request.cleanup();
        outcome
    }

    fn view(&mut self) -> RenderedPage {
        rendered(self.run("account", None).expect("first view"))
    }

    fn post(&mut self, page: &RenderedPage, fields: &[(&str, &str)], event_target: Option<&str>) -> Result<LifecycleOutcome> {
        self.post_to("account", page, fields, event_target)
    }

    fn post_to(
        &mut self,
        page_type: &str,
        page: &RenderedPage,
        fields: &[(&str, &str)],
        event_target: Option<&str>,
    ) -> Result<LifecycleOutcome> {
        let mut form: BTreeMap<String, String> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        form.insert(PAGE_STATE_FIELD.into(), page.page_state.clone());
        if let Some(target) = event_target {
            form.insert(EVENT_TARGET_FIELD.into(), target.into());
            form.insert(EVENT_ARGUMENT_FIELD.into(), EVENT_POST_BACK_ARGUMENT.into());
        }
        self.run(page_type, Some(form))
    }
}

fn rendered(outcome: LifecycleOutcome) -> RenderedPage {
    match outcome {
        LifecycleOutcome::Rendered { status, page } => {
            assert_eq!(status, 200);
            *page
        }
        other => panic!("expected a rendered page, got {:?}", other),
    }
}

fn stored_hash(page: &RenderedPage) -> String {
    decode_page_state(&page.page_state).expect("page state").1
}

#[test]
fn form_hash_is_stable_across_views() {
    let mut fixture = Fixture::new();
    let first = fixture.view();
    let second = fixture.view();

    let hash = stored_hash(&first);
    assert_eq!(hash, stored_hash(&second));
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}

#[test]
fn unchanged_post_back_round_trips_without_errors() {
    let mut fixture = Fixture::new();
    let page = fixture.view();

    let after = rendered(fixture.post(&page, &[("name", "Alice"), ("nickname", "")], None).unwrap());
    assert!(after.top_errors.is_empty());
    assert_eq!(after.field("name"), Some("Alice"));
    assert!(fixture.log.entries().is_empty());
}

#[test]
fn successful_post_back_commits_then_runs_side_effects() {
    let mut fixture = Fixture::new();
    let page = fixture.view();

    let after = rendered(
        fixture
            .post(&page, &[("name", "  Bob "), ("nickname", "bo")], Some("save"))
            .unwrap(),
    );

    assert_eq!(fixture.primary.committed_value("account:1:name").unwrap().as_deref(), Some("Bob"));
    assert_eq!(fixture.primary.committed_value("account:1:nickname").unwrap().as_deref(), Some("bo"));
    assert_eq!(fixture.audit.committed_value("audit:1").unwrap().as_deref(), Some("name=Bob"));
    assert_eq!(fixture.log.entries(), vec!["notify Bob".to_string()]);

    assert!(after.top_errors.is_empty());
    assert_eq!(after.field("name"), Some("Bob"));
    assert_eq!(after.status_messages, vec![StatusMessage::info("Account saved.")]);
}

#[test]
fn one_failed_validation_blocks_every_mutation() {
    let mut fixture = Fixture::new();
    let page = fixture.view();

    let after = rendered(
        fixture
            .post(&page, &[("name", "Bob"), ("nickname", "far too long")], Some("save"))
            .unwrap(),
    );

    assert_eq!(fixture.primary.committed_value("account:1:name").unwrap().as_deref(), Some("Alice"));
    assert_eq!(fixture.audit.committed_value("audit:1").unwrap(), None);
    assert!(fixture.log.entries().is_empty());

    assert_eq!(after.top_errors, vec![PLEASE_CORRECT_ERRORS.to_string()]);
    assert_eq!(
        after.errors_by_display.get("nickname_error"),
        Some(&vec!["The nickname is too long. It must be 5 characters or fewer.".to_string()])
    );
    assert_eq!(after.field("nickname"), Some("far too long"));
    assert!(after.status_messages.is_empty());
}

#[test]
fn failed_secondary_commit_keeps_primary_and_skips_side_effects() {
    let mut fixture = Fixture::new();
    let page = fixture.view();
    fixture.audit.fail_next_commit("audit disk full").unwrap();

    let err = fixture
        .post(&page, &[("name", "Bob"), ("nickname", "")], Some("save"))
        .unwrap_err();

    match err {
        FrameworkError::Commit { database, .. } => {
            assert_eq!(database, DatabaseId::Secondary("audit".into()))
        }
        other => panic!("expected a commit failure, got {:?}", other),
    }
    assert_eq!(fixture.primary.committed_value("account:1:name").unwrap().as_deref(), Some("Bob"));
    assert_eq!(fixture.audit.committed_value("audit:1").unwrap(), None);
    assert!(fixture.log.entries().is_empty());
}

#[test]
fn failed_primary_commit_rolls_back_secondaries() {
    let mut fixture = Fixture::new();
    let page = fixture.view();
    fixture.primary.fail_next_commit("primary unavailable").unwrap();

    let err = fixture
        .post(&page, &[("name", "Bob"), ("nickname", "")], Some("save"))
        .unwrap_err();

    assert!(matches!(err, FrameworkError::Commit { database: DatabaseId::Primary, .. }));
    assert_eq!(fixture.primary.committed_value("account:1:name").unwrap().as_deref(), Some("Alice"));
    assert_eq!(fixture.audit.committed_value("audit:1").unwrap(), None);
    assert!(fixture.log.entries().is_empty());
}

#[test]
fn concurrent_change_is_detected_and_nothing_is_written() {
    let mut fixture = Fixture::new();
    let page = fixture.view();
    fixture.primary.seed("account:1:name", "Zed").unwrap();

    let after = rendered(
        fixture
            .post(&page, &[("name", "Carol"), ("nickname", "")], Some("save"))
            .unwrap(),
    );

    assert_eq!(after.top_errors, vec![ANOTHER_USER_MODIFIED_PAGE.to_string()]);
    assert_eq!(after.field("name"), Some("Carol"));
    assert_eq!(fixture.primary.committed_value("account:1:name").unwrap().as_deref(), Some("Zed"));
    assert!(fixture.audit.committed_value("audit:1").unwrap().is_none());
    assert!(fixture.log.entries().is_empty());
}

#[test]
fn unknown_field_is_treated_as_concurrent_change() {
    let mut fixture = Fixture::new();
    let page = fixture.view();

    let after = rendered(
        fixture
            .post(&page, &[("name", "Bob"), ("injected", "1")], None)
            .unwrap(),
    );
    assert_eq!(after.top_errors, vec![ANOTHER_USER_MODIFIED_PAGE.to_string()]);
    assert_eq!(fixture.primary.committed_value("account:1:name").unwrap().as_deref(), Some("Alice"));
}

#[test]
fn event_for_unknown_target_is_not_interpreted() {
    let mut fixture = Fixture::new();
    let page = fixture.view();

    let after = rendered(
        fixture
            .post(&page, &[("name", "Alice"), ("nickname", "")], Some("delete"))
            .unwrap(),
    );
    assert_eq!(after.top_errors, vec![COULD_NOT_INTERPRET_ACTION.to_string()]);
}

#[test]
fn redirect_to_same_page_type_keeps_state_in_session() {
    let mut fixture = Fixture::new();
    let page = fixture.view();

    let outcome = fixture
        .post(&page, &[("name", "Alice"), ("nickname", "")], Some("next"))
        .unwrap();
    assert_eq!(
        outcome,
        LifecycleOutcome::Redirect {
            url: "/pages/account?account=2".into()
        }
    );
    assert!(fixture.session.has_transfer_state());
}

#[test]
fn redirect_to_other_page_type_leaves_session_empty() {
    let mut fixture = Fixture::new();
    let page = fixture.view();

    let outcome = fixture
        .post(&page, &[("name", "Alice"), ("nickname", "")], Some("home"))
        .unwrap();
    assert_eq!(outcome, LifecycleOutcome::Redirect { url: "/pages/home".into() });
    assert!(!fixture.session.has_transfer_state());
}

#[test]
fn two_submit_buttons_fail_in_development() {
    let mut fixture = Fixture::new();
    let err = fixture.run("buttons", None).unwrap_err();
    match err {
        FrameworkError::Developer(message) => assert!(message.contains("The button IDs are ok, apply.")),
        other => panic!("expected a developer error, got {:?}", other),
    }
}

#[test]
fn two_submit_buttons_are_reported_when_live() {
    let mut fixture = Fixture::with_installation(InstallationConfig::new("accounts", InstallationType::Live));
    let page = rendered(fixture.run("buttons", None).unwrap());

    assert_eq!(page.buttons.len(), 2);
    let reports = fixture.reporter.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].prefix.starts_with("Multiple buttons with submit behavior were detected."));
}

#[test]
fn duplicate_form_value_keys_are_fatal() {
    let mut fixture = Fixture::with_installation(InstallationConfig::new("accounts", InstallationType::Live));
    let err = fixture.run("duplicates", None).unwrap_err();
    assert!(matches!(err, FrameworkError::Developer(message) if message == "Duplicate post-back-value keys exist: city."));
}

#[test]
fn insecure_request_for_secure_page_redirects() {
    let mut fixture = Fixture::with_installation(InstallationConfig::development("accounts").supports_secure_connections(true));
    let outcome = fixture.run("secure", None).unwrap();
    assert_eq!(
        outcome,
        LifecycleOutcome::Redirect {
            url: "https://localhost/pages/secure".into()
        }
    );
}

#[test]
fn intermediate_installation_requires_intermediate_log_in() {
    let mut fixture = Fixture::with_installation(InstallationConfig::new("accounts", InstallationType::Intermediate));
    let err = fixture.run("home", None).unwrap_err();
    assert!(matches!(
        err,
        FrameworkError::AccessDenied {
            intermediate_login_required: true,
            ..
        }
    ));
}

#[test]
fn error_re_render_does_not_commit_vetoed_load_writes() {
    let mut fixture = Fixture::new();
    let page = rendered(fixture.run("counter", None).unwrap());
    assert_eq!(page.top_errors, vec![COUNTER_FROZEN.to_string()]);
    assert_eq!(fixture.primary.committed_value("view_counter").unwrap(), None);

    let after = rendered(
        fixture
            .post_to("counter", &page, &[("name", "")], Some("save"))
            .unwrap(),
    );
    assert_eq!(
        after.top_errors,
        vec![PLEASE_CORRECT_ERRORS.to_string(), COUNTER_FROZEN.to_string()]
    );
    assert_eq!(fixture.primary.committed_value("view_counter").unwrap(), None);
    assert!(fixture.reporter.reports().is_empty());
}

#[test]
fn failed_commit_time_validation_rolls_back_post_back() {
    let mut fixture = Fixture::new();
    let page = rendered(fixture.run("seats", None).unwrap());

    let after = rendered(fixture.post_to("seats", &page, &[], Some("reserve")).unwrap());
    assert_eq!(after.top_errors, vec![SEAT_TAKEN.to_string()]);
    assert!(after.status_messages.is_empty());
    assert_eq!(fixture.primary.committed_value("seat:12a").unwrap(), None);
    assert!(!fixture.session.has_transfer_state());
}

#[test]
fn controls_changing_on_error_re_render_fail_in_development() {
    let mut fixture = Fixture::new();
    let page = rendered(fixture.run("shifting", None).unwrap());

    let err = fixture
        .post_to("shifting", &page, &[("code", "toolong")], Some("save"))
        .unwrap_err();
    assert!(matches!(err, FrameworkError::Developer(message) if message.starts_with("Possible developer mistake.")));
}

#[test]
fn controls_changing_on_error_re_render_are_reported_when_live() {
    let mut fixture = Fixture::with_installation(InstallationConfig::new("accounts", InstallationType::Live));
    let page = rendered(fixture.run("shifting", None).unwrap());

    let after = rendered(
        fixture
            .post_to("shifting", &page, &[("code", "toolong")], Some("save"))
            .unwrap(),
    );
    assert_eq!(after.top_errors, vec![PLEASE_CORRECT_ERRORS.to_string()]);
    assert_eq!(after.field("hint"), Some(""));
    let reports = fixture.reporter.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].prefix.starts_with("Possible developer mistake."));
}

#[test]
fn ethereal_control_is_loaded_and_saved() {
    let mut fixture = Fixture::new();
    let page = rendered(fixture.run("comments", None).unwrap());
    assert_eq!(page.field("comment"), Some(""));

    let after = rendered(
        fixture
            .post_to("comments", &page, &[("comment", "Nice trip")], Some("send"))
            .unwrap(),
    );
    assert!(after.top_errors.is_empty());
    assert_eq!(after.field("comment"), Some("Nice trip"));
    assert_eq!(fixture.primary.committed_value("comment").unwrap().as_deref(), Some("Nice trip"));
}
