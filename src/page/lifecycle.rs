// ============================================================================
// Page lifecycle
// ============================================================================
//
// One pass over a page is a PageCycle driven through LifecycleStage values:
//
//   Initializing -> RestoringState -> LoadingData
//     -> AwaitingPostBackDecision -> ExecutingModification   (post-backs)
//     -> PreCommit -> Committing
//     -> Navigating -> Transferring | Redirecting           (post-backs)
//     -> Rendering                                           (first views)
//     -> Terminal
//
// A transfer starts a new cycle for the same page within the request,
// carrying the lifecycle state over. Post-backs never render directly: they
// always end in a transfer or a redirect.
//
// ============================================================================

use super::controls::load_tree;
use super::destination::{decide_navigation, url_with_security, Destination, Navigation};
use super::form::{
    PostBackValues, EVENT_ARGUMENT_FIELD, EVENT_POST_BACK_ARGUMENT, EVENT_TARGET_FIELD,
    PAGE_STATE_FIELD, SCROLL_POSITION_FIELD,
};
use super::registry::{ControlRegistry, LoadContext};
use super::state::{decode_page_state, encode_page_state, PageLifecycleState};
use super::{Control, Page, PageCatalog, PageInfo, Parameters, RenderedButton, RenderedField, RenderedPage};
use crate::core::{FrameworkError, Result};
use crate::modification::{DataModification, ErrorSink, ModificationContext, ModificationOutcome};
use crate::request::{report_developer_error, RequestState};
use crate::session::{SessionState, StatusMessage};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub const ANOTHER_USER_MODIFIED_PAGE: &str =
    "Another user has modified this page since you last viewed it. Please review the changes and try again.";
pub const COULD_NOT_INTERPRET_ACTION: &str =
    "Another user has modified this page and we could not interpret your action. Please try again.";
pub const APPLICATION_UPDATED: &str =
    "The application has been updated and we could not interpret your action. Please try again.";

const STATIC_HASH_MISMATCH: &str = "Possible developer mistake. Form controls, modification error display keys, and post back event handlers may not change on a post back with modification errors. There is a chance that this was caused by something outside the request, but it's more likely that a developer incorrectly modified something.";

pub const LOG_IN_PAGE_TYPE: &str = "log-in";

const MAX_TRANSFERS: usize = 4;

/// Last-request times closer together than this are not recorded
const LAST_REQUEST_TIME_RESOLUTION_MINUTES: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page_type: String,
    pub parameters: Parameters,
    /// Posted form fields; `None` on a first view
    pub form: Option<BTreeMap<String, String>>,
}

impl PageRequest {
    pub fn get(page_type: &str, parameters: Parameters) -> Self {
        Self {
            page_type: page_type.to_string(),
            parameters,
            form: None,
        }
    }

    pub fn post(page_type: &str, parameters: Parameters, form: BTreeMap<String, String>) -> Self {
        Self {
            page_type: page_type.to_string(),
            parameters,
            form: Some(form),
        }
    }

    pub fn is_post_back(&self) -> bool {
        self.form.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleOutcome {
    Rendered { status: u16, page: Box<RenderedPage> },
    Redirect { url: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStage {
    Initializing,
    RestoringState,
    LoadingData,
    AwaitingPostBackDecision,
    ExecutingModification,
    PreCommit,
    Committing,
    Navigating,
    Transferring,
    Redirecting,
    Rendering,
    Terminal,
}

enum CycleEnd {
    Transfer { state: PageLifecycleState, status: u16 },
    Finished(LifecycleOutcome),
}

/// Run a page request to completion, following transfers
///
/// The caller owns `request` and must clean it up afterwards, whatever the
/// result.
pub fn execute_page(
    catalog: &PageCatalog,
    request: &mut RequestState,
    session: &mut SessionState,
    page_request: PageRequest,
) -> Result<LifecycleOutcome> {
    let PageRequest {
        page_type,
        parameters,
        mut form,
    } = page_request;
    let mut transferred = None;
    let mut status = 200;

    for _ in 0..=MAX_TRANSFERS {
        let cycle = PageCycle::new(
            catalog,
            &mut *request,
            &mut *session,
            &page_type,
            &parameters,
            form.take(),
            transferred.take(),
            status,
        )?;
        match cycle.run()? {
            CycleEnd::Finished(outcome) => return Ok(outcome),
            CycleEnd::Transfer {
                state,
                status: transfer_status,
            } => {
                debug!(request_id = %request.id(), %page_type, "transferring");
                transferred = Some(state);
                status = transfer_status;
            }
        }
    }

    Err(FrameworkError::developer(format!(
        "Page '{}' transferred to itself more than {} times.",
        page_type, MAX_TRANSFERS
    )))
}

struct PageCycle<'a> {
    catalog: &'a PageCatalog,
    request: &'a mut RequestState,
    session: &'a mut SessionState,
    parameters: &'a Parameters,
    form: Option<BTreeMap<String, String>>,
    transferred: Option<PageLifecycleState>,
    page: Box<dyn Page>,
    info: PageInfo,
    state: PageLifecycleState,
    registry: ControlRegistry,
    controls: Vec<Box<dyn Control>>,
    form_value_hash: String,
    event_target: Option<String>,
    redirect: Option<Destination>,
    status_messages: Vec<StatusMessage>,
    session_messages: Vec<StatusMessage>,
    display_states: BTreeMap<String, bool>,
    focus: Option<String>,
    status: u16,
    end: Option<CycleEnd>,
}

impl<'a> PageCycle<'a> {
    #[allow(clippy::too_many_arguments)]
    fn new(
        catalog: &'a PageCatalog,
        request: &'a mut RequestState,
        session: &'a mut SessionState,
        page_type: &str,
        parameters: &'a Parameters,
        form: Option<BTreeMap<String, String>>,
        transferred: Option<PageLifecycleState>,
        status: u16,
    ) -> Result<Self> {
        Ok(Self {
            page: catalog.create(page_type)?,
            catalog,
            request,
            session,
            parameters,
            form,
            transferred,
            info: PageInfo::new(page_type),
            state: PageLifecycleState::new(),
            registry: ControlRegistry::new(),
            controls: Vec::new(),
            form_value_hash: String::new(),
            event_target: None,
            redirect: None,
            status_messages: Vec::new(),
            session_messages: Vec::new(),
            display_states: BTreeMap::new(),
            focus: None,
            status,
            end: None,
        })
    }

    fn is_post_back(&self) -> bool {
        self.form.is_some()
    }

    fn run(mut self) -> Result<CycleEnd> {
        let mut stage = LifecycleStage::Initializing;
        while stage != LifecycleStage::Terminal {
            debug!(request_id = %self.request.id(), page_type = %self.info.page_type, ?stage, "page lifecycle");
            stage = self.step(stage)?;
        }
        self.end
            .take()
            .ok_or_else(|| FrameworkError::developer("The page lifecycle ended without an outcome."))
    }

    fn step(&mut self, stage: LifecycleStage) -> Result<LifecycleStage> {
        use LifecycleStage::*;
        match stage {
            Initializing => self.initialize(),
            RestoringState => self.restore_state(),
            LoadingData => self.load_data(),
            AwaitingPostBackDecision => self.decide_post_back(),
            ExecutingModification => self.execute_modifications(),
            PreCommit => self.pre_commit(),
            Committing if self.is_post_back() => self.commit_post_back(),
            Committing => self.finish_request_modifications(),
            Navigating => self.navigate(),
            Rendering => self.render(),
            Transferring | Redirecting | Terminal => Ok(Terminal),
        }
    }

    // ------------------------------------------------------------------
    // Initializing
    // ------------------------------------------------------------------

    fn initialize(&mut self) -> Result<LifecycleStage> {
        self.request.enable_user();
        let (page, parameters) = (&mut self.page, self.parameters);
        self.info = self
            .request
            .with_user_disabled(|request| page.resolve_info(parameters, request))?;

        let installation = self.request.installation();
        if installation.supports_secure_connections && self.info.should_be_secure != self.request.is_secure() {
            let url = url_with_security(self.request.url(), self.info.should_be_secure)?;
            info!(request_id = %self.request.id(), %url, "redirecting to match required security");
            self.end = Some(CycleEnd::Finished(LifecycleOutcome::Redirect { url }));
            return Ok(LifecycleStage::Redirecting);
        }

        if installation.installation_type.is_intermediate()
            && !self.info.intermediate_public
            && !self.request.intermediate_user_exists()
        {
            return Err(FrameworkError::AccessDenied {
                intermediate_login_required: true,
                log_in_page: None,
            });
        }

        let entity_allows = match self.page.entity_setup() {
            Some(entity_setup) => entity_setup.user_can_access(self.request)?,
            None => true,
        };
        if !entity_allows || !self.page.user_can_access(&self.info, self.request)? {
            return Err(FrameworkError::AccessDenied {
                intermediate_login_required: false,
                log_in_page: self.log_in_page(),
            });
        }

        if let Some(message) = &self.info.disabled_message {
            return Err(FrameworkError::PageDisabled(message.clone()));
        }
        Ok(LifecycleStage::RestoringState)
    }

    /// Where to send an anonymous user who was denied access
    fn log_in_page(&mut self) -> Option<String> {
        let anonymous = self.request.identity().is_user_management_enabled()
            && self.request.user_accessible()
            && matches!(self.request.current_user(), Ok(None));
        anonymous.then(|| {
            PageInfo::new(LOG_IN_PAGE_TYPE)
                .parameter("return_url", self.info.url())
                .url()
        })
    }

    // ------------------------------------------------------------------
    // Restoring or creating state
    // ------------------------------------------------------------------

    fn restore_state(&mut self) -> Result<LifecycleStage> {
        let Some(form) = &self.form else {
            self.state = self
                .transferred
                .take()
                .or_else(|| self.session.take_transfer_state(&self.info.page_type))
                .unwrap_or_default();
            return Ok(LifecycleStage::LoadingData);
        };

        let reason = match form.get(PAGE_STATE_FIELD).map(|blob| decode_page_state(blob)) {
            Some(Ok((page_data, hash))) => {
                self.state = PageLifecycleState::restored(page_data, form.get(SCROLL_POSITION_FIELD).cloned());
                self.form_value_hash = hash;
                return Ok(LifecycleStage::LoadingData);
            }
            Some(Err(err)) => err.to_string(),
            None => "page state field missing".to_string(),
        };

        info!(request_id = %self.request.id(), %reason, "page state could not be restored");
        let mut fresh = PageLifecycleState::new();
        fresh.top_modification_errors = vec![APPLICATION_UPDATED.to_string()];
        self.end = Some(CycleEnd::Transfer {
            state: fresh,
            status: 400,
        });
        Ok(LifecycleStage::Transferring)
    }

    // ------------------------------------------------------------------
    // Loading data
    // ------------------------------------------------------------------

    fn load_data(&mut self) -> Result<LifecycleStage> {
        {
            let mut ctx = LoadContext::new(&mut *self.request, &mut self.state, &mut self.registry);
            if let Some(entity_setup) = self.page.entity_setup() {
                entity_setup.load_data(&mut ctx)?;
            }
            self.controls = self.page.load_data(&mut ctx)?;
            for control in self.controls.iter_mut() {
                load_tree(control.as_mut(), &mut ctx)?;
            }
            while let Some(mut control) = ctx.next_ethereal_control() {
                load_tree(control.as_mut(), &mut ctx)?;
                self.controls.push(control);
            }
        }

        let submit_buttons = self.registry.submit_button_ids();
        if submit_buttons.len() > 1 {
            let message = format!(
                "Multiple buttons with submit behavior were detected. There may only be one per page. The button IDs are {}.",
                submit_buttons.join(", ")
            );
            report_developer_error(self.request.installation(), self.request.reporter(), message)?;
        }

        for validation in self.registry.take_tree_validations() {
            validation()?;
        }

        let duplicates = self.registry.duplicate_keys();
        if !duplicates.is_empty() {
            return Err(FrameworkError::developer(format!(
                "Duplicate post-back-value keys exist: {}.",
                duplicates.join(", ")
            )));
        }

        self.display_states = self
            .registry
            .display_states(self.state.post_back_values.as_ref());
        self.focus = self
            .state
            .control_with_focus_id
            .clone()
            .or_else(|| self.registry.first_focusable().map(str::to_string));
        self.status_messages.clear();

        if self.is_post_back() {
            return Ok(LifecycleStage::AwaitingPostBackDecision);
        }

        if let Some(static_hash) = &self.state.static_form_value_hash {
            let current = self
                .registry
                .static_hash(self.state.modification_errors_exist());
            if &current != static_hash {
                report_developer_error(self.request.installation(), self.request.reporter(), STATIC_HASH_MISMATCH)?;
            }
        }
        self.form_value_hash = self.registry.concurrency_hash();
        Ok(LifecycleStage::PreCommit)
    }

    // ------------------------------------------------------------------
    // Post-back decision and modifications
    // ------------------------------------------------------------------

    fn decide_post_back(&mut self) -> Result<LifecycleStage> {
        let Some(form) = &self.form else {
            return Ok(LifecycleStage::PreCommit);
        };
        let registry = &self.registry;

        let target = form.get(EVENT_TARGET_FIELD).map(String::as_str).unwrap_or("");
        let target_is_handler = !target.is_empty() && registry.has_handler(target);
        let is_event_post_back =
            form.get(EVENT_ARGUMENT_FIELD).map(String::as_str) == Some(EVENT_POST_BACK_ARGUMENT);

        let (values, extra_values_exist) = PostBackValues::from_posted(
            form,
            |key| registry.is_expected_key(key),
            |key| target_is_handler && key == target,
        );
        let invalid_values_exist = registry
            .active_form_values()
            .any(|v| !v.posted_value_is_valid(&values));
        let new_hash = registry.concurrency_hash();

        if extra_values_exist || invalid_values_exist || new_hash != self.form_value_hash {
            warn!(
                request_id = %self.request.id(),
                extra_values_exist,
                invalid_values_exist,
                "page changed since it was rendered"
            );
            self.state.top_modification_errors = vec![ANOTHER_USER_MODIFIED_PAGE.to_string()];
            self.form_value_hash = new_hash;
        } else if is_event_post_back && !target_is_handler {
            warn!(request_id = %self.request.id(), %target, "event target is not a post-back handler");
            self.state.top_modification_errors = vec![COULD_NOT_INTERPRET_ACTION.to_string()];
        }

        self.event_target = (is_event_post_back && target_is_handler).then(|| target.to_string());
        self.state.post_back_values = Some(values);
        Ok(LifecycleStage::ExecutingModification)
    }

    fn execute_modifications(&mut self) -> Result<LifecycleStage> {
        let values_changed = {
            let empty = PostBackValues::new();
            let values = self.state.post_back_values.as_ref().unwrap_or(&empty);
            self.registry
                .active_form_values()
                .any(|v| v.value_changed(values))
        };
        if values_changed && self.registry.post_back_modification().contains_work() {
            let modification = self.registry.take_post_back_modification();
            self.execute_data_modification(modification)?;
        }

        if let Some(target) = self.event_target.take() {
            let modification = self
                .registry
                .handler_mut(&target)
                .map(|handler| std::mem::take(&mut handler.modification));
            if let Some(modification) = modification {
                self.execute_data_modification(modification)?;
            }
        }
        Ok(LifecycleStage::PreCommit)
    }

    /// Validate and apply one modification unless errors already exist
    fn execute_data_modification(&mut self, modification: DataModification) -> Result<()> {
        if self.state.modification_errors_exist() {
            debug!(request_id = %self.request.id(), "skipping modification; errors exist");
            return Ok(());
        }

        let _fresh = self.request.data_access().disable_cache();
        let empty = PostBackValues::new();
        let values = self.state.post_back_values.as_ref().unwrap_or(&empty);
        let mut context = ModificationContext::new(
            &mut *self.request,
            values,
            &mut self.redirect,
            &mut self.status_messages,
            &mut self.state.control_with_focus_id,
        );
        let mut sink = ErrorSink::new(
            self.registry.error_displays(),
            &mut self.state.modification_errors_by_display,
            &mut self.state.top_modification_errors,
        );

        match modification.execute(&mut context, &mut sink) {
            Ok(ModificationOutcome::Applied) => Ok(()),
            Ok(ModificationOutcome::ValidationFailed) => {
                debug!(request_id = %self.request.id(), "validation failed; rolling back");
                self.request.finalize_transaction(false)
            }
            Err(FrameworkError::DataModification(err)) => {
                debug!(request_id = %self.request.id(), "modification failed; rolling back");
                self.request.finalize_transaction(false)?;
                self.state.top_modification_errors = err.into_messages();
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    // ------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------

    fn pre_commit(&mut self) -> Result<LifecycleStage> {
        if !self.state.modification_errors_exist() {
            if let Err(err) = self.request.data_access().pre_commit_validate() {
                self.request.finalize_transaction(false)?;
                self.request.data_access().reset_cache();
                self.state.top_modification_errors = err.into_messages();
            }
        }
        Ok(LifecycleStage::Committing)
    }

    fn commit_post_back(&mut self) -> Result<LifecycleStage> {
        if self.state.modification_errors_exist() {
            self.request.finalize_transaction(false)?;
            self.state.static_form_value_hash = Some(self.registry.static_hash(true));
        } else {
            self.request.finalize_transaction(true)?;
            self.session
                .status_messages
                .append(&mut self.status_messages);
            self.state.post_back_values = None;
        }
        Ok(LifecycleStage::Navigating)
    }

    /// Initial-request modifications for a rendered page, then commit
    fn finish_request_modifications(&mut self) -> Result<LifecycleStage> {
        self.session_messages = std::mem::take(&mut self.session.status_messages);

        if !self.state.modification_errors_exist() {
            let _fresh = self.request.data_access().disable_cache();
            self.execute_initial_request_modifications()?;
        }
        // Writes made while loading an error re-render are validated too
        if let Err(err) = self.request.data_access().pre_commit_validate() {
            self.request.finalize_transaction(false)?;
            self.state.top_modification_errors.extend(err.into_messages());
        }

        self.request.finalize_transaction(true)?;
        Ok(LifecycleStage::Rendering)
    }

    fn execute_initial_request_modifications(&mut self) -> Result<()> {
        if !self.request.user_accessible() || self.request.installation().is_standby_server {
            return Ok(());
        }
        let Some(user) = self.request.current_user()? else {
            return Ok(());
        };

        let now = self.request.begin_time();
        let resolution = chrono::Duration::minutes(LAST_REQUEST_TIME_RESOLUTION_MINUTES);
        if user
            .last_request_time()
            .is_none_or(|last| now - last > resolution)
        {
            self.request
                .identity()
                .record_page_request(user.user_id(), now)?;
        }
        self.page
            .execute_initial_request_modifications(self.request)
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    fn resolve(&mut self, page_type: &str, parameters: &Parameters) -> Result<PageInfo> {
        let mut page = self.catalog.create(page_type)?;
        self.request
            .with_user_disabled(|request| page.resolve_info(parameters, request))
    }

    fn navigate(&mut self) -> Result<LifecycleStage> {
        let destination = if self.state.modification_errors_exist() {
            let (page_type, parameters) = (self.info.page_type.clone(), self.info.query_parameters());
            Destination::Page(self.resolve(&page_type, &parameters)?)
        } else {
            match self.redirect.take() {
                Some(Destination::Page(target)) => {
                    Destination::Page(self.resolve(&target.page_type, &target.query_parameters())?)
                }
                Some(external) => external,
                None => Destination::Page(self.page.info_from_new_parameter_values(&self.info)),
            }
        };

        match decide_navigation(&destination, &self.info) {
            Navigation::Transfer => {
                self.request.clear_user();
                self.end = Some(CycleEnd::Transfer {
                    state: std::mem::take(&mut self.state),
                    status: self.status,
                });
                Ok(LifecycleStage::Transferring)
            }
            Navigation::Redirect { url, preserve_state } => {
                if preserve_state {
                    self.session
                        .store_transfer_state(&self.info.page_type, std::mem::take(&mut self.state));
                }
                info!(request_id = %self.request.id(), %url, "redirecting after post-back");
                self.end = Some(CycleEnd::Finished(LifecycleOutcome::Redirect { url }));
                Ok(LifecycleStage::Redirecting)
            }
        }
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    fn render(&mut self) -> Result<LifecycleStage> {
        let values = self.state.post_back_values.as_ref();
        let fields: Vec<RenderedField> = self
            .registry
            .active_form_values()
            .map(|v| RenderedField {
                key: v.key().to_string(),
                value: match values {
                    Some(values) => v.value(values).to_string(),
                    None => v.durable_value().to_string(),
                },
            })
            .collect();
        let buttons = self
            .registry
            .handlers()
            .iter()
            .map(|h| RenderedButton {
                id: h.unique_id.clone(),
                submit: h.uses_submit_behavior,
            })
            .collect();

        let page_state = encode_page_state(&self.state.page_data, &self.form_value_hash)
            .map_err(|e| FrameworkError::developer(format!("Page state could not be saved: {}", e)))?;

        let errors_exist = self.state.modification_errors_exist();
        debug!(
            request_id = %self.request.id(),
            controls = self.controls.len(),
            fields = fields.len(),
            errors_exist,
            "rendering page"
        );
        let mut status_messages = std::mem::take(&mut self.session_messages);
        status_messages.append(&mut self.status_messages);

        let page = RenderedPage {
            page_type: self.info.page_type.clone(),
            url: self.info.url(),
            page_state,
            fields,
            buttons,
            top_errors: self.state.top_modification_errors.clone(),
            errors_by_display: self.state.modification_errors_by_display.clone(),
            status_messages,
            display_states: std::mem::take(&mut self.display_states),
            focus: self.focus.take(),
            scroll_position: if errors_exist {
                None
            } else {
                self.state.scroll_position.clone()
            },
        };
        self.end = Some(CycleEnd::Finished(LifecycleOutcome::Rendered {
            status: self.status,
            page: Box::new(page),
        }));
        Ok(LifecycleStage::Terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstallationConfig;
    use crate::connection::DatabaseRegistry;
    use crate::core::DatabaseId;
    use crate::page::TextField;
    use crate::request::RequestEnvironment;
    use crate::storage::MemoryDatabase;
    use std::sync::Arc;

    struct NamePage;

    impl Page for NamePage {
        fn resolve_info(&mut self, _: &Parameters, _: &mut RequestState) -> Result<PageInfo> {
            Ok(PageInfo::new("name"))
        }

        fn load_data(&mut self, _: &mut LoadContext<'_>) -> Result<Vec<Box<dyn Control>>> {
            Ok(vec![Box::new(TextField::new("name", "name", "Alice").required(true))])
        }
    }

    fn environment() -> RequestEnvironment {
        let databases = DatabaseRegistry::new()
            .with_database(DatabaseId::Primary, Arc::new(MemoryDatabase::new("main")), true)
            .unwrap();
        RequestEnvironment::new(InstallationConfig::development("test"), databases)
    }

    fn run(form: Option<BTreeMap<String, String>>, session: &mut SessionState) -> LifecycleOutcome {
        let catalog = PageCatalog::new().register("name", || Box::new(NamePage));
        let mut request = RequestState::new(&environment(), "http://localhost/pages/name", false, None);
        let page_request = PageRequest {
            page_type: "name".into(),
            parameters: Parameters::new(),
            form,
        };
        let outcome = execute_page(&catalog, &mut request, session, page_request).unwrap();
        request.cleanup();
        outcome
    }

    fn rendered(outcome: LifecycleOutcome) -> (u16, RenderedPage) {
        match outcome {
            LifecycleOutcome::Rendered { status, page } => (status, *page),
            other => panic!("expected a rendered page, got {:?}", other),
        }
    }

    #[test]
    fn test_first_view_renders_durable_values() {
        let (status, page) = rendered(run(None, &mut SessionState::new()));
        assert_eq!(status, 200);
        assert_eq!(page.field("name"), Some("Alice"));
        assert_eq!(page.focus.as_deref(), Some("name"));
        assert!(page.top_errors.is_empty());
        assert!(decode_page_state(&page.page_state).is_ok());
    }

    #[test]
    fn test_undecodable_page_state_transfers_with_400() {
        let form: BTreeMap<String, String> = [(PAGE_STATE_FIELD.to_string(), "garbage".to_string())].into();
        let (status, page) = rendered(run(Some(form), &mut SessionState::new()));
        assert_eq!(status, 400);
        assert_eq!(page.top_errors, vec![APPLICATION_UPDATED.to_string()]);
    }

    #[test]
    fn test_failed_validation_transfers_back_with_errors() {
        let mut session = SessionState::new();
        let (_, first) = rendered(run(None, &mut session));

        let form: BTreeMap<String, String> = [
            (PAGE_STATE_FIELD.to_string(), first.page_state.clone()),
            ("name".to_string(), "   ".to_string()),
        ]
        .into();
        let (status, page) = rendered(run(Some(form), &mut session));
        assert_eq!(status, 200);
        assert_eq!(page.errors_by_display.get("name_error"), Some(&vec!["Please enter the name.".to_string()]));
        assert_eq!(page.field("name"), Some("   "));
        assert_eq!(page.top_errors[0], crate::modification::PLEASE_CORRECT_ERRORS);
    }
}
