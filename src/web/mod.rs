//! HTTP host for pages
//!
//! `AppHost::handle` runs one request through the page lifecycle
//! synchronously and is what tests drive directly. `router` wraps it in an
//! axum service; each request runs on the blocking pool since the lifecycle
//! is single-threaded and not `Send`.

pub mod demo;

use crate::core::FrameworkError;
use crate::page::{execute_page, LifecycleOutcome, PageCatalog, PageRequest, Parameters};
use crate::request::{RequestEnvironment, RequestState};
use crate::session::SessionState;
use axum::extract::{Form, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use lru::LruCache;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "ewf_session";

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_in_page: Option<String>,
}

#[derive(Debug)]
pub enum WebError {
    NotFound(String),
    AccessDenied {
        intermediate_login_required: bool,
        log_in_page: Option<String>,
    },
    Forbidden(String),
    Internal(String),
}

impl WebError {
    /// Map a lifecycle failure, hiding internals outside development
    pub fn from_framework(err: &FrameworkError, show_details: bool) -> Self {
        match err {
            FrameworkError::AccessDenied {
                intermediate_login_required,
                log_in_page,
            } => Self::AccessDenied {
                intermediate_login_required: *intermediate_login_required,
                log_in_page: log_in_page.clone(),
            },
            FrameworkError::UserAccessDenied(message) | FrameworkError::PageDisabled(message) => {
                Self::Forbidden(message.clone())
            }
            other if show_details => Self::Internal(other.to_string()),
            _ => Self::Internal("An error occurred while processing your request.".to_string()),
        }
    }

    fn parts(self) -> (StatusCode, ErrorResponse) {
        let simple = |status, error: String, code: &str| {
            (
                status,
                ErrorResponse {
                    error,
                    code: code.to_string(),
                    log_in_page: None,
                },
            )
        };
        match self {
            WebError::NotFound(message) => simple(StatusCode::NOT_FOUND, message, "not_found"),
            WebError::AccessDenied {
                intermediate_login_required,
                log_in_page,
            } => (
                StatusCode::FORBIDDEN,
                ErrorResponse {
                    error: "Access denied".to_string(),
                    code: if intermediate_login_required {
                        "intermediate_login_required".to_string()
                    } else {
                        "access_denied".to_string()
                    },
                    log_in_page,
                },
            ),
            WebError::Forbidden(message) => simple(StatusCode::FORBIDDEN, message, "forbidden"),
            WebError::Internal(message) => {
                simple(StatusCode::INTERNAL_SERVER_ERROR, message, "internal_error")
            }
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, body) = self.parts();
        (status, Json(body)).into_response()
    }
}

/// A request as the page lifecycle needs it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRequest {
    pub page_type: String,
    pub query: Parameters,
    pub form: Option<BTreeMap<String, String>>,
    pub url: String,
    pub is_secure: bool,
    pub session_id: Option<String>,
}

impl HostRequest {
    pub fn get(page_type: &str) -> Self {
        Self {
            page_type: page_type.to_string(),
            query: Parameters::new(),
            form: None,
            url: format!("http://localhost/pages/{}", page_type),
            is_secure: false,
            session_id: None,
        }
    }

    pub fn post(page_type: &str, form: BTreeMap<String, String>) -> Self {
        Self {
            form: Some(form),
            ..Self::get(page_type)
        }
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    pub fn session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    pub fn secure(mut self, is_secure: bool) -> Self {
        self.is_secure = is_secure;
        self
    }

    /// `X-Forwarded-Proto: https` marks the request secure; only a trusted
    /// proxy in front of the router may set it
    fn from_http(
        page_type: String,
        query: Parameters,
        form: Option<BTreeMap<String, String>>,
        headers: &HeaderMap,
        uri: &Uri,
    ) -> Self {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        let is_secure = header("x-forwarded-proto").is_some_and(|proto| proto.eq_ignore_ascii_case("https"));
        let host = header("host").unwrap_or("localhost");
        let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
        let session_id = header("cookie").and_then(|cookies| {
            cookies.split(';').find_map(|cookie| {
                let (name, value) = cookie.trim().split_once('=')?;
                (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
            })
        });
        Self {
            page_type,
            query,
            form,
            url: format!("{}://{}{}", if is_secure { "https" } else { "http" }, host, path),
            is_secure,
            session_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostResponse {
    pub status: u16,
    pub location: Option<String>,
    pub body: serde_json::Value,
    pub session_id: String,
    pub new_session: bool,
}

impl IntoResponse for HostResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self.body)).into_response();
        let headers = response.headers_mut();
        if let Some(location) = self.location.and_then(|l| HeaderValue::from_str(&l).ok()) {
            headers.insert(header::LOCATION, location);
        }
        if self.new_session {
            let cookie = format!("{}={}; Path=/; HttpOnly", SESSION_COOKIE, self.session_id);
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                headers.insert(header::SET_COOKIE, value);
            }
        }
        response
    }
}

const DEFAULT_SESSION_CAPACITY: usize = 10_000;

type SharedSession = Arc<Mutex<SessionState>>;

/// Serves the pages of one application
///
/// Sessions live in an LRU map. A request holds its session's lock from
/// lifecycle start to cleanup, so requests sharing a cookie run one at a
/// time against the same state.
pub struct AppHost {
    environment: RequestEnvironment,
    catalog: PageCatalog,
    sessions: Mutex<LruCache<String, SharedSession>>,
}

impl AppHost {
    pub fn new(environment: RequestEnvironment, catalog: PageCatalog) -> Self {
        Self {
            environment,
            catalog,
            sessions: Mutex::new(LruCache::new(session_capacity(DEFAULT_SESSION_CAPACITY))),
        }
    }

    /// Set how many sessions are kept before the least recently used go
    pub fn with_session_capacity(self, capacity: usize) -> Self {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.resize(session_capacity(capacity));
        }
        self
    }

    pub fn environment(&self) -> &RequestEnvironment {
        &self.environment
    }

    pub fn catalog(&self) -> &PageCatalog {
        &self.catalog
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn has_session(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .is_ok_and(|sessions| sessions.contains(session_id))
    }

    /// The stored session for `session_id`; unknown ids get nothing
    fn find_session(&self, session_id: Option<&str>) -> Option<(String, SharedSession)> {
        let session_id = session_id?;
        let mut sessions = match self.sessions.lock() {
            Ok(sessions) => sessions,
            Err(err) => {
                warn!(error = %err, "session store unavailable");
                return None;
            }
        };
        sessions
            .get(session_id)
            .map(|session| (session_id.to_string(), Arc::clone(session)))
    }

    fn store_session(&self, session_id: String, session: SharedSession) {
        match self.sessions.lock() {
            Ok(mut sessions) => {
                if let Some((evicted, _)) = sessions.push(session_id.clone(), session) {
                    if evicted != session_id {
                        debug!(session = %evicted, "evicted least recently used session");
                    }
                }
            }
            Err(err) => warn!(error = %err, "session store unavailable"),
        }
    }

    /// Run one request through the page lifecycle
    ///
    /// A session id the store does not know is replaced with a fresh one.
    /// A fresh session is kept, and its cookie issued, only when it ends
    /// up holding state or the request was a post-back.
    pub fn handle(&self, host_request: HostRequest) -> HostResponse {
        let HostRequest {
            page_type,
            query,
            form,
            url,
            is_secure,
            session_id,
        } = host_request;

        if !self.catalog.contains(&page_type) {
            let (status, body) = WebError::NotFound(format!("No page called '{}'.", page_type)).parts();
            return HostResponse {
                status: status.as_u16(),
                location: None,
                body: json!(body),
                session_id: session_id.unwrap_or_default(),
                new_session: false,
            };
        }

        let known = self.find_session(session_id.as_deref());
        let is_new = known.is_none();
        if is_new && session_id.is_some() {
            debug!("unknown session id; issuing a fresh one");
        }
        let (session_id, shared) =
            known.unwrap_or_else(|| (Uuid::new_v4().to_string(), Arc::new(Mutex::new(SessionState::new()))));
        let is_post_back = form.is_some();

        let mut session = shared.lock().unwrap_or_else(PoisonError::into_inner);
        let mut request = RequestState::new(&self.environment, &url, is_secure, Some(session_id.clone()));
        let page_request = PageRequest {
            page_type,
            parameters: query,
            form,
        };

        let (status, location, body) = match execute_page(&self.catalog, &mut request, &mut session, page_request) {
            Ok(LifecycleOutcome::Rendered { status, page }) => (status, None, json!(page)),
            Ok(LifecycleOutcome::Redirect { url }) => (StatusCode::SEE_OTHER.as_u16(), Some(url), json!({})),
            Err(err) => {
                let (status, body) =
                    WebError::from_framework(&err, self.environment.installation.is_development()).parts();
                if !err.is_access_denied() && !matches!(err, FrameworkError::PageDisabled(_)) {
                    request.record_error("An unhandled error occurred while processing a page.", err);
                }
                (status.as_u16(), None, json!(body))
            }
        };

        request.cleanup();
        let keep = !is_new || is_post_back || !session.is_empty();
        drop(session);
        if keep {
            self.store_session(session_id.clone(), shared);
        }
        HostResponse {
            status,
            location,
            body,
            session_id,
            new_session: is_new && keep,
        }
    }
}

fn session_capacity(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}

async fn dispatch(host: Arc<AppHost>, request: HostRequest) -> Response {
    match tokio::task::spawn_blocking(move || host.handle(request)).await {
        Ok(response) => response.into_response(),
        Err(err) => WebError::Internal(format!("Request handler failed: {}", err)).into_response(),
    }
}

async fn get_page(
    State(host): State<Arc<AppHost>>,
    Path(page_type): Path<String>,
    Query(query): Query<Parameters>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    dispatch(host, HostRequest::from_http(page_type, query, None, &headers, &uri)).await
}

async fn post_page(
    State(host): State<Arc<AppHost>>,
    Path(page_type): Path<String>,
    Query(query): Query<Parameters>,
    headers: HeaderMap,
    uri: Uri,
    Form(form): Form<BTreeMap<String, String>>,
) -> Response {
    dispatch(host, HostRequest::from_http(page_type, query, Some(form), &headers, &uri)).await
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Routes for the health check and every registered page
///
/// Expects to sit behind a TLS-terminating proxy that sets or strips
/// `X-Forwarded-Proto`; clients reaching the router directly can claim a
/// secure connection.
pub fn router(host: Arc<AppHost>) -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .route("/pages/:page_type", get(get_page).post(post_page))
        .layer(TraceLayer::new_for_http())
        .with_state(host)
}
