use crate::core::{FrameworkError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use uuid::Uuid;

/// Role of an application user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Can manage other users
    Administrator,
    /// Ordinary user
    Standard,
}

impl Role {
    pub fn can_manage_users(&self) -> bool {
        matches!(self, Role::Administrator)
    }
}

/// User account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    user_id: u64,
    email: String,
    role: Role,
    last_request_time: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(user_id: u64, email: String, role: Role) -> Self {
        Self {
            user_id,
            email,
            role,
            last_request_time: None,
        }
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn last_request_time(&self) -> Option<DateTime<Utc>> {
        self.last_request_time
    }
}

/// Source of user identity for requests
///
/// Implementations are shared across requests and must synchronize
/// internally.
pub trait IdentityProvider: Send + Sync {
    fn is_user_management_enabled(&self) -> bool;

    /// The user id bound to a session, if any
    fn current_user_id(&self, session_token: Option<&str>) -> Result<Option<u64>>;

    fn get_user(&self, user_id: u64) -> Result<Option<User>>;

    /// Remember when the user last made a request
    fn record_page_request(&self, user_id: u64, at: DateTime<Utc>) -> Result<()>;

    /// Whether the session passed the intermediate-installation log-in
    fn intermediate_user_exists(&self, _session_token: Option<&str>) -> bool {
        false
    }
}

/// Provider for applications without user management
#[derive(Debug, Default, Clone, Copy)]
pub struct NoUserManagement;

impl IdentityProvider for NoUserManagement {
    fn is_user_management_enabled(&self) -> bool {
        false
    }

    fn current_user_id(&self, _session_token: Option<&str>) -> Result<Option<u64>> {
        Ok(None)
    }

    fn get_user(&self, _user_id: u64) -> Result<Option<User>> {
        Ok(None)
    }

    fn record_page_request(&self, _user_id: u64, _at: DateTime<Utc>) -> Result<()> {
        Ok(())
    }
}

struct StoredUser {
    user: User,
    password_hash: String,
}

/// In-process user store with bcrypt password hashing and session tokens
pub struct InMemoryIdentityProvider {
    users: RwLock<HashMap<u64, StoredUser>>,
    sessions: RwLock<HashMap<String, u64>>,
    intermediate_sessions: RwLock<Vec<String>>,
    next_user_id: AtomicU64,
    hash_cost: u32,
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::with_cost(bcrypt::DEFAULT_COST)
    }

    /// Creates a provider using a specific bcrypt cost factor
    pub fn with_cost(hash_cost: u32) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            intermediate_sessions: RwLock::new(Vec::new()),
            next_user_id: AtomicU64::new(1),
            hash_cost,
        }
    }

    /// Hashes a password using bcrypt
    ///
    /// Each hash includes a random salt, so the same password will produce different hashes.
    fn hash_password(&self, password: &str) -> Result<String> {
        bcrypt::hash(password, self.hash_cost)
            .map_err(|e| FrameworkError::Identity(format!("Failed to hash password: {}", e)))
    }

    fn verify_password(password: &str, hash: &str) -> bool {
        bcrypt::verify(password, hash).unwrap_or(false)
    }

    fn lock_error<T>(_: std::sync::PoisonError<T>) -> FrameworkError {
        FrameworkError::Identity("Identity store lock poisoned".into())
    }

    /// Creates a new user and returns its id
    pub fn create_user(&self, email: &str, password: &str, role: Role) -> Result<u64> {
        Self::validate_email(email)?;
        Self::validate_password(password)?; // Validate BEFORE hashing

        let password_hash = self.hash_password(password)?;
        let mut users = self.users.write().map_err(Self::lock_error)?;

        if users.values().any(|stored| stored.user.email.eq_ignore_ascii_case(email)) {
            return Err(FrameworkError::Identity(format!(
                "User '{}' already exists",
                email
            )));
        }

        let user_id = self.next_user_id.fetch_add(1, Ordering::SeqCst);
        users.insert(
            user_id,
            StoredUser {
                user: User::new(user_id, email.to_string(), role),
                password_hash,
            },
        );
        Ok(user_id)
    }

    /// Authenticates a user by email and password
    pub fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let users = self.users.read().map_err(Self::lock_error)?;

        let stored = users
            .values()
            .find(|stored| stored.user.email.eq_ignore_ascii_case(email))
            .ok_or_else(|| FrameworkError::Identity("Invalid email or password".into()))?;

        if !Self::verify_password(password, &stored.password_hash) {
            return Err(FrameworkError::Identity("Invalid email or password".into()));
        }

        Ok(stored.user.clone())
    }

    /// Authenticates and binds a new session token to the user
    pub fn log_in(&self, email: &str, password: &str) -> Result<String> {
        let user = self.authenticate(email, password)?;
        let token = Uuid::new_v4().to_string();
        self.sessions
            .write()
            .map_err(Self::lock_error)?
            .insert(token.clone(), user.user_id());
        Ok(token)
    }

    /// Binds an existing session token to a user without a password check
    pub fn bind_session(&self, token: &str, user_id: u64) -> Result<()> {
        if self.get_user(user_id)?.is_none() {
            return Err(FrameworkError::Identity(format!("User {} not found", user_id)));
        }
        self.sessions
            .write()
            .map_err(Self::lock_error)?
            .insert(token.to_string(), user_id);
        Ok(())
    }

    pub fn log_out(&self, token: &str) -> Result<()> {
        self.sessions.write().map_err(Self::lock_error)?.remove(token);
        Ok(())
    }

    /// Mark a session as having passed the intermediate log-in
    pub fn grant_intermediate_access(&self, token: &str) -> Result<()> {
        let mut sessions = self.intermediate_sessions.write().map_err(Self::lock_error)?;
        if !sessions.iter().any(|t| t == token) {
            sessions.push(token.to_string());
        }
        Ok(())
    }

    pub fn user_count(&self) -> Result<usize> {
        Ok(self.users.read().map_err(Self::lock_error)?.len())
    }

    fn validate_email(email: &str) -> Result<()> {
        if email.is_empty() {
            return Err(FrameworkError::Identity("Email cannot be empty".into()));
        }

        if !email.contains('@') {
            return Err(FrameworkError::Identity(format!(
                "'{}' is not a valid email address",
                email
            )));
        }

        Ok(())
    }

    /// Validates password complexity
    ///
    /// Enforces the following rules:
    /// - Minimum 8 characters
    /// - Cannot be empty
    fn validate_password(password: &str) -> Result<()> {
        if password.is_empty() {
            return Err(FrameworkError::Identity("Password cannot be empty".into()));
        }

        if password.len() < 8 {
            return Err(FrameworkError::Identity(
                "Password must be at least 8 characters long".into(),
            ));
        }

        Ok(())
    }
}

impl Default for InMemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for InMemoryIdentityProvider {
    fn is_user_management_enabled(&self) -> bool {
        true
    }

    fn current_user_id(&self, session_token: Option<&str>) -> Result<Option<u64>> {
        let Some(token) = session_token else {
            return Ok(None);
        };
        let sessions = self.sessions.read().map_err(Self::lock_error)?;
        Ok(sessions.get(token).copied())
    }

    fn get_user(&self, user_id: u64) -> Result<Option<User>> {
        let users = self.users.read().map_err(Self::lock_error)?;
        Ok(users.get(&user_id).map(|stored| stored.user.clone()))
    }

    fn record_page_request(&self, user_id: u64, at: DateTime<Utc>) -> Result<()> {
        let mut users = self.users.write().map_err(Self::lock_error)?;
        let stored = users
            .get_mut(&user_id)
            .ok_or_else(|| FrameworkError::Identity(format!("User {} not found", user_id)))?;
        stored.user.last_request_time = Some(at);
        Ok(())
    }

    fn intermediate_user_exists(&self, session_token: Option<&str>) -> bool {
        let Some(token) = session_token else {
            return false;
        };
        self.intermediate_sessions
            .read()
            .map(|sessions| sessions.iter().any(|t| t == token))
            .unwrap_or(false)
    }
}
