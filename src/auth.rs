use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};

use crate::error::{FieldProblem, SyncError, ValidationError};
use crate::models::User;
use crate::transport::{ApiRequest, Transport};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const DEFAULT_PHONE: &str = "+258 84 000 0000";

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern should compile")
});

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: User,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.user.is_admin()
    }
}

pub fn validate_login(email: &str, password: &str) -> Result<Credentials, ValidationError> {
    let email = email.trim();
    let password = password.trim();
    let mut errors = ValidationError::default();
    if email.is_empty() {
        errors.push("email", FieldProblem::Missing);
    }
    if password.is_empty() {
        errors.push("password", FieldProblem::Missing);
    }
    errors.into_result()?;
    if !is_valid_email(email) {
        return Err(invalid_email());
    }
    Ok(Credentials {
        email: email.to_string(),
        password: password.to_string(),
    })
}

/// New accounts start with the local part of the address as display name and a
/// placeholder phone number; both can be changed from the profile screen.
pub fn validate_signup(
    email: &str,
    password: &str,
    confirm_password: &str,
) -> Result<Registration, ValidationError> {
    let email = email.trim();
    let password = password.trim();
    let confirm = confirm_password.trim();
    let mut errors = ValidationError::default();
    for (field, value) in [
        ("email", email),
        ("password", password),
        ("confirm_password", confirm),
    ] {
        if value.is_empty() {
            errors.push(field, FieldProblem::Missing);
        }
    }
    errors.into_result()?;

    if !is_valid_email(email) {
        return Err(invalid_email());
    }
    if password != confirm {
        return Err(ValidationError::single(
            "confirm_password",
            FieldProblem::InvalidFormat("passwords do not match".to_string()),
        ));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::single(
            "password",
            FieldProblem::InvalidFormat(format!(
                "must be at least {MIN_PASSWORD_LEN} characters"
            )),
        ));
    }

    let name = email.split('@').next().unwrap_or(email).to_string();
    Ok(Registration {
        email: email.to_string(),
        password: password.to_string(),
        name,
        phone: DEFAULT_PHONE.to_string(),
    })
}

pub fn validate_profile(
    name: &str,
    email: &str,
    phone: &str,
) -> Result<ProfileUpdate, ValidationError> {
    let name = name.trim();
    let email = email.trim();
    let mut errors = ValidationError::default();
    if name.is_empty() {
        errors.push("name", FieldProblem::Missing);
    }
    if email.is_empty() {
        errors.push("email", FieldProblem::Missing);
    }
    errors.into_result()?;
    if !is_valid_email(email) {
        return Err(invalid_email());
    }
    let phone = phone.trim();
    Ok(ProfileUpdate {
        name: name.to_string(),
        email: email.to_string(),
        phone: (!phone.is_empty()).then(|| phone.to_string()),
    })
}

fn invalid_email() -> ValidationError {
    ValidationError::single(
        "email",
        FieldProblem::InvalidFormat("enter a valid email address".to_string()),
    )
}

#[derive(Clone)]
pub struct AuthClient {
    transport: Arc<dyn Transport>,
}

impl AuthClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn login(&self, credentials: &Credentials) -> Result<Session, SyncError> {
        let body = json!({
            "email": credentials.email,
            "password": credentials.password,
        });
        let response = self.transport.send(&ApiRequest::Login(body))?;
        ensure_success(&response)?;
        let user = response
            .get("user")
            .cloned()
            .and_then(|user| serde_json::from_value::<User>(user).ok())
            .ok_or_else(|| SyncError::server(200, "login response carried no user"))?;
        log::info!("signed in as {} ({:?})", user.email, user.role);
        Ok(Session { user })
    }

    pub fn register(&self, registration: &Registration) -> Result<(), SyncError> {
        let body = json!({
            "email": registration.email,
            "password": registration.password,
            "name": registration.name,
            "phone": registration.phone,
        });
        let response = self.transport.send(&ApiRequest::Register(body))?;
        ensure_success(&response)?;
        log::info!("registered {}", registration.email);
        Ok(())
    }

    /// Saves the profile and returns the session user with the new values applied.
    pub fn update_profile(
        &self,
        session: &Session,
        update: &ProfileUpdate,
    ) -> Result<User, SyncError> {
        let body = json!({
            "id": session.user.id,
            "name": update.name,
            "email": update.email,
            "phone": update.phone,
        });
        let response = self.transport.send(&ApiRequest::UpdateProfile(body))?;
        ensure_success(&response)?;
        let mut user = session.user.clone();
        user.name = update.name.clone();
        user.email = update.email.clone();
        user.phone = update.phone.clone();
        Ok(user)
    }
}

fn ensure_success(response: &Value) -> Result<(), SyncError> {
    if response.get("success").and_then(Value::as_bool) == Some(true) {
        return Ok(());
    }
    Err(SyncError::server(200, "unexpected response from server"))
}
