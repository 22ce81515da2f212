use std::fmt;

use thiserror::Error;

use crate::models::RecordId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldProblem {
    Missing,
    NotANumber,
    OutOfRange { min: i64, max: i64 },
    InvalidFormat(String),
    Duplicate,
    Derived(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub problem: FieldProblem,
}

impl FieldError {
    pub fn new(field: impl Into<String>, problem: FieldProblem) -> Self {
        Self {
            field: field.into(),
            problem,
        }
    }

    pub fn reason(&self) -> String {
        match &self.problem {
            FieldProblem::Missing => "required".to_string(),
            FieldProblem::NotANumber => "not a number".to_string(),
            FieldProblem::OutOfRange { min, max } => {
                if *max == i64::MAX {
                    format!("must be at least {min}")
                } else {
                    format!("must be between {min} and {max}")
                }
            }
            FieldProblem::InvalidFormat(reason) => reason.clone(),
            FieldProblem::Duplicate => "already taken".to_string(),
            FieldProblem::Derived(reason) => reason.clone(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason())
    }
}

/// Field-attributed failure produced before anything touches the network.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn single(field: impl Into<String>, problem: FieldProblem) -> Self {
        Self {
            errors: vec![FieldError::new(field, problem)],
        }
    }

    pub fn push(&mut self, field: impl Into<String>, problem: FieldProblem) {
        self.errors.push(FieldError::new(field, problem));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn missing_fields(&self) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|err| err.problem == FieldProblem::Missing)
            .map(|err| err.field.as_str())
            .collect()
    }

    pub fn for_field(&self, field: &str) -> Option<&FieldError> {
        self.errors.iter().find(|err| err.field == field)
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let missing = self.missing_fields();
        if !missing.is_empty() && missing.len() == self.errors.len() {
            return write!(f, "missing fields: {}", missing.join(", "));
        }
        let parts = self
            .errors
            .iter()
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        write!(f, "invalid input: {}", parts.join("; "))
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("network error: {reason}")]
    Network { reason: String, timed_out: bool },
    #[error("server error (http {status}){}", message_suffix(.message))]
    Server { status: u16, message: Option<String> },
    #[error("record {id} already has a mutation in flight")]
    Busy { id: RecordId },
}

fn message_suffix(message: &Option<String>) -> String {
    match message {
        Some(msg) => format!(": {msg}"),
        None => String::new(),
    }
}

impl SyncError {
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: Some(message.into()),
        }
    }

    pub fn network(reason: impl Into<String>) -> Self {
        Self::Network {
            reason: reason.into(),
            timed_out: false,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }

    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(err) => err.to_string(),
            Self::Network { timed_out: true, .. } => {
                "Request timed out. Check the connection and try again.".to_string()
            }
            Self::Network { .. } => {
                "Connection error. Check that the league server is reachable.".to_string()
            }
            Self::Server {
                message: Some(msg), ..
            } => msg.clone(),
            Self::Server {
                status: 401,
                message: None,
            } => "Wrong email or password".to_string(),
            Self::Server {
                status: 404,
                message: None,
            } => "Record not found".to_string(),
            Self::Server { status, .. } => format!("Server error ({status})"),
            Self::Busy { .. } => "Still saving the previous change, please wait".to_string(),
        }
    }
}
