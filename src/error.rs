use std::fmt;
use thiserror::Error;

use crate::nacha::NachaError;

#[derive(Error, Debug)]
pub enum AchError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("different currencies: {left} and {right}")]
    DifferentCurrencies { left: String, right: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("NACHA error: {0}")]
    Nacha(#[from] NachaError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote address {0} is not in the allowed IP list")]
    IpNotAllowed(String),

    #[error("path {0:?} escapes the configured base path")]
    PathEscape(String),

    #[error("{0}")]
    Policy(String),

    #[error("no micro-deposit confirmation attempts remaining for depository {0}")]
    AttemptsExhausted(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{0}")]
    Multiple(ErrorList),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AchError {
    pub fn policy(msg: impl Into<String>) -> Self {
        AchError::Policy(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AchError::Validation(msg.into())
    }

    /// Whether the same input fails the same way on every retry.
    pub fn is_permanent(&self) -> bool {
        match self {
            AchError::InvalidAmount(_)
            | AchError::DifferentCurrencies { .. }
            | AchError::Validation(_) => true,
            AchError::Multiple(errors) => errors.iter().all(AchError::is_permanent),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AchError>;

/// Collects failures from loops that must keep going after one item fails.
#[derive(Debug, Default)]
pub struct ErrorList(Vec<AchError>);

impl ErrorList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn add(&mut self, err: impl Into<AchError>) {
        match err.into() {
            AchError::Multiple(inner) => self.0.extend(inner.0),
            other => self.0.push(other),
        }
    }

    /// Records the error side of `result`, returning the success value if any.
    pub fn capture<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.add(e);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AchError> {
        self.0.iter()
    }

    /// `Ok(())` when nothing was collected, a single error as itself, otherwise `Multiple`.
    pub fn into_result(mut self) -> Result<()> {
        match self.0.len() {
            0 => Ok(()),
            1 => Err(self.0.remove(0)),
            _ => Err(AchError::Multiple(self)),
        }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.len() {
            0 => write!(f, "<nil>"),
            1 => write!(f, "{}", self.0[0]),
            n => {
                write!(f, "{} errors: ", n)?;
                for (i, err) in self.0.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}
