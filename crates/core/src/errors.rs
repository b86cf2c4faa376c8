use thiserror::Error;

use crate::shorturl::ShortUrlError;
use crate::store::StoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("no free short id after {attempts} attempts")]
    CollisionExhausted { attempts: u32 },
    #[error("command failed: {0}")]
    Command(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("unauthorized: {message}")]
    Unauthorized { message: String, correlation_id: String },
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("reported to user: {message}")]
    UserVisible { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("upstream unreachable: {message}")]
    BadGateway { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "The request could not be authenticated.",
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::UserVisible { .. } => "The command failed. See the reply for details.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::BadGateway { .. } => "The chat platform could not be reached.",
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    /// HTTP status the ingress layer answers with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized { .. } => 401,
            Self::BadRequest { .. } => 400,
            Self::UserVisible { .. } => 200,
            Self::ServiceUnavailable { .. } => 503,
            Self::BadGateway { .. } => 502,
            Self::Internal { .. } => 500,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::Unauthorized { correlation_id, .. }
            | Self::BadRequest { correlation_id, .. }
            | Self::UserVisible { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::BadGateway { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::Unauthorized { correlation_id: id, .. }
            | InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::UserVisible { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::BadGateway { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Authentication(message) => {
                Self::Unauthorized { message, correlation_id }
            }
            ApplicationError::MalformedRequest(message) => {
                Self::BadRequest { message, correlation_id }
            }
            ApplicationError::Command(message) => Self::UserVisible { message, correlation_id },
            ApplicationError::Storage(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Integration(message) => Self::BadGateway { message, correlation_id },
            ApplicationError::CollisionExhausted { attempts } => Self::Internal {
                message: format!("short id space exhausted after {attempts} attempts"),
                correlation_id,
            },
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::InvalidKey(message) => Self::MalformedRequest(message),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<ShortUrlError> for ApplicationError {
    fn from(value: ShortUrlError) -> Self {
        match value {
            ShortUrlError::InvalidUrl(message) => Self::Command(message),
            ShortUrlError::InvalidTtl(message) => Self::Command(message),
            ShortUrlError::CollisionExhausted { attempts } => Self::CollisionExhausted { attempts },
            ShortUrlError::Store(error) => Self::from(error),
        }
    }
}
