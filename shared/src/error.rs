use thiserror::Error;

/// Failure reported by one of the external services (auth, records, storage)
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("{service} request failed: {message}")]
    Service {
        service: &'static str,
        message: String,
    },
}

impl BackendError {
    pub fn service(service: &'static str, err: impl std::fmt::Display) -> Self {
        BackendError::Service {
            service,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AuthError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("no authenticated user")]
    Unauthorized,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl AuthError {
    /// Message safe to show to the person using the app
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Validation(message) => message.clone(),
            AuthError::InvalidCredentials => "Invalid email or password".to_string(),
            AuthError::Unauthorized => "You must be logged in to do that".to_string(),
            AuthError::Backend(BackendError::Rejected(message)) => message.clone(),
            AuthError::Backend(_) => "An unexpected error occurred".to_string(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SubmitError {
    #[error("no authenticated user")]
    Unauthorized,

    #[error("at least one evidence image is required")]
    NoEvidence,

    #[error("{count} evidence images attached, at most {max} allowed")]
    TooMuchEvidence { count: usize, max: usize },

    #[error("failed to create report: {0}")]
    CreateReport(BackendError),

    #[error("failed to upload {file_name} for report {report_id}: {source}")]
    Upload {
        report_id: String,
        file_name: String,
        source: BackendError,
    },

    #[error("failed to record image for report {report_id}: {source}")]
    ImageRecord {
        report_id: String,
        source: BackendError,
    },

    #[error("evidence task for report {report_id} did not complete: {message}")]
    Interrupted { report_id: String, message: String },
}

impl SubmitError {
    pub fn user_message(&self) -> String {
        match self {
            SubmitError::Unauthorized => "You must be logged in to submit a report".to_string(),
            SubmitError::NoEvidence => "Add at least one photo before submitting".to_string(),
            SubmitError::TooMuchEvidence { max, .. } => format!("Upload up to {} photos", max),
            _ => "Failed to submit report. Please try again.".to_string(),
        }
    }

    /// Id of the report row left behind when a failure happened after it was created.
    /// Nothing is rolled back, so callers may want to surface or log it.
    pub fn orphaned_report_id(&self) -> Option<&str> {
        match self {
            SubmitError::Upload { report_id, .. }
            | SubmitError::ImageRecord { report_id, .. }
            | SubmitError::Interrupted { report_id, .. } => Some(report_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LoadError {
    #[error("failed to list reports: {0}")]
    Reports(BackendError),

    #[error("failed to list images for report {report_id}: {source}")]
    Images {
        report_id: String,
        source: BackendError,
    },

    #[error("image fetch did not complete: {0}")]
    Interrupted(String),
}

impl LoadError {
    pub fn user_message(&self) -> String {
        "Failed to load reports. Please try again later.".to_string()
    }
}

/// Why a device position could not be obtained. Never fatal to the caller.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LocationError {
    #[error("geolocation is not supported")]
    Unsupported,

    #[error("location permission denied")]
    Denied,

    #[error("position unavailable: {0}")]
    Unavailable(String),

    #[error("timed out waiting for a position fix")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} must be set")]
    Missing(&'static str),
}
