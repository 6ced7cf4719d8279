//! Seams to the hosted services the app is built on.
//!
//! The production implementations live in [`crate::auth`] (Cognito),
//! [`crate::dynamo`] (DynamoDB) and [`crate::s3`] (S3).

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::BackendError;
use crate::types::{
    Identity, NewProfile, NewReport, NewReportImage, Profile, ProfileUpdate, Report, ReportImage,
    SessionChange, UploadHandle,
};

#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Register a new account and, where the service allows it, open a session for it
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity, BackendError>;

    async fn authenticate(&self, email: &str, password: &str) -> Result<Identity, BackendError>;

    async fn end_session(&self) -> Result<(), BackendError>;

    async fn current_session(&self) -> Result<Option<Identity>, BackendError>;

    /// Stream of sign-in/sign-out events, including ones this process did not cause
    fn on_session_change(&self) -> broadcast::Receiver<SessionChange>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_profile(&self, id: &str) -> Result<Option<Profile>, BackendError>;

    async fn create_profile(&self, profile: NewProfile) -> Result<Profile, BackendError>;

    async fn update_profile(&self, id: &str, update: ProfileUpdate) -> Result<Profile, BackendError>;

    /// All reports owned by `owner_id`, newest first
    async fn list_reports(&self, owner_id: &str) -> Result<Vec<Report>, BackendError>;

    async fn create_report(&self, report: NewReport) -> Result<Report, BackendError>;

    async fn list_report_images(&self, report_id: &str) -> Result<Vec<ReportImage>, BackendError>;

    async fn create_report_image(&self, image: NewReportImage) -> Result<ReportImage, BackendError>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(
        &self,
        path: &str,
        content: Vec<u8>,
        content_type: &str,
    ) -> Result<UploadHandle, BackendError>;

    fn public_url(&self, path: &str) -> String;
}
