//! In-memory stand-ins for the hosted services, used by the unit tests.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::backend::{AuthBackend, ObjectStore, RecordStore};
use crate::error::{BackendError, LocationError};
use crate::geolocation::{Geolocator, PositionOptions};
use crate::types::{
    Identity, NewProfile, NewReport, NewReportImage, Position, Profile, ProfileUpdate, Report,
    ReportImage, SessionChange, UploadHandle,
};

fn unavailable(service: &'static str) -> BackendError {
    BackendError::service(service, "simulated outage")
}

pub struct FakeAuth {
    accounts: Mutex<HashMap<String, (String, Identity)>>,
    current: Mutex<Option<Identity>>,
    changes: broadcast::Sender<SessionChange>,
    /// Sign-out drops the local session but reports a service failure
    pub fail_sign_out: bool,
    pub calls: AtomicUsize,
}

impl Default for FakeAuth {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            accounts: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            changes,
            fail_sign_out: false,
            calls: AtomicUsize::new(0),
        }
    }
}

impl FakeAuth {
    pub fn with_account(self, id: &str, email: &str, password: &str) -> Self {
        let identity = Identity {
            id: id.to_string(),
            email: email.to_string(),
        };
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), (password.to_string(), identity));
        self
    }

    /// Pretend a session already exists, e.g. restored from storage
    pub fn with_session(self, identity: Identity) -> Self {
        *self.current.lock().unwrap() = Some(identity);
        self
    }

    pub fn failing_sign_out(mut self) -> Self {
        self.fail_sign_out = true;
        self
    }

    /// Push a change as if another tab signed in or out
    pub fn emit(&self, change: SessionChange) {
        let _ = self.changes.send(change);
    }

    pub fn account(&self, email: &str) -> Option<Identity> {
        self.accounts
            .lock()
            .unwrap()
            .get(email)
            .map(|(_, identity)| identity.clone())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn open(&self, identity: &Identity) {
        *self.current.lock().unwrap() = Some(identity.clone());
        self.emit(SessionChange::SignedIn(identity.clone()));
    }
}

#[async_trait]
impl AuthBackend for FakeAuth {
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let identity = {
            let mut accounts = self.accounts.lock().unwrap();
            if accounts.contains_key(email) {
                return Err(BackendError::Rejected(
                    "An account with this email already exists".to_string(),
                ));
            }
            let identity = Identity {
                id: uuid::Uuid::new_v4().to_string(),
                email: email.to_string(),
            };
            accounts.insert(email.to_string(), (password.to_string(), identity.clone()));
            identity
        };
        self.open(&identity);
        Ok(identity)
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let identity = match self.accounts.lock().unwrap().get(email) {
            Some((stored, identity)) if stored == password => identity.clone(),
            _ => return Err(BackendError::InvalidCredentials),
        };
        self.open(&identity);
        Ok(identity)
    }

    async fn end_session(&self) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.current.lock().unwrap() = None;
        self.emit(SessionChange::SignedOut);
        if self.fail_sign_out {
            return Err(unavailable("auth"));
        }
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<Identity>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.current.lock().unwrap().clone())
    }

    fn on_session_change(&self) -> broadcast::Receiver<SessionChange> {
        self.changes.subscribe()
    }
}

#[derive(Default)]
pub struct FakeRecords {
    pub profiles: Mutex<HashMap<String, Profile>>,
    pub reports: Mutex<Vec<Report>>,
    pub images: Mutex<Vec<ReportImage>>,
    pub fail_profiles: bool,
    pub fail_reports: bool,
    /// Report ids whose image listing fails
    pub fail_images_for: HashSet<String>,
    /// Image row creation fails
    pub fail_images: bool,
    /// Profile reads look up the row, then wait this long before answering
    pub profile_read_delay: Option<Duration>,
    pub profile_write_delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl FakeRecords {
    pub fn insert_report(&self, report: Report) {
        self.reports.lock().unwrap().push(report);
    }

    pub fn insert_image(&self, image: ReportImage) {
        self.images.lock().unwrap().push(image);
    }

    pub fn report_rows(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }

    pub fn image_rows(&self) -> Vec<ReportImage> {
        self.images.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for FakeRecords {
    async fn get_profile(&self, id: &str) -> Result<Option<Profile>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let profile = self.profiles.lock().unwrap().get(id).cloned();
        if let Some(delay) = self.profile_read_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(profile)
    }

    async fn create_profile(&self, profile: NewProfile) -> Result<Profile, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.profile_write_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_profiles {
            return Err(unavailable("records"));
        }
        let now = Utc::now();
        let profile = Profile {
            id: profile.id,
            name: Some(profile.name),
            email: Some(profile.email),
            created_at: now,
            updated_at: now,
        };
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.id.clone(), profile.clone());
        Ok(profile)
    }

    async fn update_profile(&self, id: &str, update: ProfileUpdate) -> Result<Profile, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles
            .get_mut(id)
            .ok_or_else(|| BackendError::Rejected(format!("no profile for {}", id)))?;
        if let Some(name) = update.name {
            profile.name = Some(name);
        }
        if let Some(email) = update.email {
            profile.email = Some(email);
        }
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn list_reports(&self, owner_id: &str) -> Result<Vec<Report>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reports {
            return Err(unavailable("records"));
        }
        let mut reports: Vec<Report> = self
            .reports
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reports)
    }

    async fn create_report(&self, report: NewReport) -> Result<Report, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reports {
            return Err(unavailable("records"));
        }
        let report = Report {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: report.owner_id,
            category: report.category,
            location: report.location,
            description: report.description,
            status: report.status,
            reward: None,
            created_at: Utc::now(),
        };
        self.reports.lock().unwrap().push(report.clone());
        Ok(report)
    }

    async fn list_report_images(&self, report_id: &str) -> Result<Vec<ReportImage>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_images_for.contains(report_id) {
            return Err(unavailable("records"));
        }
        Ok(self
            .images
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.report_id == report_id)
            .cloned()
            .collect())
    }

    async fn create_report_image(&self, image: NewReportImage) -> Result<ReportImage, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_images {
            return Err(unavailable("records"));
        }
        let image = ReportImage {
            id: uuid::Uuid::new_v4().to_string(),
            report_id: image.report_id,
            image_url: image.image_url,
            latitude: image.latitude,
            longitude: image.longitude,
            created_at: Utc::now(),
        };
        self.images.lock().unwrap().push(image.clone());
        Ok(image)
    }
}

#[derive(Default)]
pub struct FakeObjects {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
    /// Uploads whose path ends with one of these suffixes fail after a short delay
    pub fail_suffixes: Vec<String>,
    pub calls: AtomicUsize,
}

impl FakeObjects {
    pub fn failing_on(suffix: &str) -> Self {
        Self {
            fail_suffixes: vec![suffix.to_string()],
            ..Self::default()
        }
    }

    pub fn paths(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for FakeObjects {
    async fn upload(
        &self,
        path: &str,
        content: Vec<u8>,
        _content_type: &str,
    ) -> Result<UploadHandle, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_suffixes.iter().any(|suffix| path.ends_with(suffix.as_str())) {
            // let sibling uploads finish first so tests see a deterministic partial state
            tokio::time::sleep(Duration::from_millis(20)).await;
            return Err(unavailable("storage"));
        }
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), content);
        Ok(UploadHandle {
            path: path.to_string(),
        })
    }

    fn public_url(&self, path: &str) -> String {
        format!("https://storage.test/report-images/{}", path)
    }
}

/// Geolocator answering every request with the same outcome
pub struct FixedGeolocator {
    pub outcome: Result<Position, LocationError>,
    pub calls: AtomicUsize,
}

impl FixedGeolocator {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            outcome: Ok(Position {
                latitude,
                longitude,
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            outcome: Err(LocationError::Denied),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geolocator for FixedGeolocator {
    async fn current_position(&self, _options: &PositionOptions) -> Result<Position, LocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

pub fn report(owner_id: &str, id: &str, minutes_ago: i64) -> Report {
    Report {
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        category: Default::default(),
        location: "MG Road".to_string(),
        description: "Jumped the red light".to_string(),
        status: Default::default(),
        reward: None,
        created_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
    }
}
