//! Report form state and the multi-step submission that turns it into a
//! report row, uploaded evidence and one image row per file.

use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::backend::{ObjectStore, RecordStore};
use crate::error::SubmitError;
use crate::geolocation::{locate_once, Geolocator};
use crate::types::{
    GeoFix, Identity, NewReport, NewReportImage, Report, ReportImage, ReportStatus,
    ViolationCategory,
};

pub const MAX_EVIDENCE: usize = 4;

pub const LOCATION_WARNING: &str =
    "Unable to get location. Please enable location services and try again.";

/// A file picked by the user, held locally until submission
#[derive(Debug, Clone)]
pub struct EvidenceFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Evidence {
    pub file: EvidenceFile,
    /// `data:` URL for showing the image before it is uploaded
    pub preview: String,
    pub location: Option<GeoFix>,
}

impl Evidence {
    fn new(file: EvidenceFile, location: Option<GeoFix>) -> Self {
        let preview = format!(
            "data:{};base64,{}",
            file.content_type,
            general_purpose::STANDARD.encode(&file.bytes)
        );
        Self {
            file,
            preview,
            location,
        }
    }
}

/// Result of adding a batch of files to the form
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AttachOutcome {
    pub attached: usize,
    /// Names of files left out because the form was full
    pub rejected: Vec<String>,
    /// Set when at least one file was attached without a location fix
    pub location_warning: Option<&'static str>,
}

/// Working set of the report form
#[derive(Debug, Clone, Default)]
pub struct ReportForm {
    pub category: ViolationCategory,
    pub location: String,
    pub description: String,
    evidence: Vec<Evidence>,
}

impl ReportForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evidence(&self) -> &[Evidence] {
        &self.evidence
    }

    /// Attach newly selected files, trying once per file to tag it with the
    /// device position. A file without a fix is still attached.
    pub async fn attach_evidence(
        &mut self,
        files: Vec<EvidenceFile>,
        geolocator: &dyn Geolocator,
    ) -> AttachOutcome {
        let mut outcome = AttachOutcome::default();

        for file in files {
            if self.evidence.len() >= MAX_EVIDENCE {
                tracing::warn!("Evidence limit reached, skipping {}", file.name);
                outcome.rejected.push(file.name);
                continue;
            }

            let location = match locate_once(geolocator).await {
                Ok(fix) => Some(fix),
                Err(e) => {
                    tracing::warn!("Error getting location for {}: {}", file.name, e);
                    outcome.location_warning = Some(LOCATION_WARNING);
                    None
                }
            };

            self.evidence.push(Evidence::new(file, location));
            outcome.attached += 1;
        }

        outcome
    }

    /// Drop one attached file along with its preview
    pub fn remove_evidence(&mut self, index: usize) -> Option<Evidence> {
        if index < self.evidence.len() {
            Some(self.evidence.remove(index))
        } else {
            None
        }
    }

    /// Whether the submit control should be enabled. Callers also keep it
    /// disabled while a submission is in flight.
    pub fn can_submit(&self) -> bool {
        (1..=MAX_EVIDENCE).contains(&self.evidence.len())
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Everything created by a successful submission
#[derive(Debug, Clone)]
pub struct SubmittedReport {
    pub report: Report,
    pub images: Vec<ReportImage>,
}

pub struct SubmissionPipeline {
    records: Arc<dyn RecordStore>,
    objects: Arc<dyn ObjectStore>,
    geolocator: Arc<dyn Geolocator>,
}

impl SubmissionPipeline {
    pub fn new(
        records: Arc<dyn RecordStore>,
        objects: Arc<dyn ObjectStore>,
        geolocator: Arc<dyn Geolocator>,
    ) -> Self {
        Self {
            records,
            objects,
            geolocator,
        }
    }

    /// Create the report and its evidence.
    ///
    /// Steps run in order: report row, then every evidence upload concurrently.
    /// The first failing upload decides the result; uploads still running are
    /// left to finish and nothing already written is removed. The form is only
    /// cleared on full success.
    pub async fn submit(
        &self,
        identity: Option<&Identity>,
        form: &mut ReportForm,
    ) -> Result<SubmittedReport, SubmitError> {
        let identity = identity.ok_or(SubmitError::Unauthorized)?;
        match form.evidence.len() {
            0 => return Err(SubmitError::NoEvidence),
            count if count > MAX_EVIDENCE => {
                return Err(SubmitError::TooMuchEvidence {
                    count,
                    max: MAX_EVIDENCE,
                })
            }
            _ => {}
        }

        let location = self.resolve_location(&form.location).await;

        let report = self
            .records
            .create_report(NewReport {
                owner_id: identity.id.clone(),
                category: form.category,
                location,
                description: form.description.clone(),
                status: ReportStatus::Pending,
            })
            .await
            .map_err(|e| {
                tracing::error!("Failed to create report: {}", e);
                SubmitError::CreateReport(e)
            })?;

        tracing::info!(
            "Report {} created for {}, uploading {} images",
            report.id,
            identity.id,
            form.evidence.len()
        );

        let images = self
            .store_evidence(&identity.id, &report.id, form.evidence.clone())
            .await?;

        form.reset();
        Ok(SubmittedReport { report, images })
    }

    async fn resolve_location(&self, typed: &str) -> String {
        let typed = typed.trim();
        if !typed.is_empty() {
            return typed.to_string();
        }
        match locate_once(self.geolocator.as_ref()).await {
            Ok(fix) => format_position(&fix),
            Err(e) => {
                tracing::warn!("Error getting location for report: {}", e);
                String::new()
            }
        }
    }

    async fn store_evidence(
        &self,
        owner_id: &str,
        report_id: &str,
        evidence: Vec<Evidence>,
    ) -> Result<Vec<ReportImage>, SubmitError> {
        let mut uploads = JoinSet::new();
        for item in evidence {
            uploads.spawn(store_one(
                Arc::clone(&self.records),
                Arc::clone(&self.objects),
                owner_id.to_string(),
                report_id.to_string(),
                item,
            ));
        }

        let mut images = Vec::with_capacity(uploads.len());
        while let Some(joined) = uploads.join_next().await {
            let failure = match joined {
                Ok(Ok(image)) => {
                    images.push(image);
                    continue;
                }
                Ok(Err(e)) => e,
                Err(e) => SubmitError::Interrupted {
                    report_id: report_id.to_string(),
                    message: e.to_string(),
                },
            };

            tracing::error!("Failed to submit report {}: {}", report_id, failure);
            // Dropping the set would cancel the rest; let them run to completion instead
            uploads.detach_all();
            return Err(failure);
        }

        Ok(images)
    }
}

async fn store_one(
    records: Arc<dyn RecordStore>,
    objects: Arc<dyn ObjectStore>,
    owner_id: String,
    report_id: String,
    evidence: Evidence,
) -> Result<ReportImage, SubmitError> {
    let Evidence { file, location, .. } = evidence;
    let path = object_key(&owner_id, &file.name);

    objects
        .upload(&path, file.bytes, &file.content_type)
        .await
        .map_err(|source| SubmitError::Upload {
            report_id: report_id.clone(),
            file_name: file.name.clone(),
            source,
        })?;

    let image_url = objects.public_url(&path);

    records
        .create_report_image(NewReportImage {
            report_id: report_id.clone(),
            image_url,
            latitude: location.map(|fix| fix.latitude),
            longitude: location.map(|fix| fix.longitude),
        })
        .await
        .map_err(|source| SubmitError::ImageRecord { report_id, source })
}

/// Storage key for an upload: `{owner}/{random}.{ext}`, keeping the original extension
pub fn object_key(owner_id: &str, file_name: &str) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            format!("{}/{}.{}", owner_id, random, ext)
        }
        _ => format!("{}/{}", owner_id, random),
    }
}

fn format_position(fix: &GeoFix) -> String {
    format!("{}, {}", fix.latitude, fix.longitude)
}
