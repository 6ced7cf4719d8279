use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::backend::RecordStore;
use crate::error::LoadError;
use crate::types::{Report, ReportImage, ReportStatus, ViolationCategory};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageView {
    pub url: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// A report joined with its images, ready for display
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReportView {
    pub id: String,
    #[serde(rename = "type")]
    pub category: ViolationCategory,
    pub location: String,
    pub date: String,
    pub created_at: DateTime<Utc>,
    pub status: ReportStatus,
    pub reward: Option<u64>,
    pub description: String,
    pub images: Vec<ImageView>,
}

impl ReportView {
    fn from_parts(report: Report, images: Vec<ReportImage>) -> Self {
        Self {
            date: report.created_at.format("%-m/%-d/%Y").to_string(),
            id: report.id,
            category: report.category,
            location: report.location,
            created_at: report.created_at,
            status: report.status,
            reward: report.reward,
            description: report.description,
            images: images
                .into_iter()
                .map(|image| ImageView {
                    url: image.image_url,
                    latitude: image.latitude,
                    longitude: image.longitude,
                })
                .collect(),
        }
    }
}

/// Aggregates shown on the dashboard. Recompute from the loaded reports each time.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct RewardSummary {
    pub total_reports: usize,
    pub verified_reports: usize,
    pub total_reward: u64,
}

impl RewardSummary {
    pub fn from_reports(reports: &[ReportView]) -> Self {
        let verified = reports
            .iter()
            .filter(|report| report.status == ReportStatus::Verified);

        let (verified_reports, total_reward) = verified.fold((0, 0), |(count, sum), report| {
            (count + 1, sum.saturating_add(report.reward.unwrap_or(0)))
        });

        Self {
            total_reports: reports.len(),
            verified_reports,
            total_reward,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RewardEntry {
    pub report_id: String,
    #[serde(rename = "type")]
    pub category: ViolationCategory,
    pub date: String,
    pub amount: u64,
}

/// Verified reports that carry a reward, in load order
pub fn reward_history(reports: &[ReportView]) -> Vec<RewardEntry> {
    reports
        .iter()
        .filter(|report| report.status == ReportStatus::Verified)
        .filter_map(|report| {
            report.reward.filter(|amount| *amount > 0).map(|amount| RewardEntry {
                report_id: report.id.clone(),
                category: report.category,
                date: report.date.clone(),
                amount,
            })
        })
        .collect()
}

/// Load every report owned by `identity_id`, newest first, each joined with its images.
///
/// Image lookups run concurrently. Any failure fails the whole load and the
/// remaining lookups are cancelled, so callers never see a partial history.
pub async fn load_for_identity(
    records: &Arc<dyn RecordStore>,
    identity_id: &str,
) -> Result<Vec<ReportView>, LoadError> {
    let reports = records.list_reports(identity_id).await.map_err(|e| {
        tracing::error!("Error fetching reports for {}: {}", identity_id, e);
        LoadError::Reports(e)
    })?;

    let mut lookups = JoinSet::new();
    for (position, report) in reports.into_iter().enumerate() {
        let records = Arc::clone(records);
        lookups.spawn(async move {
            let images = records
                .list_report_images(&report.id)
                .await
                .map_err(|source| LoadError::Images {
                    report_id: report.id.clone(),
                    source,
                })?;
            Ok::<_, LoadError>((position, ReportView::from_parts(report, images)))
        });
    }

    let mut views = Vec::with_capacity(lookups.len());
    while let Some(joined) = lookups.join_next().await {
        let result = joined.map_err(|e| LoadError::Interrupted(e.to_string()))?;
        match result {
            Ok(view) => views.push(view),
            Err(e) => {
                tracing::error!("Error fetching reports for {}: {}", identity_id, e);
                return Err(e);
            }
        }
    }

    views.sort_by_key(|(position, _)| *position);
    Ok(views.into_iter().map(|(_, view)| view).collect())
}
