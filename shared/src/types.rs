use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ========== IDENTITY ==========
/// Authenticated principal issued by the auth service
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Identity {
    pub id: String,
    pub email: String,
}

/// Identity change pushed by the auth service
#[derive(Debug, Clone, PartialEq)]
pub enum SessionChange {
    SignedIn(Identity),
    SignedOut,
}

// ========== PROFILE ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Profile {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProfile {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
}

// ========== REPORT ==========
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViolationCategory {
    #[default]
    #[serde(rename = "Signal Breaking")]
    SignalBreaking,
    #[serde(rename = "Illegal Parking")]
    IllegalParking,
    #[serde(rename = "Rash Driving")]
    RashDriving,
    #[serde(rename = "Underage Driving")]
    UnderageDriving,
    #[serde(rename = "Drunk Driving")]
    DrunkDriving,
}

impl ViolationCategory {
    pub const ALL: [ViolationCategory; 5] = [
        ViolationCategory::SignalBreaking,
        ViolationCategory::IllegalParking,
        ViolationCategory::RashDriving,
        ViolationCategory::UnderageDriving,
        ViolationCategory::DrunkDriving,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationCategory::SignalBreaking => "Signal Breaking",
            ViolationCategory::IllegalParking => "Illegal Parking",
            ViolationCategory::RashDriving => "Rash Driving",
            ViolationCategory::UnderageDriving => "Underage Driving",
            ViolationCategory::DrunkDriving => "Drunk Driving",
        }
    }
}

impl fmt::Display for ViolationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViolationCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ViolationCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| format!("unknown violation category: {}", s))
    }
}

/// Verification state. Only an external reviewer moves a report out of `Pending`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    #[default]
    Pending,
    Verified,
    Rejected,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Verified => "verified",
            ReportStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReportStatus::Pending),
            "verified" => Ok(ReportStatus::Verified),
            "rejected" => Ok(ReportStatus::Rejected),
            other => Err(format!("unknown report status: {}", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Report {
    pub id: String,
    pub owner_id: String,
    pub category: ViolationCategory,
    pub location: String,
    pub description: String,
    pub status: ReportStatus,
    pub reward: Option<u64>, // set by the reviewer, only meaningful once verified
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReport {
    pub owner_id: String,
    pub category: ViolationCategory,
    pub location: String,
    pub description: String,
    pub status: ReportStatus,
}

// ========== REPORT IMAGE ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReportImage {
    pub id: String,
    pub report_id: String,
    pub image_url: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReportImage {
    pub report_id: String,
    pub image_url: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

// ========== LOCATION ==========
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// A position stamped with the moment it was captured
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct GeoFix {
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at: DateTime<Utc>,
}

impl GeoFix {
    pub fn capture(position: Position) -> Self {
        Self {
            latitude: position.latitude,
            longitude: position.longitude,
            captured_at: Utc::now(),
        }
    }
}

// ========== STORAGE ==========
/// Opaque result of an object upload
#[derive(Debug, Clone, PartialEq)]
pub struct UploadHandle {
    pub path: String,
}
