use async_trait::async_trait;
use std::time::Duration;

use crate::error::LocationError;
use crate::types::{GeoFix, Position};

const POSITION_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for a one-shot position request
#[derive(Debug, Clone)]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    pub timeout: Duration,
    /// Oldest cached fix that may be returned; zero forces a fresh one
    pub maximum_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout: POSITION_TIMEOUT,
            maximum_age: Duration::ZERO,
        }
    }
}

#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn current_position(&self, options: &PositionOptions) -> Result<Position, LocationError>;
}

/// Single position attempt with the default options
pub async fn locate_once(geolocator: &dyn Geolocator) -> Result<GeoFix, LocationError> {
    locate_with(geolocator, &PositionOptions::default()).await
}

pub async fn locate_with(
    geolocator: &dyn Geolocator,
    options: &PositionOptions,
) -> Result<GeoFix, LocationError> {
    match tokio::time::timeout(options.timeout, geolocator.current_position(options)).await {
        Ok(Ok(position)) => Ok(GeoFix::capture(position)),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(LocationError::Timeout),
    }
}

/// What the device said about its position when it made the request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportedPosition {
    pub position: Option<Position>,
    /// Why the device had no fix: "denied", "timeout", or any other reason
    pub error: Option<String>,
}

impl ReportedPosition {
    pub fn at(position: Position) -> Self {
        Self {
            position: Some(position),
            error: None,
        }
    }

    pub fn from_device(position: Option<Position>, error: Option<String>) -> Self {
        Self { position, error }
    }
}

#[async_trait]
impl Geolocator for ReportedPosition {
    async fn current_position(&self, _options: &PositionOptions) -> Result<Position, LocationError> {
        if let Some(position) = self.position {
            return Ok(position);
        }
        match self.error.as_deref().map(str::trim) {
            None | Some("") => Err(LocationError::Unsupported),
            Some(reason) if reason.eq_ignore_ascii_case("denied") => Err(LocationError::Denied),
            Some(reason) if reason.eq_ignore_ascii_case("timeout") => Err(LocationError::Timeout),
            Some(reason) => Err(LocationError::Unavailable(reason.to_string())),
        }
    }
}
