use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;

use crate::backend::RecordStore;
use crate::error::BackendError;
use crate::types::{
    NewProfile, NewReport, NewReportImage, Profile, ProfileUpdate, Report, ReportImage,
};
use crate::{images, reports, users};

pub(crate) const SERVICE: &str = "dynamodb";

pub(crate) type Item = HashMap<String, AttributeValue>;

/// Record store on a single DynamoDB table (PK/SK design)
#[derive(Clone)]
pub struct DynamoStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }
}

#[async_trait]
impl RecordStore for DynamoStore {
    async fn get_profile(&self, id: &str) -> Result<Option<Profile>, BackendError> {
        users::get_profile(&self.client, &self.table_name, id).await
    }

    async fn create_profile(&self, profile: NewProfile) -> Result<Profile, BackendError> {
        users::create_profile(&self.client, &self.table_name, profile).await
    }

    async fn update_profile(&self, id: &str, update: ProfileUpdate) -> Result<Profile, BackendError> {
        users::update_profile(&self.client, &self.table_name, id, update).await
    }

    async fn list_reports(&self, owner_id: &str) -> Result<Vec<Report>, BackendError> {
        reports::list_user_reports(&self.client, &self.table_name, owner_id).await
    }

    async fn create_report(&self, report: NewReport) -> Result<Report, BackendError> {
        reports::create_report(&self.client, &self.table_name, report).await
    }

    async fn list_report_images(&self, report_id: &str) -> Result<Vec<ReportImage>, BackendError> {
        images::list_report_images(&self.client, &self.table_name, report_id).await
    }

    async fn create_report_image(&self, image: NewReportImage) -> Result<ReportImage, BackendError> {
        images::create_report_image(&self.client, &self.table_name, image).await
    }
}

pub(crate) fn service_error(e: impl std::error::Error) -> BackendError {
    BackendError::service(SERVICE, aws_sdk_dynamodb::error::DisplayErrorContext(e))
}

/// Run a paged query to the end. `fetch` gets the start key for each page and
/// returns the page items with the key to continue from.
pub(crate) async fn collect_pages<F, Fut>(mut fetch: F) -> Result<Vec<Item>, BackendError>
where
    F: FnMut(Option<Item>) -> Fut,
    Fut: Future<Output = Result<(Vec<Item>, Option<Item>), BackendError>>,
{
    let mut items = Vec::new();
    let mut start_key = None;

    loop {
        let (page, next) = fetch(start_key).await?;
        items.extend(page);
        match next {
            Some(key) => start_key = Some(key),
            None => break,
        }
    }

    Ok(items)
}

pub(crate) fn s(value: impl Into<String>) -> AttributeValue {
    AttributeValue::S(value.into())
}

pub(crate) fn n(value: impl ToString) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

pub(crate) fn string_attr(item: &Item, key: &str) -> Option<String> {
    item.get(key)
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string())
}

pub(crate) fn number_attr<T: FromStr>(item: &Item, key: &str) -> Option<T> {
    item.get(key)
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse().ok())
}

pub(crate) fn time_attr(item: &Item, key: &str) -> Option<DateTime<Utc>> {
    string_attr(item, key)
        .and_then(|value| DateTime::parse_from_rfc3339(&value).ok())
        .map(|time| time.with_timezone(&Utc))
}
