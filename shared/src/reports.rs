use aws_sdk_dynamodb::Client as DynamoClient;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::dynamo::{collect_pages, number_attr, s, service_error, string_attr, time_attr, Item};
use crate::error::BackendError;
use crate::types::{NewReport, Report};

fn owner_pk(owner_id: &str) -> String {
    format!("USER#{}", owner_id)
}

/// Sort key under the owner; the timestamp prefix keeps reports in creation order
fn owner_sk(created_at: &DateTime<Utc>, report_id: &str) -> String {
    format!(
        "REPORT#{}#{}",
        created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        report_id
    )
}

/// Create a report under its owner, sorted by creation time
pub async fn create_report(
    client: &DynamoClient,
    table_name: &str,
    report: NewReport,
) -> Result<Report, BackendError> {
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

    client
        .put_item()
        .table_name(table_name)
        .item("PK", s(owner_pk(&report.owner_id)))
        .item("SK", s(owner_sk(&report.created_at, &report.id)))
        .item("report_id", s(report.id.clone()))
        .item("user_id", s(report.owner_id.clone()))
        .item("type", s(report.category.as_str()))
        .item("location", s(report.location.clone()))
        .item("description", s(report.description.clone()))
        .item("status", s(report.status.as_str()))
        .item("created_at", s(report.created_at.to_rfc3339()))
        .send()
        .await
        .map_err(service_error)?;

    tracing::info!("Report {} stored for user {}", report.id, report.owner_id);
    Ok(report)
}

/// Every report for one user, newest first. Follows pagination to the end.
pub async fn list_user_reports(
    client: &DynamoClient,
    table_name: &str,
    owner_id: &str,
) -> Result<Vec<Report>, BackendError> {
    let pk = owner_pk(owner_id);

    let items = collect_pages(|start_key| {
        let query = client
            .query()
            .table_name(table_name)
            .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
            .expression_attribute_values(":pk", s(pk.clone()))
            .expression_attribute_values(":sk_prefix", s("REPORT#"))
            .scan_index_forward(false)
            .set_exclusive_start_key(start_key);
        async move {
            let result = query.send().await.map_err(service_error)?;
            Ok((result.items().to_vec(), result.last_evaluated_key().cloned()))
        }
    })
    .await?;

    let mut reports = Vec::with_capacity(items.len());
    for item in &items {
        match report_from_item(item) {
            Some(report) => reports.push(report),
            None => tracing::warn!("Skipping malformed report item for user {}", owner_id),
        }
    }

    Ok(reports)
}

/// Status and reward are written by reviewers outside this app; read them as stored.
pub(crate) fn report_from_item(item: &Item) -> Option<Report> {
    Some(Report {
        id: string_attr(item, "report_id")?,
        owner_id: string_attr(item, "user_id")?,
        category: string_attr(item, "type")?.parse().ok()?,
        location: string_attr(item, "location").unwrap_or_default(),
        description: string_attr(item, "description").unwrap_or_default(),
        status: string_attr(item, "status")
            .and_then(|status| status.parse().ok())
            .unwrap_or_default(),
        reward: number_attr(item, "reward"),
        created_at: time_attr(item, "created_at")?,
    })
}
