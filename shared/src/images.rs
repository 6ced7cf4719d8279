use aws_sdk_dynamodb::Client as DynamoClient;
use chrono::Utc;

use crate::dynamo::{collect_pages, n, number_attr, s, service_error, string_attr, time_attr, Item};
use crate::error::BackendError;
use crate::types::{NewReportImage, ReportImage};

/// Create an image row under its report
pub async fn create_report_image(
    client: &DynamoClient,
    table_name: &str,
    image: NewReportImage,
) -> Result<ReportImage, BackendError> {
    let image = ReportImage {
        id: uuid::Uuid::new_v4().to_string(),
        report_id: image.report_id,
        image_url: image.image_url,
        latitude: image.latitude,
        longitude: image.longitude,
        created_at: Utc::now(),
    };

    let mut builder = client
        .put_item()
        .table_name(table_name)
        .item("PK", s(format!("REPORT#{}", image.report_id)))
        .item("SK", s(format!("IMAGE#{}", image.id)))
        .item("image_url", s(image.image_url.clone()))
        .item("created_at", s(image.created_at.to_rfc3339()));

    if let Some(latitude) = image.latitude {
        builder = builder.item("latitude", n(latitude));
    }
    if let Some(longitude) = image.longitude {
        builder = builder.item("longitude", n(longitude));
    }

    builder.send().await.map_err(service_error)?;

    Ok(image)
}

/// List all images for a report, following pagination to the end
pub async fn list_report_images(
    client: &DynamoClient,
    table_name: &str,
    report_id: &str,
) -> Result<Vec<ReportImage>, BackendError> {
    let pk = format!("REPORT#{}", report_id);

    let items = collect_pages(|start_key| {
        let query = client
            .query()
            .table_name(table_name)
            .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
            .expression_attribute_values(":pk", s(pk.clone()))
            .expression_attribute_values(":sk_prefix", s("IMAGE#"))
            .set_exclusive_start_key(start_key);
        async move {
            let result = query.send().await.map_err(service_error)?;
            Ok((result.items().to_vec(), result.last_evaluated_key().cloned()))
        }
    })
    .await?;

    Ok(items
        .iter()
        .filter_map(|item| image_from_item(report_id, item))
        .collect())
}

pub(crate) fn image_from_item(report_id: &str, item: &Item) -> Option<ReportImage> {
    let sk = string_attr(item, "SK")?;
    let image_id = sk.strip_prefix("IMAGE#")?;

    Some(ReportImage {
        id: image_id.to_string(),
        report_id: report_id.to_string(),
        image_url: string_attr(item, "image_url").unwrap_or_default(),
        latitude: number_attr(item, "latitude"),
        longitude: number_attr(item, "longitude"),
        created_at: time_attr(item, "created_at").unwrap_or_else(Utc::now),
    })
}
