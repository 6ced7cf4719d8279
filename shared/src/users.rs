use aws_sdk_dynamodb::types::ReturnValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use chrono::Utc;

use crate::dynamo::{s, service_error, string_attr, time_attr, Item};
use crate::error::BackendError;
use crate::types::{NewProfile, Profile, ProfileUpdate};

const PROFILE_SK: &str = "PROFILE";

fn profile_pk(user_id: &str) -> String {
    format!("USER#{}", user_id)
}

/// Create the profile row right after the account exists in Cognito
pub async fn create_profile(
    client: &DynamoClient,
    table_name: &str,
    profile: NewProfile,
) -> Result<Profile, BackendError> {
    let now = Utc::now();

    // Store profile with PK=USER#cognito-sub, SK=PROFILE
    client
        .put_item()
        .table_name(table_name)
        .item("PK", s(profile_pk(&profile.id)))
        .item("SK", s(PROFILE_SK))
        .item("name", s(profile.name.clone()))
        .item("email", s(profile.email.clone()))
        .item("created_at", s(now.to_rfc3339()))
        .item("updated_at", s(now.to_rfc3339()))
        .send()
        .await
        .map_err(service_error)?;

    tracing::info!("Profile created for user: {}", profile.id);

    Ok(Profile {
        id: profile.id,
        name: Some(profile.name),
        email: Some(profile.email),
        created_at: now,
        updated_at: now,
    })
}

pub async fn get_profile(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<Option<Profile>, BackendError> {
    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", s(profile_pk(user_id)))
        .key("SK", s(PROFILE_SK))
        .send()
        .await
        .map_err(service_error)?;

    Ok(result.item().map(|item| profile_from_item(user_id, item)))
}

pub async fn update_profile(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    update: ProfileUpdate,
) -> Result<Profile, BackendError> {
    let mut update_expr = vec!["updated_at = :updated_at"];
    let mut builder = client
        .update_item()
        .table_name(table_name)
        .key("PK", s(profile_pk(user_id)))
        .key("SK", s(PROFILE_SK))
        .condition_expression("attribute_exists(PK)")
        .expression_attribute_values(":updated_at", s(Utc::now().to_rfc3339()))
        .return_values(ReturnValue::AllNew);

    if let Some(name) = update.name {
        update_expr.push("#name = :name");
        builder = builder
            .expression_attribute_names("#name", "name")
            .expression_attribute_values(":name", s(name));
    }

    if let Some(email) = update.email {
        update_expr.push("email = :email");
        builder = builder.expression_attribute_values(":email", s(email));
    }

    let result = builder
        .update_expression(format!("SET {}", update_expr.join(", ")))
        .send()
        .await
        .map_err(|e| {
            let missing = e
                .as_service_error()
                .map_or(false, |se| se.is_conditional_check_failed_exception());
            if missing {
                BackendError::Rejected(format!("No profile for user {}", user_id))
            } else {
                service_error(e)
            }
        })?;

    let item = result
        .attributes()
        .ok_or_else(|| BackendError::service(crate::dynamo::SERVICE, "update returned no attributes"))?;
    Ok(profile_from_item(user_id, item))
}

pub(crate) fn profile_from_item(user_id: &str, item: &Item) -> Profile {
    let created_at = time_attr(item, "created_at").unwrap_or_else(Utc::now);
    Profile {
        id: user_id.to_string(),
        name: string_attr(item, "name"),
        email: string_attr(item, "email"),
        created_at,
        updated_at: time_attr(item, "updated_at").unwrap_or(created_at),
    }
}
