pub mod types;
pub mod error;
pub mod config;
pub mod backend;
pub mod geolocation;
pub mod routes;
pub mod session;
pub mod submission;
pub mod dashboard;
pub mod auth;
pub mod dynamo;
pub mod users;
pub mod reports;
pub mod images;
pub mod s3;

#[cfg(test)]
mod fake;

use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_s3::Client as S3Client;
use std::sync::Arc;

use crate::auth::CognitoAuth;
use crate::backend::{ObjectStore, RecordStore};
use crate::config::Config;
use crate::dynamo::DynamoStore;
use crate::s3::S3Storage;

/// Shared application state
pub struct AppState {
    pub cognito_client: CognitoClient,
    pub dynamo_client: DynamoClient,
    pub s3_client: S3Client,
    pub config: Config,
}

impl AppState {
    pub fn new(
        cognito_client: CognitoClient,
        dynamo_client: DynamoClient,
        s3_client: S3Client,
        config: Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            cognito_client,
            dynamo_client,
            s3_client,
            config,
        })
    }

    pub fn records(&self) -> Arc<dyn RecordStore> {
        Arc::new(DynamoStore::new(
            self.dynamo_client.clone(),
            self.config.table_name.clone(),
        ))
    }

    pub fn objects(&self) -> Arc<dyn ObjectStore> {
        Arc::new(S3Storage::new(
            self.s3_client.clone(),
            self.config.bucket_name.clone(),
        ))
    }

    /// Auth client for one caller, resumed from their access token when they sent one
    pub fn auth(&self, access_token: Option<&str>) -> Arc<CognitoAuth> {
        let auth = CognitoAuth::new(
            self.cognito_client.clone(),
            self.config.cognito_client_id.clone(),
            self.config.cognito_client_secret.clone(),
            self.config.cognito_user_pool_id.clone(),
        );
        match access_token {
            Some(token) => Arc::new(auth.with_access_token(token)),
            None => Arc::new(auth),
        }
    }
}
