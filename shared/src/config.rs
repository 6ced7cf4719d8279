use crate::error::ConfigError;
use std::env;

const DEFAULT_TABLE_NAME: &str = "roadwatch";
const DEFAULT_BUCKET_NAME: &str = "report-images";

/// Runtime settings read from the lambda environment
#[derive(Debug, Clone)]
pub struct Config {
    pub cognito_client_id: String,
    pub cognito_client_secret: String,
    pub cognito_user_pool_id: Option<String>,
    pub table_name: String,
    pub bucket_name: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));
        let with_default = |key: &str, default: &str| {
            lookup(key).unwrap_or_else(|| {
                tracing::info!("{} not set, using default: {}", key, default);
                default.to_string()
            })
        };

        let cognito_user_pool_id = lookup("COGNITO_USER_POOL_ID");
        if cognito_user_pool_id.is_none() {
            tracing::warn!("COGNITO_USER_POOL_ID not set; new accounts will not be auto-confirmed");
        }

        Ok(Self {
            cognito_client_id: required("COGNITO_CLIENT_ID")?,
            cognito_client_secret: required("COGNITO_CLIENT_SECRET")?,
            cognito_user_pool_id,
            table_name: with_default("TABLE_NAME", DEFAULT_TABLE_NAME),
            bucket_name: with_default("BUCKET_NAME", DEFAULT_BUCKET_NAME),
        })
    }
}
