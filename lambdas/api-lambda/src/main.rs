use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_s3::Client as S3Client;
use lambda_http::{run, service_fn, Error, Request};
use roadwatch_shared::config::Config;
use roadwatch_shared::AppState;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod http_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .without_time()
        .init();

    // Initialize AWS clients once at startup
    let aws_config = aws_config::load_from_env().await;
    let config = Config::from_env()?;

    let state = AppState::new(
        CognitoClient::new(&aws_config),
        DynamoClient::new(&aws_config),
        S3Client::new(&aws_config),
        config,
    );

    run(service_fn(move |event: Request| {
        let state = Arc::clone(&state);
        async move { http_handler::function_handler(event, state).await }
    }))
    .await
}
