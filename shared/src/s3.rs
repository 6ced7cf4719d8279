use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use crate::backend::ObjectStore;
use crate::error::BackendError;
use crate::types::UploadHandle;

/// Evidence storage in a public-read S3 bucket
#[derive(Clone)]
pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    async fn upload(
        &self,
        path: &str,
        content: Vec<u8>,
        content_type: &str,
    ) -> Result<UploadHandle, BackendError> {
        let size = content.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(content))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to upload {} to S3: {}", path, DisplayErrorContext(&e));
                BackendError::service("s3", DisplayErrorContext(&e))
            })?;

        tracing::info!("Uploaded {} ({} bytes)", path, size);
        Ok(UploadHandle {
            path: path.to_string(),
        })
    }

    fn public_url(&self, path: &str) -> String {
        public_url(&self.bucket, path)
    }
}

fn public_url(bucket: &str, key: &str) -> String {
    format!("https://{}.s3.amazonaws.com/{}", bucket, key)
}
