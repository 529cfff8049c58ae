//! S3-compatible gateway (Cloudflare R2, MinIO, AWS S3).
//!
//! Presigned URLs are produced by the SDK and served by the bucket itself,
//! so `verify_signature` keeps the trait default.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client,
    config::Region,
    error::SdkError,
    operation::{get_object::GetObjectError, head_object::HeadObjectError},
    presigning::PresigningConfig,
    primitives::DateTime as AwsDateTime,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::{
    models::object::{HttpMetadata, PresignOptions, PresignedUrl, StoredObject},
    services::object_store::{ObjectStore, StoreError, StoreResult, ensure_key_valid},
};

const CUSTOM_ENDPOINT_REGION: &str = "auto";

pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build a client from the default AWS credential chain, optionally
    /// pointed at a custom endpoint (R2 account URL, MinIO, …).
    ///
    /// A custom endpoint gets the region `auto` unless `AWS_REGION` names one.
    pub async fn new(bucket: impl Into<String>, endpoint_url: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(endpoint) = endpoint_url {
            let region =
                std::env::var("AWS_REGION").unwrap_or_else(|_| CUSTOM_ENDPOINT_REGION.into());
            loader = loader.endpoint_url(endpoint).region(Region::new(region));
        }
        let config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(endpoint_url.is_some())
            .build();

        Self {
            client: Client::from_conf(s3_config),
            bucket: bucket.into(),
        }
    }
}

fn to_chrono(value: Option<&AwsDateTime>) -> Option<DateTime<Utc>> {
    value.and_then(|dt| DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos()))
}

fn strip_quotes(etag: Option<&str>) -> String {
    etag.unwrap_or_default().trim_matches('"').to_string()
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredObject>> {
        ensure_key_valid(key)?;
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(SdkError::ServiceError(err))
                if matches!(err.err(), GetObjectError::NoSuchKey(_)) =>
            {
                return Ok(None);
            }
            Err(err) => return Err(StoreError::Backend(err.to_string())),
        };

        debug!(bucket = %self.bucket, key = %key, "object fetched from S3");
        let http_metadata = HttpMetadata {
            content_type: output.content_type().map(str::to_string),
            content_language: output.content_language().map(str::to_string),
            content_disposition: output.content_disposition().map(str::to_string),
            content_encoding: output.content_encoding().map(str::to_string),
            cache_control: output.cache_control().map(str::to_string),
        };
        let size = output.content_length().unwrap_or_default().max(0) as u64;
        let etag = strip_quotes(output.e_tag());
        let uploaded = to_chrono(output.last_modified());
        let body = ReaderStream::new(output.body.into_async_read()).boxed();

        Ok(Some(StoredObject {
            key: key.to_string(),
            size,
            etag,
            uploaded,
            http_metadata,
            body: Some(body),
        }))
    }

    async fn head(&self, key: &str) -> StoreResult<Option<StoredObject>> {
        ensure_key_valid(key)?;
        let output = match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(SdkError::ServiceError(err))
                if matches!(err.err(), HeadObjectError::NotFound(_)) =>
            {
                return Ok(None);
            }
            Err(err) => return Err(StoreError::Backend(err.to_string())),
        };

        Ok(Some(StoredObject {
            key: key.to_string(),
            size: output.content_length().unwrap_or_default().max(0) as u64,
            etag: strip_quotes(output.e_tag()),
            uploaded: to_chrono(output.last_modified()),
            http_metadata: HttpMetadata {
                content_type: output.content_type().map(str::to_string),
                content_language: output.content_language().map(str::to_string),
                content_disposition: output.content_disposition().map(str::to_string),
                content_encoding: output.content_encoding().map(str::to_string),
                cache_control: output.cache_control().map(str::to_string),
            },
            body: None,
        }))
    }

    async fn presign(&self, key: &str, options: PresignOptions) -> StoreResult<PresignedUrl> {
        ensure_key_valid(key)?;
        let config = PresigningConfig::expires_in(options.expires_in)
            .map_err(|err| StoreError::Signing(err.to_string()))?;
        let request = match options.method.as_str() {
            "GET" => self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .presigned(config)
                .await
                .map_err(|err| StoreError::Signing(err.to_string()))?,
            other => {
                return Err(StoreError::Signing(format!(
                    "method {other} is not supported"
                )));
            }
        };
        let ttl = chrono::Duration::from_std(options.expires_in)
            .map_err(|err| StoreError::Signing(err.to_string()))?;

        Ok(PresignedUrl {
            url: request.uri().to_string(),
            expires_at: Utc::now() + ttl,
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        Ok(())
    }

    fn scheme(&self) -> &'static str {
        "s3"
    }
}
