//! S3 object store.
//!
//! Talks to a managed S3 bucket (or any S3-compatible endpoint) through
//! `aws-sdk-s3`.  All owners share one bucket; each owner's objects live
//! under `{prefix}{owner_id}/`.
//!
//! Credentials are resolved via the standard AWS credential chain
//! (env vars, `~/.aws/credentials`, IAM role, etc.) unless explicit keys
//! are configured.

use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::ops::Range;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::backend::{ProgressCallback, RawObjectMeta, RemoteObjectStore, StoreFuture};
use crate::config::S3StoreConfig;
use crate::errors::TransportError;

/// S3 rejects multipart parts smaller than this (except the last one).
const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Bytes escaped in an RFC 5987 `filename*` value (everything but attr-char).
const ATTR_CHAR_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Store that forwards operations to an S3 bucket.
pub struct S3Store {
    client: Client,
    bucket: String,
    /// Key prefix for all objects in the bucket.
    prefix: String,
    presign_ttl: Duration,
    multipart_threshold: u64,
    part_size: u64,
}

impl S3Store {
    /// Build the SDK client from `config`.
    pub async fn new(config: &S3StoreConfig) -> anyhow::Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        if !config.endpoint_url.is_empty() {
            loader = loader.endpoint_url(&config.endpoint_url);
        }

        if !config.access_key_id.is_empty() && !config.secret_access_key.is_empty() {
            let creds = aws_sdk_s3::config::Credentials::new(
                &config.access_key_id,
                &config.secret_access_key,
                None, // session_token
                None, // expiry
                "filedash-config",
            );
            loader = loader.credentials_provider(creds);
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.use_path_style)
            .build();

        info!(
            "S3 store initialized: bucket={} prefix='{}'",
            config.bucket, config.prefix
        );

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            prefix: config.prefix.clone(),
            presign_ttl: Duration::from_secs(config.presign_ttl_seconds),
            multipart_threshold: config.multipart_threshold_bytes,
            part_size: effective_part_size(config.part_size_bytes),
        })
    }

    fn s3_key(&self, key: &str) -> String {
        s3_key(&self.prefix, key)
    }

    fn to_utc(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
        dt.to_millis()
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
    }

    async fn put_multipart(
        &self,
        s3_key: &str,
        data: Bytes,
        content_type: &str,
        on_progress: &ProgressCallback,
    ) -> Result<(), TransportError> {
        let total = data.len() as u64;
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(s3_key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| TransportError::new("put", e.into_service_error()))?;
        let upload_id = created
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| TransportError::new("put", "missing multipart upload id"))?;

        let result: Result<(), TransportError> = async {
            let mut parts = Vec::new();
            let mut loaded = 0u64;
            for (index, range) in part_ranges(data.len(), self.part_size).into_iter().enumerate() {
                let part_number = index as i32 + 1;
                let chunk = data.slice(range);
                let chunk_len = chunk.len() as u64;
                let output = self
                    .client
                    .upload_part()
                    .bucket(&self.bucket)
                    .key(s3_key)
                    .upload_id(&upload_id)
                    .part_number(part_number)
                    .body(ByteStream::from(chunk))
                    .send()
                    .await
                    .map_err(|e| TransportError::new("put", e.into_service_error()))?;
                parts.push(
                    CompletedPart::builder()
                        .set_e_tag(output.e_tag().map(str::to_string))
                        .part_number(part_number)
                        .build(),
                );
                loaded += chunk_len;
                on_progress(loaded, total);
            }

            self.client
                .complete_multipart_upload()
                .bucket(&self.bucket)
                .key(s3_key)
                .upload_id(&upload_id)
                .multipart_upload(
                    CompletedMultipartUpload::builder()
                        .set_parts(Some(parts))
                        .build(),
                )
                .send()
                .await
                .map_err(|e| TransportError::new("put", e.into_service_error()))?;
            Ok(())
        }
        .await;

        if let Err(e) = &result {
            warn!("Aborting S3 multipart upload {} due to error: {}", upload_id, e);
            if let Err(abort_err) = self
                .client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(s3_key)
                .upload_id(&upload_id)
                .send()
                .await
            {
                warn!("Failed to abort multipart upload {}: {}", upload_id, abort_err);
            }
        }
        result
    }
}

impl RemoteObjectStore for S3Store {
    fn list(&self, prefix: &str) -> StoreFuture<'_, Vec<RawObjectMeta>> {
        let s3_prefix = self.s3_key(prefix);
        Box::pin(async move {
            debug!("S3 list_objects_v2: bucket={} prefix={}", self.bucket, s3_prefix);

            let mut listed = Vec::new();
            let mut continuation: Option<String> = None;
            loop {
                let mut request = self
                    .client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(&s3_prefix)
                    .max_keys(1000);
                if let Some(token) = continuation.take() {
                    request = request.continuation_token(token);
                }
                let output = request
                    .send()
                    .await
                    .map_err(|e| TransportError::new("list", e.into_service_error()))?;

                for item in output.contents() {
                    let Some(key) = item.key().and_then(|k| dashboard_key(&self.prefix, k))
                    else {
                        continue;
                    };
                    listed.push(RawObjectMeta {
                        key: key.to_string(),
                        size: item.size().and_then(|s| u64::try_from(s).ok()),
                        content_type: None,
                        last_modified: item.last_modified().and_then(Self::to_utc),
                    });
                }

                if output.is_truncated().unwrap_or(false) {
                    continuation = output.next_continuation_token().map(str::to_string);
                    if continuation.is_none() {
                        break;
                    }
                } else {
                    break;
                }
            }
            Ok(listed)
        })
    }

    fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        on_progress: ProgressCallback,
    ) -> StoreFuture<'_, ()> {
        let s3_key = self.s3_key(key);
        let content_type = content_type.to_string();
        Box::pin(async move {
            let total = data.len() as u64;
            debug!(
                "S3 put_object: bucket={} key={} bytes={}",
                self.bucket, s3_key, total
            );

            if total > self.multipart_threshold {
                return self
                    .put_multipart(&s3_key, data, &content_type, &on_progress)
                    .await;
            }

            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&s3_key)
                .content_type(&content_type)
                .body(ByteStream::from(data))
                .send()
                .await
                .map_err(|e| TransportError::new("put", e.into_service_error()))?;
            on_progress(total, total);
            Ok(())
        })
    }

    fn get_url(&self, key: &str, download: bool) -> StoreFuture<'_, String> {
        let s3_key = self.s3_key(key);
        let file_name = key.rsplit('/').next().unwrap_or(key).to_string();
        Box::pin(async move {
            debug!("S3 presign get_object: bucket={} key={}", self.bucket, s3_key);

            let config = PresigningConfig::expires_in(self.presign_ttl)
                .map_err(|e| TransportError::new("get", e))?;
            let mut request = self.client.get_object().bucket(&self.bucket).key(&s3_key);
            if download {
                request = request.response_content_disposition(attachment_disposition(&file_name));
            }
            let presigned = request
                .presigned(config)
                .await
                .map_err(|e| TransportError::new("get", e))?;
            Ok(presigned.uri().to_string())
        })
    }

    fn remove(&self, key: &str) -> StoreFuture<'_, ()> {
        let s3_key = self.s3_key(key);
        Box::pin(async move {
            debug!("S3 delete_object: bucket={} key={}", self.bucket, s3_key);

            // S3 delete_object is idempotent -- no error for missing keys.
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(&s3_key)
                .send()
                .await
                .map_err(|e| TransportError::new("remove", e.into_service_error()))?;
            Ok(())
        })
    }
}

/// Map a dashboard key to the bucket key: `{prefix}{key}`.
fn s3_key(prefix: &str, key: &str) -> String {
    format!("{prefix}{key}")
}

/// Map a bucket key back to a dashboard key; `None` for keys outside the
/// configured prefix.
fn dashboard_key<'a>(prefix: &str, s3_key: &'a str) -> Option<&'a str> {
    s3_key.strip_prefix(prefix)
}

fn effective_part_size(configured: u64) -> u64 {
    configured.max(MIN_PART_SIZE)
}

/// Byte ranges of each multipart part, in order.  Every part is
/// `part_size` long except possibly the last.
fn part_ranges(total: usize, part_size: u64) -> Vec<Range<usize>> {
    let step = usize::try_from(part_size).unwrap_or(usize::MAX).max(1);
    (0..total)
        .step_by(step)
        .map(|start| start..total.min(start.saturating_add(step)))
        .collect()
}

/// `Content-Disposition` for a download link.  The quoted `filename` is an
/// ASCII fallback; `filename*` carries the exact UTF-8 name.
fn attachment_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();
    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        utf8_percent_encode(file_name, ATTR_CHAR_SET)
    )
}

// -- Tests -------------------------------------------------------------------
