//! S3-compatible evidence store.
//!
//! Every case shares one bucket and is a key prefix inside it. Blobs are
//! created with `If-None-Match: *`, so a finished upload never replaces an
//! existing object. Small blobs go up in a single `PutObject`; a multipart
//! upload is opened only once a full part has accumulated.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectStore, StreamingUpload};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::default_provider::credentials::DefaultCredentialsChain;
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::provider::error::CredentialsError;
use aws_credential_types::provider::future::ProvideCredentials as ProvideCredentialsFuture;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_smithy_http_client::Builder as SmithyHttpClientBuilder;
use bytes::Bytes;
use custody_core::config::S3StorageConfig;
use std::io::SeekFrom;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::OnceCell;
use tokio_util::io::ReaderStream;
use tracing::instrument;

/// Size of every multipart part but the last. S3 rejects smaller ones.
const PART_SIZE: usize = 5 * 1024 * 1024;

/// Pending bytes held in memory before moving to a temp file.
const SPILL_THRESHOLD: usize = 64 * 1024 * 1024;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Tag on errors from the ambient credential chain.
const AMBIENT_CREDENTIALS: &str = "custody-ambient-credentials";

/// The default AWS credential chain, built on the first signed request.
///
/// Construction of the backend must not touch the network or TLS roots.
#[derive(Debug)]
struct AmbientCredentials {
    region: aws_config::Region,
    chain: OnceCell<DefaultCredentialsChain>,
}

impl AmbientCredentials {
    async fn resolve(&self) -> aws_credential_types::provider::Result {
        let chain = self
            .chain
            .get_or_init(|| {
                DefaultCredentialsChain::builder()
                    .region(self.region.clone())
                    .build()
            })
            .await;
        chain.provide_credentials().await.map_err(|err| {
            CredentialsError::provider_error(format!("{AMBIENT_CREDENTIALS}: {err}"))
        })
    }
}

impl ProvideCredentials for AmbientCredentials {
    fn provide_credentials<'a>(&'a self) -> ProvideCredentialsFuture<'a>
    where
        Self: 'a,
    {
        ProvideCredentialsFuture::new(self.resolve())
    }
}

/// What the failed request was doing to its key.
#[derive(Clone, Copy)]
enum Intent {
    Read,
    Create,
    Other,
}

fn storage_error<E>(err: SdkError<E>, key: &str, intent: Intent) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let status = match &err {
        SdkError::ServiceError(service) => Some(service.raw().status().as_u16()),
        _ => None,
    };
    match (intent, status) {
        (Intent::Read, Some(404)) => StorageError::NotFound(key.to_string()),
        // 412: the key exists. 409: a concurrent conditional write won.
        (Intent::Create, Some(409 | 412)) => StorageError::AlreadyExists(key.to_string()),
        _ if err.to_string().contains(AMBIENT_CREDENTIALS) => StorageError::Config(
            "no S3 credentials configured and none found in the environment".to_string(),
        ),
        _ => StorageError::S3(Box::new(err)),
    }
}

/// Bare `host:port` endpoints mean plain HTTP.
fn endpoint_url(endpoint: &str) -> String {
    let lower = endpoint.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

/// Evidence store backed by an S3-compatible bucket.
#[derive(Debug)]
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl S3Backend {
    pub fn new(config: &S3StorageConfig) -> StorageResult<Self> {
        config.validate().map_err(StorageError::Config)?;

        let region = aws_config::Region::new(config.region().to_string());
        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(region.clone())
            .force_path_style(config.force_path_style);

        builder = match config.static_credentials().map_err(StorageError::Config)? {
            Some((key_id, secret)) => builder.credentials_provider(
                aws_sdk_s3::config::Credentials::new(key_id, secret, None, None, "custody-config"),
            ),
            None => builder.credentials_provider(AmbientCredentials {
                region,
                chain: OnceCell::new(),
            }),
        };

        if let Some(url) = config.endpoint.as_deref().map(endpoint_url) {
            builder = builder.endpoint_url(&url);
            // No trust roots needed for plain HTTP.
            if url.starts_with("http://") {
                builder = builder.http_client(SmithyHttpClientBuilder::new().build_http());
            }
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            prefix: config.normalized_prefix(),
        })
    }

    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Backend {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await;
        match head.map_err(|e| storage_error(e, key, Intent::Read)) {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        use futures::TryStreamExt;

        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
            .map_err(|e| storage_error(e, key, Intent::Read))?;

        let body = ReaderStream::new(output.body.into_async_read()).map_err(StorageError::Io);
        Ok(Box::pin(body))
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        Ok(Box::new(S3Upload {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key: key.to_string(),
            object: self.full_key(key),
            upload_id: None,
            parts: Vec::new(),
            size: 0,
            pending: PartBuffer::new(SPILL_THRESHOLD),
            settled: false,
        }))
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        // DeleteObject reports success for missing keys.
        if !self.exists(key).await? {
            return Err(StorageError::NotFound(key.to_string()));
        }
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
            .map_err(|e| storage_error(e, key, Intent::Other))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn health_check(&self) -> StorageResult<()> {
        let head = self.client.head_bucket().bucket(&self.bucket).send();
        match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, head).await {
            Ok(result) => result
                .map(|_| ())
                .map_err(|e| storage_error(e, &self.bucket, Intent::Other)),
            Err(_) => Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("bucket {} did not answer within {HEALTH_CHECK_TIMEOUT:?}", self.bucket),
            ))),
        }
    }
}

/// Region of a temp file holding bytes not yet sent.
struct SpillFile {
    file: tokio::fs::File,
    start: u64,
    end: u64,
}

impl SpillFile {
    async fn append(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(self.end)).await?;
        self.file.write_all(data).await?;
        self.file.flush().await?;
        self.end += data.len() as u64;
        Ok(())
    }

    async fn read_front(&mut self, len: usize) -> std::io::Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(self.start)).await?;
        let mut out = vec![0u8; len];
        self.file.read_exact(&mut out).await?;
        self.start += len as u64;
        Ok(out)
    }
}

/// Bytes accepted by an upload but not yet sent as a part.
///
/// Kept in memory until more than `spill_at` bytes are pending, then moved
/// to an anonymous temp file for the rest of the upload.
struct PartBuffer {
    memory: Vec<u8>,
    spill: Option<SpillFile>,
    spill_at: usize,
}

impl PartBuffer {
    fn new(spill_at: usize) -> Self {
        Self {
            memory: Vec::new(),
            spill: None,
            spill_at,
        }
    }

    fn len(&self) -> usize {
        match &self.spill {
            Some(spill) => (spill.end - spill.start) as usize,
            None => self.memory.len(),
        }
    }

    /// Append `data`. Returns true if this call moved the buffer to disk.
    async fn push(&mut self, data: &[u8]) -> std::io::Result<bool> {
        if let Some(spill) = self.spill.as_mut() {
            spill.append(data).await?;
            return Ok(false);
        }
        self.memory.extend_from_slice(data);
        if self.memory.len() <= self.spill_at {
            return Ok(false);
        }

        let mut spill = SpillFile {
            file: tokio::fs::File::from_std(tempfile::tempfile()?),
            start: 0,
            end: 0,
        };
        spill.append(&std::mem::take(&mut self.memory)).await?;
        self.spill = Some(spill);
        Ok(true)
    }

    /// Remove up to `max` bytes from the front.
    async fn take(&mut self, max: usize) -> std::io::Result<Vec<u8>> {
        let len = max.min(self.len());
        match self.spill.as_mut() {
            Some(spill) => spill.read_front(len).await,
            None => Ok(self.memory.drain(..len).collect()),
        }
    }
}

struct S3Upload {
    client: Client,
    bucket: String,
    key: String,
    object: String,
    /// Opened when the first full part is ready.
    upload_id: Option<String>,
    parts: Vec<CompletedPart>,
    size: u64,
    pending: PartBuffer,
    /// Set once finish or abort has run.
    settled: bool,
}

impl S3Upload {
    async fn upload_id(&mut self) -> StorageResult<String> {
        if let Some(id) = &self.upload_id {
            return Ok(id.clone());
        }
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.object)
            .send()
            .await
            .map_err(|e| storage_error(e, &self.key, Intent::Other))?;
        let id = created
            .upload_id()
            .ok_or_else(|| StorageError::Config("S3 did not return an upload id".to_string()))?
            .to_string();
        self.upload_id = Some(id.clone());
        Ok(id)
    }

    async fn send_part(&mut self, data: Vec<u8>) -> StorageResult<()> {
        let upload_id = self.upload_id().await?;
        let number = self.parts.len() as i32 + 1;
        let sent = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.object)
            .upload_id(upload_id)
            .part_number(number)
            .body(Bytes::from(data).into())
            .send()
            .await
            .map_err(|e| storage_error(e, &self.key, Intent::Other))?;

        self.parts.push(
            CompletedPart::builder()
                .e_tag(sent.e_tag().unwrap_or_default())
                .part_number(number)
                .build(),
        );
        Ok(())
    }

    async fn complete(&mut self) -> StorageResult<u64> {
        let tail = self.pending.take(usize::MAX).await?;

        if self.upload_id.is_none() {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&self.object)
                .if_none_match("*")
                .body(Bytes::from(tail).into())
                .send()
                .await
                .map_err(|e| storage_error(e, &self.key, Intent::Create))?;
            return Ok(self.size);
        }

        if !tail.is_empty() {
            self.send_part(tail).await?;
        }
        let parts = CompletedMultipartUpload::builder()
            .set_parts(Some(std::mem::take(&mut self.parts)))
            .build();
        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.object)
            .set_upload_id(self.upload_id.clone())
            .if_none_match("*")
            .multipart_upload(parts)
            .send()
            .await
            .map_err(|e| storage_error(e, &self.key, Intent::Create))?;
        Ok(self.size)
    }

    async fn abort_multipart(&mut self) -> StorageResult<()> {
        let Some(upload_id) = self.upload_id.take() else {
            return Ok(());
        };
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.object)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| storage_error(e, &self.key, Intent::Other))?;
        Ok(())
    }
}

#[async_trait]
impl StreamingUpload for S3Upload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.size += data.len() as u64;
        if self.pending.push(&data).await? {
            tracing::debug!(key = %self.key, pending = self.pending.len(), "Upload buffer moved to temp file");
        }
        while self.pending.len() >= PART_SIZE {
            let part = self.pending.take(PART_SIZE).await?;
            self.send_part(part).await?;
        }
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<u64> {
        let result = self.complete().await;
        self.settled = true;
        if result.is_err()
            && let Err(e) = self.abort_multipart().await
        {
            tracing::warn!(key = %self.key, error = %e, "Failed to abort multipart upload");
        }
        result
    }

    async fn abort(mut self: Box<Self>) -> StorageResult<()> {
        self.settled = true;
        self.abort_multipart().await
    }
}

impl Drop for S3Upload {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let Some(upload_id) = self.upload_id.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let request = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.object)
            .upload_id(upload_id);
        let key = std::mem::take(&mut self.key);
        handle.spawn(async move {
            if let Err(e) = request.send().await {
                tracing::warn!(key = %key, error = %e, "Failed to abort dropped multipart upload");
            }
        });
    }
}
