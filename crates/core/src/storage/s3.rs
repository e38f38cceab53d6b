//! S3-compatible object store.

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use reqwest::{Body, Client};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use super::credentials::{CredentialEnv, CredentialSource, ResolvedCredentials};
use super::error::StorageError;
use super::sigv4::{self, SigningParams, UNSIGNED_PAYLOAD};
use super::traits::ObjectStore;
use super::types::PutObjectRequest;
use super::xml;
use crate::config::StorageConfig;

/// Temporary credentials are re-resolved when they expire within this window.
const REFRESH_MARGIN_MINS: i64 = 5;

/// Streams objects to S3 (or an S3-compatible endpoint) with SigV4 signed PUTs.
///
/// AWS endpoints are addressed virtual-hosted style
/// (`https://<bucket>.s3.<region>.amazonaws.com/<key>`); a custom endpoint is
/// addressed path style (`<endpoint>/<bucket>/<key>`). Bucket names with dots
/// would not match the `*.s3.<region>.amazonaws.com` certificate, so those go
/// path style against the regional endpoint.
pub struct S3ObjectStore {
    client: Client,
    credentials: RwLock<ResolvedCredentials>,
    /// Where fresh credentials come from once these near expiry.
    source: Option<CredentialSource>,
    env: CredentialEnv,
    region: String,
    endpoint: Option<String>,
}

impl S3ObjectStore {
    /// Creates a store with already resolved credentials.
    pub fn new(
        credentials: ResolvedCredentials,
        endpoint: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            region: credentials.region.clone(),
            credentials: RwLock::new(credentials),
            source: None,
            env: CredentialEnv::Process,
            endpoint: endpoint.map(|e| e.trim_end_matches('/').to_string()),
        })
    }

    /// Resolves credentials from `config` and creates the store.
    pub async fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        Self::from_config_with(config, CredentialEnv::Process).await
    }

    /// Like [`from_config`](Self::from_config), reading variables from `env`.
    pub async fn from_config_with(config: &StorageConfig, env: CredentialEnv) -> Result<Self, StorageError> {
        let source = CredentialSource::from_config(config);
        let credentials = source.resolve_with(&env).await?;
        let mut store = Self::new(credentials, config.endpoint.clone(), config.timeout_secs)?;
        store.source = Some(source);
        store.env = env;
        Ok(store)
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Current credentials, re-resolved first when they are about to expire.
    async fn current_credentials(&self) -> Result<ResolvedCredentials, StorageError> {
        let credentials = self.credentials.read().await.clone();
        let Some(source) = &self.source else {
            return Ok(credentials);
        };
        if !credentials.expires_within(chrono::Duration::minutes(REFRESH_MARGIN_MINS)) {
            return Ok(credentials);
        }

        let mut current = self.credentials.write().await;
        // Re-check, another upload may have refreshed already.
        if current.expires_within(chrono::Duration::minutes(REFRESH_MARGIN_MINS)) {
            info!(
                "Storage credentials from {} expire at {:?}, refreshing",
                current.origin, current.expires_at
            );
            *current = source.resolve_with(&self.env).await?;
        }
        Ok(current.clone())
    }

    /// Returns `(url, host, canonical_uri)` for an object.
    fn object_location(&self, bucket: &str, key: &str) -> (String, String, String) {
        let encoded_key = sigv4::encode_key(key);

        match &self.endpoint {
            Some(endpoint) => {
                let host = endpoint
                    .split_once("://")
                    .map(|(_, rest)| rest)
                    .unwrap_or(endpoint.as_str())
                    .split('/')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                let canonical_uri = format!("/{}/{}", urlencoding::encode(bucket), encoded_key);
                (format!("{}{}", endpoint, canonical_uri), host, canonical_uri)
            }
            None if bucket.contains('.') => {
                let host = format!("s3.{}.amazonaws.com", self.region);
                let canonical_uri = format!("/{}/{}", urlencoding::encode(bucket), encoded_key);
                (
                    format!("https://{}{}", host, canonical_uri),
                    host,
                    canonical_uri,
                )
            }
            None => {
                let host = format!("{}.s3.{}.amazonaws.com", bucket, self.region);
                let canonical_uri = format!("/{}", encoded_key);
                (
                    format!("https://{}{}", host, canonical_uri),
                    host,
                    canonical_uri,
                )
            }
        }
    }

    /// Headers for a PUT, in the order they are sent. Includes `host` and
    /// `authorization`.
    fn signed_put_headers(
        &self,
        credentials: &ResolvedCredentials,
        request: &PutObjectRequest,
        host: &str,
        canonical_uri: &str,
    ) -> Vec<(String, String)> {
        let params = SigningParams {
            access_key_id: &credentials.access_key_id,
            secret_access_key: &credentials.secret_access_key,
            region: &self.region,
            service: "s3",
            datetime: Utc::now(),
        };

        let mut headers = vec![
            ("host".to_string(), host.to_string()),
            ("content-length".to_string(), request.size_bytes.to_string()),
            ("content-type".to_string(), request.content_type.clone()),
            (
                "x-amz-acl".to_string(),
                request.acl.as_header_value().to_string(),
            ),
            ("x-amz-content-sha256".to_string(), UNSIGNED_PAYLOAD.to_string()),
            ("x-amz-date".to_string(), params.amz_date()),
        ];
        if let Some(token) = &credentials.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }

        let authorization =
            sigv4::authorization(&params, "PUT", canonical_uri, "", &headers, UNSIGNED_PAYLOAD);
        headers.push(("authorization".to_string(), authorization));
        headers
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn name(&self) -> &str {
        "s3"
    }

    async fn put_object(
        &self,
        request: PutObjectRequest,
        progress_tx: Option<mpsc::Sender<u64>>,
    ) -> Result<(), StorageError> {
        let (url, host, canonical_uri) = self.object_location(&request.bucket, &request.key);
        let credentials = self.current_credentials().await?;
        let headers = self.signed_put_headers(&credentials, &request, &host, &canonical_uri);

        let file = tokio::fs::File::open(&request.local_path)
            .await
            .map_err(|e| StorageError::io(&request.local_path, e))?;

        let mut sent: u64 = 0;
        let stream = ReaderStream::new(file).inspect(move |chunk| {
            if let Ok(bytes) = chunk {
                sent += bytes.len() as u64;
                if let Some(tx) = &progress_tx {
                    // Non-blocking send
                    let _ = tx.try_send(sent);
                }
            }
        });

        debug!("PUT {} ({} bytes)", url, request.size_bytes);

        let mut builder = self.client.put(&url);
        for (name, value) in &headers {
            // reqwest derives Host from the URL.
            if name != "host" {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }

        let response = builder.body(Body::wrap_stream(stream)).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                key: request.key,
                status: status.as_u16(),
                message: xml::error_message(&body),
            });
        }

        Ok(())
    }
}
