//! Ambient credential providers that reach outside the process: STS web
//! identity, `credential_process`, the container endpoint and EC2 instance
//! metadata.
//!
//! Each returns `Ok(None)` when its source is not configured and an error
//! when it is configured but fails.

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::profile::Profile;
use super::{CredentialEnv, ResolvedCredentials};
use crate::error_log::single_line;
use crate::storage::error::StorageError;
use crate::storage::xml;

const STS_TIMEOUT: Duration = Duration::from_secs(10);
const CONTAINER_TIMEOUT: Duration = Duration::from_secs(5);
const IMDS_TIMEOUT: Duration = Duration::from_secs(1);

/// ECS task role endpoint, used with `AWS_CONTAINER_CREDENTIALS_RELATIVE_URI`.
const CONTAINER_ENDPOINT: &str = "http://169.254.170.2";
const IMDS_ENDPOINT: &str = "http://169.254.169.254";
const IMDS_TOKEN_TTL_SECS: u32 = 21600;
const IMDS_TOKEN_HEADER: &str = "x-aws-ec2-metadata-token";
const STS_API_VERSION: &str = "2011-06-15";

/// Temporary credentials as served by the container endpoint and IMDS.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RoleCredentials {
    code: Option<String>,
    access_key_id: String,
    secret_access_key: String,
    token: Option<String>,
    expiration: Option<DateTime<Utc>>,
}

impl RoleCredentials {
    fn into_resolved(self, region: &str, origin: String) -> ResolvedCredentials {
        ResolvedCredentials {
            access_key_id: self.access_key_id,
            secret_access_key: self.secret_access_key,
            session_token: self.token,
            region: region.to_string(),
            origin,
            expires_at: self.expiration,
        }
    }
}

/// Output of a `credential_process` command.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProcessCredentials {
    version: u32,
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
    expiration: Option<DateTime<Utc>>,
}

fn client(timeout: Duration) -> Result<Client, StorageError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

fn credentials_error(message: impl Into<String>) -> StorageError {
    StorageError::Credentials(message.into())
}

/// `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` / `AWS_SESSION_TOKEN`.
pub(super) fn from_env(env: &CredentialEnv, region: &str) -> Option<ResolvedCredentials> {
    Some(ResolvedCredentials {
        access_key_id: env.get("AWS_ACCESS_KEY_ID")?,
        secret_access_key: env.get("AWS_SECRET_ACCESS_KEY")?,
        session_token: env.get("AWS_SESSION_TOKEN"),
        region: region.to_string(),
        origin: "environment".to_string(),
        expires_at: None,
    })
}

/// Exchange a web identity token for role credentials with
/// `AssumeRoleWithWebIdentity`. The call is unsigned.
pub(super) async fn web_identity(
    env: &CredentialEnv,
    profile: &Profile,
    region: &str,
) -> Result<Option<ResolvedCredentials>, StorageError> {
    let (token_file, role_arn, session_name) = match (
        env.get("AWS_WEB_IDENTITY_TOKEN_FILE"),
        env.get("AWS_ROLE_ARN"),
    ) {
        (Some(file), Some(arn)) => (file, arn, env.get("AWS_ROLE_SESSION_NAME")),
        _ => match (
            profile.get("web_identity_token_file"),
            profile.get("role_arn"),
        ) {
            (Some(file), Some(arn)) => (
                file.to_string(),
                arn.to_string(),
                profile.get("role_session_name").map(str::to_string),
            ),
            _ => return Ok(None),
        },
    };

    let token = tokio::fs::read_to_string(&token_file).await.map_err(|e| {
        credentials_error(format!(
            "failed to read web identity token {}: {}",
            token_file, e
        ))
    })?;
    let session_name = session_name
        .unwrap_or_else(|| format!("playlist-ingest-{}", Utc::now().timestamp_millis()));
    let endpoint = env
        .get("AWS_ENDPOINT_URL_STS")
        .unwrap_or_else(|| format!("https://sts.{}.amazonaws.com", region));
    let url = format!(
        "{}/?Action=AssumeRoleWithWebIdentity&Version={}&RoleArn={}&RoleSessionName={}&WebIdentityToken={}",
        endpoint.trim_end_matches('/'),
        STS_API_VERSION,
        urlencoding::encode(&role_arn),
        urlencoding::encode(&session_name),
        urlencoding::encode(token.trim())
    );

    debug!("Assuming role {} with web identity", role_arn);
    let response = client(STS_TIMEOUT)?.get(&url).send().await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(credentials_error(format!(
            "AssumeRoleWithWebIdentity for {} failed: {} - {}",
            role_arn,
            status.as_u16(),
            xml::error_message(&body)
        )));
    }

    match (
        xml::field(&body, "AccessKeyId"),
        xml::field(&body, "SecretAccessKey"),
    ) {
        (Some(access_key_id), Some(secret_access_key)) => Ok(Some(ResolvedCredentials {
            access_key_id,
            secret_access_key,
            session_token: xml::field(&body, "SessionToken"),
            region: region.to_string(),
            origin: format!("web identity {}", role_arn),
            expires_at: xml::field(&body, "Expiration")
                .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
                .map(|t| t.with_timezone(&Utc)),
        })),
        _ => Err(credentials_error(format!(
            "AssumeRoleWithWebIdentity for {} returned no credentials",
            role_arn
        ))),
    }
}

/// Run the profile's `credential_process` and parse its JSON output.
///
/// The command line is split on whitespace and run without a shell.
pub(super) async fn credential_process(
    profile: &Profile,
    region: &str,
) -> Result<Option<ResolvedCredentials>, StorageError> {
    let Some(command) = profile.get("credential_process") else {
        return Ok(None);
    };

    let mut parts = command.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| credentials_error("credential_process is blank"))?;

    debug!("Running credential_process for profile {}", profile.name);
    let output = Command::new(program)
        .args(parts)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| credentials_error(format!("failed to run {}: {}", program, e)))?;

    if !output.status.success() {
        return Err(credentials_error(format!(
            "credential_process {} exited with {}: {}",
            program,
            output.status,
            single_line(&String::from_utf8_lossy(&output.stderr))
        )));
    }

    let parsed: ProcessCredentials = serde_json::from_slice(&output.stdout).map_err(|e| {
        credentials_error(format!("credential_process {} printed invalid JSON: {}", program, e))
    })?;
    if parsed.version != 1 {
        return Err(credentials_error(format!(
            "credential_process {} returned unsupported Version {}",
            program, parsed.version
        )));
    }

    Ok(Some(ResolvedCredentials {
        access_key_id: parsed.access_key_id,
        secret_access_key: parsed.secret_access_key,
        session_token: parsed.session_token,
        region: region.to_string(),
        origin: format!("credential_process [{}]", profile.name),
        expires_at: parsed.expiration,
    }))
}

/// ECS task roles and EKS pod identity.
pub(super) async fn container(
    env: &CredentialEnv,
    region: &str,
) -> Result<Option<ResolvedCredentials>, StorageError> {
    let url = match (
        env.get("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI"),
        env.get("AWS_CONTAINER_CREDENTIALS_FULL_URI"),
    ) {
        (Some(relative), _) => format!("{}{}", CONTAINER_ENDPOINT, relative),
        (None, Some(full)) => full,
        (None, None) => return Ok(None),
    };

    let authorization = match env.get("AWS_CONTAINER_AUTHORIZATION_TOKEN_FILE") {
        Some(path) => Some(
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| {
                    credentials_error(format!("failed to read container token {}: {}", path, e))
                })?
                .trim()
                .to_string(),
        ),
        None => env.get("AWS_CONTAINER_AUTHORIZATION_TOKEN"),
    };

    let mut request = client(CONTAINER_TIMEOUT)?.get(&url);
    if let Some(token) = authorization {
        request = request.header("Authorization", token);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(credentials_error(format!(
            "container credentials endpoint {} returned {}",
            url, status
        )));
    }

    let credentials: RoleCredentials = response.json().await?;
    Ok(Some(credentials.into_resolved(
        region,
        format!("container endpoint {}", url),
    )))
}

/// EC2 instance profile credentials through IMDSv2.
///
/// A host without a metadata service (the token request fails or times
/// out) yields `Ok(None)`, as does an instance without a profile.
pub(super) async fn instance_metadata(
    env: &CredentialEnv,
    region: &str,
) -> Result<Option<ResolvedCredentials>, StorageError> {
    if env
        .get("AWS_EC2_METADATA_DISABLED")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    {
        return Ok(None);
    }

    let endpoint = env
        .get("AWS_EC2_METADATA_SERVICE_ENDPOINT")
        .unwrap_or_else(|| IMDS_ENDPOINT.to_string());
    let endpoint = endpoint.trim_end_matches('/');
    let client = client(IMDS_TIMEOUT)?;

    let token = match client
        .put(format!("{}/latest/api/token", endpoint))
        .header(
            "x-aws-ec2-metadata-token-ttl-seconds",
            IMDS_TOKEN_TTL_SECS.to_string(),
        )
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => response.text().await?,
        Ok(response) => {
            debug!("Instance metadata token request returned {}", response.status());
            return Ok(None);
        }
        Err(e) => {
            debug!("Instance metadata unavailable: {}", e);
            return Ok(None);
        }
    };

    let base = format!("{}/latest/meta-data/iam/security-credentials/", endpoint);
    let response = client
        .get(&base)
        .header(IMDS_TOKEN_HEADER, &token)
        .send()
        .await?;
    if response.status() == StatusCode::NOT_FOUND {
        debug!("Instance has no IAM role attached");
        return Ok(None);
    }
    if !response.status().is_success() {
        return Err(credentials_error(format!(
            "instance metadata role lookup returned {}",
            response.status()
        )));
    }

    let roles = response.text().await?;
    let Some(role) = roles.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return Ok(None);
    };

    let response = client
        .get(format!("{}{}", base, role))
        .header(IMDS_TOKEN_HEADER, &token)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(credentials_error(format!(
            "instance metadata credentials for role {} returned {}",
            role,
            response.status()
        )));
    }

    let credentials: RoleCredentials = response.json().await?;
    if let Some(code) = credentials.code.as_deref().filter(|c| *c != "Success") {
        return Err(credentials_error(format!(
            "instance metadata credentials for role {} not ready: {}",
            role, code
        )));
    }

    Ok(Some(
        credentials.into_resolved(region, format!("instance profile {}", role)),
    ))
}
