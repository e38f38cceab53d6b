//! Storage credential resolution.
//!
//! Keys from configuration win when both are set. Otherwise the ambient
//! chain is walked in the order the AWS SDKs use:
//!
//! 1. `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` / `AWS_SESSION_TOKEN`
//! 2. web identity (`AWS_WEB_IDENTITY_TOKEN_FILE` + `AWS_ROLE_ARN`, or the
//!    profile's `web_identity_token_file` + `role_arn`) exchanged through STS
//! 3. static keys in the shared credentials file
//! 4. the profile's `credential_process`
//! 5. static keys in the shared config file
//! 6. the container credentials endpoint (ECS task roles, EKS pod identity)
//! 7. EC2 instance metadata (IMDSv2)
//!
//! A source that is configured but fails ends the chain with an error.

mod profile;
mod providers;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

use super::error::StorageError;
use crate::config::StorageConfig;
use profile::{Profile, ProfileFile};

/// Region used when neither config nor environment names one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Where environment variables are read from during resolution.
#[derive(Debug, Clone, Default)]
pub enum CredentialEnv {
    /// The process environment.
    #[default]
    Process,
    /// A fixed set of variables; everything else is unset.
    Fixed(HashMap<String, String>),
}

impl CredentialEnv {
    pub fn fixed<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Fixed(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Value of `name`. Empty values count as unset.
    pub fn get(&self, name: &str) -> Option<String> {
        match self {
            CredentialEnv::Process => std::env::var(name).ok(),
            CredentialEnv::Fixed(vars) => vars.get(name).cloned(),
        }
        .filter(|v| !v.is_empty())
    }
}

/// How storage credentials are obtained.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Keys supplied in configuration.
    Explicit {
        access_key: String,
        secret_key: String,
        region: Option<String>,
    },
    /// Keys found by the ambient provider chain.
    Ambient { region: Option<String> },
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Explicit { region, .. } => f
                .debug_struct("Explicit")
                .field("access_key", &"***")
                .field("secret_key", &"***")
                .field("region", region)
                .finish(),
            CredentialSource::Ambient { region } => {
                f.debug_struct("Ambient").field("region", region).finish()
            }
        }
    }
}

/// Credentials ready for request signing.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub region: String,
    /// Where the keys came from, for logging.
    pub origin: String,
    /// Set for temporary credentials.
    pub expires_at: Option<DateTime<Utc>>,
}

impl ResolvedCredentials {
    /// True when the credentials expire within `margin` from now.
    pub fn expires_within(&self, margin: chrono::Duration) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at - margin <= Utc::now())
    }
}

impl fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .field("region", &self.region)
            .field("origin", &self.origin)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl CredentialSource {
    /// Explicit when both keys are configured, ambient otherwise.
    pub fn from_config(config: &StorageConfig) -> Self {
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());

        match (non_empty(&config.access_key), non_empty(&config.secret_key)) {
            (Some(access_key), Some(secret_key)) => CredentialSource::Explicit {
                access_key,
                secret_key,
                region: non_empty(&config.region),
            },
            _ => CredentialSource::Ambient {
                region: non_empty(&config.region),
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CredentialSource::Explicit { .. } => "explicit",
            CredentialSource::Ambient { .. } => "ambient",
        }
    }

    fn configured_region(&self) -> Option<&str> {
        match self {
            CredentialSource::Explicit { region, .. } | CredentialSource::Ambient { region } => {
                region.as_deref()
            }
        }
    }

    /// Resolve against the process environment.
    pub async fn resolve(&self) -> Result<ResolvedCredentials, StorageError> {
        self.resolve_with(&CredentialEnv::Process).await
    }

    /// Resolve reading variables from `env`.
    pub async fn resolve_with(&self, env: &CredentialEnv) -> Result<ResolvedCredentials, StorageError> {
        let profile = Profile::load(env);
        let region = resolve_region(self.configured_region(), env, &profile);

        let resolved = match self {
            CredentialSource::Explicit {
                access_key,
                secret_key,
                ..
            } => ResolvedCredentials {
                access_key_id: access_key.clone(),
                secret_access_key: secret_key.clone(),
                session_token: None,
                region,
                origin: "configuration".to_string(),
                expires_at: None,
            },
            CredentialSource::Ambient { .. } => resolve_ambient(env, &profile, &region).await?,
        };

        info!(
            "Using {} storage credentials from {} (region {})",
            self.kind(),
            resolved.origin,
            resolved.region
        );

        Ok(resolved)
    }
}

async fn resolve_ambient(
    env: &CredentialEnv,
    profile: &Profile,
    region: &str,
) -> Result<ResolvedCredentials, StorageError> {
    if let Some(credentials) = providers::from_env(env, region) {
        return Ok(credentials);
    }
    if let Some(credentials) = providers::web_identity(env, profile, region).await? {
        return Ok(credentials);
    }
    if let Some(credentials) = profile.static_keys(ProfileFile::Credentials, region) {
        return Ok(credentials);
    }
    if let Some(credentials) = providers::credential_process(profile, region).await? {
        return Ok(credentials);
    }
    if let Some(credentials) = profile.static_keys(ProfileFile::Config, region) {
        return Ok(credentials);
    }
    if let Some(credentials) = providers::container(env, region).await? {
        return Ok(credentials);
    }
    if let Some(credentials) = providers::instance_metadata(env, region).await? {
        return Ok(credentials);
    }

    debug!("Ambient credential chain exhausted for profile {}", profile.name);
    Err(StorageError::Credentials(format!(
        "no explicit keys configured and no ambient source provided any \
         (environment, web identity, profile {}, credential_process, container endpoint, instance metadata)",
        profile.name
    )))
}

/// Explicit, else `AWS_REGION`, `AWS_DEFAULT_REGION`, the profile's region,
/// else [`DEFAULT_REGION`].
fn resolve_region(explicit: Option<&str>, env: &CredentialEnv, profile: &Profile) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| env.get("AWS_REGION"))
        .or_else(|| env.get("AWS_DEFAULT_REGION"))
        .or_else(|| profile.region().map(str::to_string))
        .unwrap_or_else(|| DEFAULT_REGION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Nothing but the given variables, with instance metadata switched off.
    fn hermetic(pairs: &[(&str, &str)]) -> CredentialEnv {
        CredentialEnv::fixed(
            pairs
                .iter()
                .copied()
                .chain([("AWS_EC2_METADATA_DISABLED", "true")]),
        )
    }

    fn write(temp: &TempDir, name: &str, contents: &str) -> String {
        let path = temp.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path.to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn test_explicit_when_both_keys_configured() {
        let source = CredentialSource::from_config(&StorageConfig {
            access_key: Some("AKIA".to_string()),
            secret_key: Some("secret".to_string()),
            region: Some("eu-west-1".to_string()),
            ..Default::default()
        });
        assert_eq!(source.kind(), "explicit");

        let creds = source.resolve_with(&hermetic(&[])).await.unwrap();
        assert_eq!(creds.access_key_id, "AKIA");
        assert_eq!(creds.region, "eu-west-1");
        assert_eq!(creds.origin, "configuration");
        assert!(creds.expires_at.is_none());
    }

    #[test]
    fn test_ambient_when_keys_missing_or_empty() {
        let source = CredentialSource::from_config(&StorageConfig {
            access_key: Some(String::new()),
            secret_key: Some("secret".to_string()),
            ..Default::default()
        });
        assert_eq!(source, CredentialSource::Ambient { region: None });

        let source = CredentialSource::from_config(&StorageConfig {
            access_key: Some("AKIA".to_string()),
            ..Default::default()
        });
        assert_eq!(source.kind(), "ambient");
    }

    #[tokio::test]
    async fn test_ambient_reads_environment() {
        let source = CredentialSource::Ambient { region: None };
        let creds = source
            .resolve_with(&hermetic(&[
                ("AWS_ACCESS_KEY_ID", "ENVKEY"),
                ("AWS_SECRET_ACCESS_KEY", "envsecret"),
                ("AWS_SESSION_TOKEN", "token"),
                ("AWS_DEFAULT_REGION", "ap-south-1"),
            ]))
            .await
            .unwrap();

        assert_eq!(creds.access_key_id, "ENVKEY");
        assert_eq!(creds.session_token.as_deref(), Some("token"));
        assert_eq!(creds.region, "ap-south-1");
        assert_eq!(creds.origin, "environment");
    }

    #[test]
    fn test_region_precedence() {
        let temp = TempDir::new().unwrap();
        let config = write(&temp, "config", "[default]\nregion = sa-east-1\n");
        let env = hermetic(&[
            ("AWS_REGION", "us-west-2"),
            ("AWS_DEFAULT_REGION", "eu-central-1"),
            ("AWS_CONFIG_FILE", config.as_str()),
        ]);
        let profile = Profile::load(&env);
        assert_eq!(resolve_region(Some("eu-west-1"), &env, &profile), "eu-west-1");
        assert_eq!(resolve_region(None, &env, &profile), "us-west-2");

        let env = hermetic(&[("AWS_CONFIG_FILE", config.as_str())]);
        assert_eq!(resolve_region(None, &env, &Profile::load(&env)), "sa-east-1");

        let env = hermetic(&[]);
        assert_eq!(resolve_region(None, &env, &Profile::load(&env)), DEFAULT_REGION);
    }

    #[tokio::test]
    async fn test_ambient_reads_shared_credentials_file() {
        let temp = TempDir::new().unwrap();
        let credentials = write(
            &temp,
            "credentials",
            "[default]\naws_access_key_id = DEFAULTKEY\naws_secret_access_key = defaultsecret\n\n[work]\naws_access_key_id = WORKKEY\naws_secret_access_key = worksecret\n",
        );
        let source = CredentialSource::Ambient {
            region: Some("eu-west-1".to_string()),
        };

        let creds = source
            .resolve_with(&hermetic(&[("AWS_SHARED_CREDENTIALS_FILE", credentials.as_str())]))
            .await
            .unwrap();
        assert_eq!(creds.access_key_id, "DEFAULTKEY");

        let creds = source
            .resolve_with(&hermetic(&[
                ("AWS_SHARED_CREDENTIALS_FILE", credentials.as_str()),
                ("AWS_PROFILE", "work"),
            ]))
            .await
            .unwrap();
        assert_eq!(creds.access_key_id, "WORKKEY");
        assert_eq!(creds.secret_access_key, "worksecret");
        assert!(creds.origin.ends_with("[work]"));
    }

    #[tokio::test]
    async fn test_config_file_profile_supplies_keys_and_region() {
        let temp = TempDir::new().unwrap();
        let config = write(
            &temp,
            "config",
            "[profile work]\nregion = ca-central-1\naws_access_key_id = CFGKEY\naws_secret_access_key = cfgsecret\n",
        );

        let creds = CredentialSource::Ambient { region: None }
            .resolve_with(&hermetic(&[
                ("AWS_CONFIG_FILE", config.as_str()),
                ("AWS_PROFILE", "work"),
            ]))
            .await
            .unwrap();

        assert_eq!(creds.access_key_id, "CFGKEY");
        assert_eq!(creds.region, "ca-central-1");
        assert!(creds.origin.ends_with("config [work]"));
    }

    #[tokio::test]
    async fn test_credentials_file_beats_config_file() {
        let temp = TempDir::new().unwrap();
        let credentials = write(
            &temp,
            "credentials",
            "[default]\naws_access_key_id = FILEKEY\naws_secret_access_key = filesecret\n",
        );
        let config = write(
            &temp,
            "config",
            "[default]\naws_access_key_id = CFGKEY\naws_secret_access_key = cfgsecret\n",
        );

        let creds = CredentialSource::Ambient { region: None }
            .resolve_with(&hermetic(&[
                ("AWS_SHARED_CREDENTIALS_FILE", credentials.as_str()),
                ("AWS_CONFIG_FILE", config.as_str()),
            ]))
            .await
            .unwrap();
        assert_eq!(creds.access_key_id, "FILEKEY");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_credential_process_output_is_used() {
        let temp = TempDir::new().unwrap();
        let config = write(
            &temp,
            "config",
            "[default]\ncredential_process = echo {\"Version\":1,\"AccessKeyId\":\"PROCKEY\",\"SecretAccessKey\":\"procsecret\",\"SessionToken\":\"proctoken\",\"Expiration\":\"2030-01-01T00:00:00Z\"}\n",
        );

        let creds = CredentialSource::Ambient { region: None }
            .resolve_with(&hermetic(&[("AWS_CONFIG_FILE", config.as_str())]))
            .await
            .unwrap();

        assert_eq!(creds.access_key_id, "PROCKEY");
        assert_eq!(creds.session_token.as_deref(), Some("proctoken"));
        assert_eq!(creds.origin, "credential_process [default]");
        assert!(creds.expires_at.is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_credential_process_stops_the_chain() {
        let temp = TempDir::new().unwrap();
        let config = write(&temp, "config", "[default]\ncredential_process = false\n");

        let result = CredentialSource::Ambient { region: None }
            .resolve_with(&hermetic(&[("AWS_CONFIG_FILE", config.as_str())]))
            .await;
        assert!(matches!(result, Err(StorageError::Credentials(_))));
    }

    #[tokio::test]
    async fn test_instance_role_is_the_last_resort() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/latest/api/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("t"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/latest/meta-data/iam/security-credentials/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ingest-role"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/latest/meta-data/iam/security-credentials/ingest-role"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Code": "Success",
                "AccessKeyId": "ASIAINSTANCE",
                "SecretAccessKey": "instancesecret",
                "Token": "instancetoken",
                "Expiration": "2030-01-01T00:00:00Z"
            })))
            .mount(&server)
            .await;

        let uri = server.uri();
        let creds = CredentialSource::Ambient {
            region: Some("eu-west-1".to_string()),
        }
        .resolve_with(&CredentialEnv::fixed([(
            "AWS_EC2_METADATA_SERVICE_ENDPOINT",
            uri.as_str(),
        )]))
        .await
        .unwrap();

        assert_eq!(creds.access_key_id, "ASIAINSTANCE");
        assert_eq!(creds.session_token.as_deref(), Some("instancetoken"));
        assert_eq!(creds.origin, "instance profile ingest-role");
    }

    #[tokio::test]
    async fn test_ambient_without_any_source_fails() {
        let source = CredentialSource::Ambient { region: None };
        let result = source
            .resolve_with(&hermetic(&[(
                "AWS_SHARED_CREDENTIALS_FILE",
                "/nonexistent/credentials",
            )]))
            .await;
        assert!(matches!(result, Err(StorageError::Credentials(_))));
    }

    #[test]
    fn test_expires_within() {
        let mut creds = ResolvedCredentials {
            access_key_id: "a".to_string(),
            secret_access_key: "s".to_string(),
            session_token: None,
            region: DEFAULT_REGION.to_string(),
            origin: "test".to_string(),
            expires_at: None,
        };
        assert!(!creds.expires_within(chrono::Duration::minutes(5)));

        creds.expires_at = Some(Utc::now() + chrono::Duration::minutes(2));
        assert!(creds.expires_within(chrono::Duration::minutes(5)));
        assert!(!creds.expires_within(chrono::Duration::minutes(1)));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let source = CredentialSource::Explicit {
            access_key: "AKIA".to_string(),
            secret_key: "topsecret".to_string(),
            region: None,
        };
        let debug = format!("{:?}", source);
        assert!(!debug.contains("topsecret"));
        assert!(!debug.contains("AKIA"));
    }
}
