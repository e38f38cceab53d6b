//! Shared AWS profile files (`~/.aws/credentials` and `~/.aws/config`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{CredentialEnv, ResolvedCredentials};

/// Which shared file a setting came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ProfileFile {
    Credentials,
    Config,
}

#[derive(Debug, Default)]
struct Section {
    path: PathBuf,
    values: HashMap<String, String>,
}

/// The selected profile (`AWS_PROFILE`, else `default`) as found in both
/// shared files. Either file may be missing.
#[derive(Debug, Default)]
pub(super) struct Profile {
    pub name: String,
    credentials: Option<Section>,
    config: Option<Section>,
}

impl Profile {
    pub fn load(env: &CredentialEnv) -> Self {
        let name = env.get("AWS_PROFILE").unwrap_or_else(|| "default".to_string());
        let home = env
            .get("HOME")
            .or_else(|| env.get("USERPROFILE"))
            .map(PathBuf::from);
        let in_home = |file: &str| home.as_ref().map(|h| h.join(".aws").join(file));

        let credentials = env
            .get("AWS_SHARED_CREDENTIALS_FILE")
            .map(PathBuf::from)
            .or_else(|| in_home("credentials"))
            .and_then(|path| read_section(&path, &[name.clone()]));

        // The config file names profiles `[profile x]`; `[default]` may go either way.
        let mut config_sections = vec![format!("profile {}", name)];
        if name == "default" {
            config_sections.insert(0, name.clone());
        }
        let config = env
            .get("AWS_CONFIG_FILE")
            .map(PathBuf::from)
            .or_else(|| in_home("config"))
            .and_then(|path| read_section(&path, &config_sections));

        Self {
            name,
            credentials,
            config,
        }
    }

    fn section(&self, file: ProfileFile) -> Option<&Section> {
        match file {
            ProfileFile::Credentials => self.credentials.as_ref(),
            ProfileFile::Config => self.config.as_ref(),
        }
    }

    /// A setting from the credentials file, else the config file.
    pub fn get(&self, key: &str) -> Option<&str> {
        [ProfileFile::Credentials, ProfileFile::Config]
            .into_iter()
            .find_map(|file| self.get_in(file, key))
    }

    fn get_in(&self, file: ProfileFile, key: &str) -> Option<&str> {
        self.section(file)?
            .values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Region configured for the profile. Only the config file carries one.
    pub fn region(&self) -> Option<&str> {
        self.get_in(ProfileFile::Config, "region")
    }

    /// Static keys stored in `file` for this profile.
    pub fn static_keys(&self, file: ProfileFile, region: &str) -> Option<ResolvedCredentials> {
        let section = self.section(file)?;
        Some(ResolvedCredentials {
            access_key_id: self.get_in(file, "aws_access_key_id")?.to_string(),
            secret_access_key: self.get_in(file, "aws_secret_access_key")?.to_string(),
            session_token: self.get_in(file, "aws_session_token").map(str::to_string),
            region: region.to_string(),
            origin: format!("{} [{}]", section.path.display(), self.name),
            expires_at: None,
        })
    }
}

fn read_section(path: &Path, names: &[String]) -> Option<Section> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            return None;
        }
    };

    let found = names
        .iter()
        .find_map(|name| parse_section(&contents, name));
    if found.is_none() {
        debug!("No profile {:?} in {}", names, path.display());
    }

    found.map(|values| Section {
        path: path.to_path_buf(),
        values,
    })
}

/// Key/value pairs of one `[name]` section of an INI-style AWS file.
///
/// Keys are lowercased. Indented lines belong to nested blocks such as
/// `s3 =` and are ignored.
fn parse_section(contents: &str, name: &str) -> Option<HashMap<String, String>> {
    let mut current: Option<&str> = None;
    let mut values = HashMap::new();
    let mut found = false;

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let header = header.trim();
            current = Some(header);
            found |= header == name;
            continue;
        }

        if current != Some(name) || raw.starts_with([' ', '\t']) {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            values.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }

    found.then_some(values)
}
