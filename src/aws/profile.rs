use std::{
    collections::{HashMap, HashSet},
    path::Path,
};

use ini::{Ini, Properties};
use tracing::debug;

use crate::{constants, error::ProfileError};

/// One AWS profile as described by the shared config files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileConfig {
    pub name: String,
    pub source_profile: Option<String>,
    pub role_arn: Option<String>,
    pub mfa_serial: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl ProfileConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Profiles with a role are reached by assuming it from `source_profile`
    pub fn is_role(&self) -> bool {
        self.role_arn.is_some()
    }

    fn merge(&mut self, section: &Properties) {
        let pick = |key: &str| section.get(key).map(str::to_string);

        self.source_profile = pick("source_profile").or(self.source_profile.take());
        self.role_arn = pick("role_arn").or(self.role_arn.take());
        self.mfa_serial = pick("mfa_serial").or(self.mfa_serial.take());
        self.region = pick("region").or(self.region.take());
        self.access_key_id = pick("aws_access_key_id").or(self.access_key_id.take());
        self.secret_access_key = pick("aws_secret_access_key").or(self.secret_access_key.take());
    }
}

/// All profiles known from `~/.aws/config` and `~/.aws/credentials`
#[derive(Debug, Clone, Default)]
pub struct Profiles {
    profiles: HashMap<String, ProfileConfig>,
}

impl Profiles {
    /// Load profiles from the shared config files; missing files are skipped
    pub fn load() -> Result<Self, ProfileError> {
        let config = match constants::get_aws_config_path() {
            Some(path) => load_ini(&path)?,
            None => Ini::new(),
        };
        let credentials = match constants::get_aws_credentials_path() {
            Some(path) => load_ini(&path)?,
            None => Ini::new(),
        };

        Ok(Self::from_ini(&config, &credentials))
    }

    /// Build from parsed files; the config file wins over the credentials file
    pub fn from_ini(config: &Ini, credentials: &Ini) -> Self {
        let mut profiles = Self::default();

        for (section, props) in credentials.iter() {
            if let Some(name) = section {
                profiles.entry(name).merge(props);
            }
        }

        for (section, props) in config.iter() {
            let name = match section {
                Some("default") => "default",
                Some(s) => match s.strip_prefix("profile ") {
                    Some(name) => name.trim(),
                    None => continue,
                },
                None => continue,
            };
            profiles.entry(name).merge(props);
        }

        profiles
    }

    fn entry(&mut self, name: &str) -> &mut ProfileConfig {
        self.profiles
            .entry(name.to_string())
            .or_insert_with(|| ProfileConfig::new(name))
    }

    pub fn insert(&mut self, profile: ProfileConfig) {
        self.profiles.insert(profile.name.clone(), profile);
    }

    pub fn get(&self, name: &str) -> Result<&ProfileConfig, ProfileError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Follow `source_profile` links from `name` down to a profile without a role
    ///
    /// The first element is `name` itself, the last one is the root. A link
    /// that revisits a profile fails with [`ProfileError::Cycle`].
    pub fn role_chain(&self, name: &str) -> Result<Vec<ProfileConfig>, ProfileError> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = self.get(name)?;

        loop {
            if !visited.insert(current.name.as_str()) {
                let mut names: Vec<String> = chain
                    .iter()
                    .map(|p: &ProfileConfig| p.name.clone())
                    .collect();
                names.push(current.name.clone());
                return Err(ProfileError::Cycle {
                    profile: current.name.clone(),
                    chain: names,
                });
            }
            chain.push(current.clone());

            if !current.is_role() {
                break;
            }

            let source = current.source_profile.as_deref().ok_or_else(|| {
                ProfileError::MissingSourceProfile {
                    profile: current.name.clone(),
                }
            })?;
            current = self.get(source)?;
        }

        debug!(
            "Resolved profile chain: {}",
            chain
                .iter()
                .map(|p| p.name.as_str())
                .collect::<Vec<_>>()
                .join(" -> ")
        );
        Ok(chain)
    }
}

impl FromIterator<ProfileConfig> for Profiles {
    fn from_iter<I: IntoIterator<Item = ProfileConfig>>(iter: I) -> Self {
        let mut profiles = Self::default();
        for profile in iter {
            profiles.insert(profile);
        }
        profiles
    }
}

fn load_ini(path: &Path) -> Result<Ini, ProfileError> {
    if !path.exists() {
        debug!("AWS config file not present: {}", path.display());
        return Ok(Ini::new());
    }

    Ini::load_from_file(path).map_err(|e| ProfileError::ConfigFile {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
