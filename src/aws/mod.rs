use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod acquire;
pub mod cache;
pub mod mfa;
pub mod profile;
pub mod store;
pub mod sts;

/// AWS temporary credentials, as cached on disk
///
/// Field names follow the STS response shape so the cache file reads like
/// the `Credentials` block the AWS CLI prints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Credential {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
    #[serde(default)]
    pub region: Option<String>,
}

impl Credential {
    /// A credential is usable until its expiration instant
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration > now
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Copy of this credential carrying a different region
    pub fn with_region(self, region: Option<String>) -> Self {
        Self { region, ..self }
    }
}

pub use acquire::{CredentialAcquirer, RetryPolicy};
pub use cache::CredentialCache;
pub use mfa::{AwsConfigureRelogin, MfaPrompt, Relogin, TerminalPrompt};
pub use profile::{ProfileConfig, Profiles};
pub use store::CredentialStore;
pub use sts::{IdentityProvider, StsIdentityProvider};

#[cfg(test)]
pub(crate) mod testing;
