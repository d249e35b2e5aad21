use std::sync::Arc;

use anyhow::{Context, Result};

use crate::aws::{
    AwsConfigureRelogin, CredentialAcquirer, CredentialCache, CredentialStore, Profiles,
    StsIdentityProvider, TerminalPrompt,
};

pub mod clear;
pub mod completions;
pub mod credentials;
pub mod proxy;
pub mod ssh;
pub mod target;
pub mod tunnel;

pub use clear::ClearCommand;
pub use completions::CompletionsCommand;
pub use credentials::{CredentialsCommand, OutputFormat};
pub use proxy::ProxyCommand;
pub use ssh::SshCommand;
pub use target::{TargetCommand, TunnelArgs};
pub use tunnel::OpenTunnelCommand;

/// Credential cache wired to STS, the terminal MFA prompt and `aws configure`
pub(crate) fn credential_cache() -> Result<CredentialCache> {
    let store = CredentialStore::from_env().context("Failed to locate the credential cache")?;
    let profiles = Profiles::load().context("Failed to read AWS configuration")?;
    let acquirer = CredentialAcquirer::new(
        Arc::new(StsIdentityProvider::new()),
        Arc::new(TerminalPrompt),
        Arc::new(AwsConfigureRelogin),
    );

    Ok(CredentialCache::new(store, profiles, acquirer))
}
