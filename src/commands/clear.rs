use anyhow::{Context, Result};
use clap::Args;

use crate::aws::CredentialStore;

#[derive(Debug, Clone, Args)]
pub struct ClearCommand {}

impl ClearCommand {
    pub async fn execute(self, profile: &str) -> Result<()> {
        let store = CredentialStore::from_env().context("Failed to locate the credential cache")?;
        self.clear(&store, profile).await
    }

    async fn clear(&self, store: &CredentialStore, profile: &str) -> Result<()> {
        let removed = store
            .remove(profile)
            .await
            .with_context(|| format!("Failed to clear credentials for profile '{profile}'"))?;

        if removed {
            println!("Cleared cached credentials for profile '{profile}'");
        } else {
            println!("No cached credentials for profile '{profile}'");
        }
        Ok(())
    }
}
