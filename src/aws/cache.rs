use tracing::{debug, info, warn};

use super::{Credential, CredentialAcquirer, CredentialStore, Profiles};
use crate::error::{AuthResult, StoreError};

/// Returns valid credentials for a profile, from disk when possible
///
/// Lookup walks the role chain from the requested profile towards its root
/// and stops at the first profile holding an unexpired cached record. Every
/// profile above that point is then (re)acquired in order: a session token
/// for the root, or one assume-role call per role hop, each result written
/// back to the store under its own profile name.
pub struct CredentialCache {
    store: CredentialStore,
    profiles: Profiles,
    acquirer: CredentialAcquirer,
}

impl CredentialCache {
    pub fn new(store: CredentialStore, profiles: Profiles, acquirer: CredentialAcquirer) -> Self {
        Self {
            store,
            profiles,
            acquirer,
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Valid credentials for `profile`; never returns an expired record
    pub async fn get(&self, profile: &str) -> AuthResult<Credential> {
        if let Some(credential) = self.cached(profile).await? {
            debug!("Cache hit for profile: {}", profile);
            return Ok(credential);
        }

        let chain = self.profiles.role_chain(profile)?;

        // Index of the first link (from the target) already cached, if any.
        let mut start = None;
        for (index, link) in chain.iter().enumerate().skip(1) {
            if let Some(credential) = self.cached(&link.name).await? {
                start = Some((index, credential));
                break;
            }
        }

        let (mut index, mut credential) = match start {
            Some(found) => found,
            None => {
                let root_index = chain.len() - 1;
                let root = &chain[root_index];
                info!("Requesting session credentials for profile: {}", root.name);
                let credential = self.acquirer.session_token(root).await?;
                self.store.save(&root.name, &credential).await?;
                (root_index, credential)
            }
        };

        while index > 0 {
            let source = &chain[index];
            let target = &chain[index - 1];
            let Some(role_arn) = target.role_arn.as_deref() else {
                break;
            };

            credential = self.acquirer.assume_role(role_arn, &credential, source).await?;
            self.store.save(&target.name, &credential).await?;
            index -= 1;
        }

        Ok(credential)
    }

    /// Unexpired record for `profile`; missing, expired and unreadable
    /// records are all cache misses
    async fn cached(&self, profile: &str) -> AuthResult<Option<Credential>> {
        match self.store.fetch(profile).await {
            Ok(Some(credential)) if credential.is_valid() => Ok(Some(credential)),
            Ok(Some(_)) => {
                debug!("Cached credentials for {} have expired", profile);
                Ok(None)
            }
            Ok(None) => Ok(None),
            Err(e @ StoreError::Corrupted { .. }) => {
                warn!("Ignoring unreadable credential cache: {}", e);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
