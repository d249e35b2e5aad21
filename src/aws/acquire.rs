use std::{env, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{
    Credential, ProfileConfig,
    mfa::{MfaPrompt, Relogin, mfa_serial_from_arn},
    sts::IdentityProvider,
};
use crate::{
    constants::{DEFAULT_MFA_BACKOFF_BASE, DEFAULT_MFA_MAX_TRIES},
    error::{AuthError, AuthResult},
};

/// Longest role session name STS accepts
const MAX_SESSION_NAME_LEN: usize = 64;

/// Bounded retry of MFA-gated session token requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_tries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_tries: DEFAULT_MFA_MAX_TRIES,
            base_delay: DEFAULT_MFA_BACKOFF_BASE,
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure: `base * 2^(attempt-1)`, at most 32x base
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(5);
        self.base_delay * (1u32 << exponent)
    }
}

/// Obtains fresh credentials from the identity provider
pub struct CredentialAcquirer {
    provider: Arc<dyn IdentityProvider>,
    prompt: Arc<dyn MfaPrompt>,
    relogin: Arc<dyn Relogin>,
    policy: RetryPolicy,
    session_name: String,
}

impl CredentialAcquirer {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        prompt: Arc<dyn MfaPrompt>,
        relogin: Arc<dyn Relogin>,
    ) -> Self {
        Self {
            provider,
            prompt,
            relogin,
            policy: RetryPolicy::default(),
            session_name: role_session_name(&local_user(), &local_hostname()),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    /// MFA-gated session credentials for a profile holding long-lived keys
    ///
    /// Rejected attempts are retried with backoff; once the budget is spent
    /// the re-login fallback runs and [`AuthError::Exhausted`] is returned.
    pub async fn session_token(&self, profile: &ProfileConfig) -> AuthResult<Credential> {
        let mut serial = profile.mfa_serial.clone();

        for attempt in 1..=self.policy.max_tries {
            match self.try_session_token(profile, &mut serial).await {
                Ok(credential) => return Ok(credential.with_region(profile.region.clone())),
                Err(e) if e.is_rejected() => {
                    warn!(
                        "MFA attempt {}/{} for profile '{}' failed: {}",
                        attempt, self.policy.max_tries, profile.name, e
                    );
                    eprintln!(
                        "\n > Invalid MFA code provided or other authentication problem, please try again!\n"
                    );
                    if attempt < self.policy.max_tries {
                        sleep(self.policy.delay_for(attempt)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        eprintln!("\n > Giving up after multiple fails...");
        self.run_relogin(&profile.name).await;

        Err(AuthError::Exhausted {
            profile: profile.name.clone(),
            attempts: self.policy.max_tries,
        })
    }

    async fn try_session_token(
        &self,
        profile: &ProfileConfig,
        serial: &mut Option<String>,
    ) -> AuthResult<Credential> {
        let code = self.read_code(&profile.name).await?;

        let serial_number = match serial.clone() {
            Some(known) => known,
            None => {
                let arn = self.provider.caller_arn(profile).await?;
                let derived = mfa_serial_from_arn(&arn);
                debug!("Derived MFA serial {} from {}", derived, arn);
                *serial = Some(derived.clone());
                derived
            }
        };

        Ok(self
            .provider
            .get_session_token(profile, &serial_number, &code)
            .await?)
    }

    /// The re-login is interactive; it runs off the async workers
    async fn run_relogin(&self, profile: &str) {
        let relogin = Arc::clone(&self.relogin);
        let name = profile.to_string();

        if let Err(e) = tokio::task::spawn_blocking(move || relogin.relogin(&name)).await {
            warn!("Re-login for profile '{}' did not finish: {}", profile, e);
        }
    }

    async fn read_code(&self, profile: &str) -> AuthResult<String> {
        let prompt = Arc::clone(&self.prompt);
        let profile = profile.to_string();

        tokio::task::spawn_blocking(move || prompt.prompt(&profile))
            .await
            .map_err(|e| AuthError::Prompt(e.to_string()))?
    }

    /// Credentials for `profile` obtained by assuming its role from `source`
    ///
    /// Role credentials carry no region of their own; they inherit the
    /// source profile's.
    pub async fn assume_role(
        &self,
        role_arn: &str,
        source: &Credential,
        source_profile: &ProfileConfig,
    ) -> AuthResult<Credential> {
        info!(
            "Assuming role {} via source profile {}",
            role_arn, source_profile.name
        );

        let credential = self
            .provider
            .assume_role(source, role_arn, &self.session_name)
            .await?;

        let region = source_profile.region.clone().or(source.region.clone());
        Ok(credential.with_region(region))
    }
}

/// `{user}@{host}-session`, restricted to the characters STS allows
pub fn role_session_name(user: &str, host: &str) -> String {
    format!("{user}@{host}-session")
        .chars()
        .map(|c| match c {
            c if c.is_ascii_alphanumeric() => c,
            '_' | '+' | '=' | ',' | '.' | '@' | '-' => c,
            _ => '-',
        })
        .take(MAX_SESSION_NAME_LEN)
        .collect()
}

fn local_user() -> String {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "clvm".to_string())
}

fn local_hostname() -> String {
    #[cfg(unix)]
    {
        nix::unistd::gethostname()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string())
    }

    #[cfg(not(unix))]
    {
        env::var("COMPUTERNAME").unwrap_or_else(|_| "localhost".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::testing::{FakePrompt, FakeRelogin, FakeSts};

    struct Parts {
        sts: Arc<FakeSts>,
        prompt: Arc<FakePrompt>,
        relogin: Arc<FakeRelogin>,
        acquirer: CredentialAcquirer,
    }

    fn acquirer(sts: FakeSts, prompt: FakePrompt) -> Parts {
        let sts = Arc::new(sts);
        let prompt = Arc::new(prompt);
        let relogin = Arc::new(FakeRelogin::default());
        let acquirer = CredentialAcquirer::new(sts.clone(), prompt.clone(), relogin.clone())
            .with_policy(RetryPolicy {
                max_tries: 3,
                base_delay: Duration::ZERO,
            });

        Parts {
            sts,
            prompt,
            relogin,
            acquirer,
        }
    }

    #[tokio::test]
    async fn test_unavailable_prompt_fails_without_retry_or_relogin() {
        let parts = acquirer(FakeSts::default(), FakePrompt::unavailable());

        let err = parts
            .acquirer
            .session_token(&ProfileConfig::new("default"))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::PromptUnavailable(_)));
        assert_eq!(parts.prompt.count(), 1);
        assert_eq!(parts.relogin.count(), 0);
        assert!(parts.sts.calls().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_relogin_runs_off_the_runtime_thread() {
        let parts = acquirer(FakeSts::rejecting(3), FakePrompt::default());

        let err = parts
            .acquirer
            .session_token(&ProfileConfig::new("default"))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Exhausted { attempts: 3, .. }));
        let threads = parts.relogin.threads();
        assert_eq!(threads.len(), 1);
        assert_ne!(threads[0], std::thread::current().id());
    }

    #[test]
    fn test_delay_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_tries: 3,
            base_delay: Duration::from_secs(1),
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10), Duration::from_secs(32));
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_tries, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_role_session_name() {
        assert_eq!(
            role_session_name("alice", "laptop.local"),
            "alice@laptop.local-session"
        );
    }

    #[test]
    fn test_role_session_name_is_sanitized() {
        let name = role_session_name("DOMAIN\\bob smith", &"h".repeat(100));
        assert!(name.starts_with("DOMAIN-bob-smith@"));
        assert_eq!(name.len(), MAX_SESSION_NAME_LEN);
    }
}
