//! Scripted stand-ins for the identity provider, MFA prompt and re-login.

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    },
    thread::{self, ThreadId},
};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::{Credential, IdentityProvider, MfaPrompt, ProfileConfig, Relogin};
use crate::error::{AuthError, IdentityError};

pub fn credential(tag: &str, valid_for: Duration) -> Credential {
    Credential {
        access_key_id: format!("AKIA{tag}"),
        secret_access_key: format!("secret-{tag}"),
        session_token: format!("token-{tag}"),
        expiration: Utc::now() + valid_for,
        region: Some("eu-west-1".to_string()),
    }
}

/// Records every call; session token results are scripted per call
#[derive(Default)]
pub struct FakeSts {
    pub calls: Mutex<Vec<String>>,
    pub session_results: Mutex<VecDeque<Result<(), IdentityError>>>,
}

impl FakeSts {
    pub fn rejecting(times: usize) -> Self {
        let fake = Self::default();
        for _ in 0..times {
            fake.session_results
                .lock()
                .unwrap()
                .push_back(Err(IdentityError::Rejected("invalid MFA code".to_string())));
        }
        fake
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl IdentityProvider for FakeSts {
    async fn caller_arn(&self, profile: &ProfileConfig) -> Result<String, IdentityError> {
        self.record(format!("caller_arn:{}", profile.name));
        Ok(format!("arn:aws:iam::123456789012:user/{}", profile.name))
    }

    async fn get_session_token(
        &self,
        profile: &ProfileConfig,
        serial_number: &str,
        token_code: &str,
    ) -> Result<Credential, IdentityError> {
        self.record(format!(
            "get_session_token:{}:{}:{}",
            profile.name, serial_number, token_code
        ));
        let scripted = self.session_results.lock().unwrap().pop_front();
        match scripted {
            Some(Err(e)) => Err(e),
            _ => Ok(credential(&profile.name.to_uppercase(), Duration::hours(1))
                .with_region(None)),
        }
    }

    async fn assume_role(
        &self,
        source: &Credential,
        role_arn: &str,
        _session_name: &str,
    ) -> Result<Credential, IdentityError> {
        self.record(format!("assume_role:{}:{}", source.access_key_id, role_arn));
        let role = role_arn.rsplit('/').next().unwrap_or("ROLE");
        Ok(credential(&role.to_uppercase(), Duration::hours(1)).with_region(None))
    }
}

/// Answers with a fixed code and counts how often it was asked
#[derive(Default)]
pub struct FakePrompt {
    pub count: AtomicU32,
    pub unavailable: bool,
}

impl FakePrompt {
    /// A prompt with no terminal behind it
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

impl MfaPrompt for FakePrompt {
    fn prompt(&self, _profile: &str) -> Result<String, AuthError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(AuthError::PromptUnavailable("no terminal".to_string()));
        }
        Ok("123456".to_string())
    }
}

/// Counts re-logins and remembers which thread ran them
#[derive(Default)]
pub struct FakeRelogin {
    pub count: AtomicU32,
    pub threads: Mutex<Vec<ThreadId>>,
}

impl FakeRelogin {
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn threads(&self) -> Vec<ThreadId> {
        self.threads.lock().unwrap().clone()
    }
}

impl Relogin for FakeRelogin {
    fn relogin(&self, _profile: &str) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.threads.lock().unwrap().push(thread::current().id());
    }
}
